//! The `readcheck init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create readcheck.toml
    if std::path::Path::new("readcheck.toml").exists() {
        println!("readcheck.toml already exists, skipping.");
    } else {
        std::fs::write("readcheck.toml", SAMPLE_CONFIG)?;
        println!("Created readcheck.toml");
    }

    // Create example passage library
    std::fs::create_dir_all("passages")?;
    let example_path = std::path::Path::new("passages/example.json");
    if example_path.exists() {
        println!("passages/example.json already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_PASSAGES)?;
        println!("Created passages/example.json");
    }

    println!("\nNext steps:");
    println!("  1. Set OPENAI_API_KEY (or edit readcheck.toml for another provider)");
    println!("  2. Run: readcheck validate --passages passages");
    println!("  3. Run: readcheck take");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# readcheck configuration

default_provider = "openai"
default_model = "gpt-4o-mini"
question_temperature = 0.7
grading_temperature = 0.3
max_tokens = 1024
max_retries = 3
retry_delay_ms = 1000
passages = "passages"
output_dir = "./readcheck-results"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;

const EXAMPLE_PASSAGES: &str = r#"{
  "passages": [
    {
      "id": "paper-boats",
      "title": "Paper Boats",
      "content": "Every spring, when the snow melted, Mara folded paper boats from old newspapers. She launched them into the stream behind her grandmother's house and watched them spin away. Most sank before the first bend. One year she coated a boat in candle wax, and it sailed all the way past the mill. Her grandmother said the wax boat had taught her more than any book: a small change, tested patiently, can carry an idea much further than expected."
    }
  ]
}
"#;
