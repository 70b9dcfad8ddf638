//! The `readcheck list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use readcheck_providers::create_provider;
use readcheck_providers::ollama::OllamaProvider;
use readcheck_providers::ProviderConfig;

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = readcheck_providers::config::load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if let Some(filter) = &provider_filter {
            if name != filter {
                continue;
            }
        }

        let provider_config = &config.providers[name];
        let models = match provider_config {
            ProviderConfig::Ollama { base_url } => {
                match OllamaProvider::new(base_url)?.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        eprintln!("Provider {name}: {e:#}");
                        continue;
                    }
                }
            }
            _ => create_provider(name, provider_config)?.available_models(),
        };

        if !models.is_empty() {
            found_any = true;
            let marker = if *name == config.default_provider {
                " (default)"
            } else {
                ""
            };
            println!("Provider: {name}{marker}");
            for model in &models {
                let default = if model.id == config.default_model {
                    " *"
                } else {
                    ""
                };
                if model.max_context > 0 {
                    println!(
                        "  {} — {} ({}K context){default}",
                        model.id,
                        model.name,
                        model.max_context / 1000
                    );
                } else {
                    println!("  {} — {}{default}", model.id, model.name);
                }
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `readcheck init` to create a config file.");
    }

    Ok(())
}
