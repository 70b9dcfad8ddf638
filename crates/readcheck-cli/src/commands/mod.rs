pub mod init;
pub mod list_models;
pub mod passages;
pub mod take;
pub mod validate;
