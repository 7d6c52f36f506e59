pub mod config;
pub mod types;
pub mod workdir;

pub use config::{load_config, ExtractorConfig, SelectorConfig};
