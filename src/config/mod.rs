// Configuration management module
// TOML configuration for the embedding service, chunking, retrieval and loading

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, OllamaConfig};
