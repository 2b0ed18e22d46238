pub mod config;
pub mod generate;

pub use config::ConfigCommand;
pub use generate::GenerateCommand;
