pub mod commands;
pub mod error;
pub mod output;

pub use commands::{ConfigCommand, GenerateCommand};
pub use error::{CliError, CliResult};
pub use output::OutputFormat;
