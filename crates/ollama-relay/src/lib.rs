//! Ollama Relay - streaming reframer for text generation backends
//!
//! This crate opens a generation request against an Ollama-compatible
//! upstream, decodes its newline-delimited JSON response incrementally, and
//! republishes the text fragments as a plain byte stream.

pub mod config;
pub mod error;
pub mod relay;
pub mod server;

pub use error::{RelayAppError, RelayError};
pub use relay::{GenerationRequest, RelayStream, StreamRelay};
