//! Streaming relay from an Ollama generate call to a plain text byte stream
//!
//! One [`StreamRelay::open`] call issues exactly one upstream request. The
//! response body is decoded incrementally ([`LineBuffer`]), each line is parsed
//! as an [`UpstreamRecord`], and text fragments are written to the returned
//! [`RelayStream`] either whole or token by token ([`Pacer`]).

mod line_buffer;
mod pacing;
mod record;
mod request;
mod stream;

pub use line_buffer::LineBuffer;
pub use pacing::{Pacer, Tokens, tokenize};
pub use record::UpstreamRecord;
pub use request::{GenerateBody, GenerateOptions, GenerationRequest, Identity};
pub use stream::{CompletionHandle, RelayStream, StreamEnd, StreamRelay};
