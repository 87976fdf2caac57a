//! Message stream processing
//!
//! - `decoder`: byte chunks to blank-line delimited frames
//! - `interpret`: frame payloads to [`StreamEvent`](crate::models::StreamEvent)s
//! - `processor`: per-call state tying both to the delta sink

mod decoder;
mod interpret;
mod processor;

pub use decoder::EventFrameDecoder;
pub use interpret::interpret;
pub use processor::StreamProcessor;
