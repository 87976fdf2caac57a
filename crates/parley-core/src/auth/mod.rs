//! Authentication for Parley
//!
//! - Bearer token storage behind a single interface
//! - Memory, file, and layered backends

pub mod token_store;

pub use token_store::{FileTokenStore, LayeredTokenStore, MemoryTokenStore, TokenStore};
