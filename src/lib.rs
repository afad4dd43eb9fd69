pub mod artifacts;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp_server;
pub mod media;
pub mod openai;
pub mod options;
pub mod sanitizer;
pub mod tools;

pub use error::{ImageError, Result};
