//! Shared vocabulary of the Open8055 server: protocol constants, the error
//! taxonomy and validated port/mask/timeout types.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
