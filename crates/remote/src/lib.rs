pub mod client;
pub mod error;
pub mod types;

pub use client::RemoteApp;
pub use error::{RemoteError, Result};
pub use types::*;
