//! Core utilities and common types for CSDL.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::CsdlConfig;
pub use error::{Error, Result};
pub use types::*;
