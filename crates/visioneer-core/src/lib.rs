pub mod config;
pub mod error;
pub mod types;

pub use config::VisioneerConfig;
pub use error::{Result, VisioneerError};
pub use types::*;
