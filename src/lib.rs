pub mod config;
pub mod models;
pub mod utils;
pub mod vision;

pub use config::{Config, ConfigError};
pub use models::*;
pub use vision::{VisionClient, VisionError};
