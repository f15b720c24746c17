pub mod analyzer;
pub mod client;
pub mod throttle;

pub use analyzer::{build_analyze_request, extract_analysis, extract_personalized_score};
pub use client::{VisionClient, VisionError};
pub use throttle::Throttle;
