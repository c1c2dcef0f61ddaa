// hlsgate API Library
//
// HTTP/JSON API for stream control and HLS metadata

pub mod http;

// Re-export commonly used types
pub use http::{create_router, AppState};
