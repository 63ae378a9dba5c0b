// Cuepoint API Library
//
// HTTP/JSON surface over the playback core

pub mod http;

// Re-export commonly used types
pub use http::{create_router, AppState};
