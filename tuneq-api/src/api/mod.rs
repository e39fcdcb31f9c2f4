//! HTTP API handlers for tuneq-api

pub mod health;
pub mod jobs;
pub mod music;
pub mod sse;

pub use health::health_routes;
pub use jobs::job_routes;
pub use music::music_routes;
pub use sse::music_event_stream;
