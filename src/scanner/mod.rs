//! Capture discovery: locating the newest photo written by the capture job
//! and reading what we need to know about it.

pub mod discovery;
pub mod metadata;

pub use discovery::{is_allowed_image, latest_image, mime_type_for};
pub use metadata::capture_time;
