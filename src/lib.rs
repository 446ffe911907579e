//! Plantwatch: timelapse plant health tracking.
//!
//! Each run picks the newest capture, asks a vision model to judge it, and
//! records the reply and a 0-100 health score in SQLite. The score history can
//! be charted and posted to a chat webhook.

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod http;
pub mod llm;
pub mod logging;
pub mod notify;
pub mod report;
pub mod scanner;
pub mod scoring;

pub use error::{PipelineError, Result};
