//! Chat webhook notifications.
//!
//! Messages go to a Discord-style webhook as `multipart/form-data` with a
//! `content` field and an optional `file` part. Delivery is always optional:
//! callers that must not fail use [`notify_best_effort`].

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::NotifyConfig;
use crate::error::{PipelineError, Result};
use crate::http;

pub trait Notify {
    fn send(&self, message: &str, attachment: Option<&Path>) -> Result<()>;
}

pub struct WebhookNotifier {
    url: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: Option<&str>, timeout: Duration) -> Result<Self> {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        if let Some(url) = url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(PipelineError::Config(format!(
                    "webhook URL must be http(s): {}",
                    url
                )));
            }
        }
        Ok(Self {
            url: url.map(str::to_string),
            timeout,
        })
    }

    /// Channel for capture notices and errors.
    pub fn general(config: &NotifyConfig) -> Result<Self> {
        Self::new(
            config.webhook_url.as_deref(),
            http::timeout_from_secs(config.timeout_secs),
        )
    }

    /// Channel for analyses and reports.
    pub fn ai(config: &NotifyConfig) -> Result<Self> {
        Self::new(
            config.ai_webhook(),
            http::timeout_from_secs(config.timeout_secs),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

impl Notify for WebhookNotifier {
    fn send(&self, message: &str, attachment: Option<&Path>) -> Result<()> {
        let Some(url) = self.url.as_deref() else {
            tracing::info!("No webhook configured; skipping notification: {}", message);
            return Ok(());
        };

        let file = attachment.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => Some((file_name(path), bytes)),
            Err(e) => {
                tracing::warn!("Could not read attachment {:?}: {}", path, e);
                None
            }
        });

        let file = file.as_ref().map(|(name, bytes)| (name.as_str(), bytes.as_slice()));
        let boundary = choose_boundary(clock_seed(), message, file);
        let body = multipart_body(&boundary, message, file);

        tracing::debug!(
            bytes = body.len(),
            attachment = file.is_some(),
            "Posting webhook notification"
        );

        http::agent(self.timeout)
            .post(url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .map_err(delivery_error)?;

        tracing::info!("Notification delivered");
        Ok(())
    }
}

/// Send and swallow any failure.
pub fn notify_best_effort(notifier: &dyn Notify, message: &str, attachment: Option<&Path>) {
    if let Err(e) = notifier.send(message, attachment) {
        tracing::warn!("Notification not delivered: {}", e);
    }
}

fn delivery_error(err: ureq::Error) -> PipelineError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            PipelineError::Delivery(format!("webhook returned HTTP {}: {}", code, body.trim()))
        }
        ureq::Error::Transport(t) => PipelineError::Delivery(t.to_string()),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().replace('"', "_"))
        .unwrap_or_else(|| "attachment".to_string())
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().map(|e| e.to_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

fn clock_seed() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

/// A multipart boundary that occurs in neither the message nor the file.
fn choose_boundary(seed: u128, message: &str, file: Option<(&str, &[u8])>) -> String {
    let occurs_in = |haystack: &[u8], needle: &[u8]| {
        haystack.windows(needle.len()).any(|w| w == needle)
    };
    (0u64..)
        .map(|n| format!("----plantwatch{:x}{:x}", seed, n))
        .find(|candidate| {
            let needle = candidate.as_bytes();
            !occurs_in(message.as_bytes(), needle)
                && !file.is_some_and(|(name, bytes)| {
                    occurs_in(name.as_bytes(), needle) || occurs_in(bytes, needle)
                })
        })
        .unwrap_or_default()
}

fn multipart_body(boundary: &str, message: &str, file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"content\"\r\n\r\n");
    body.extend_from_slice(message.as_bytes());
    body.extend_from_slice(b"\r\n");

    if let Some((name, bytes)) = file {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type_for(name)).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
