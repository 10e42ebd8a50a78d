//! HTTP delivery of completion notifications.

use super::{CompletionNotifier, Notification};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Posts notifications as JSON to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("Hitport/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            url: url.into(),
        }
    }

    /// Returns the target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn deliver(&self, notification: &Notification) -> std::result::Result<u16, String> {
        let response = self
            .client
            .post(&self.url)
            .header("X-Hitport-Event", notification.kind.as_str())
            .header("X-Hitport-Delivery-Id", notification.event_id.to_string())
            .json(notification)
            .send()
            .map_err(|e| format!("HTTP request failed: {e}"))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            Ok(status)
        } else {
            Err(format!("HTTP {status} response"))
        }
    }
}

impl CompletionNotifier for WebhookNotifier {
    fn notify(&self, notification: &Notification) {
        let start = Instant::now();
        let result = self.deliver(notification);
        let status = if result.is_ok() { "success" } else { "error" };

        metrics::counter!(
            "notifications_total",
            "kind" => notification.kind.as_str(),
            "status" => status
        )
        .increment(1);

        match result {
            Ok(code) => debug!(
                url = %self.url,
                kind = %notification.kind,
                status = code,
                duration_ms = start.elapsed().as_millis(),
                "notification delivered"
            ),
            Err(error) => warn!(
                url = %self.url,
                kind = %notification.kind,
                error = %error,
                "notification delivery failed"
            ),
        }
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Accepts one request, answers `200 OK` and returns the raw request.
    fn serve_once(listener: TcpListener) -> thread::JoinHandle<String> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let line = line.to_ascii_lowercase();
                            let value = line.strip_prefix("content-length:")?;
                            value.trim().parse::<usize>().ok()
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8(raw).unwrap()
        })
    }

    #[test]
    fn test_posts_json_with_event_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let server = serve_once(listener);

        let notification = Notification::import_done(7, 3, 0, &[]);
        let notifier = WebhookNotifier::new(url, Duration::from_secs(5));
        notifier.notify(&notification);

        let request = server.join().unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /hook "));
        assert!(lower.contains("content-type: application/json"));
        assert!(lower.contains("x-hitport-event: import-done"));
        assert!(lower.contains(&format!("x-hitport-delivery-id: {}", notification.event_id)));

        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let sent: Notification = serde_json::from_str(body).unwrap();
        assert_eq!(sent.kind, NotificationKind::ImportDone);
        assert_eq!(sent.site_id, 7);
    }

    #[test]
    fn test_unreachable_endpoint_is_swallowed() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_millis(200));
        assert_eq!(notifier.url(), "http://127.0.0.1:9/hook");
        notifier.notify(&Notification::import_done(1, 0, 0, &[]));
    }
}
