//! Fire-and-forget motion alert notifications
//!
//! When the broadcast loop observes motion it hands off here; the actual
//! HTTP request runs on its own task so a slow or dead endpoint can never
//! stall the fan-out. Failures are logged and swallowed.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

/// Wire body of one alert request.
#[derive(Debug, Clone, Copy, Serialize)]
struct AlertPayload {
    motion: bool,
}

/// Posts `{"motion": true}` to a fixed external endpoint.
#[derive(Debug, Clone)]
pub struct AlertNotifier {
    client: reqwest::Client,
    url: String,
}

impl AlertNotifier {
    /// Create a notifier for the given endpoint URL.
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    /// Endpoint this notifier posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one notification attempt in the background.
    ///
    /// Returns immediately. Network errors and non-success responses are
    /// logged at `warn` and never propagated; an unreachable endpoint must
    /// not affect detection or broadcast state.
    pub fn notify(&self) {
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .json(&AlertPayload { motion: true })
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %url, "Motion alert delivered");
                }
                Ok(resp) => {
                    warn!(url = %url, status = %resp.status(), "Alert endpoint returned non-success");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Alert request failed");
                }
            }
        });
    }
}
