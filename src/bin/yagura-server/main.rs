//! Yagura Server — live camera fan-out with per-viewer motion detection
//!
//! ## Usage
//!
//! ```bash
//! # Stream the camera (web + WebSocket on port 5050)
//! yagura-server
//!
//! # Custom port, alert endpoint, static-background detection
//! YAGURA_PORT=8080 \
//! YAGURA_ALERT_URL=http://192.168.1.163:8080/trigger-buzzer \
//! YAGURA_REFERENCE_POLICY=static yagura-server
//!
//! # No camera hardware: synthetic moving test pattern
//! YAGURA_TEST_SOURCE=1 yagura-server
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::time::interval;
use tracing::{info, warn};

use yagura::alert::AlertNotifier;
use yagura::capture::{CameraCapture, CameraCaptureConfig, TestPattern};
use yagura::detect::{MotionConfig, ReferencePolicy};
use yagura::server::{BroadcastConfig, Broadcaster, ClientRegistry};
use yagura::web;

/// Server configuration from environment
struct Config {
    port: u16,
    period_ms: u64,
    fps: u32,
    jpeg_quality: u8,
    diff_threshold: u8,
    min_area: u32,
    policy: ReferencePolicy,
    alert_url: Option<String>,
    test_source: bool,
}

impl Config {
    fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        }

        let policy = std::env::var("YAGURA_REFERENCE_POLICY")
            .ok()
            .and_then(|s| {
                let parsed = ReferencePolicy::parse(&s);
                if parsed.is_none() {
                    warn!(value = %s, "Unknown YAGURA_REFERENCE_POLICY, using default");
                }
                parsed
            })
            .unwrap_or_default();

        let test_source = std::env::var("YAGURA_TEST_SOURCE")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            port: parsed("YAGURA_PORT", 5050),
            period_ms: parsed("YAGURA_PERIOD_MS", 33),
            fps: parsed("YAGURA_FPS", 30),
            jpeg_quality: parsed("YAGURA_JPEG_QUALITY", 80),
            diff_threshold: parsed("YAGURA_DIFF_THRESHOLD", 25),
            min_area: parsed("YAGURA_MIN_AREA", 1000),
            policy,
            alert_url: std::env::var("YAGURA_ALERT_URL").ok(),
            test_source,
        }
    }

    fn broadcast(&self) -> BroadcastConfig {
        BroadcastConfig {
            period: Duration::from_millis(self.period_ms),
            jpeg_quality: self.jpeg_quality,
            motion: MotionConfig {
                diff_threshold: self.diff_threshold,
                min_area: self.min_area,
                policy: self.policy,
                ..MotionConfig::default()
            },
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("yagura=info".parse().unwrap()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env();

    info!("Yagura Server starting");
    info!("  Port: {}", config.port);
    info!("  Cycle period: {} ms", config.period_ms);
    info!("  Reference policy: {:?}", config.policy);
    match &config.alert_url {
        Some(url) => info!("  Alert endpoint: {}", url),
        None => info!("  Alerts: disabled (set YAGURA_ALERT_URL to enable)"),
    }

    let registry = ClientRegistry::new();

    let mut broadcaster = Broadcaster::new(registry.clone(), config.broadcast());
    if let Some(url) = &config.alert_url {
        broadcaster = broadcaster.with_notifier(AlertNotifier::new(url.clone()));
    }

    if config.test_source {
        info!("  Source: synthetic test pattern");
        tokio::spawn(broadcaster.run(TestPattern::new().moving()));
    } else {
        let capture = CameraCapture::start(CameraCaptureConfig {
            fps: config.fps,
            ..CameraCaptureConfig::default()
        })?;
        info!("  Source: camera");
        tokio::spawn(broadcaster.run(capture));
    }

    // Periodic stats logging
    let stats_registry = registry.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(60));
        ticker.tick().await; // First tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let stats = stats_registry.stats();
            info!(
                subscribers = stats.subscribers,
                delivered = stats.frames_delivered,
                dropped = stats.frames_dropped,
                "Stats"
            );
        }
    });

    let bind: SocketAddr = ([0, 0, 0, 0], config.port).into();
    web::start(registry, bind).await
}
