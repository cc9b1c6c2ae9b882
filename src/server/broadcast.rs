//! Broadcast loop: capture once, process and deliver per subscriber
//!
//! One task runs forever at a fixed cadence. Each cycle pulls a single
//! frame from the capture source and fans it out: every subscriber gets its
//! own copy, optionally run through motion detection against that
//! subscriber's private reference frame, then grayscale, JPEG, base64, and
//! a bounded non-blocking delivery. One subscriber's failure never aborts
//! the cycle for the others; a dead connection is removed on the spot.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, GrayImage};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::alert::AlertNotifier;
use crate::capture::FrameSource;
use crate::detect::{detect, MotionConfig};
use crate::server::registry::{ClientRegistry, SendOutcome, SubscriberId, ViewMode};
use crate::Frame;

/// Broadcast loop configuration.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Cycle period; ~33ms gives ~30 frames per second
    pub period: Duration,
    /// Fixed JPEG quality for the wire payload (no negotiation)
    pub jpeg_quality: u8,
    /// Motion detector tuning shared by all secure-mode subscribers
    pub motion: MotionConfig,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(33),
            jpeg_quality: 80,
            motion: MotionConfig::default(),
        }
    }
}

/// What one cycle did, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
    /// True when any subscriber's detection pass found motion
    pub motion: bool,
}

/// The fan-out orchestrator. Owns the cadence; the registry is shared with
/// the connection handlers, the capture source is exclusively ours.
pub struct Broadcaster {
    registry: ClientRegistry,
    config: BroadcastConfig,
    notifier: Option<AlertNotifier>,
}

impl Broadcaster {
    pub fn new(registry: ClientRegistry, config: BroadcastConfig) -> Self {
        Self {
            registry,
            config,
            notifier: None,
        }
    }

    /// Attach an alert notifier, fired at most once per cycle in which any
    /// subscriber observed motion.
    pub fn with_notifier(mut self, notifier: AlertNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run forever at the configured cadence. There is no shutdown
    /// protocol; the loop stops when the process exits.
    pub async fn run<S: FrameSource>(self, mut source: S) {
        let mut ticker = interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick(&mut source).await;
        }
    }

    /// One scheduled tick: idle with no subscribers (no camera I/O at all),
    /// skip the cycle on a capture miss, otherwise fan the frame out.
    pub async fn tick<S: FrameSource>(&self, source: &mut S) -> Option<CycleReport> {
        if self.registry.is_empty() {
            return None;
        }
        let Some(frame) = source.read() else {
            trace!("No frame available, skipping cycle");
            return None;
        };
        Some(self.cycle(frame).await)
    }

    /// Fan one captured frame out to every subscriber in the current
    /// snapshot. Exposed separately so tests can drive frames directly.
    pub async fn cycle(&self, frame: Frame) -> CycleReport {
        let mut report = CycleReport::default();

        for (id, mode) in self.registry.snapshot().await {
            match self.process_subscriber(id, mode, &frame).await {
                Ok((outcome, motion)) => {
                    report.motion |= motion;
                    match outcome {
                        SendOutcome::Delivered => report.delivered += 1,
                        SendOutcome::Dropped => {
                            debug!(subscriber = %id, "Queue full, frame dropped");
                            report.dropped += 1;
                        }
                        SendOutcome::Disconnected => {
                            warn!(subscriber = %id, "Delivery failed, removing subscriber");
                            self.registry.remove(id).await;
                            report.removed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Processing failed, removing subscriber");
                    self.registry.remove(id).await;
                    report.removed += 1;
                }
            }
        }

        if report.motion {
            if let Some(notifier) = &self.notifier {
                notifier.notify();
            }
        }

        trace!(?report, timestamp_us = frame.timestamp_us, "Cycle complete");
        report
    }

    /// Process and deliver one subscriber's view of the frame. Returns the
    /// delivery outcome plus whether this subscriber's detection pass found
    /// motion.
    async fn process_subscriber(
        &self,
        id: SubscriberId,
        mode: ViewMode,
        frame: &Frame,
    ) -> Result<(SendOutcome, bool)> {
        let (gray, motion) = match mode {
            ViewMode::Normal => (frame.to_gray(), false),
            ViewMode::Secure => {
                let reference = self.registry.reference(id).await;
                let detection = detect(frame, reference.as_ref(), &self.config.motion);
                self.registry.store_reference(id, detection.reference).await;
                (imageops::grayscale(&detection.annotated), detection.motion)
            }
        };

        let payload = encode_payload(&gray, self.config.jpeg_quality)?;
        let outcome = self.registry.try_deliver(id, payload).await;
        Ok((outcome, motion))
    }
}

/// JPEG-encode a grayscale frame and wrap it in base64 text, the one
/// message shape every viewer receives.
fn encode_payload(gray: &GrayImage, quality: u8) -> Result<String> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(gray)
        .context("JPEG encode failed")?;
    Ok(BASE64.encode(&jpeg))
}
