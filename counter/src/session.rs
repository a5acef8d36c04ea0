//! Per-connection pipeline: decode -> detect -> track -> aggregate
//!
//! A [`Session`] owns its tracker, so track ids are private to the
//! connection and disappear with it. Frames are handled strictly one at a
//! time; the caller awaits [`Session::handle`] before reading the next
//! message.

use crate::aggregator::aggregate;
use crate::config::SessionConfig;
use crate::detector::Detector;
use crate::error::{CounterError, Result};
use crate::frame::{decode_base64_frame, decode_binary_frame, FrameEncoding};
use crate::types::{Detection, FrameReport, ImageData};
use ioutrack::{MultiTracker, Observation};
use log::{debug, info, warn};
use std::sync::Arc;

/// Payload of one inbound message
#[derive(Debug, Clone)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
}

impl Inbound {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Message to send back for this frame
    Report(FrameReport),
    /// Message was not a frame for this connection; nothing to send
    Skipped,
}

pub struct Session {
    id: u64,
    detector: Arc<dyn Detector>,
    tracker: MultiTracker,
    encoding: FrameEncoding,
    max_detector_failures: u32,
    consecutive_failures: u32,
    frames: u64,
}

impl Session {
    pub fn new(id: u64, detector: Arc<dyn Detector>, config: &SessionConfig) -> Self {
        info!(
            "session {id}: started ({} frames, {} association, detector {})",
            config.frame_encoding,
            config.tracker.association,
            detector.name()
        );
        Self {
            id,
            detector,
            tracker: MultiTracker::new(config.tracker.clone()),
            encoding: config.frame_encoding,
            max_detector_failures: config.max_detector_failures,
            consecutive_failures: 0,
            frames: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Frames run through the tracker so far
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Process one inbound message.
    ///
    /// Undecodable frames and detector failures age the tracks and still
    /// produce a report. Errors are fatal for the session.
    pub async fn handle(&mut self, inbound: Inbound) -> Result<FrameOutcome> {
        let accepted = matches!(
            (self.encoding, &inbound),
            (FrameEncoding::Base64, Inbound::Text(_)) | (FrameEncoding::Binary, Inbound::Binary(_))
        );
        if !accepted {
            warn!(
                "session {}: skipping {} message, connection expects {} frames",
                self.id,
                inbound.kind(),
                self.encoding
            );
            return Ok(FrameOutcome::Skipped);
        }

        self.frames += 1;
        let detections = match decode(inbound).await {
            Ok(image) => self.detect(image).await?,
            Err(e) => {
                warn!("session {}: frame {} not decodable: {}", self.id, self.frames, e);
                Vec::new()
            }
        };

        let report = self.track(&detections)?;
        debug!(
            "session {}: frame {} -> {} detections, {} vehicles",
            self.id,
            self.frames,
            detections.len(),
            report.detections.len()
        );
        Ok(FrameOutcome::Report(report))
    }

    /// Run the detector off the async runtime. Isolated failures count as
    /// an empty frame, a run of them ends the session.
    async fn detect(&mut self, image: ImageData) -> Result<Vec<Detection>> {
        let detector = Arc::clone(&self.detector);
        let result = tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .unwrap_or_else(|e| Err(CounterError::detector(format!("detector task failed: {e}"))));

        match result {
            Ok(detections) => {
                self.consecutive_failures = 0;
                Ok(detections)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "session {}: detector failed on frame {} ({}/{}): {}",
                    self.id, self.frames, self.consecutive_failures, self.max_detector_failures, e
                );
                if self.consecutive_failures >= self.max_detector_failures {
                    Err(CounterError::DetectorUnavailable {
                        failures: self.consecutive_failures,
                    })
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    fn track(&mut self, detections: &[Detection]) -> Result<FrameReport> {
        let observations: Vec<Observation> =
            detections.iter().map(Detection::to_observation).collect();
        let tracks = self.tracker.step(&observations)?;
        Ok(aggregate(&tracks))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        info!(
            "session {}: closed after {} frames, released {} tracks",
            self.id,
            self.frames,
            self.tracker.num_tracks()
        );
    }
}

async fn decode(inbound: Inbound) -> Result<ImageData> {
    tokio::task::spawn_blocking(move || match inbound {
        Inbound::Text(text) => decode_base64_frame(&text),
        Inbound::Binary(bytes) => decode_binary_frame(&bytes),
    })
    .await
    .unwrap_or_else(|e| Err(CounterError::decode(format!("decode task failed: {e}"))))
}
