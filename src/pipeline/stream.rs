use std::time::Duration;
use anyhow::Error;
use opencv::core::Mat;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::config::config::StreamConfig;
use crate::modules::detector::HandLandmarkDetector;
use crate::utils::coordinate::HandLandmarks;
use crate::utils::image::{mirror, rgba_to_rgb, rotate_frame};
use crate::utils::utils::now_millis;

pub const FRAME_ERROR: &str = "FRAME_ERROR";
pub const DETECTION_ERROR: &str = "DETECTION_ERROR";

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// RGBA_8888 camera frame as delivered by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub row_stride: usize,
    pub rotation_degrees: i32,
}

impl CameraFrame {
    pub fn new(data: Vec<u8>, width: i32, height: i32) -> Self {
        CameraFrame {
            data,
            width,
            height,
            row_stride: width.max(0) as usize * 4,
            rotation_degrees: 0,
        }
    }

    /// to_rgb drops row padding, then rotates the frame upright.
    pub fn to_rgb(&self) -> Result<Mat, Error> {
        let rgb = rgba_to_rgb(&self.data, self.width, self.height, self.row_stride)?;
        rotate_frame(rgb, self.rotation_degrees)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HandsEvent {
    pub hands: Vec<HandLandmarks>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StreamEvent {
    Hands(HandsEvent),
    Error { code: String, message: String },
}

impl StreamEvent {
    fn error(code: &str, err: &Error) -> Self {
        StreamEvent::Error {
            code: code.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Live hand landmark detection over a stream of camera frames.
///
/// Only the newest submitted frame is analysed; frames that arrive while the
/// worker is busy replace each other.
pub struct HandLandmarkStream {
    frames: watch::Sender<Option<CameraFrame>>,
    worker: JoinHandle<()>,
}

impl HandLandmarkStream {
    pub fn start<D>(detector: D, config: StreamConfig, events: mpsc::Sender<StreamEvent>) -> Self
    where
        D: HandLandmarkDetector + 'static,
    {
        let (frames, rx) = watch::channel(None);
        let worker = tokio::spawn(run(detector, config.mirror, rx, events));
        info!(mirror = config.mirror, "hand landmark stream started");
        HandLandmarkStream { frames, worker }
    }

    /// channel starts the stream together with a fresh event channel sized by the config.
    pub fn channel<D>(detector: D, config: StreamConfig) -> (Self, mpsc::Receiver<StreamEvent>)
    where
        D: HandLandmarkDetector + 'static,
    {
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        (Self::start(detector, config, tx), rx)
    }

    pub fn submit(&self, frame: CameraFrame) -> Result<(), Error> {
        self.frames
            .send(Some(frame))
            .map_err(|_| Error::msg("hand landmark stream has stopped"))
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// stop closes the frame channel and waits for the worker to drain.
    pub async fn stop(self) -> Result<(), Error> {
        let HandLandmarkStream { frames, mut worker } = self;
        drop(frames);

        match tokio::time::timeout(STOP_TIMEOUT, &mut worker).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!("hand landmark stream did not stop in time, aborting");
                worker.abort();
            }
        }
        info!("hand landmark stream stopped");
        Ok(())
    }
}

fn prepare_frame(frame: &CameraFrame, mirrored: bool) -> Result<Mat, Error> {
    let rgb = frame.to_rgb()?;
    if mirrored {
        return mirror(&rgb)
    }
    Ok(rgb)
}

async fn run<D: HandLandmarkDetector>(
    detector: D,
    mirrored: bool,
    mut frames: watch::Receiver<Option<CameraFrame>>,
    events: mpsc::Sender<StreamEvent>,
) {
    while frames.changed().await.is_ok() {
        let frame = frames.borrow_and_update().clone();
        let frame = match frame {
            None => continue,
            Some(frame) => frame,
        };

        // The frame is consumed before the detection future is awaited.
        let detection = prepare_frame(&frame, mirrored).map(|rgb| detector.detect(rgb));
        let event = match detection {
            Err(e) => {
                warn!(error = %e, "cannot convert camera frame");
                StreamEvent::error(FRAME_ERROR, &e)
            }
            Ok(detection) => match detection.await {
                Ok(hands) => {
                    debug!(hands = hands.len(), "frame analysed");
                    StreamEvent::Hands(HandsEvent { hands, timestamp: now_millis() })
                }
                Err(e) => {
                    warn!(error = %e, "hand landmark detection failed");
                    StreamEvent::error(DETECTION_ERROR, &e)
                }
            },
        };

        if events.send(event).await.is_err() {
            info!("no listener for hand landmark events, stopping");
            break
        }
    }
}
