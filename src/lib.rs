pub mod utils;
pub mod triton_client;
pub mod pipeline;
pub mod config;
pub mod helper;
pub mod modules;

pub use config::config::PipelineConfig;
pub use modules::detector::HandLandmarkDetector;
pub use modules::hand_landmark_client::HandLandmarkClient;
pub use modules::sign_classifier::{Sign, SignClassifier};
pub use pipeline::pipeline::{SignLanguagePipeline, SignResult};
pub use pipeline::stream::{CameraFrame, HandLandmarkStream, StreamEvent};
