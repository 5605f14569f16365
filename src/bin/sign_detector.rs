//! Camera preview for the sign detector.
//!
//! Usage:
//!   sign-detector                          # camera 0, local triton
//!   sign-detector --camera 1 --url http://triton:8001
//!   sign-detector --config detector.json

use std::path::PathBuf;
use anyhow::Error;
use clap::Parser;
use opencv::core::{Mat, MatTraitConst};
use opencv::highgui::{destroy_all_windows, imshow, wait_key};
use opencv::videoio::{VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst, CAP_ANY};
use rs_sign_detector::utils::image::mirror;
use rs_sign_detector::{PipelineConfig, SignLanguagePipeline};
use tracing::{info, warn};

const WINDOW_NAME: &str = "Sign Language Detector";

#[derive(Parser, Debug)]
#[command(name = "sign-detector")]
#[command(author, version, about = "Live hand sign detection from a camera", long_about = None)]
struct Args {
    /// Camera index
    #[arg(short, long, default_value_t = 0)]
    camera: i32,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Triton gRPC url (overrides the config file)
    #[arg(long)]
    url: Option<String>,

    /// Hand landmark model name (overrides the config file)
    #[arg(long)]
    model: Option<String>,

    /// Show the camera image as captured instead of mirrored
    #[arg(long)]
    no_mirror: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rs_sign_detector=info,sign_detector=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(url) = args.url {
        config.triton.url = url;
    }
    if let Some(model) = args.model {
        config.hand_landmark.model_name = model;
    }

    let pipeline = SignLanguagePipeline::from_config(&config).await?;

    let mut cap = VideoCapture::new(args.camera, CAP_ANY)?;
    if !cap.is_opened()? {
        return Err(Error::msg(format!("cannot open camera {}", args.camera)))
    }
    info!(camera = args.camera, "press 'q' to quit");

    let mut frame = Mat::default();
    loop {
        if !cap.read(&mut frame)? || frame.empty() {
            warn!("camera returned no frame, stopping");
            break
        }

        let mut shown = if args.no_mirror { frame.try_clone()? } else { mirror(&frame)? };

        pipeline.annotate_frame(&mut shown).await?;

        imshow(WINDOW_NAME, &shown)?;
        if wait_key(1)? & 0xFF == 'q' as i32 {
            break
        }
    }

    cap.release()?;
    destroy_all_windows()?;
    Ok(())
}
