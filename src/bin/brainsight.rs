//! brainsight - capture or upload an image and describe what the model sees
//!
//! 1. Loads configuration (file + environment)
//! 2. Opens the camera (capture) or reads a file (upload)
//! 3. Sends one detection request and prints the parsed result
//! 4. Releases the camera on every exit path

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use brainsight::capture::encode_upload_path;
use brainsight::{
    BrainsightConfig, CaptureError, DetectionResult, Notice, PerceptionError, Session,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect and explain objects in a camera frame or image file")]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Print the result as JSON on stdout.
    #[arg(long)]
    json: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the camera, capture one frame, and detect.
    Capture {
        /// Camera device (overrides config), e.g. /dev/video0 or stub://camera.
        #[arg(long, env = "BRAINSIGHT_CAMERA_DEVICE")]
        device: Option<String>,
        /// How long to wait for the first frame.
        #[arg(long, default_value_t = 5)]
        warmup_secs: u64,
    },
    /// Detect on an image file.
    Upload {
        /// Image file to upload.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = BrainsightConfig::load()?;
    if let Command::Capture {
        device: Some(device),
        ..
    } = &args.command
    {
        cfg.camera.device = device.clone();
    }

    let mut session = {
        let _stage = ui.stage("Prepare session");
        Session::from_config(&cfg)?
    };

    let outcome = run(&args.command, &mut session, &ui);
    // Release the device before reporting, whatever happened.
    if let Err(err) = session.stop_stream() {
        log::warn!("failed to stop camera stream: {}", err);
    }

    match outcome {
        Ok(result) => {
            ui.notify(&Notice::detection_complete(&result));
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                ui.render_result(&result);
            }
            Ok(())
        }
        Err(err) => {
            ui.notify(&Notice::from(&err));
            Err(anyhow!(err))
        }
    }
}

fn run(
    command: &Command,
    session: &mut Session,
    ui: &ui::Ui,
) -> Result<DetectionResult, PerceptionError> {
    let encoding = match command {
        Command::Capture { warmup_secs, .. } => {
            let info = {
                let _stage = ui.stage("Start camera");
                session.start_stream()?
            };
            log::info!("streaming from {}", info.label);
            let _stage = ui.stage("Capture frame");
            capture_when_ready(session, Duration::from_secs(*warmup_secs))?
        }
        Command::Upload { path } => {
            let _stage = ui.stage("Read image");
            encode_upload_path(path)?
        }
    };

    let _stage = ui.stage("Processing visual input");
    session.detect(&encoding).cloned()
}

/// The first frames of a fresh stream may not be available yet.
fn capture_when_ready(
    session: &mut Session,
    warmup: Duration,
) -> Result<brainsight::ImageEncoding, PerceptionError> {
    let poll = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    loop {
        match session.capture_frame() {
            Err(PerceptionError::Capture(CaptureError::NoActiveStream)) if waited < warmup => {
                std::thread::sleep(poll);
                waited += poll;
            }
            other => return other,
        }
    }
}
