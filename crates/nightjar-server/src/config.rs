use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use nightjar_pipeline::{CaptureConfig, ControlState};
use serde::{Deserialize, Serialize};

/// Command-line flags. Any flag given overrides the config file.
#[derive(Parser, Debug, Default)]
#[command(name = "nightjar", version, about = "Live camera server with night mode and detection")]
pub struct Args {
    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Camera index, device path, URI, or `synthetic`
    #[arg(short, long)]
    pub device: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub fps: Option<u32>,

    /// Listen address, e.g. 0.0.0.0:5000
    #[arg(long)]
    pub bind: Option<String>,

    /// YOLO ONNX model (needs the `tract` feature)
    #[arg(long)]
    pub yolo_model: Option<PathBuf>,

    /// RF-DETR ONNX model (needs the `tract` feature)
    #[arg(long)]
    pub rfdetr_model: Option<PathBuf>,

    /// JPEG quality, 1-100
    #[arg(long)]
    pub quality: Option<u8>,

    /// Try camera indexes 0-3, report which deliver frames, and exit
    #[arg(long)]
    pub probe: bool,

    /// Save this many adjusted frames to --output and exit instead of serving
    #[arg(short = 'n', long, visible_alias = "num-frames", value_name = "N")]
    pub capture: Option<u32>,

    /// Directory for --capture frames (default: the snapshot directory)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Brightness for --capture, -50 to 50
    #[arg(short, long, allow_negative_numbers = true)]
    pub brightness: Option<i64>,

    /// Contrast for --capture, 0.5 to 2.0
    #[arg(short, long)]
    pub contrast: Option<f64>,

    /// Night mode for --capture: night exposure, fixed levels, greyscale
    #[arg(long)]
    pub night: bool,
}

impl Args {
    /// Clamped controls for a --capture run.
    pub fn batch_controls(&self) -> ControlState {
        let mut controls = ControlState::default();
        if let Some(brightness) = self.brightness {
            controls.set_brightness(brightness);
        }
        if let Some(contrast) = self.contrast {
            controls.set_contrast(contrast);
        }
        controls.set_night_mode(self.night);
        controls
    }
}

/// One detection model on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    /// Class names, one per line; detections fall back to class ids without it
    #[serde(default)]
    pub labels: Option<PathBuf>,
}

impl ModelConfig {
    pub fn yolo(path: PathBuf) -> Self {
        Self {
            path,
            input_width: 640,
            input_height: 640,
            labels: None,
        }
    }

    pub fn rfdetr(path: PathBuf) -> Self {
        Self {
            path,
            input_width: 560,
            input_height: 560,
            labels: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub device: String,
    pub capture: CaptureConfig,
    pub yolo: Option<ModelConfig>,
    pub rfdetr: Option<ModelConfig>,
    /// Where `/api/capture` writes when the request names no directory
    pub snapshot_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
            device: "0".into(),
            capture: CaptureConfig::default(),
            yolo: None,
            rfdetr: None,
            snapshot_dir: PathBuf::from("./frames"),
        }
    }
}

impl ServerConfig {
    /// Defaults, then the config file (if any), then command-line overrides.
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => ServerConfig::default(),
        };
        config.apply(args);
        Ok(config)
    }

    fn apply(&mut self, args: &Args) {
        if let Some(device) = &args.device {
            self.device = device.clone();
        }
        if let Some(bind) = &args.bind {
            self.bind = bind.clone();
        }
        let request = &mut self.capture.request;
        if let Some(width) = args.width {
            request.width = width;
        }
        if let Some(height) = args.height {
            request.height = height;
        }
        if let Some(fps) = args.fps {
            request.fps = fps;
        }
        if let Some(quality) = args.quality {
            self.capture.jpeg_quality = quality.clamp(1, 100);
        }
        if let Some(path) = &args.yolo_model {
            match &mut self.yolo {
                Some(model) => model.path = path.clone(),
                None => self.yolo = Some(ModelConfig::yolo(path.clone())),
            }
        }
        if let Some(path) = &args.rfdetr_model {
            match &mut self.rfdetr {
                Some(model) => model.path = path.clone(),
                None => self.rfdetr = Some(ModelConfig::rfdetr(path.clone())),
            }
        }
    }
}
