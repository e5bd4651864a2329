use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Frame, Result};

/// Which device to open: a `/dev/videoN` index or an explicit path / URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Index(u32),
    Path(String),
}

impl DeviceSelector {
    /// Device node or URL handed to the backend.
    pub fn device_path(&self) -> String {
        match self {
            DeviceSelector::Index(n) => format!("/dev/video{n}"),
            DeviceSelector::Path(p) => p.clone(),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<u32>() {
            Ok(n) => DeviceSelector::Index(n),
            Err(_) => DeviceSelector::Path(s.to_string()),
        })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Index(n) => write!(f, "{n}"),
            DeviceSelector::Path(p) => f.write_str(p),
        }
    }
}

/// Compression the device is asked to deliver on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecHint {
    /// Motion-JPEG; most USB webcams only reach full rate at 720p this way.
    #[default]
    Mjpg,
    Raw,
}

/// What we *ask* the driver for. Nothing guarantees we get it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: CodecHint,
    /// Frames the driver may hold before we read; 1 keeps latency lowest.
    pub buffer_depth: u32,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            codec: CodecHint::Mjpg,
            buffer_depth: 1,
        }
    }
}

/// What the driver actually delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualGeometry {
    pub width: u32,
    pub height: u32,
}

impl ActualGeometry {
    pub fn matches(&self, request: &CaptureRequest) -> bool {
        self.width == request.width && self.height == request.height
    }
}

/// Exposure/gain register values, in the driver's own units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureSettings {
    /// Negative values are log2 seconds; -1 leaves auto exposure on.
    pub exposure: i32,
    pub gain: i32,
    pub brightness: Option<i32>,
}

impl ExposureSettings {
    /// Longer manual exposure, moderate gain, reduced sensor brightness.
    pub const NIGHT: ExposureSettings = ExposureSettings {
        exposure: -8,
        gain: 40,
        brightness: Some(20),
    };

    pub const NORMAL: ExposureSettings = ExposureSettings {
        exposure: -1,
        gain: 0,
        brightness: None,
    };

    pub fn is_auto(&self) -> bool {
        self.exposure == -1
    }
}

/// A camera handle owned by exactly one capture thread.
///
/// Every setter is best-effort: backends log and carry on when the driver
/// refuses a value. Only [`read`](DeviceSource::read) reports failures.
pub trait DeviceSource: Send {
    /// Ask for a geometry / codec / buffer depth. Returns the geometry the
    /// driver settled on when it is already known.
    fn configure(&mut self, request: &CaptureRequest) -> Option<ActualGeometry>;

    fn apply_exposure(&mut self, settings: &ExposureSettings);

    fn read(&mut self) -> Result<Frame>;

    fn close(&mut self);

    fn apply_night_settings(&mut self) {
        self.apply_exposure(&ExposureSettings::NIGHT);
    }

    fn apply_normal_settings(&mut self) {
        self.apply_exposure(&ExposureSettings::NORMAL);
    }
}

impl<S: DeviceSource + ?Sized> DeviceSource for Box<S> {
    fn configure(&mut self, request: &CaptureRequest) -> Option<ActualGeometry> {
        (**self).configure(request)
    }

    fn apply_exposure(&mut self, settings: &ExposureSettings) {
        (**self).apply_exposure(settings)
    }

    fn read(&mut self) -> Result<Frame> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
