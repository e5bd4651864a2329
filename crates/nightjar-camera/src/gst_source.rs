// nightjar-camera/src/gst_source.rs
// ------------------------------------------------------------
// v4l2src → capsfilter → decodebin → videoconvert → RGB appsink
// The capsfilter starts unconstrained. configure() tries the
// requested geometry/codec, then the geometry in any codec, then
// ANY, moving on whenever the bus reports a negotiation error.
// ------------------------------------------------------------

use std::time::Duration;

use gst::prelude::*;
use log::{debug, info, warn};

use crate::{
    ActualGeometry, CameraError, CaptureRequest, CodecHint, DeviceSelector, DeviceSource,
    ExposureSettings, Frame, Result,
};

const PULL_TIMEOUT_SECS: u64 = 2;
// how long a started pipeline gets to report a negotiation error
const NEGOTIATE_WINDOW_MS: u64 = 1500;

/// Camera handle – owns the pipeline and *appsink*.
pub struct GstCamera {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    src: gst::Element,
    caps: gst::Element,
    device: String,
    /// decoded URI source: already raw, no codec to ask for
    uri: bool,
    closed: bool,
}

impl GstCamera {
    /// Build the pipeline and take it to READY, which makes v4l2src open the
    /// device node. Any failure here means the device is unavailable.
    ///
    /// ```no_run
    /// use nightjar_camera::{CaptureRequest, DeviceSelector, DeviceSource, GstCamera};
    /// let mut cam = GstCamera::open(&DeviceSelector::Index(0)).unwrap();
    /// cam.configure(&CaptureRequest::default());
    /// let frame = cam.read().unwrap();
    /// println!("{}x{}", frame.width(), frame.height());
    /// ```
    pub fn open(selector: &DeviceSelector) -> Result<Self> {
        let device = selector.device_path();
        let uri = device.contains("://");
        let src = if uri {
            format!("uridecodebin uri={device} name=src")
        } else {
            format!("v4l2src device={device} name=src")
        };
        Self::launch(&src, device, uri)
    }

    /// Build around any source element description named `src`.
    fn launch(src: &str, device: String, uri: bool) -> Result<Self> {
        gst::init().map_err(CameraError::GstInit)?;
        let pipe_str = format!(
            "{src} ! capsfilter name=caps ! decodebin ! videoconvert \
             ! video/x-raw,format=RGB ! appsink name=sink sync=false drop=true max-buffers=1"
        );

        let pipeline = gst::parse::launch(&pipe_str)
            .map_err(CameraError::ParsePipeline)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::DeviceUnavailable("launch string is not a pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or(CameraError::ElementNotFound("sink"))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CameraError::ElementNotFound("sink"))?;
        let src = pipeline.by_name("src").ok_or(CameraError::ElementNotFound("src"))?;
        let caps = pipeline.by_name("caps").ok_or(CameraError::ElementNotFound("caps"))?;

        if let Err(e) = pipeline.set_state(gst::State::Ready) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CameraError::DeviceUnavailable(format!("{device}: {e}")));
        }
        info!("opened camera {device}");

        Ok(Self {
            pipeline,
            appsink,
            src,
            caps,
            device,
            uri,
            closed: false,
        })
    }

    /// Caps to try, most specific first. The last entry is always ANY.
    fn caps_candidates(request: &CaptureRequest, uri: bool) -> Vec<gst::Caps> {
        if uri {
            return vec![gst::Caps::new_any()];
        }
        let (w, h) = (request.width as i32, request.height as i32);
        let sized = |media: &str| {
            gst::Caps::builder(media)
                .field("width", w)
                .field("height", h)
                .build()
        };
        let (preferred, other) = match request.codec {
            CodecHint::Mjpg => ("image/jpeg", "video/x-raw"),
            CodecHint::Raw => ("video/x-raw", "image/jpeg"),
        };
        let exact = gst::Caps::builder(preferred)
            .field("width", w)
            .field("height", h)
            .field("framerate", gst::Fraction::new(request.fps as i32, 1))
            .build();
        let mut any_codec = sized(preferred);
        any_codec.merge(sized(other));
        vec![exact, any_codec, gst::Caps::new_any()]
    }

    /// Start the pipeline with `caps` and watch the bus for a bounded time.
    /// Returns the error text when the pipeline failed to start or negotiate.
    fn try_start(&self, caps: &gst::Caps) -> std::result::Result<(), String> {
        let _ = self.pipeline.set_state(gst::State::Ready);
        if let Some(bus) = self.pipeline.bus() {
            while bus.pop().is_some() {}
        }
        self.caps.set_property("caps", caps.clone());

        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| e.to_string())?;

        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        // live sources report PLAYING before caps are agreed; failures
        // arrive later as bus errors
        match bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(NEGOTIATE_WINDOW_MS),
            &[gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Error(err) => Err(format!(
                    "{} ({})",
                    err.error(),
                    err.debug().map(|d| d.to_string()).unwrap_or_default()
                )),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }

    /// Convert a `gst::Sample` into a tightly packed RGB [`Frame`].
    fn sample_to_frame(sample: gst::Sample) -> Result<Frame> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| CameraError::ReadFailure("sample has no buffer".into()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| CameraError::ReadFailure("sample has no caps".into()))?;
        let s = caps
            .structure(0)
            .ok_or_else(|| CameraError::ReadFailure("caps missing structure".into()))?;
        let width = s
            .get::<i32>("width")
            .map_err(|e| CameraError::ReadFailure(e.to_string()))? as usize;
        let height = s
            .get::<i32>("height")
            .map_err(|e| CameraError::ReadFailure(e.to_string()))? as usize;

        let pts = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or(Duration::ZERO);

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::ReadFailure(e.to_string()))?;
        let data = map.as_slice();
        let row = width * 3;
        // RGB rows are padded to 4 bytes by videoconvert
        let stride = if height > 0 { data.len() / height } else { row };
        if stride < row {
            return Err(CameraError::ReadFailure(format!(
                "buffer of {} bytes too small for {width}x{height}",
                data.len()
            )));
        }

        let mut pixels = Vec::with_capacity(row * height);
        for line in data.chunks(stride).take(height) {
            pixels.extend_from_slice(&line[..row]);
        }
        drop(map);

        Ok(Frame::new(width as u32, height as u32, pixels)?.with_pts(pts))
    }
}

impl DeviceSource for GstCamera {
    fn configure(&mut self, request: &CaptureRequest) -> Option<ActualGeometry> {
        self.appsink.set_max_buffers(request.buffer_depth.max(1));

        for caps in Self::caps_candidates(request, self.uri) {
            match self.try_start(&caps) {
                Ok(()) => {
                    info!("{}: streaming with caps {caps}", self.device);
                    break;
                }
                Err(e) if caps.is_any() => {
                    warn!("{}: pipeline did not start even with driver defaults: {e}", self.device);
                }
                Err(e) => warn!(
                    "{}: driver refused {caps}: {e}; relaxing the request",
                    self.device
                ),
            }
        }
        // geometry is only known once the first sample carries caps
        None
    }

    fn apply_exposure(&mut self, settings: &ExposureSettings) {
        if self.src.find_property("extra-controls").is_none() {
            debug!("{}: source has no extra-controls, ignoring exposure", self.device);
            return;
        }
        let mut controls = gst::Structure::builder("c");
        if settings.is_auto() {
            // V4L2_EXPOSURE_APERTURE_PRIORITY
            controls = controls.field("auto_exposure", 3i32);
        } else {
            // manual; v4l2 exposure is in 100 µs units, ours is log2 seconds
            let units = (10_000.0 * 2f64.powi(settings.exposure)).round() as i32;
            controls = controls
                .field("auto_exposure", 1i32)
                .field("exposure_time_absolute", units.max(1));
        }
        controls = controls.field("gain", settings.gain);
        if let Some(b) = settings.brightness {
            controls = controls.field("brightness", b);
        }
        self.src.set_property("extra-controls", controls.build());
        debug!("{}: applied {:?}", self.device, settings);
    }

    fn read(&mut self) -> Result<Frame> {
        if self.appsink.is_eos() {
            return Err(CameraError::ReadFailure(format!("{}: end of stream", self.device)));
        }
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
            .ok_or_else(|| {
                CameraError::ReadFailure(format!(
                    "{}: no sample within {PULL_TIMEOUT_SECS}s",
                    self.device
                ))
            })?;
        Self::sample_to_frame(sample)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.pipeline.set_state(gst::State::Null);
        info!("closed camera {}", self.device);
    }
}

impl Drop for GstCamera {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Hardware test (cargo test --features gstreamer -- --ignored)
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore]
    fn capture_one() {
        let mut cam = GstCamera::open(&DeviceSelector::Index(0)).expect("open");
        cam.configure(&CaptureRequest::default());
        let frame = cam.read().expect("frame");
        println!("Received {}x{}", frame.width(), frame.height());
        assert_eq!(frame.pixels().len(), (frame.width() * frame.height() * 3) as usize);
        cam.close();
    }

    #[test]
    fn candidates_relax_down_to_any() {
        gst::init().unwrap();
        let request = CaptureRequest {
            width: 320,
            height: 240,
            ..CaptureRequest::default()
        };
        let caps = GstCamera::caps_candidates(&request, false);
        assert_eq!(caps.len(), 3);
        assert!(caps[0].structure(0).unwrap().has_name("image/jpeg"));
        assert!(caps[0].structure(0).unwrap().has_field("framerate"));
        assert_eq!(caps[1].size(), 2);
        assert!(!caps[1].structure(1).unwrap().has_field("framerate"));
        assert!(caps[2].is_any());

        let uri = GstCamera::caps_candidates(&request, true);
        assert_eq!(uri.len(), 1);
        assert!(uri[0].is_any());
    }

    #[test]
    fn raw_only_source_still_streams_when_mjpg_requested() {
        // videotestsrc cannot produce image/jpeg, so the first candidate
        // fails to negotiate and the raw entry of the second one is used
        let mut cam = GstCamera::launch(
            "videotestsrc is-live=true name=src",
            "videotestsrc".into(),
            false,
        )
        .expect("launch");
        let request = CaptureRequest {
            width: 320,
            height: 240,
            fps: 30,
            codec: CodecHint::Mjpg,
            buffer_depth: 1,
        };
        cam.configure(&request);
        let frame = cam.read().expect("frame after fallback");
        assert_eq!((frame.width(), frame.height()), (320, 240));
        cam.close();
    }
}
