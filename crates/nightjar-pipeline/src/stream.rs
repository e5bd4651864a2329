// nightjar-pipeline/src/stream.rs
use std::{sync::Arc, time::Duration};

use futures_core::Stream;
use log::debug;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::CameraContext;

pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

// one part in flight per subscriber; a slow client skips frames, never queues them
const DEPTH: usize = 1;

/// Wrap one JPEG as a `--frame` multipart part.
pub fn encode_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Per-subscriber stream of multipart parts.
///
/// Each newly published frame is sent at most once. The slot is read only
/// after the consumer has room, so a slow consumer gets the newest frame
/// rather than one that was current when it fell behind. While nothing new
/// is ready the task sleeps `idle`. The stream ends when the capture loop
/// reaches a terminal state or the consumer goes away.
pub fn frame_stream(ctx: Arc<CameraContext>, idle: Duration) -> impl Stream<Item = Vec<u8>> {
    let (tx, rx) = mpsc::channel(DEPTH);

    tokio::spawn(async move {
        let mut last_sent = 0u64;
        'consumer: loop {
            let Ok(permit) = tx.reserve().await else {
                debug!("stream consumer dropped");
                break;
            };
            loop {
                match ctx.latest_frame() {
                    Some((frame, sequence)) if sequence != last_sent => {
                        last_sent = sequence;
                        permit.send(encode_part(frame.as_bytes()));
                        break;
                    }
                    _ => {
                        if ctx.loop_state().is_terminal() {
                            debug!("capture loop ended, closing stream");
                            break 'consumer;
                        }
                        if tx.is_closed() {
                            debug!("stream consumer dropped");
                            break 'consumer;
                        }
                        tokio::time::sleep(idle).await;
                    }
                }
            }
        }
    });

    ReceiverStream::new(rx)
}
