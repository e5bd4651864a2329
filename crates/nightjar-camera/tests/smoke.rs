use std::sync::atomic::{AtomicBool, Ordering};

use nightjar_camera::{
    CaptureRequest, DeviceSource, FailurePlan, Pattern, SyntheticCamera, Warmup,
};

#[test]
fn boxed_source_warms_up_then_streams() -> anyhow::Result<()> {
    let cam = SyntheticCamera::new(64, 48, Pattern::Solid([200, 100, 50]))
        .with_failures(FailurePlan::Window { start: 0, len: 2 });
    let closes = cam.close_counter();
    let mut source: Box<dyn DeviceSource> = Box::new(cam);

    // the driver is free to ignore the request
    let actual = source.configure(&CaptureRequest::default());
    assert_eq!(actual.map(|g| (g.width, g.height)), Some((64, 48)));

    let warmup = Warmup { settle_ms: 0, discard_reads: 3, interval_ms: 0 };
    assert!(warmup.run(&mut source, &AtomicBool::new(false)));

    let frame = source.read()?;
    assert_eq!((frame.width(), frame.height()), (64, 48));
    assert_eq!(frame.pixel(10, 10), [200, 100, 50]);

    source.close();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}
