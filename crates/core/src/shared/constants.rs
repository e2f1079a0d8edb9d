/// Rolling metrics window: roughly one second of frames at 30 fps.
pub const DEFAULT_METRICS_WINDOW: usize = 30;

/// Frame rate assumed when neither the metrics nor the source report one.
pub const DEFAULT_FALLBACK_FPS: f64 = 30.0;

/// Highest camera index (exclusive) probed when listing devices.
pub const DEFAULT_CAMERA_PROBE_LIMIT: u32 = 16;

/// Pipeline identifier stamped on results when no pipeline is active.
pub const PASSTHROUGH_PIPELINE_ID: &str = "none";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
