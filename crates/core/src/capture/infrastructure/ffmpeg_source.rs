use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::{FrameSource, SourceError};
use crate::capture::domain::source_spec::SourceSpec;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Consecutive `EAGAIN` reads tolerated before a source counts as failed.
const MAX_READ_RETRIES: u32 = 50;
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Decodes frames from a video file or a camera via ffmpeg-next
/// (libavformat, libavdevice, libavcodec).
///
/// Converts each decoded frame to RGB24 and wraps it in a [`Frame`].
pub struct FfmpegSource {
    spec: SourceSpec,
    stream: Option<OpenStream>,
}

// Safety: FfmpegSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn new(spec: SourceSpec) -> Self {
        Self { spec, stream: None }
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }
}

impl FrameSource for FfmpegSource {
    fn open(&mut self) -> Result<VideoMetadata, SourceError> {
        self.close();
        let stream = OpenStream::open(&self.spec)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.spec)))?;
        let metadata = stream.metadata.clone();
        self.stream = Some(stream);
        Ok(metadata)
    }

    fn read_frame(&mut self) -> Result<Frame, SourceError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SourceError::Unavailable(format!("{}: not opened", self.spec)))?;
        stream.next_frame()
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn describe(&self) -> String {
        self.spec.to_string()
    }
}

/// Probes camera indices `0..limit` and returns `(index, label)` for each
/// device that opens.
pub fn list_cameras(limit: u32) -> Vec<(u32, String)> {
    (0..limit)
        .filter(|&index| OpenStream::open(&SourceSpec::Camera(index)).is_ok())
        .map(|index| (index, format!("Camera {index}")))
        .collect()
}

/// Decoder state for one opened source. Frames are decoded lazily, one per
/// `next_frame` call, so the whole video is never buffered.
struct OpenStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    metadata: VideoMetadata,
    video_stream_index: usize,
    time_base: f64,
    live: bool,
    clock: Instant,
    next_sequence: u64,
    flushing: bool,
    done: bool,
}

impl OpenStream {
    fn open(spec: &SourceSpec) -> Result<Self, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let (ictx, live) = match spec {
            SourceSpec::File(path) => (ffmpeg_next::format::input(path)?, false),
            SourceSpec::Camera(index) => (open_camera(*index)?, true),
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let time_base = f64::from(stream.time_base());
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err("Video stream reports zero frame size".into());
        }

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: if live { 0 } else { stream.frames().max(0) as usize },
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: match spec {
                SourceSpec::File(path) => Some(path.clone()),
                SourceSpec::Camera(_) => None,
            },
        };

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            metadata,
            video_stream_index,
            time_base,
            live,
            clock: Instant::now(),
            next_sequence: 1,
            flushing: false,
            done: false,
        })
    }

    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if self.done {
            return Err(self.exhausted());
        }

        if let Some(frame) = self.try_receive()? {
            return Ok(frame);
        }

        if self.flushing {
            self.done = true;
            return Err(self.exhausted());
        }

        let mut retries = 0;
        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            match classify_read(packet.read(&mut self.ictx), retries) {
                PacketRead::Ready => retries = 0,
                PacketRead::Retry => {
                    retries += 1;
                    std::thread::sleep(READ_RETRY_DELAY);
                    continue;
                }
                PacketRead::End => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                    if let Some(frame) = self.try_receive()? {
                        return Ok(frame);
                    }
                    self.done = true;
                    return Err(self.exhausted());
                }
                PacketRead::Failed(reason) => return Err(SourceError::Capture(reason)),
            }

            if packet.stream() != self.video_stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
                continue;
            }

            if let Some(frame) = self.try_receive()? {
                return Ok(frame);
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| SourceError::Capture(format!("pixel conversion failed: {e}")))?;

        let timestamp_s = match (self.live, decoded.timestamp()) {
            (false, Some(pts)) => pts as f64 * self.time_base,
            _ => self.clock.elapsed().as_secs_f64(),
        };

        let pixels = extract_rgb_pixels(&rgb_frame, self.metadata.width, self.metadata.height);
        let frame = Frame::new(
            pixels,
            self.metadata.width,
            self.metadata.height,
            3,
            self.next_sequence,
            timestamp_s,
        );
        self.next_sequence += 1;
        Ok(Some(frame))
    }

    /// A file that runs out of packets has ended; a camera that does has failed.
    fn exhausted(&self) -> SourceError {
        if self.live {
            SourceError::Capture("camera stopped delivering frames".to_string())
        } else {
            SourceError::EndOfStream
        }
    }
}

#[derive(Debug, PartialEq)]
enum PacketRead {
    Ready,
    Retry,
    End,
    Failed(String),
}

/// Maps a demuxer read result after `retries` consecutive `EAGAIN`s.
/// Only `Eof` ends a stream; device errors such as `ENODEV` or `EIO` fail it.
fn classify_read(result: Result<(), ffmpeg_next::Error>, retries: u32) -> PacketRead {
    match result {
        Ok(()) => PacketRead::Ready,
        Err(ffmpeg_next::Error::Eof) => PacketRead::End,
        Err(ffmpeg_next::Error::Other { errno })
            if errno == ffmpeg_next::error::EAGAIN && retries < MAX_READ_RETRIES =>
        {
            PacketRead::Retry
        }
        Err(e) => PacketRead::Failed(format!("packet read failed: {e}")),
    }
}

fn open_camera(
    index: u32,
) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
    ffmpeg_next::device::register_all();

    let (format_name, url) =
        camera_device(index).ok_or("Camera capture is not supported on this platform")?;

    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name().split(',').any(|name| name == format_name))
        .ok_or_else(|| format!("Capture device format '{format_name}' unavailable"))?;

    let context = ffmpeg_next::format::open_with(
        &url,
        &ffmpeg_next::format::Format::Input(format),
        ffmpeg_next::Dictionary::new(),
    )?;

    match context {
        ffmpeg_next::format::context::Context::Input(input) => Ok(input),
        ffmpeg_next::format::context::Context::Output(_) => {
            Err("Capture device opened as an output".into())
        }
    }
}

/// Maps a camera index to the platform's libavdevice input and device URL.
fn camera_device(index: u32) -> Option<(&'static str, String)> {
    if cfg!(target_os = "linux") {
        Some(("v4l2", format!("/dev/video{index}")))
    } else if cfg!(target_os = "macos") {
        Some(("avfoundation", index.to_string()))
    } else if cfg!(target_os = "windows") {
        Some(("vfwcap", index.to_string()))
    } else {
        None
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
/// This function strips that padding to produce a tightly-packed pixel buffer.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
