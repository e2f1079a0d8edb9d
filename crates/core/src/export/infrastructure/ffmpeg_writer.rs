use std::path::Path;

use crate::export::domain::video_writer::VideoWriter;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Encodes RGB frames to a video container via ffmpeg-next.
///
/// The container is chosen from the output path's extension; the stream is
/// MPEG-4 Part 2 in YUV420P. YUV420P needs even dimensions, so an odd width
/// or height is encoded one pixel larger with the last column or row repeated.
pub struct FfmpegWriter {
    octx: Option<ffmpeg_next::format::context::Output>,
    encoder: Option<ffmpeg_next::codec::encoder::video::Encoder>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    encoded_width: u32,
    encoded_height: u32,
    fps: i32,
    frame_count: usize,
    video_stream_index: usize,
}

// Safety: FfmpegWriter is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self {
            octx: None,
            encoder: None,
            scaler: None,
            width: 0,
            height: 0,
            encoded_width: 0,
            encoded_height: 0,
            fps: 0,
            frame_count: 0,
            video_stream_index: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn drain_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (Some(encoder), Some(octx)) = (self.encoder.as_mut(), self.octx.as_mut()) else {
            return Err("FfmpegWriter: not opened".into());
        };
        let ost_time_base = octx
            .stream(self.video_stream_index)
            .ok_or("FfmpegWriter: output stream missing")?
            .time_base();

        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.video_stream_index);
            encoded.rescale_ts(ffmpeg_next::Rational(1, self.fps), ost_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoWriter for FfmpegWriter {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let (w, h) = (metadata.width, metadata.height);
        if w == 0 || h == 0 {
            return Err(format!("Unsupported frame size {w}x{h}").into());
        }
        let (enc_w, enc_h) = encoded_size(w, h);

        let fps_i = metadata.fps.round() as i32;
        let fps_i = if fps_i <= 0 { 30 } else { fps_i };

        let mut octx = ffmpeg_next::format::output(path)?;

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;

        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        encoder_ctx.set_width(enc_w);
        encoder_ctx.set_height(enc_h);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps_i));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps_i, 1)));

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        let video_stream_index = ost.index();

        octx.write_header()?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            enc_w,
            enc_h,
            ffmpeg_next::format::Pixel::YUV420P,
            enc_w,
            enc_h,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        self.width = w;
        self.height = h;
        self.encoded_width = enc_w;
        self.encoded_height = enc_h;
        self.fps = fps_i;
        self.video_stream_index = video_stream_index;
        self.octx = Some(octx);
        self.encoder = Some(encoder);
        self.scaler = Some(scaler);
        self.frame_count = 0;

        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let (Some(encoder), Some(scaler)) = (self.encoder.as_mut(), self.scaler.as_mut()) else {
            return Err("FfmpegWriter: not opened".into());
        };

        if frame.dimensions() != (self.width, self.height) || frame.channels() != 3 {
            return Err(format!(
                "Frame {}x{}x{} does not match recording size {}x{}x3",
                frame.width(),
                frame.height(),
                frame.channels(),
                self.width,
                self.height
            )
            .into());
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.encoded_width,
            self.encoded_height,
        );

        let stride = rgb_frame.stride(0);
        copy_padded_rgb(
            frame.data(),
            (self.width, self.height),
            rgb_frame.data_mut(0),
            stride,
            (self.encoded_width, self.encoded_height),
        );

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(self.frame_count as i64));

        encoder.send_frame(&yuv_frame)?;
        self.drain_packets()?;

        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.send_eof()?;
            self.drain_packets()?;
            if let Some(octx) = self.octx.as_mut() {
                octx.write_trailer()?;
            }
        }

        self.octx = None;
        self.encoder = None;
        self.scaler = None;

        Ok(())
    }
}

/// Rounds each dimension up to the next even number.
fn encoded_size(width: u32, height: u32) -> (u32, u32) {
    (width + width % 2, height + height % 2)
}

/// Copies a tightly-packed RGB image into a strided buffer of size `padded`,
/// repeating the last column and row into the padding.
fn copy_padded_rgb(
    src: &[u8],
    (width, height): (u32, u32),
    dst: &mut [u8],
    stride: usize,
    (padded_width, padded_height): (u32, u32),
) {
    let row_bytes = width as usize * 3;
    let pad_bytes = (padded_width - width) as usize * 3;
    for row in 0..padded_height as usize {
        let src_start = row.min(height as usize - 1) * row_bytes;
        let src_row = &src[src_start..src_start + row_bytes];
        let dst_start = row * stride;
        dst[dst_start..dst_start + row_bytes].copy_from_slice(src_row);
        for pad in (0..pad_bytes).step_by(3) {
            let at = dst_start + row_bytes + pad;
            dst[at..at + 3].copy_from_slice(&src_row[row_bytes - 3..]);
        }
    }
}
