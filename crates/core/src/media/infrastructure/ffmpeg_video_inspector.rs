use std::path::Path;

use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video as RawFrame;

use crate::shared::frame::Frame;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Opens `path` and a decoder for its best video stream.
fn open_video_stream(path: &Path) -> Result<(Input, usize, ffmpeg_next::decoder::Video), BoxError> {
    ffmpeg_next::init()?;
    let ictx = ffmpeg_next::format::input(path)?;
    let (index, parameters) = {
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| format!("no video stream in {}", path.display()))?;
        (stream.index(), stream.parameters())
    };
    let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters)?
        .decoder()
        .video()?;
    Ok((ictx, index, decoder))
}

/// True when `path` opens as a container with a video stream that yields
/// at least one decoded frame.
pub fn is_decodable_video(path: &Path) -> bool {
    VideoFrames::open(path)
        .map(|mut frames| matches!(frames.next(), Some(Ok(_))))
        .unwrap_or(false)
}

/// Decodes every `interval`-th frame of a video (frames 0, N, 2N, ...).
pub fn sample_frames(
    path: &Path,
    interval: usize,
) -> Result<impl Iterator<Item = Result<Frame, BoxError>>, BoxError> {
    Ok(VideoFrames::open(path)?.step_by(interval.max(1)))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Reading,
    Draining,
    Finished,
}

/// Lazy RGB24 frame iterator over one video stream.
pub struct VideoFrames {
    ictx: Input,
    stream_index: usize,
    decoder: ffmpeg_next::decoder::Video,
    to_rgb: scaling::Context,
    decoded: usize,
    state: DecodeState,
}

impl VideoFrames {
    pub fn open(path: &Path) -> Result<Self, BoxError> {
        let (ictx, stream_index, decoder) = open_video_stream(path)?;
        let (w, h) = (decoder.width(), decoder.height());
        let to_rgb = scaling::Context::get(
            decoder.format(),
            w,
            h,
            ffmpeg_next::format::Pixel::RGB24,
            w,
            h,
            scaling::Flags::BILINEAR,
        )?;
        Ok(Self {
            ictx,
            stream_index,
            decoder,
            to_rgb,
            decoded: 0,
            state: DecodeState::Reading,
        })
    }

    /// Next frame the decoder already has buffered, converted to RGB.
    fn buffered(&mut self) -> Option<Result<Frame, BoxError>> {
        let mut raw = RawFrame::empty();
        self.decoder.receive_frame(&mut raw).ok()?;
        let mut rgb = RawFrame::empty();
        if let Err(e) = self.to_rgb.run(&raw, &mut rgb) {
            return Some(Err(e.into()));
        }
        let (w, h) = (rgb.width(), rgb.height());
        let frame = Frame::new(packed_rgb(&rgb), w, h, 3, self.decoded);
        self.decoded += 1;
        Some(Ok(frame))
    }

    /// Feeds the next packet of our stream; false once the input is exhausted.
    fn feed(&mut self) -> bool {
        for (stream, packet) in self.ictx.packets() {
            if stream.index() == self.stream_index && self.decoder.send_packet(&packet).is_ok() {
                return true;
            }
        }
        false
    }
}

impl Iterator for VideoFrames {
    type Item = Result<Frame, BoxError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                DecodeState::Finished => return None,
                DecodeState::Reading => {
                    if let Some(frame) = self.buffered() {
                        return Some(frame);
                    }
                    if !self.feed() {
                        // Corrupt trailing data is not worth failing over.
                        let _ = self.decoder.send_eof();
                        self.state = DecodeState::Draining;
                    }
                }
                DecodeState::Draining => {
                    let frame = self.buffered();
                    if frame.is_none() {
                        self.state = DecodeState::Finished;
                    }
                    return frame;
                }
            }
        }
    }
}

/// Copies the visible RGB24 bytes of each row, dropping stride padding.
fn packed_rgb(frame: &RawFrame) -> Vec<u8> {
    let row_bytes = frame.width() as usize * 3;
    frame
        .data(0)
        .chunks(frame.stride(0))
        .take(frame.height() as usize)
        .flat_map(|row| &row[..row_bytes])
        .copied()
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    /// Encodes `num_frames` grey MPEG-4 frames whose brightness steps by 40.
    pub fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();
        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new()).unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let value = ((i * 40) % 256) as u8;
            rgb_frame.data_mut(0).fill(value);

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));
            encoder.send_frame(&yuv_frame).unwrap();
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(&mut octx).unwrap();
            }
        }

        encoder.send_eof().unwrap();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
        octx.write_trailer().unwrap();
    }
}
