use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageFormat};

use crate::shared::frame::Frame;

const JPEG_QUALITY: u8 = 95;

/// Decodes an image file into an RGB [`Frame`].
pub fn read_frame(path: &Path, index: usize) -> Result<Frame, ImageError> {
    let image = image::open(path)?.into_rgb8();
    Ok(Frame::from_rgb_image(image, index))
}

/// Encodes `frame` to `path`, choosing the codec from the file extension.
pub fn write_frame(path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let image = frame
        .to_rgb_image()
        .ok_or("Failed to create image from frame data")?;

    match ImageFormat::from_path(path)? {
        ImageFormat::Jpeg => {
            let writer = BufWriter::new(File::create(path)?);
            let mut encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
            encoder.encode_image(&image)?;
        }
        format => image.save_with_format(path, format)?,
    }
    Ok(())
}

/// True when `path` decodes as an image.
pub fn is_decodable_image(path: &Path) -> bool {
    image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map(|r| r.decode().is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 3, 0)
    }

    #[test]
    fn test_png_write_then_read_is_lossless() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0001.png");
        let frame = solid(8, 6, 120);
        write_frame(&path, &frame).unwrap();

        let read = read_frame(&path, 3).unwrap();
        assert_eq!(read.data(), frame.data());
        assert_eq!(read.index(), 3);
    }

    #[test]
    fn test_jpg_write_is_decodable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0001.jpg");
        write_frame(&path, &solid(16, 16, 200)).unwrap();

        assert!(is_decodable_image(&path));
        let read = read_frame(&path, 0).unwrap();
        assert_eq!((read.width(), read.height()), (16, 16));
    }

    #[test]
    fn test_write_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/out.png");
        write_frame(&path, &solid(2, 2, 0)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_garbage_is_not_decodable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(!is_decodable_image(&path));
        assert!(read_frame(&path, 0).is_err());
    }

    #[test]
    fn test_missing_is_not_decodable() {
        assert!(!is_decodable_image(Path::new("/nonexistent/out.png")));
    }
}
