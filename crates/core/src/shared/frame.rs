use ndarray::ArrayView3;

/// A single video/image frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; processors and
/// inference adapters exchange `Frame`s and never touch files directly.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Wraps a decoded RGB image.
    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Copies the pixels into an `image` buffer for encoding or resizing.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if self.channels != 3 {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the rectangle `[x0, x1) × [y0, y1)` into a new frame.
    ///
    /// The rectangle is clipped to the frame; an empty result has zero
    /// width or height.
    pub fn crop(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> Frame {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        let x0 = x0.min(x1);
        let y0 = y0.min(y1);
        let w = (x1 - x0) as usize;
        let h = (y1 - y0) as usize;
        let c = self.channels as usize;
        let stride = self.width as usize * c;

        let mut data = Vec::with_capacity(w * h * c);
        for row in y0 as usize..y1 as usize {
            let start = row * stride + x0 as usize * c;
            data.extend_from_slice(&self.data[start..start + w * c]);
        }
        Frame::new(data, w as u32, h as u32, self.channels, self.index)
    }

    /// Writes `patch` with its top-left corner at `(x, y)`, clipping
    /// anything that falls outside this frame.
    pub fn paste(&mut self, patch: &Frame, x: u32, y: u32) {
        debug_assert_eq!(patch.channels, self.channels, "channel count mismatch");
        if x >= self.width || y >= self.height {
            return;
        }
        let c = self.channels as usize;
        let w = patch.width.min(self.width - x) as usize;
        let h = patch.height.min(self.height - y) as usize;
        let dst_stride = self.width as usize * c;
        let src_stride = patch.width as usize * c;

        for row in 0..h {
            let dst = (y as usize + row) * dst_stride + x as usize * c;
            let src = row * src_stride;
            self.data[dst..dst + w * c].copy_from_slice(&patch.data[src..src + w * c]);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
