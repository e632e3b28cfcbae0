use std::fmt;

/// Channel count of the interleaved RGB layout every published frame uses.
pub const RGB_CHANNELS: u32 = 3;

/// Pixel layouts exchanged with the decoding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar 4:2:0 YUV
    Yuv420p,
    /// Semi-planar 4:2:0, interleaved chroma
    Nv12,
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit BGR
    Bgr24,
    /// Packed 8-bit RGB with alpha
    Rgba,
}

impl PixelFormat {
    /// Bytes per pixel for packed layouts, `None` for planar ones.
    pub fn packed_channels(&self) -> Option<u32> {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(3),
            PixelFormat::Rgba => Some(4),
            PixelFormat::Yuv420p | PixelFormat::Nv12 => None,
        }
    }
}

/// The (width, height, channel count) triple describing a buffer's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Geometry {
    /// Pixels per row
    pub width: u32,
    /// Rows
    pub height: u32,
    /// Interleaved bytes per pixel
    pub channels: u32,
}

impl Geometry {
    /// Geometry with an explicit channel count.
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Interleaved RGB geometry for the given picture size.
    pub fn rgb(width: u32, height: u32) -> Self {
        Self::new(width, height, RGB_CHANNELS)
    }

    /// Number of bytes a buffer of this geometry occupies, or `None` when the
    /// product does not fit in `usize`.
    pub fn capacity(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.channels as usize)
    }

    /// True when any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.channels == 0
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// A decoded picture still owned by the decoder.
///
/// Only valid until the next call into the decoder that produced it, which is
/// why it borrows instead of owning its pixels.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    /// Pixel data in `format`
    pub data: &'a [u8],
    /// Layout of `data`
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Presentation timestamp of the packet that completed the picture
    pub pts: Option<i64>,
    /// Whether the picture was decoded from a key unit
    pub key_frame: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_capacity() {
        assert_eq!(Geometry::rgb(640, 480).capacity(), Some(921_600));
        assert_eq!(Geometry::new(0, 480, 3).capacity(), Some(0));
        assert!(Geometry::new(0, 480, 3).is_empty());
        assert_eq!(Geometry::rgb(1280, 720).to_string(), "1280x720x3");
    }

    #[test]
    fn test_geometry_capacity_overflow() {
        assert_eq!(Geometry::new(u32::MAX, u32::MAX, 3).capacity(), None);
    }

    #[test]
    fn test_packed_channels() {
        assert_eq!(PixelFormat::Rgb24.packed_channels(), Some(RGB_CHANNELS));
        assert_eq!(PixelFormat::Rgba.packed_channels(), Some(4));
        assert_eq!(PixelFormat::Yuv420p.packed_channels(), None);
    }
}
