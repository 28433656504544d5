use serde::{Deserialize, Serialize};

/// Output pixel layout tag. Equivalent to harvid's `fmt` integer, but
/// expressed as a closed enum so [`picture_bytesize`] can never see an
/// unrecognised value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    Bgr24,
    Rgba32,
    Yuv420P,
}

impl PixelFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba32 => "rgba32",
            PixelFormat::Yuv420P => "yuv420p",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic, pure sizing function. The coordinator uses exactly this
/// value for every buffer it allocates or reuses (spec §6, §4.4).
pub fn picture_bytesize(fmt: PixelFormat, w: i16, h: i16) -> usize {
    debug_assert!(w > 0 && h > 0);
    let (w, h) = (w as usize, h as usize);
    match fmt {
        PixelFormat::Gray8 => w * h,
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => w * h * 3,
        PixelFormat::Rgba32 => w * h * 4,
        PixelFormat::Yuv420P => {
            let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
            w * h + 2 * cw * ch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb24_is_three_bytes_per_pixel() {
        assert_eq!(picture_bytesize(PixelFormat::Rgb24, 320, 180), 320 * 180 * 3);
    }

    #[test]
    fn gray8_is_one_byte_per_pixel() {
        assert_eq!(picture_bytesize(PixelFormat::Gray8, 4, 4), 16);
    }

    #[test]
    fn yuv420p_accounts_for_subsampled_chroma() {
        // 4x4 luma plane (16 bytes) + two 2x2 chroma planes (4 bytes each).
        assert_eq!(picture_bytesize(PixelFormat::Yuv420P, 4, 4), 16 + 2 * 4);
    }

    #[test]
    fn yuv420p_rounds_odd_dimensions_up() {
        // 3x3 luma (9 bytes) + two 2x2 chroma planes (4 bytes each).
        assert_eq!(picture_bytesize(PixelFormat::Yuv420P, 3, 3), 9 + 2 * 4);
    }
}
