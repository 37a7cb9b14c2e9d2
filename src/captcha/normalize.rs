//! Flattening of captcha images to opaque RGB.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};

use super::{CaptchaError, CaptchaResult};

/// Opaque 8-bit RGB pixel grid ready for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pixels: RgbImage,
}

impl NormalizedImage {
    /// Wrap an RGB buffer. Zero-sized images are rejected.
    pub fn from_rgb(pixels: RgbImage) -> CaptchaResult<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(CaptchaError::protocol("captcha image has no pixels"));
        }
        Ok(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Interleaved RGB samples, row-major.
    pub fn samples(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

/// Decode raw image bytes and flatten them to RGB.
///
/// Only images that carry transparency in their source form (an alpha
/// channel, or a palette with a `tRNS` transparency table) are composited
/// over opaque white. Everything else is converted straight to RGB; a `tRNS`
/// colour key on a truecolour or grayscale PNG is ignored.
pub fn normalize(raw: &[u8]) -> CaptchaResult<NormalizedImage> {
    let decoded = image::load_from_memory(raw)?;
    let transparent = png_source_transparency(raw).unwrap_or_else(|| decoded.color().has_alpha());

    let pixels = if transparent {
        composite_over_white(&decoded.to_rgba8())
    } else {
        decoded.to_rgb8()
    };
    NormalizedImage::from_rgb(pixels)
}

/// Transparency as declared in a PNG header; `None` for other formats.
///
/// The decoder expands every `tRNS` chunk into alpha, so the decoded colour
/// type cannot tell a transparent palette from a colour-keyed RGB image.
fn png_source_transparency(raw: &[u8]) -> Option<bool> {
    if image::guess_format(raw).ok()? != ImageFormat::Png {
        return None;
    }

    let reader = png::Decoder::new(Cursor::new(raw)).read_info().ok()?;
    let info = reader.info();
    Some(match info.color_type {
        png::ColorType::Rgba | png::ColorType::GrayscaleAlpha => true,
        png::ColorType::Indexed => info.trns.is_some(),
        png::ColorType::Rgb | png::ColorType::Grayscale => false,
    })
}

fn composite_over_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Rgb([blend(r, a), blend(g, a), blend(b, a)])
    })
}

fn blend(channel: u8, alpha: u8) -> u8 {
    let alpha = u32::from(alpha);
    let mixed = u32::from(channel) * alpha + 255 * (255 - alpha);
    ((mixed + 127) / 255) as u8
}
