use crate::core::fs;
use crate::types::OverlaySettings;
use ab_glyph::{FontArc, PxScale};
use image::{ImageFormat, Pixel, Rgba, RgbaImage};
use std::path::Path;
use tracing::{error, info, warn};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum OverlayError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Image error: {0}")]
        Image(#[from] image::ImageError),

        #[error("Invalid font: {0}")]
        Font(#[from] ab_glyph::InvalidFont),
    }
}

use error::OverlayError;

static BUNDLED_FONT: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans-Bold.ttf");

const MIN_FONT_SIZE: u32 = 5;
const FONT_SIZE_STEP: u32 = 2;

/// Pixel rectangle, `x`/`y` being the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest font size, starting at `start` and shrinking by 2px, whose measured
/// width stays within `max_width`. Stops at the minimum size.
pub fn fit_font_size(start: u32, max_width: f32, measure: impl Fn(u32) -> u32) -> u32 {
    let mut size = start;
    while size > MIN_FONT_SIZE {
        if measure(size) as f32 <= max_width {
            break;
        }
        size = size.saturating_sub(FONT_SIZE_STEP);
    }
    size
}

/// Text box grown by `padding` on every side, clipped to the image.
pub fn banner_rect(
    image_size: (u32, u32),
    text_origin: (i64, i64),
    text_size: (u32, u32),
    padding: u32,
) -> Rect {
    let (width, height) = (i64::from(image_size.0), i64::from(image_size.1));
    let padding = i64::from(padding);
    let left = (text_origin.0 - padding).clamp(0, width);
    let top = (text_origin.1 - padding).clamp(0, height);
    let right = (text_origin.0 + i64::from(text_size.0) + padding).clamp(0, width);
    let bottom = (text_origin.1 + i64::from(text_size.1) + padding).clamp(0, height);
    Rect {
        x: left as u32,
        y: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    }
}

/// Stamps a stale-data warning banner onto a published image.
///
/// Best effort: errors are logged, never returned. The engine does not know
/// whether an image was already stamped; callers guard against repeats.
pub struct Overlay {
    pub settings: OverlaySettings,
}

impl Overlay {
    pub fn new(settings: OverlaySettings) -> Self {
        Self { settings }
    }

    /// Rewrites `path` in place with the banner. Returns whether the image was
    /// rewritten.
    pub fn apply(&self, path: &Path, text: &str) -> bool {
        if !path.exists() {
            warn!(path = %path.display(), "No image to overlay");
            return false;
        }
        warn!(path = %path.display(), "Applying warning overlay");
        match self.try_apply(path, text) {
            Ok(()) => {
                info!("Warning overlay saved successfully");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to add overlay");
                false
            }
        }
    }

    fn try_apply(&self, path: &Path, text: &str) -> Result<(), OverlayError> {
        let mut image = image::open(path)?.to_rgba8();
        self.stamp(&mut image, text);

        // The pointer references the master by name, so replace it in place.
        let mut encoded = std::io::Cursor::new(Vec::new());
        image.write_to(&mut encoded, ImageFormat::Png)?;
        fs::replace_file(path, encoded.get_ref())?;
        Ok(())
    }

    /// Draws the banner and outlined text onto `image`.
    pub fn stamp(&self, image: &mut RgbaImage, text: &str) {
        let (width, height) = image.dimensions();
        let start_size = ((width as f32 * self.settings.font_size_ratio) as u32).max(1);
        let max_text_width = width as f32 * self.settings.max_text_width_ratio;
        let y = (height as f32 * self.settings.top_margin_ratio) as i64;

        let Some(font) = self.font() else {
            let text_size = (max_text_width as u32, start_size);
            let x = (i64::from(width) - i64::from(text_size.0)) / 2;
            let rect = banner_rect((width, height), (x, y), text_size, self.settings.padding);
            self.darken(image, rect);
            return;
        };

        let size = fit_font_size(start_size, max_text_width, |size| {
            imageproc::drawing::text_size(PxScale::from(size as f32), &font, text).0
        });
        let scale = PxScale::from(size as f32);
        let text_size = imageproc::drawing::text_size(scale, &font, text);
        let x = (i64::from(width) - i64::from(text_size.0)) / 2;

        let rect = banner_rect((width, height), (x, y), text_size, self.settings.padding);
        self.darken(image, rect);

        let (x, y) = (x as i32, y as i32);
        let stroke = self.settings.stroke_width as i32;
        let outline = Rgba([0, 0, 0, 255]);
        for (dx, dy) in outline_offsets(stroke) {
            imageproc::drawing::draw_text_mut(image, outline, x + dx, y + dy, scale, &font, text);
        }
        let [r, g, b] = self.settings.text_color;
        imageproc::drawing::draw_text_mut(image, Rgba([r, g, b, 255]), x, y, scale, &font, text);
    }

    /// The configured font, else the bundled DejaVu Sans Bold.
    fn font(&self) -> Option<FontArc> {
        match self.load_font() {
            Ok(font) => return Some(font),
            Err(e) => warn!(
                font = %self.settings.font_path.display(),
                error = %e,
                "Warning font unavailable, using bundled font"
            ),
        }
        match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                error!(error = %e, "Bundled font unreadable, drawing banner only");
                None
            }
        }
    }

    fn load_font(&self) -> Result<FontArc, OverlayError> {
        let data = std::fs::read(&self.settings.font_path)?;
        Ok(FontArc::try_from_vec(data)?)
    }

    fn darken(&self, image: &mut RgbaImage, rect: Rect) {
        let shade = Rgba([0, 0, 0, self.settings.banner_alpha]);
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                image.get_pixel_mut(x, y).blend(&shade);
            }
        }
    }
}

/// The 8 compass offsets at distance `stroke`.
fn outline_offsets(stroke: i32) -> impl Iterator<Item = (i32, i32)> {
    [-stroke, 0, stroke]
        .into_iter()
        .flat_map(move |dx| [-stroke, 0, stroke].into_iter().map(move |dy| (dx, dy)))
        .filter(|&(dx, dy)| dx != 0 || dy != 0)
}
