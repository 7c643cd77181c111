use crate::core::fs;
use crate::types::{
    COMPRESSED_FILE, ImageSettings, JPEG_FILE, MASTER_FILE, POINTER_FILE,
};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, error, info};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ImageProcessingError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Image error: {0}")]
        Image(#[from] image::ImageError),

        #[error("Resize error: {0}")]
        Resize(#[from] fast_image_resize::ResizeError),

        #[error("PNG encoding error: {0}")]
        Png(#[from] png::EncodingError),

        #[error("Image height {height}px does not exceed the {crop}px crop")]
        TooSmall { height: u32, crop: u32 },
    }
}

use error::ImageProcessingError;

/// Paths of one published artifact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub master: PathBuf,
    pub compressed: PathBuf,
    pub jpeg: PathBuf,
    pub pointer: PathBuf,
}

/// Largest size fitting `target` that keeps the aspect ratio of `src`,
/// i.e. `src * min(target_w / src_w, target_h / src_h)`. Never upscales.
///
/// Integer arithmetic keeps the limiting axis exactly on the target edge.
pub fn fit_within(src: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_width, src_height) = (u64::from(src.0.max(1)), u64::from(src.1.max(1)));
    let (target_width, target_height) = (u64::from(target.0), u64::from(target.1));

    if src_width <= target_width && src_height <= target_height {
        return (src_width as u32, src_height as u32);
    }

    let (dst_width, dst_height) = if target_width * src_height <= target_height * src_width {
        (target_width, src_height * target_width / src_width)
    } else {
        (src_width * target_height / src_height, target_height)
    };
    ((dst_width as u32).max(1), (dst_height as u32).max(1))
}

/// A file written under a temporary name in the output directory.
/// Dropping it unpublished removes the temporary file.
struct Staged {
    path: TempPath,
    dest: PathBuf,
}

impl Staged {
    fn publish(self) -> Result<(), ImageProcessingError> {
        self.path.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Second hidden name for the file currently at `dest`, so it can be put back.
/// `None` when there is nothing to keep.
fn keep_previous(dir: &Path, dest: &Path) -> std::io::Result<Option<TempPath>> {
    match std::fs::symlink_metadata(dest) {
        Ok(meta) if !meta.is_dir() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }
    let link = tempfile::Builder::new()
        .prefix(".previous-")
        .make_in(dir, |path| std::fs::hard_link(dest, path))?;
    Ok(Some(link.into_temp_path()))
}

/// Renames every staged file into place. If one rename fails, the files
/// already replaced get their previous content back.
fn publish_all(dir: &Path, staged: Vec<Staged>) -> Result<(), ImageProcessingError> {
    let previous = staged
        .iter()
        .map(|s| keep_previous(dir, &s.dest))
        .collect::<std::io::Result<Vec<_>>>()?;

    let mut replaced: Vec<(PathBuf, Option<TempPath>)> = Vec::with_capacity(staged.len());
    for (staged, previous) in staged.into_iter().zip(previous) {
        let dest = staged.dest.clone();
        if let Err(e) = staged.publish() {
            error!(dest = %dest.display(), error = %e, "Publishing failed, restoring previous artifacts");
            for (dest, previous) in replaced.into_iter().rev() {
                restore(&dest, previous);
            }
            return Err(e);
        }
        replaced.push((dest, previous));
    }
    Ok(())
}

fn restore(dest: &Path, previous: Option<TempPath>) {
    let result = match previous {
        Some(previous) => previous.persist(dest).map_err(|e| e.error),
        None => std::fs::remove_file(dest),
    };
    if let Err(e) = result {
        error!(dest = %dest.display(), error = %e, "Failed to restore artifact");
    }
}

/// Turns raw exported bytes into the served artifact set.
pub struct ImagePipeline {
    pub output_dir: PathBuf,
    pub settings: ImageSettings,
}

impl ImagePipeline {
    pub fn new(output_dir: impl Into<PathBuf>, settings: ImageSettings) -> Self {
        Self {
            output_dir: output_dir.into(),
            settings,
        }
    }

    pub fn artifact_set(&self) -> ArtifactSet {
        ArtifactSet {
            master: self.output_dir.join(MASTER_FILE),
            compressed: self.output_dir.join(COMPRESSED_FILE),
            jpeg: self.output_dir.join(JPEG_FILE),
            pointer: self.output_dir.join(POINTER_FILE),
        }
    }

    /// Publishes all four artifacts or none.
    ///
    /// Every output is staged under a temporary name in `output_dir` and
    /// renamed into place only once all of them were produced. A failed
    /// rename puts the previous set back.
    pub fn process(&self, bytes: &[u8]) -> Result<ArtifactSet, ImageProcessingError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let artifacts = self.artifact_set();

        let source = image::load_from_memory(bytes)?;
        let cropped = self.crop(&source)?;
        let master_bytes = encode(&cropped, ImageFormat::Png)?;
        let master = self.stage(&artifacts.master, &master_bytes)?;

        let resized = self.resize(&cropped)?;
        let compressed = self.stage(&artifacts.compressed, &self.quantize(&resized)?)?;
        let jpeg = self.stage(&artifacts.jpeg, &self.encode_jpeg(&resized)?)?;
        let pointer = self.stage_pointer(&artifacts.pointer, &master_bytes)?;

        publish_all(&self.output_dir, vec![master, compressed, jpeg, pointer])?;

        info!(
            dir = %self.output_dir.display(),
            width = resized.width(),
            height = resized.height(),
            "Artifacts published"
        );
        Ok(artifacts)
    }

    fn crop(&self, source: &DynamicImage) -> Result<DynamicImage, ImageProcessingError> {
        let crop = self.settings.crop_bottom_px;
        if source.height() <= crop {
            return Err(ImageProcessingError::TooSmall {
                height: source.height(),
                crop,
            });
        }
        Ok(source.crop_imm(0, 0, source.width(), source.height() - crop))
    }

    fn resize(&self, cropped: &DynamicImage) -> Result<DynamicImage, ImageProcessingError> {
        let (dst_width, dst_height) = fit_within(
            (cropped.width(), cropped.height()),
            (self.settings.target_width, self.settings.target_height),
        );
        debug!(dst_width, dst_height, "Resizing cropped graph");

        let src_image = DynamicImage::ImageRgba8(cropped.to_rgba8());
        let mut dst_image = DynamicImage::new(dst_width, dst_height, src_image.color());

        let mut resizer = fast_image_resize::Resizer::new();
        resizer.resize(
            &src_image,
            &mut dst_image,
            Some(&fast_image_resize::ResizeOptions::new().resize_alg(
                fast_image_resize::ResizeAlg::Convolution(fast_image_resize::FilterType::Lanczos3),
            )),
        )?;

        Ok(dst_image)
    }

    /// Indexed PNG with at most `palette_colors` entries.
    fn quantize(&self, resized: &DynamicImage) -> Result<Vec<u8>, ImageProcessingError> {
        let rgba = resized.to_rgba8();
        let colors = usize::from(self.settings.palette_colors);
        let quantizer = color_quant::NeuQuant::new(10, colors, rgba.as_raw());

        let indices: Vec<u8> = rgba
            .pixels()
            .map(|pixel| quantizer.index_of(&pixel.0) as u8)
            .collect();

        let color_map = quantizer.color_map_rgba();
        let palette: Vec<u8> = color_map
            .chunks_exact(4)
            .flat_map(|c| [c[0], c[1], c[2]])
            .collect();
        let alpha: Vec<u8> = color_map.chunks_exact(4).map(|c| c[3]).collect();

        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, rgba.width(), rgba.height());
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(palette);
            if alpha.iter().any(|&a| a != u8::MAX) {
                encoder.set_trns(alpha);
            }
            encoder.set_compression(png::Compression::Best);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&indices)?;
            writer.finish()?;
        }
        Ok(out)
    }

    fn encode_jpeg(&self, resized: &DynamicImage) -> Result<Vec<u8>, ImageProcessingError> {
        let mut out = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            &mut out,
            self.settings.jpeg_quality,
        );
        resized.to_rgb8().write_with_encoder(encoder)?;
        Ok(out)
    }

    fn stage(&self, dest: &Path, bytes: &[u8]) -> Result<Staged, ImageProcessingError> {
        Ok(Staged {
            path: fs::stage_bytes(&self.output_dir, bytes)?,
            dest: dest.to_path_buf(),
        })
    }

    /// Relative symlink to the master, so the directory can be moved or served as is.
    #[cfg(unix)]
    fn stage_pointer(&self, dest: &Path, _master: &[u8]) -> Result<Staged, ImageProcessingError> {
        let link = tempfile::Builder::new()
            .prefix(".staging-")
            .make_in(&self.output_dir, |path| {
                std::os::unix::fs::symlink(MASTER_FILE, path)
            })?;
        Ok(Staged {
            path: link.into_temp_path(),
            dest: dest.to_path_buf(),
        })
    }

    #[cfg(not(unix))]
    fn stage_pointer(&self, dest: &Path, master: &[u8]) -> Result<Staged, ImageProcessingError> {
        self.stage(dest, master)
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ImageProcessingError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests;
