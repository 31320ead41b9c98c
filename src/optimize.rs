use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use image::ImageReader;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::OptimizeSettings;
use crate::error::CatalogError;
use crate::fs_util::{list_files, persist, temp_file_beside};

const DERIVATIVE_SUFFIX: &str = "_optimized";
const SOURCE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub source: Utf8PathBuf,
    pub path: Utf8PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct OptimizeFailure {
    pub source: Utf8PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeReport {
    pub optimized: Vec<OptimizedImage>,
    pub failed: Vec<OptimizeFailure>,
}

#[derive(Debug, Clone)]
pub struct AssetOptimizer {
    settings: OptimizeSettings,
}

impl AssetOptimizer {
    pub fn new(settings: OptimizeSettings) -> Self {
        Self { settings }
    }

    pub fn optimize_dir(
        &self,
        dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<OptimizeReport, CatalogError> {
        if !dir.as_std_path().is_dir() {
            return Err(CatalogError::Filesystem(format!(
                "image directory {dir} does not exist"
            )));
        }

        let mut report = OptimizeReport::default();
        for source in list_files(dir)?.into_iter().filter(|path| is_candidate(path)) {
            match self.optimize_file(&source) {
                Ok(optimized) => {
                    sink.event(ProgressEvent::message(format!(
                        "Optimized and saved: {}",
                        optimized.path
                    )));
                    report.optimized.push(optimized);
                }
                Err(err) => {
                    tracing::error!(path = %source, error = %err, "failed to optimize image");
                    sink.event(ProgressEvent::message(format!(
                        "Failed to optimize {}: {err}",
                        source.file_name().unwrap_or(source.as_str())
                    )));
                    report.failed.push(OptimizeFailure {
                        source,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    pub fn optimize_file(&self, source: &Utf8Path) -> Result<OptimizedImage, CatalogError> {
        let image_err = |message: String| CatalogError::Image {
            path: source.to_path_buf(),
            message,
        };

        let decoded = ImageReader::open(source.as_std_path())
            .map_err(|err| image_err(err.to_string()))?
            .with_guessed_format()
            .map_err(|err| image_err(err.to_string()))?
            .decode()
            .map_err(|err| image_err(err.to_string()))?;

        // drops palette and alpha channels
        let rgb = decoded.to_rgb8();
        let (width, height) = fit_within(
            rgb.width(),
            rgb.height(),
            self.settings.max_width,
            self.settings.max_height,
        );
        let resized = if (width, height) == rgb.dimensions() {
            rgb
        } else {
            imageops::resize(&rgb, width, height, FilterType::Lanczos3)
        };

        let path = derivative_path(source);
        let mut temp = temp_file_beside(&path)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            JpegEncoder::new_with_quality(&mut writer, self.settings.quality)
                .encode_image(&resized)
                .map_err(|err| image_err(err.to_string()))?;
            writer
                .flush()
                .map_err(|err| CatalogError::Filesystem(format!("write {path}: {err}")))?;
        }
        persist(temp, &path)?;

        tracing::info!(source = %source, path = %path, width, height, "optimized image");
        Ok(OptimizedImage {
            source: source.to_path_buf(),
            path,
            width,
            height,
        })
    }
}

/// Largest size fitting `max_width × max_height` with the same aspect ratio.
/// Images already inside the box keep their size.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let ratio = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let scale = |value: u32, max: u32| ((f64::from(value) * ratio).round() as u32).clamp(1, max);
    (scale(width, max_width), scale(height, max_height))
}

pub fn derivative_path(source: &Utf8Path) -> Utf8PathBuf {
    let stem = source.file_stem().unwrap_or("image");
    source.with_file_name(format!("{stem}{DERIVATIVE_SUFFIX}.jpg"))
}

pub fn is_candidate(path: &Utf8Path) -> bool {
    let extension_ok = path
        .extension()
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let is_derivative = path
        .file_stem()
        .map(|stem| stem.ends_with(DERIVATIVE_SUFFIX))
        .unwrap_or(false);
    extension_ok && !is_derivative
}
