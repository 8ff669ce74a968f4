// ------------------------- Export -------------------------

use std::{
    fmt, fs,
    io::Cursor,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

use chrono::{DateTime, Utc};
use image::{ImageBuffer, ImageError, ImageOutputFormat, Rgba};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::render::{
    create_renderer, FrameInputs, FrameSize, RenderBackend, RenderError, RendererFactory,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportResolution {
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4K")]
    Uhd4k,
}

impl ExportResolution {
    pub const ALL: [ExportResolution; 2] = [ExportResolution::FullHd, ExportResolution::Uhd4k];

    pub fn tag(&self) -> &'static str {
        match self {
            ExportResolution::FullHd => "1080p",
            ExportResolution::Uhd4k => "4K",
        }
    }

    pub fn size(&self) -> FrameSize {
        match self {
            ExportResolution::FullHd => FrameSize::new(1920, 1080),
            ExportResolution::Uhd4k => FrameSize::new(3840, 2160),
        }
    }
}

impl fmt::Display for ExportResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ExportResolution {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        ExportResolution::ALL
            .into_iter()
            .find(|res| res.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| ExportError::UnknownResolution(tag.to_string()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("unknown export resolution {0:?} (expected 1080p or 4K)")]
    UnknownResolution(String),
    #[error("Render: {0}")]
    Render(#[from] RenderError),
    #[error("renderer produced {actual_width}x{actual_height}, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("Image: {0}")]
    Encode(#[from] ImageError),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// An encoded wallpaper, ready to be written wherever the user picks.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl ExportedImage {
    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        fs::write(path, &self.png)?;
        info!(path = %path.display(), bytes = self.png.len(), "wallpaper saved");
        Ok(())
    }

    /// Writes under the suggested filename inside `dir`.
    pub fn write_into(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        self.write_to(&path)?;
        Ok(path)
    }
}

pub fn export_filename(timestamp: DateTime<Utc>, resolution: ExportResolution) -> String {
    format!(
        "fractal-{}-{}.png",
        timestamp.timestamp_millis(),
        resolution.tag()
    )
}

/// Renders single high-resolution frames with a renderer of their own,
/// so the live view's resources and state are never touched.
pub struct ExportRenderer {
    backend: RenderBackend,
    factory: RendererFactory,
}

impl ExportRenderer {
    pub fn new(backend: RenderBackend) -> Self {
        Self::with_factory(backend, Box::new(create_renderer))
    }

    pub fn with_factory(backend: RenderBackend, factory: RendererFactory) -> Self {
        Self { backend, factory }
    }

    pub fn export(
        &mut self,
        inputs: &FrameInputs,
        resolution: ExportResolution,
        timestamp: DateTime<Utc>,
    ) -> Result<ExportedImage, ExportError> {
        let size = resolution.size();
        let started = Instant::now();
        let mut renderer = (self.factory)(self.backend)?;
        let frame = renderer.render(inputs, size)?;
        drop(renderer);

        if frame.width != size.width || frame.height != size.height {
            return Err(ExportError::SizeMismatch {
                width: size.width,
                height: size.height,
                actual_width: frame.width,
                actual_height: frame.height,
            });
        }
        let img = ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width, frame.height, frame.pixels)
            .ok_or(ExportError::SizeMismatch {
                width: size.width,
                height: size.height,
                actual_width: frame.width,
                actual_height: frame.height,
            })?;
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageOutputFormat::Png)?;

        let filename = export_filename(timestamp, resolution);
        info!(
            file = %filename,
            resolution = resolution.tag(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "wallpaper rendered"
        );
        Ok(ExportedImage {
            filename,
            width: size.width,
            height: size.height,
            png: png.into_inner(),
        })
    }
}
