//! Stacked image sources that tiles are composited from.
//!
//! New layer types are added by implementing [`ImageSource`] and pushing
//! them onto a [`StackedImageSources`]:
//!
//! ```rust,ignore
//! use voxlab::source::{ImageSource, SourcePatch, FetchError};
//!
//! struct Checkerboard;
//!
//! impl ImageSource for Checkerboard {
//!     fn name(&self) -> &str { "checkerboard" }
//!     fn fetch(&self, rect: Rect, slice: &SliceCoord) -> Result<SourcePatch, FetchError> {
//!         /* paint rect */
//!     }
//! }
//! ```

mod volume_sources;

use std::sync::Arc;

use image::RgbaImage;
use thiserror::Error;

use crate::geometry::Rect;
use crate::volume::{SliceCoord, VolumeError};

pub use volume_sources::{ColorTable, GrayscaleSource, LabelSource};

/// Errors a source can report instead of a patch.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// Underlying volume access failed
    #[error("volume access failed: {0}")]
    Volume(#[from] VolumeError),

    /// Source cannot produce data right now
    #[error("source '{source_name}' unavailable: {message}")]
    Unavailable {
        source_name: String,
        message: String,
    },
}

impl FetchError {
    pub fn unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Pixels of one source for one data-space rectangle.
#[derive(Debug, Clone)]
pub struct SourcePatch {
    /// Sized to the requested rectangle, in data orientation.
    pub pixels: RgbaImage,
    /// An invalid patch contributes nothing to the composite.
    pub valid: bool,
}

impl SourcePatch {
    pub fn valid(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            valid: true,
        }
    }

    pub fn invalid(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            valid: false,
        }
    }
}

/// A provider of 2D pixel data for slices of a volume.
///
/// Called from tile worker threads.
pub trait ImageSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Pixels for `rect` (data space) of the slice `slice`.
    fn fetch(&self, rect: Rect, slice: &SliceCoord) -> Result<SourcePatch, FetchError>;
}

/// One entry of the stack.
#[derive(Clone)]
pub struct StackedLayer {
    pub source: Arc<dyn ImageSource>,
    pub opacity: f32,
    pub visible: bool,
}

impl std::fmt::Debug for StackedLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackedLayer")
            .field("source", &self.source.name())
            .field("opacity", &self.opacity)
            .field("visible", &self.visible)
            .finish()
    }
}

/// Ordered image sources, composited back-to-front (index 0 at the back).
#[derive(Debug, Clone, Default)]
pub struct StackedImageSources {
    layers: Vec<StackedLayer>,
}

impl StackedImageSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fully opaque, visible layer on top of the stack.
    pub fn push(&mut self, source: Arc<dyn ImageSource>) -> usize {
        self.push_with_opacity(source, 1.0)
    }

    pub fn push_with_opacity(&mut self, source: Arc<dyn ImageSource>, opacity: f32) -> usize {
        self.layers.push(StackedLayer {
            source,
            opacity: opacity.clamp(0.0, 1.0),
            visible: true,
        });
        self.layers.len() - 1
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[StackedLayer] {
        &self.layers
    }

    /// Layers that take part in compositing, back to front.
    pub fn visible_layers(&self) -> Vec<StackedLayer> {
        self.layers.iter().filter(|l| l.visible).cloned().collect()
    }

    /// Returns `false` if `index` does not exist.
    pub fn set_visible(&mut self, index: usize, visible: bool) -> bool {
        match self.layers.get_mut(index) {
            Some(layer) => {
                layer.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Returns `false` if `index` does not exist.
    pub fn set_opacity(&mut self, index: usize, opacity: f32) -> bool {
        match self.layers.get_mut(index) {
            Some(layer) => {
                layer.opacity = opacity.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }
}
