//! One tile's pixel store with its version counters.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbaImage;

use super::raster::{self, Pen};
use crate::geometry::{PointF, RectF};
use crate::surface::Surface;

/// Read-only copy of a tile's state taken under its lock.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    pub pixels: Arc<RgbaImage>,
    pub data_version: u64,
    pub image_version: u64,
    pub progress: f32,
}

impl BufferSnapshot {
    pub fn is_fresh(&self) -> bool {
        self.image_version == self.data_version
    }
}

#[derive(Debug)]
struct TileState {
    /// Shared with snapshots; cloned on write while a snapshot is alive.
    pixels: Arc<RgbaImage>,
    data_version: u64,
    image_version: u64,
    /// Estimated completion of the recompute in flight, below 1.0 while stale.
    progress: f32,
}

/// Pixel buffer of one tile.
///
/// `image_version <= data_version` holds at all times. Equal versions mean
/// the pixels reflect the latest data; the tile is stale otherwise.
#[derive(Debug)]
pub struct TileBuffer {
    rect: RectF,
    state: Mutex<TileState>,
    notifier: Option<Sender<RectF>>,
}

impl TileBuffer {
    /// Create a transparent, fresh buffer covering the display rectangle
    /// `rect`. Successful writes report `rect` through `notifier`.
    pub fn new(rect: RectF, notifier: Option<Sender<RectF>>) -> Self {
        let (w, h) = raster::pixel_size(&rect);
        Self {
            rect,
            state: Mutex::new(TileState {
                pixels: Arc::new(raster::blank(w, h)),
                data_version: 0,
                image_version: 0,
                progress: 1.0,
            }),
            notifier,
        }
    }

    pub fn rect(&self) -> RectF {
        self.rect
    }

    fn lock(&self) -> MutexGuard<'_, TileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        if let Some(tx) = &self.notifier {
            // The receiver going away just means nobody repaints anymore.
            let _ = tx.send(self.rect);
        }
    }

    /// Rasterize a stroke given in display coordinates into this tile.
    pub fn lock_and_draw(&self, from: PointF, to: PointF, pen: &Pen) {
        {
            let mut state = self.lock();
            let origin = self.rect.top_left();
            let pixels = Arc::make_mut(&mut state.pixels);
            raster::draw_line(pixels, from - origin, to - origin, pen);
            state.data_version += 1;
            state.progress = 0.0;
        }
        self.notify();
    }

    /// Replace the pixels with a recompute result for `target_version`.
    ///
    /// Results older than the current image version are dropped and
    /// `false` is returned, so a slow recompute never overwrites a newer one.
    pub fn lock_and_replace(&self, pixels: Arc<RgbaImage>, target_version: u64) -> bool {
        {
            let mut state = self.lock();
            if target_version < state.image_version {
                log::trace!(
                    "Dropping stale tile result v{} (image at v{})",
                    target_version,
                    state.image_version
                );
                return false;
            }
            state.pixels = pixels;
            state.image_version = target_version;
            state.data_version = state.data_version.max(target_version);
            state.progress = if state.image_version == state.data_version {
                1.0
            } else {
                0.0
            };
        }
        self.notify();
        true
    }

    /// Show an incomplete recompute result without advancing the image
    /// version, so the tile stays stale.
    pub fn lock_and_preview(&self, pixels: Arc<RgbaImage>, target_version: u64) -> bool {
        {
            let mut state = self.lock();
            if target_version <= state.image_version {
                return false;
            }
            state.pixels = pixels;
        }
        self.notify();
        true
    }

    /// Bump the data version, leaving the pixels stale. Returns the new
    /// data version.
    pub fn mark_dirty(&self) -> u64 {
        let mut state = self.lock();
        state.data_version += 1;
        state.progress = 0.0;
        state.data_version
    }

    /// Record partial progress of a recompute targeting `version`. Ignored
    /// if the tile moved on in the meantime.
    pub fn set_progress(&self, version: u64, progress: f32) {
        let mut state = self.lock();
        if state.data_version == version && state.image_version < version {
            state.progress = progress.clamp(0.0, 0.99);
        }
    }

    /// Blank the pixels and mark them fresh at the current data version.
    pub fn lock_and_clear(&self) {
        {
            let mut state = self.lock();
            let (w, h) = state.pixels.dimensions();
            state.pixels = Arc::new(raster::blank(w, h));
            state.image_version = state.data_version;
            state.progress = 1.0;
        }
        self.notify();
    }

    pub fn data_version(&self) -> u64 {
        self.lock().data_version
    }

    pub fn image_version(&self) -> u64 {
        self.lock().image_version
    }

    pub fn is_fresh(&self) -> bool {
        let state = self.lock();
        state.image_version == state.data_version
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        let state = self.lock();
        BufferSnapshot {
            pixels: Arc::clone(&state.pixels),
            data_version: state.data_version,
            image_version: state.image_version,
            progress: if state.image_version == state.data_version {
                1.0
            } else {
                state.progress.min(0.99)
            },
        }
    }

    /// Paint the pixels at the tile rectangle while holding the lock.
    pub fn paint(&self, surface: &mut dyn Surface) {
        let state = self.lock();
        surface.draw_image(self.rect, &state.pixels);
    }
}
