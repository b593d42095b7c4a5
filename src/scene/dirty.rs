//! Per-tile computation progress, drawn as pie charts.

use std::sync::Arc;

use image::Rgba;

use crate::geometry::RectF;
use crate::surface::{Drawable, Surface};
use crate::tiling::Tiling;

const DIRTY_COLOR: Rgba<u8> = Rgba([255, 0, 0, 128]);

/// Shows how much work is left on every unfinished tile.
///
/// The pie covers the fraction still missing, so a tile that has not
/// started shows a full disc and a finished tile shows nothing.
#[derive(Debug, Clone)]
pub struct DirtyIndicator {
    tiling: Arc<Tiling>,
    progress: Vec<f32>,
    visible: bool,
}

impl DirtyIndicator {
    /// Tiles start out unfinished.
    pub fn new(tiling: Arc<Tiling>) -> Self {
        let progress = vec![0.0; tiling.len()];
        Self {
            tiling,
            progress,
            visible: true,
        }
    }

    /// Returns `false` for an unknown tile.
    pub fn set_tile_progress(&mut self, tile_id: usize, progress: f32) -> bool {
        match self.progress.get_mut(tile_id) {
            Some(p) => {
                *p = if progress.is_nan() {
                    0.0
                } else {
                    progress.clamp(0.0, 1.0)
                };
                true
            }
            None => false,
        }
    }

    pub fn tile_progress(&self, tile_id: usize) -> Option<f32> {
        self.progress.get(tile_id).copied()
    }

    pub fn unfinished(&self) -> usize {
        self.progress.iter().filter(|&&p| p < 1.0).count()
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Drawable for DirtyIndicator {
    fn bounding_rect(&self) -> RectF {
        self.tiling.bounding_rect()
    }

    fn paint(&self, surface: &mut dyn Surface) {
        if !self.visible {
            return;
        }
        for (rect, &progress) in self.tiling.scene_rects().iter().zip(&self.progress) {
            if progress >= 1.0 {
                continue;
            }
            let r = rect.width.min(rect.height);
            let c = rect.center();
            let pie = RectF::new(c.x - r / 4.0, c.y - r / 4.0, r / 2.0, r / 2.0);
            let span = ((1.0 - progress) * 360.0).min(360.0);
            surface.fill_pie(pie, 0.0, span, DIRTY_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Transform;
    use crate::surface::ImageSurface;

    fn indicator() -> DirtyIndicator {
        DirtyIndicator::new(Arc::new(Tiling::new((128, 64), Transform::identity(), 64)))
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut ind = indicator();
        assert!(ind.set_tile_progress(0, 3.0));
        assert_eq!(ind.tile_progress(0), Some(1.0));
        assert!(ind.set_tile_progress(1, -1.0));
        assert_eq!(ind.tile_progress(1), Some(0.0));
        assert!(!ind.set_tile_progress(2, 0.5));
        assert_eq!(ind.unfinished(), 1);
    }

    #[test]
    fn test_paints_only_unfinished_tiles() {
        let mut ind = indicator();
        ind.set_tile_progress(0, 1.0);
        let mut surface = ImageSurface::new(128, 64);
        ind.paint(&mut surface);
        // Tile 0 is done, tile 1 shows a full disc at its centre.
        assert_eq!(surface.image().get_pixel(32, 32)[0], 0);
        assert!(surface.image().get_pixel(96, 32)[0] > 0);
    }

    #[test]
    fn test_hidden_indicator_paints_nothing() {
        let mut ind = indicator();
        ind.set_visible(false);
        let mut surface = ImageSurface::new(128, 64);
        ind.paint(&mut surface);
        assert!(surface.image().pixels().all(|p| p[0] == 0));
    }
}
