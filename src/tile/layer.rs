//! Brushing layer: a tile buffer per tile for strokes in progress.

use std::sync::mpsc::Sender;

use super::buffer::TileBuffer;
use super::raster::Pen;
use crate::geometry::{PointF, RectF};
use crate::tiling::Tiling;

/// Interactive drawing overlay laid out on a tiling.
///
/// Strokes only touch this layer. A tile drawn since the last `clear` is
/// stale and has to be painted on top of the rendered slice.
pub struct TiledImageLayer {
    tiles: Vec<TileBuffer>,
}

impl TiledImageLayer {
    pub fn new(tiling: &Tiling, notifier: Option<Sender<RectF>>) -> Self {
        let tiles = tiling
            .scene_rects()
            .iter()
            .map(|rect| TileBuffer::new(*rect, notifier.clone()))
            .collect();
        Self { tiles }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TileBuffer> {
        self.tiles.get(index)
    }

    /// Draw into the tile containing `to`. Returns the tile index, or
    /// `None` when `to` lies outside the tiling.
    pub fn draw_line(
        &self,
        tiling: &Tiling,
        from: PointF,
        to: PointF,
        pen: &Pen,
    ) -> Option<usize> {
        let index = tiling.index_containing(to)?;
        self.tiles.get(index)?.lock_and_draw(from, to, pen);
        Some(index)
    }

    /// Tiles overlapping `rect` that carry undisplayed strokes.
    pub fn stale_tiles(&self, tiling: &Tiling, rect: &RectF) -> Vec<usize> {
        tiling
            .indices_intersecting(rect)
            .into_iter()
            .filter(|&i| self.tiles.get(i).is_some_and(|t| !t.is_fresh()))
            .collect()
    }

    /// Drop all strokes.
    pub fn clear(&self) {
        for tile in &self.tiles {
            tile.lock_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Transform;

    #[test]
    fn test_draw_marks_only_target_tile() {
        let tiling = Tiling::new((128, 128), Transform::identity(), 64);
        let layer = TiledImageLayer::new(&tiling, None);
        let hit = layer.draw_line(
            &tiling,
            PointF::new(70.0, 5.0),
            PointF::new(80.0, 5.0),
            &Pen::default(),
        );
        assert_eq!(hit, Some(1));
        let all = tiling.bounding_rect();
        assert_eq!(layer.stale_tiles(&tiling, &all), vec![1]);
    }

    #[test]
    fn test_draw_outside_is_ignored() {
        let tiling = Tiling::new((64, 64), Transform::identity(), 64);
        let layer = TiledImageLayer::new(&tiling, None);
        let hit = layer.draw_line(
            &tiling,
            PointF::new(0.0, 0.0),
            PointF::new(100.0, 100.0),
            &Pen::default(),
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn test_clear_resets_strokes() {
        let tiling = Tiling::new((64, 64), Transform::identity(), 32);
        let layer = TiledImageLayer::new(&tiling, None);
        layer.draw_line(
            &tiling,
            PointF::new(1.0, 1.0),
            PointF::new(2.0, 2.0),
            &Pen::default(),
        );
        layer.clear();
        assert!(layer.stale_tiles(&tiling, &tiling.bounding_rect()).is_empty());
        assert_eq!(layer.len(), 4);
    }
}
