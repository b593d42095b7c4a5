//! Partitioning of a slice plane into a fixed grid of tiles.
//!
//! Tiles are laid out row-major in data space and mapped to display space
//! through the data-to-scene transform. A `Tiling` never changes after
//! construction: a new slice shape means a new `Tiling`, with a new
//! generation number that lets late worker results be recognised and
//! dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::{PointF, Rect, RectF, Transform};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Immutable grid of tiles covering one slice plane.
#[derive(Debug, Clone)]
pub struct Tiling {
    slice_shape: (u32, u32),
    tile_edge: u32,
    data2scene: Transform,
    data_rects: Vec<Rect>,
    scene_rects: Vec<RectF>,
    generation: u64,
}

impl Tiling {
    /// Build the grid for a slice of `slice_shape` data pixels.
    ///
    /// Edge tiles are clipped to the slice, so tiles on the right and
    /// bottom border may be smaller than `tile_edge`. A zero `tile_edge`
    /// is treated as one.
    pub fn new(slice_shape: (u32, u32), data2scene: Transform, tile_edge: u32) -> Self {
        let tile_edge = tile_edge.max(1);
        let (width, height) = slice_shape;
        let cols = width.div_ceil(tile_edge);
        let rows = height.div_ceil(tile_edge);

        let mut data_rects = Vec::with_capacity((cols * rows) as usize);
        for row in 0..rows {
            for col in 0..cols {
                let x = col * tile_edge;
                let y = row * tile_edge;
                let w = tile_edge.min(width - x);
                let h = tile_edge.min(height - y);
                data_rects.push(Rect::new(x as i32, y as i32, w as i32, h as i32));
            }
        }

        let scene_rects = data_rects
            .iter()
            .map(|r| data2scene.map_rect(r.to_rect_f()))
            .collect();

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Tiling #{}: {}x{} slice, edge {}, {} tiles",
            generation,
            width,
            height,
            tile_edge,
            data_rects.len()
        );

        Self {
            slice_shape,
            tile_edge,
            data2scene,
            data_rects,
            scene_rects,
            generation,
        }
    }

    pub fn len(&self) -> usize {
        self.data_rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_rects.is_empty()
    }

    pub fn slice_shape(&self) -> (u32, u32) {
        self.slice_shape
    }

    pub fn tile_edge(&self) -> u32 {
        self.tile_edge
    }

    pub fn data2scene(&self) -> Transform {
        self.data2scene
    }

    /// Process-wide unique id of this grid.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Display rectangle of a tile.
    pub fn rect_of(&self, index: usize) -> Option<RectF> {
        self.scene_rects.get(index).copied()
    }

    /// Data-space rectangle of a tile, as handed to image sources.
    pub fn data_rect_of(&self, index: usize) -> Option<Rect> {
        self.data_rects.get(index).copied()
    }

    pub fn scene_rects(&self) -> &[RectF] {
        &self.scene_rects
    }

    /// Display bounds of the whole slice.
    pub fn bounding_rect(&self) -> RectF {
        self.data2scene.map_rect(RectF::new(
            0.0,
            0.0,
            self.slice_shape.0 as f32,
            self.slice_shape.1 as f32,
        ))
    }

    /// Tile whose half-open display rectangle contains `point`.
    pub fn index_containing(&self, point: PointF) -> Option<usize> {
        self.scene_rects.iter().position(|r| r.contains(point))
    }

    /// Indices of all tiles overlapping `rect`, in ascending order.
    pub fn indices_intersecting(&self, rect: &RectF) -> Vec<usize> {
        self.scene_rects
            .iter()
            .enumerate()
            .filter(|(_, r)| r.intersects(rect))
            .map(|(i, _)| i)
            .collect()
    }
}
