//! Tiled 2D view of one slicing axis.
//!
//! `ImageScene2D` ties together the tiling, the tile provider rendering the
//! stacked sources, the brushing overlay holding strokes in progress and the
//! dirty indicator. It never talks to a windowing toolkit: the display layer
//! hands it a [`Surface`] to paint on and polls [`ImageScene2D::poll_invalidated`]
//! to learn when to repaint.

mod dirty;

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use image::Rgba;

use crate::geometry::{PointF, Rect, RectF, Transform};
use crate::interaction::{InteractionEvent, InteractionSink};
use crate::source::StackedImageSources;
use crate::surface::{Drawable, Surface};
use crate::tile::{Pen, ProviderError, TileProvider, TiledImageLayer};
use crate::tiling::Tiling;
use crate::volume::SliceCoord;

pub use dirty::DirtyIndicator;

const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Knobs a scene is built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSettings {
    pub tile_edge: u32,
    pub worker_threads: usize,
    pub show_tile_outlines: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            tile_edge: crate::constants::DEFAULT_TILE_EDGE,
            worker_threads: crate::constants::DEFAULT_WORKER_THREADS,
            show_tile_outlines: false,
        }
    }
}

pub struct ImageScene2D {
    data2scene: Transform,
    scene2data: Transform,
    scene_rect: RectF,
    tile_edge: u32,
    tiling: Arc<Tiling>,
    provider: TileProvider,
    brushing: TiledImageLayer,
    brush_tx: Sender<RectF>,
    brush_rx: Receiver<RectF>,
    indicator: DirtyIndicator,
    show_tile_outlines: bool,
    slicing_position_settled: bool,
    drawing: bool,
    interactions: Arc<dyn InteractionSink>,
}

impl ImageScene2D {
    /// An empty scene; call [`set_scene_shape`](Self::set_scene_shape)
    /// before painting.
    pub fn new(
        sources: StackedImageSources,
        slice: SliceCoord,
        settings: &SceneSettings,
        interactions: Arc<dyn InteractionSink>,
    ) -> Result<Self, ProviderError> {
        let data2scene = Transform::transposition();
        let scene2data = data2scene.transposed();
        let tiling = Tiling::new((0, 0), data2scene, settings.tile_edge);
        let provider = TileProvider::new(tiling, sources, slice, settings.worker_threads)?;
        let tiling = provider.tiling();
        let (brush_tx, brush_rx) = mpsc::channel();

        Ok(Self {
            data2scene,
            scene2data,
            scene_rect: RectF::default(),
            tile_edge: settings.tile_edge,
            brushing: TiledImageLayer::new(&tiling, Some(brush_tx.clone())),
            indicator: DirtyIndicator::new(Arc::clone(&tiling)),
            tiling,
            provider,
            brush_tx,
            brush_rx,
            show_tile_outlines: settings.show_tile_outlines,
            slicing_position_settled: true,
            drawing: false,
            interactions,
        })
    }

    /// Resize the scene (display coordinates, x right, y down). Rebuilds
    /// the tiling and drops all cached tiles and strokes.
    pub fn set_scene_shape(&mut self, shape: (u32, u32)) {
        self.scene_rect = RectF::new(0.0, 0.0, shape.0 as f32, shape.1 as f32);
        let r = self.scene2data.map_rect(self.scene_rect);
        let slice_shape = (r.width.round() as u32, r.height.round() as u32);

        self.provider
            .retile(Tiling::new(slice_shape, self.data2scene, self.tile_edge));
        self.tiling = self.provider.tiling();
        self.indicator = DirtyIndicator::new(Arc::clone(&self.tiling));
        self.brushing = TiledImageLayer::new(&self.tiling, Some(self.brush_tx.clone()));
        log::debug!(
            "Scene resized to {}x{} ({} tiles)",
            shape.0,
            shape.1,
            self.tiling.len()
        );
    }

    /// Scene shape for a slice of `slice_shape` data pixels.
    pub fn scene_shape_for(&self, slice_shape: (u32, u32)) -> (u32, u32) {
        let r = self.data2scene.map_rect(RectF::new(
            0.0,
            0.0,
            slice_shape.0 as f32,
            slice_shape.1 as f32,
        ));
        (r.width.round() as u32, r.height.round() as u32)
    }

    pub fn scene_rect(&self) -> RectF {
        self.scene_rect
    }

    pub fn tiling(&self) -> &Tiling {
        &self.tiling
    }

    pub fn provider(&self) -> &TileProvider {
        &self.provider
    }

    pub fn dirty_indicator(&self) -> &DirtyIndicator {
        &self.indicator
    }

    pub fn data2scene(&self) -> Transform {
        self.data2scene
    }

    pub fn slice(&self) -> SliceCoord {
        self.provider.slice()
    }

    /// Show another slice of the same axis.
    pub fn set_slice(&mut self, slice: SliceCoord) {
        let current = self.provider.slice();
        if current == slice {
            return;
        }
        self.interactions.record(InteractionEvent::SliceChanged {
            axis: slice.axis,
            delta: slice.index as i64 - current.index as i64,
        });
        self.provider.set_slice(slice);
    }

    /// Stroke in display coordinates, drawn into the tile containing `to`.
    pub fn draw_line(&mut self, from: PointF, to: PointF, pen: &Pen) -> Option<usize> {
        if !self.drawing {
            self.drawing = true;
            self.interactions.record(InteractionEvent::BeginDrawing {
                axis: self.slice().axis,
            });
        }
        self.brushing.draw_line(&self.tiling, from, to, pen)
    }

    /// Drop the strokes once they have been committed to the labels.
    pub fn end_drawing(&mut self) {
        if self.drawing {
            self.drawing = false;
            self.interactions.record(InteractionEvent::EndDrawing {
                axis: self.slice().axis,
            });
        }
        self.brushing.clear();
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Invalidate the tiles covering a data-space rectangle of this slice.
    pub fn invalidate_data_rect(&self, rect: &Rect) -> Vec<usize> {
        let scene = self.data2scene.map_rect(rect.to_rect_f());
        self.provider.notify_sources_changed(&scene)
    }

    pub fn invalidate_all(&self) {
        self.provider.notify_all_changed();
    }

    /// Paint the rendered slice within `rect` and record tile progress.
    pub fn draw_background(&mut self, surface: &mut dyn Surface, rect: &RectF) {
        for tile in self.provider.get_tiles(rect) {
            surface.draw_image(tile.rect, &tile.pixels);
            self.indicator.set_tile_progress(tile.id, tile.progress);
        }
    }

    /// Paint strokes not yet folded into the rendered slice.
    pub fn draw_foreground(&self, surface: &mut dyn Surface, rect: &RectF) {
        for id in self.brushing.stale_tiles(&self.tiling, rect) {
            if let Some(tile) = self.brushing.get(id) {
                tile.paint(surface);
            }
            if self.show_tile_outlines {
                if let Some(r) = self.tiling.rect_of(id) {
                    surface.stroke_rect(r, OUTLINE_COLOR);
                }
            }
        }
    }

    /// Background, dirty indicator and foreground in one pass.
    pub fn render(&mut self, surface: &mut dyn Surface, rect: &RectF) {
        self.draw_background(surface, rect);
        self.indicator.paint(surface);
        self.draw_foreground(surface, rect);
    }

    /// Union of the display areas that changed since the last call,
    /// clipped to the scene.
    pub fn poll_invalidated(&self) -> Option<RectF> {
        let changed = self
            .provider
            .take_changes()
            .into_iter()
            .chain(self.brush_rx.try_iter())
            .reduce(|a, b| a.united(&b))?;
        let clipped = changed.intersected(&self.scene_rect);
        (!clipped.is_empty()).then_some(clipped)
    }

    /// Hide the dirty indicator while the slice is being scrolled.
    pub fn indicate_slicing_position_settled(&mut self, settled: bool) {
        self.indicator.set_visible(settled);
        self.slicing_position_settled = settled;
    }

    pub fn slicing_position_settled(&self) -> bool {
        self.slicing_position_settled
    }

    pub fn set_show_tile_outlines(&mut self, show: bool) {
        self.show_tile_outlines = show;
    }

    pub fn show_tile_outlines(&self) -> bool {
        self.show_tile_outlines
    }

    /// Block until the provider has no queued work.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.provider.wait_for_idle(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{InteractionLog, NullSink};
    use crate::source::GrayscaleSource;
    use crate::surface::ImageSurface;
    use crate::volume::Volume;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn scene_over(volume: Volume, interactions: Arc<dyn InteractionSink>) -> ImageScene2D {
        let mut sources = StackedImageSources::new();
        sources.push(Arc::new(GrayscaleSource::new("raw", volume.into_shared())));
        let settings = SceneSettings {
            tile_edge: 16,
            worker_threads: 2,
            show_tile_outlines: true,
        };
        ImageScene2D::new(sources, SliceCoord::new(2, 0, 0, 0), &settings, interactions).unwrap()
    }

    fn gradient() -> Volume {
        // x extent 40, y extent 24
        let mut volume = Volume::zeros([1, 40, 24, 1, 1]);
        for x in 0..40 {
            for y in 0..24 {
                volume.array_mut()[[0, x, y, 0, 0]] = x as u8;
            }
        }
        volume
    }

    #[test]
    fn test_scene_shape_transposes_slice() {
        let mut scene = scene_over(gradient(), Arc::new(NullSink));
        let shape = scene.scene_shape_for((40, 24));
        assert_eq!(shape, (24, 40));
        scene.set_scene_shape(shape);
        assert_eq!(scene.tiling().slice_shape(), (40, 24));
        assert_eq!(scene.tiling().len(), 3 * 2);
    }

    #[test]
    fn test_render_shows_data_transposed() {
        let mut scene = scene_over(gradient(), Arc::new(NullSink));
        scene.set_scene_shape((24, 40));
        let rect = scene.scene_rect();
        let mut surface = ImageSurface::new(24, 40);
        scene.draw_background(&mut surface, &rect);
        assert!(scene.wait_for_idle(TIMEOUT));
        assert!(scene.poll_invalidated().is_some());

        let mut surface = ImageSurface::new(24, 40);
        scene.draw_background(&mut surface, &rect);
        assert_eq!(scene.dirty_indicator().unfinished(), 0);
        // Data x runs down the display.
        assert_eq!(surface.image().get_pixel(5, 33)[0], 33);
        assert_eq!(surface.image().get_pixel(20, 2)[0], 2);
    }

    #[test]
    fn test_strokes_show_until_drawing_ends() {
        let log = Arc::new(InteractionLog::new());
        let mut scene = scene_over(gradient(), log.clone());
        scene.set_scene_shape((24, 40));
        let pen = Pen::new(Rgba([0, 255, 0, 255]), 1.0);
        assert_eq!(
            scene.draw_line(PointF::new(1.5, 1.5), PointF::new(4.5, 1.5), &pen),
            Some(0)
        );
        assert!(scene.poll_invalidated().is_some());

        let mut surface = ImageSurface::new(24, 40);
        scene.draw_foreground(&mut surface, &scene.scene_rect());
        assert_eq!(*surface.image().get_pixel(3, 1), Rgba([0, 255, 0, 255]));

        scene.end_drawing();
        let mut surface = ImageSurface::new(24, 40);
        scene.draw_foreground(&mut surface, &scene.scene_rect());
        assert_eq!(surface.image().get_pixel(3, 1)[1], 0);
        assert_eq!(
            log.events(),
            vec![
                InteractionEvent::BeginDrawing { axis: 2 },
                InteractionEvent::EndDrawing { axis: 2 }
            ]
        );
    }

    #[test]
    fn test_draw_outside_scene_is_ignored() {
        let mut scene = scene_over(gradient(), Arc::new(NullSink));
        scene.set_scene_shape((24, 40));
        let pen = Pen::default();
        assert_eq!(
            scene.draw_line(PointF::new(0.0, 0.0), PointF::new(100.0, 100.0), &pen),
            None
        );
    }

    #[test]
    fn test_invalidate_data_rect_hits_transposed_tile() {
        let mut scene = scene_over(gradient(), Arc::new(NullSink));
        scene.set_scene_shape((24, 40));
        // Data x 20..30 at y 0..4 lands in display rows 20..30, columns 0..4.
        let hit = scene.invalidate_data_rect(&Rect::new(20, 0, 10, 4));
        let expected: Vec<usize> = scene
            .tiling()
            .indices_intersecting(&RectF::new(0.0, 20.0, 4.0, 10.0));
        assert_eq!(hit, expected);
    }

    #[test]
    fn test_settled_toggles_indicator() {
        let mut scene = scene_over(gradient(), Arc::new(NullSink));
        scene.indicate_slicing_position_settled(false);
        assert!(!scene.dirty_indicator().is_visible());
        assert!(!scene.slicing_position_settled());
        scene.indicate_slicing_position_settled(true);
        assert!(scene.dirty_indicator().is_visible());
    }

    #[test]
    fn test_slice_change_is_logged() {
        let log = Arc::new(InteractionLog::new());
        let mut scene = scene_over(gradient(), log.clone());
        scene.set_slice(SliceCoord::new(2, 0, 0, 0));
        assert!(log.is_empty());
        scene.set_slice(SliceCoord::new(2, 3, 0, 0));
        assert_eq!(
            log.events(),
            vec![InteractionEvent::SliceChanged { axis: 2, delta: 3 }]
        );
    }
}
