//! Control-thread façade for label editing.
//!
//! `VolumeEditor` owns the label volume handle, the slice selectors, the
//! history and the scenes showing the volume. Every label mutation goes
//! through it so the affected tiles are invalidated right after the write.

use std::io::{Read, Seek, Write};
use std::sync::{Arc, PoisonError};

use ndarray::Array5;

use crate::history::{EditTarget, HistoryManager, LabelEdit, PersistError};
use crate::interaction::{InteractionEvent, InteractionSink};
use crate::scene::ImageScene2D;
use crate::volume::{
    LabelStore, Region, SharedVolume, SliceCoord, SlicePosition, SliceSelectors, VolumeError,
    VolumeUpdate,
};

/// Invalidate the tiles of every scene whose slice crosses `region`.
fn invalidate_region(scenes: &[ImageScene2D], region: &Region) {
    for scene in scenes {
        if let Some(rect) = scene.slice().plane_rect_of(region) {
            scene.invalidate_data_rect(&rect);
        }
    }
}

/// Borrowed view of the editor used while restoring history entries.
struct EditorTarget<'a> {
    labels: &'a SharedVolume,
    selectors: &'a mut SliceSelectors,
    scenes: &'a [ImageScene2D],
}

impl EditTarget for EditorTarget<'_> {
    fn read_labels(&self, region: &Region) -> Result<Array5<u8>, VolumeError> {
        let guard = self.labels.read().unwrap_or_else(PoisonError::into_inner);
        guard.read_sub_volume(region.offset, region.shape)
    }

    fn write_labels(&mut self, update: &VolumeUpdate) -> Result<(), VolumeError> {
        {
            let mut guard = self.labels.write().unwrap_or_else(PoisonError::into_inner);
            update.apply_to(&mut *guard)?;
        }
        invalidate_region(self.scenes, &update.region());
        Ok(())
    }

    fn slice_position(&mut self) -> &mut dyn SlicePosition {
        &mut *self.selectors
    }
}

pub struct VolumeEditor {
    labels: SharedVolume,
    selectors: SliceSelectors,
    history: HistoryManager,
    scenes: Vec<ImageScene2D>,
    interactions: Arc<dyn InteractionSink>,
}

impl VolumeEditor {
    pub fn new(
        labels: SharedVolume,
        history_size: usize,
        interactions: Arc<dyn InteractionSink>,
    ) -> Self {
        let shape = labels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .shape();
        Self {
            labels,
            selectors: SliceSelectors::for_shape(shape),
            history: HistoryManager::new(history_size),
            scenes: Vec::new(),
            interactions,
        }
    }

    /// Take ownership of a scene and move it to the selected slice of its
    /// axis. Returns its index.
    pub fn add_scene(&mut self, scene: ImageScene2D) -> usize {
        self.scenes.push(scene);
        self.sync_scenes();
        self.scenes.len() - 1
    }

    pub fn scenes(&self) -> &[ImageScene2D] {
        &self.scenes
    }

    pub fn scene_mut(&mut self, index: usize) -> Option<&mut ImageScene2D> {
        self.scenes.get_mut(index)
    }

    pub fn labels(&self) -> &SharedVolume {
        &self.labels
    }

    pub fn selectors(&self) -> &SliceSelectors {
        &self.selectors
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Move the selector of `axis` and the scenes slicing along it.
    pub fn set_slice(&mut self, axis: usize, index: usize) {
        self.selectors.set_slice(axis, index);
        self.sync_scenes();
    }

    fn sync_scenes(&mut self) {
        for scene in &mut self.scenes {
            let slice = scene.slice();
            let index = self.selectors.current_slice(slice.axis);
            if index != slice.index {
                scene.set_slice(SliceCoord { index, ..slice });
            }
        }
    }

    fn target(&mut self) -> EditorTarget<'_> {
        EditorTarget {
            labels: &self.labels,
            selectors: &mut self.selectors,
            scenes: &self.scenes,
        }
    }

    /// Apply a stroke made on slice `slice` of `axis` and record it.
    ///
    /// Strokes still shown by the scenes of that axis are dropped, since
    /// the rendered labels now carry them.
    pub fn paint(
        &mut self,
        update: &VolumeUpdate,
        axis: usize,
        slice: usize,
        label: u8,
    ) -> Result<(), VolumeError> {
        let mut target = self.target();
        let edit = LabelEdit::capture(&target, update, axis, slice, label)?;
        target.write_labels(update)?;
        self.history.append(edit);

        for scene in self.scenes.iter_mut().filter(|s| s.slice().axis == axis) {
            scene.end_drawing();
        }
        log::debug!(
            "{} label {} at {:?} (axis {}, slice {})",
            if update.erasing { "Erased" } else { "Painted" },
            label,
            update.offset,
            axis,
            slice
        );
        Ok(())
    }

    pub fn undo(&mut self) -> Result<bool, VolumeError> {
        self.interactions.record(InteractionEvent::Undo);
        let mut target = EditorTarget {
            labels: &self.labels,
            selectors: &mut self.selectors,
            scenes: &self.scenes,
        };
        let undone = self.history.undo(&mut target)?;
        self.sync_scenes();
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool, VolumeError> {
        self.interactions.record(InteractionEvent::Redo);
        let mut target = EditorTarget {
            labels: &self.labels,
            selectors: &mut self.selectors,
            scenes: &self.scenes,
        };
        let redone = self.history.redo(&mut target)?;
        self.sync_scenes();
        Ok(redone)
    }

    /// Delete `label` from the volume and the history, renumbering larger
    /// labels down by one. Must not run while a stroke is being committed.
    pub fn remove_label(&mut self, label: u8) {
        if label == 0 {
            log::warn!("Label 0 marks unlabeled voxels and cannot be removed");
            return;
        }
        self.interactions
            .record(InteractionEvent::LabelRemoved { label });
        self.labels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_label(label);
        self.history.remove_label(label);
        for scene in &self.scenes {
            scene.invalidate_all();
        }
        log::info!("Removed label {}", label);
    }

    pub fn clear_history(&mut self) {
        self.interactions.record(InteractionEvent::HistoryCleared);
        self.history.clear();
    }

    pub fn save_history<W: Write + Seek>(&self, writer: W, group: &str) -> Result<W, PersistError> {
        self.history.save_to_zip(writer, group)
    }

    /// Replace the history with one read from an archive.
    pub fn load_history<R: Read + Seek>(&mut self, reader: R, group: &str) -> Result<(), PersistError> {
        let max_size = self.history.max_size();
        self.history = HistoryManager::load_from_zip(reader, group, max_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionLog;
    use crate::scene::SceneSettings;
    use crate::source::{ColorTable, LabelSource, StackedImageSources};
    use crate::surface::ImageSurface;
    use crate::volume::Volume;
    use image::Rgba;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn editor_with_scene(log: Arc<InteractionLog>) -> VolumeEditor {
        let labels = Volume::zeros([1, 16, 16, 8, 1]).into_shared();
        let mut editor = VolumeEditor::new(labels.clone(), 100, log.clone());

        let mut sources = StackedImageSources::new();
        sources.push(Arc::new(LabelSource::new(
            "labels",
            labels,
            ColorTable::default(),
        )));
        let settings = SceneSettings {
            tile_edge: 8,
            worker_threads: 2,
            show_tile_outlines: false,
        };
        let mut scene =
            ImageScene2D::new(sources, SliceCoord::new(2, 0, 0, 0), &settings, log).unwrap();
        scene.set_scene_shape(scene.scene_shape_for((16, 16)));
        editor.add_scene(scene);
        editor
    }

    /// 2x2 patch of `label` at x, y = 3..5 on z = `z`.
    fn square(z: usize, label: u8) -> VolumeUpdate {
        let mut data = Array5::<u8>::zeros([1, 2, 2, 1, 1]);
        data.fill(label);
        VolumeUpdate::new([0, 3, 3, z, 0], data, false)
    }

    fn render(editor: &mut VolumeEditor) -> ImageSurface {
        let scene = editor.scene_mut(0).unwrap();
        let rect = scene.scene_rect();
        let mut surface = ImageSurface::new(16, 16);
        scene.draw_background(&mut surface, &rect);
        assert!(scene.wait_for_idle(TIMEOUT));
        let mut surface = ImageSurface::new(16, 16);
        scene.draw_background(&mut surface, &rect);
        surface
    }

    #[test]
    fn test_scene_follows_selector() {
        let editor = editor_with_scene(Arc::new(InteractionLog::new()));
        assert_eq!(editor.selectors().current_slice(2), 4);
        assert_eq!(editor.scenes()[0].slice().index, 4);
    }

    #[test]
    fn test_paint_shows_up_in_scene() {
        let mut editor = editor_with_scene(Arc::new(InteractionLog::new()));
        render(&mut editor);
        editor.paint(&square(4, 1), 2, 4, 1).unwrap();

        let surface = render(&mut editor);
        // Display is transposed: data (x=3, y=4) sits at column 4, row 3.
        assert_eq!(*surface.image().get_pixel(4, 3), Rgba([255, 0, 0, 255]));
        assert_eq!(*surface.image().get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(editor.history().len(), 1);
    }

    #[test]
    fn test_undo_restores_volume_and_slice() {
        let log = Arc::new(InteractionLog::new());
        let mut editor = editor_with_scene(log.clone());
        editor.paint(&square(6, 2), 2, 6, 2).unwrap();
        editor.set_slice(2, 1);

        assert!(editor.undo().unwrap());
        assert_eq!(editor.selectors().current_slice(2), 6);
        assert_eq!(editor.scenes()[0].slice().index, 6);
        assert!(
            editor
                .labels()
                .read()
                .unwrap()
                .array()
                .iter()
                .all(|&v| v == 0)
        );

        assert!(editor.redo().unwrap());
        assert_eq!(editor.labels().read().unwrap().get([0, 4, 4, 6, 0]), Some(2));
        assert!(!editor.redo().unwrap());
        assert!(log.events().contains(&InteractionEvent::Undo));
    }

    #[test]
    fn test_undo_invalidates_tiles() {
        let mut editor = editor_with_scene(Arc::new(InteractionLog::new()));
        editor.paint(&square(4, 1), 2, 4, 1).unwrap();
        render(&mut editor);
        editor.undo().unwrap();
        let surface = render(&mut editor);
        assert_eq!(*surface.image().get_pixel(4, 3), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_remove_label_renumbers_volume_and_history() {
        let mut editor = editor_with_scene(Arc::new(InteractionLog::new()));
        editor.paint(&square(0, 1), 2, 0, 1).unwrap();
        editor.paint(&square(1, 2), 2, 1, 2).unwrap();
        editor.paint(&square(2, 3), 2, 2, 3).unwrap();

        editor.remove_label(2);
        let labels: Vec<u8> = editor
            .history()
            .entries()
            .iter()
            .map(|e| e.label_number)
            .collect();
        assert_eq!(labels, vec![1, 2]);
        let volume = editor.labels().read().unwrap();
        assert_eq!(volume.get([0, 3, 3, 1, 0]), Some(0));
        assert_eq!(volume.get([0, 3, 3, 2, 0]), Some(2));
    }

    #[test]
    fn test_remove_label_zero_keeps_labels() {
        let log = Arc::new(InteractionLog::new());
        let mut editor = editor_with_scene(log.clone());
        editor.paint(&square(0, 1), 2, 0, 1).unwrap();
        editor.paint(&square(1, 2), 2, 1, 2).unwrap();

        editor.remove_label(0);
        assert_eq!(editor.history().len(), 2);
        let volume = editor.labels().read().unwrap();
        assert_eq!(volume.get([0, 3, 3, 0, 0]), Some(1));
        assert_eq!(volume.get([0, 3, 3, 1, 0]), Some(2));
        assert!(
            !log.events()
                .iter()
                .any(|e| matches!(e, InteractionEvent::LabelRemoved { .. }))
        );
    }

    #[test]
    fn test_paint_on_non_spatial_axis_is_rejected() {
        let mut editor = editor_with_scene(Arc::new(InteractionLog::new()));
        let err = editor.paint(&square(0, 1), 4, 0, 1).unwrap_err();
        assert_eq!(err, VolumeError::InvalidAxis(4));
        assert!(editor.history().is_empty());
        assert_eq!(editor.labels().read().unwrap().get([0, 3, 3, 0, 0]), Some(0));
    }

    #[test]
    fn test_clear_history() {
        let log = Arc::new(InteractionLog::new());
        let mut editor = editor_with_scene(log.clone());
        editor.paint(&square(0, 1), 2, 0, 1).unwrap();
        editor.clear_history();
        assert!(editor.history().is_empty());
        assert!(!editor.undo().unwrap());
        assert!(log.events().contains(&InteractionEvent::HistoryCleared));
    }

    #[test]
    fn test_history_survives_save_and_load() {
        let mut editor = editor_with_scene(Arc::new(InteractionLog::new()));
        editor.paint(&square(3, 1), 2, 3, 1).unwrap();
        let bytes = editor
            .save_history(std::io::Cursor::new(Vec::new()), "_history")
            .unwrap()
            .into_inner();
        editor.clear_history();
        editor
            .load_history(std::io::Cursor::new(bytes), "_history")
            .unwrap();
        assert!(editor.undo().unwrap());
        assert_eq!(editor.labels().read().unwrap().get([0, 3, 3, 3, 0]), Some(0));
    }

    #[test]
    fn test_out_of_bounds_paint_is_rejected() {
        let mut editor = editor_with_scene(Arc::new(InteractionLog::new()));
        let mut data = Array5::<u8>::zeros([1, 2, 2, 1, 1]);
        data.fill(1);
        let update = VolumeUpdate::new([0, 15, 15, 0, 0], data, false);
        assert!(editor.paint(&update, 2, 0, 1).is_err());
        assert!(editor.history().is_empty());
    }
}
