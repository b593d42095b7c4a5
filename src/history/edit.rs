//! A single reversible label edit.

use ndarray::{Array5, Zip};

use crate::interaction::now_seconds;
use crate::volume::{
    LabelStore, Region, SPATIAL_AXES, SlicePosition, VolumeError, VolumeUpdate, renumber_without,
};

/// What an edit needs to undo or redo itself.
pub trait EditTarget {
    /// Current labels inside `region`.
    fn read_labels(&self, region: &Region) -> Result<Array5<u8>, VolumeError>;

    /// Apply a masked write to the labels and make sure views pick it up.
    fn write_labels(&mut self, update: &VolumeUpdate) -> Result<(), VolumeError>;

    fn slice_position(&mut self) -> &mut dyn SlicePosition;
}

/// Labels and slice selectors held directly, without any view to notify.
pub struct DirectTarget<'a> {
    pub labels: &'a mut dyn LabelStore,
    pub slices: &'a mut dyn SlicePosition,
}

impl EditTarget for DirectTarget<'_> {
    fn read_labels(&self, region: &Region) -> Result<Array5<u8>, VolumeError> {
        self.labels.read_sub_volume(region.offset, region.shape)
    }

    fn write_labels(&mut self, update: &VolumeUpdate) -> Result<(), VolumeError> {
        update.apply_to(&mut *self.labels)
    }

    fn slice_position(&mut self) -> &mut dyn SlicePosition {
        &mut *self.slices
    }
}

/// One painted (or erased) sub-volume, with the labels it replaced.
///
/// Restoring an edit swaps the labels under its mask with the stored
/// ones, so the same call serves for undo and redo.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEdit {
    /// Slicing axis the edit was made on
    pub axis: usize,
    /// Slice index along `axis`
    pub slice: usize,
    pub time: usize,
    /// 5D offset of the patch
    pub offset: [usize; 5],
    /// Written values; voxels > 0 form the mask
    pub labels: Array5<u8>,
    /// Labels under the patch before the last application
    pub before: Array5<u8>,
    pub erasing: bool,
    pub label_number: u8,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl LabelEdit {
    /// Snapshot what `update` is about to overwrite. Call before applying it.
    pub fn capture(
        target: &dyn EditTarget,
        update: &VolumeUpdate,
        axis: usize,
        slice: usize,
        label_number: u8,
    ) -> Result<Self, VolumeError> {
        if axis >= SPATIAL_AXES {
            return Err(VolumeError::InvalidAxis(axis));
        }
        let before = target.read_labels(&update.region())?;
        Ok(Self {
            axis,
            slice,
            time: update.offset[crate::volume::TIME],
            offset: update.offset,
            labels: update.data.clone(),
            before,
            erasing: update.erasing,
            label_number,
            timestamp: now_seconds(),
        })
    }

    pub fn shape(&self) -> [usize; 5] {
        let d = self.labels.dim();
        [d.0, d.1, d.2, d.3, d.4]
    }

    pub fn region(&self) -> Region {
        Region::new(self.offset, self.shape())
    }

    /// Put the stored labels back under the mask and keep the replaced
    /// ones for the opposite direction. Moves the slice selector to the
    /// edit's slice if it shows another one.
    pub fn restore(&mut self, target: &mut dyn EditTarget) -> Result<(), VolumeError> {
        let region = self.region();
        let current = target.read_labels(&region)?;

        let paint = Zip::from(&self.labels)
            .and(&self.before)
            .map_collect(|&l, &b| if l > 0 { b } else { 0 });
        let erase = Zip::from(&self.labels)
            .and(&self.before)
            .map_collect(|&l, &b| u8::from(l > 0 && b == 0));

        target.write_labels(&VolumeUpdate::new(self.offset, paint, false))?;
        target.write_labels(&VolumeUpdate::new(self.offset, erase, true))?;
        self.before = current;

        let slices = target.slice_position();
        if slices.current_slice(self.axis) != self.slice {
            slices.set_slice(self.axis, self.slice);
        }
        self.erasing = !self.erasing;
        Ok(())
    }

    /// Clear `label` from the stored arrays and close the numbering gap.
    pub fn renumber_without(&mut self, label: u8) {
        renumber_without(&mut self.labels, label);
        renumber_without(&mut self.before, label);
    }
}
