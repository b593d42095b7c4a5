//! 5D volumes and sub-volume access.
//!
//! Arrays are indexed `[time, x, y, z, channel]`. The label volume and the
//! raw intensity volume share the same representation; workers read them
//! through a [`SharedVolume`] while the control thread writes.

mod slicing;
mod update;

use std::sync::{Arc, RwLock};

use ndarray::{Array5, Slice, Zip};
use thiserror::Error;

pub use slicing::{
    SPATIAL_AXES, SliceCoord, SlicePosition, SliceSelectors, plane_axes, plane_shape,
};
pub use update::VolumeUpdate;

/// Index of the time axis in a 5D shape.
pub const TIME: usize = 0;
/// Index of the channel axis in a 5D shape.
pub const CHANNEL: usize = 4;

/// Errors raised by sub-volume access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VolumeError {
    /// Requested region reaches past the volume
    #[error("region {offset:?}+{shape:?} outside volume of shape {volume:?}")]
    OutOfBounds {
        offset: [usize; 5],
        shape: [usize; 5],
        volume: [usize; 5],
    },

    /// Data and mask (or region) disagree in shape
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Slicing axis is not one of x, y, z
    #[error("axis {0} is not a spatial axis")]
    InvalidAxis(usize),
}

/// Axis-aligned box inside a 5D volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub offset: [usize; 5],
    pub shape: [usize; 5],
}

impl Region {
    pub fn new(offset: [usize; 5], shape: [usize; 5]) -> Self {
        Self { offset, shape }
    }

    pub fn end(&self, dim: usize) -> usize {
        self.offset[dim] + self.shape[dim]
    }

    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    /// Extent of the region along `dim`.
    pub fn slice(&self, dim: usize) -> Slice {
        Slice::from(self.offset[dim]..self.end(dim))
    }

    /// Check that the region lies inside a volume of shape `volume`.
    pub fn check_within(&self, volume: [usize; 5]) -> Result<(), VolumeError> {
        if (0..5).all(|d| self.end(d) <= volume[d]) {
            Ok(())
        } else {
            Err(VolumeError::OutOfBounds {
                offset: self.offset,
                shape: self.shape,
                volume,
            })
        }
    }
}

/// Read/write access to a label volume.
pub trait LabelStore {
    fn shape(&self) -> [usize; 5];

    /// Copy of the sub-volume at `offset` with extents `shape`.
    fn read_sub_volume(&self, offset: [usize; 5], shape: [usize; 5])
    -> Result<Array5<u8>, VolumeError>;

    /// Write `data` at `offset` wherever `mask` is set. Voxels outside the
    /// mask keep their value.
    fn write_sub_volume(
        &mut self,
        offset: [usize; 5],
        data: &Array5<u8>,
        mask: &Array5<bool>,
    ) -> Result<(), VolumeError>;
}

/// Dense in-memory 5D `u8` volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array5<u8>,
}

/// Volume shared between the control thread and tile workers.
pub type SharedVolume = Arc<RwLock<Volume>>;

impl Volume {
    pub fn zeros(shape: [usize; 5]) -> Self {
        Self {
            data: Array5::zeros(shape),
        }
    }

    pub fn from_array(data: Array5<u8>) -> Self {
        Self { data }
    }

    pub fn into_shared(self) -> SharedVolume {
        Arc::new(RwLock::new(self))
    }

    pub fn array(&self) -> &Array5<u8> {
        &self.data
    }

    pub fn array_mut(&mut self) -> &mut Array5<u8> {
        &mut self.data
    }

    pub fn get(&self, index: [usize; 5]) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Clear `label` and shift every larger label down by one. Label 0 is
    /// "unlabeled" and cannot be removed.
    pub fn remove_label(&mut self, label: u8) {
        if label == 0 {
            log::warn!("Refusing to remove label 0 from volume");
            return;
        }
        renumber_without(&mut self.data, label);
    }
}

impl LabelStore for Volume {
    fn shape(&self) -> [usize; 5] {
        let d = self.data.dim();
        [d.0, d.1, d.2, d.3, d.4]
    }

    fn read_sub_volume(
        &self,
        offset: [usize; 5],
        shape: [usize; 5],
    ) -> Result<Array5<u8>, VolumeError> {
        let region = Region::new(offset, shape);
        region.check_within(self.shape())?;
        let view = self.data.slice_each_axis(|ax| region.slice(ax.axis.index()));
        Ok(view.to_owned())
    }

    fn write_sub_volume(
        &mut self,
        offset: [usize; 5],
        data: &Array5<u8>,
        mask: &Array5<bool>,
    ) -> Result<(), VolumeError> {
        if data.shape() != mask.shape() {
            return Err(VolumeError::ShapeMismatch {
                expected: data.shape().to_vec(),
                found: mask.shape().to_vec(),
            });
        }
        let d = data.dim();
        let region = Region::new(offset, [d.0, d.1, d.2, d.3, d.4]);
        region.check_within(self.shape())?;
        let mut view = self
            .data
            .slice_each_axis_mut(|ax| region.slice(ax.axis.index()));
        Zip::from(&mut view)
            .and(data)
            .and(mask)
            .for_each(|voxel, &value, &masked| {
                if masked {
                    *voxel = value;
                }
            });
        Ok(())
    }
}

/// Clear `label` and decrement every larger value, closing the gap left in
/// a dense label numbering.
pub fn renumber_without(array: &mut Array5<u8>, label: u8) {
    array.mapv_inplace(|v| {
        if v == label {
            0
        } else if v > label {
            v - 1
        } else {
            v
        }
    });
}
