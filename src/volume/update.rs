//! Masked rectangular writes into a label volume.

use ndarray::Array5;

use super::{LabelStore, Region, VolumeError};

/// One rectangular sub-volume write.
///
/// Only voxels where `data > 0` are touched: painting copies the patch
/// value there, erasing sets them to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeUpdate {
    pub offset: [usize; 5],
    pub data: Array5<u8>,
    pub erasing: bool,
}

impl VolumeUpdate {
    pub fn new(offset: [usize; 5], data: Array5<u8>, erasing: bool) -> Self {
        Self {
            offset,
            data,
            erasing,
        }
    }

    pub fn size(&self) -> [usize; 5] {
        let d = self.data.dim();
        [d.0, d.1, d.2, d.3, d.4]
    }

    pub fn region(&self) -> Region {
        Region::new(self.offset, self.size())
    }

    pub fn mask(&self) -> Array5<bool> {
        self.data.mapv(|v| v > 0)
    }

    pub fn apply_to(&self, target: &mut dyn LabelStore) -> Result<(), VolumeError> {
        let mask = self.mask();
        if self.erasing {
            let zeros = Array5::<u8>::zeros(self.data.raw_dim());
            target.write_sub_volume(self.offset, &zeros, &mask)
        } else {
            target.write_sub_volume(self.offset, &self.data, &mask)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    fn volume_with(value: u8) -> Volume {
        let mut volume = Volume::zeros([1, 4, 4, 1, 1]);
        volume.array_mut().fill(value);
        volume
    }

    fn patch() -> Array5<u8> {
        let mut data = Array5::<u8>::zeros([1, 2, 2, 1, 1]);
        data[[0, 0, 0, 0, 0]] = 5;
        data[[0, 1, 1, 0, 0]] = 6;
        data
    }

    #[test]
    fn test_paint_writes_positive_only() {
        let mut volume = volume_with(1);
        VolumeUpdate::new([0, 1, 1, 0, 0], patch(), false)
            .apply_to(&mut volume)
            .unwrap();
        assert_eq!(volume.get([0, 1, 1, 0, 0]), Some(5));
        assert_eq!(volume.get([0, 2, 2, 0, 0]), Some(6));
        assert_eq!(volume.get([0, 2, 1, 0, 0]), Some(1));
        assert_eq!(volume.get([0, 1, 2, 0, 0]), Some(1));
        assert_eq!(volume.get([0, 0, 0, 0, 0]), Some(1));
    }

    #[test]
    fn test_erase_clears_positive_only() {
        let mut volume = volume_with(4);
        VolumeUpdate::new([0, 1, 1, 0, 0], patch(), true)
            .apply_to(&mut volume)
            .unwrap();
        assert_eq!(volume.get([0, 1, 1, 0, 0]), Some(0));
        assert_eq!(volume.get([0, 2, 2, 0, 0]), Some(0));
        assert_eq!(volume.get([0, 2, 1, 0, 0]), Some(4));
        assert_eq!(volume.get([0, 3, 3, 0, 0]), Some(4));
    }

    #[test]
    fn test_out_of_bounds_update_fails() {
        let mut volume = volume_with(0);
        let result = VolumeUpdate::new([0, 3, 3, 0, 0], patch(), false).apply_to(&mut volume);
        assert!(result.is_err());
        assert!(volume.array().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_region_and_size() {
        let update = VolumeUpdate::new([0, 1, 2, 0, 0], patch(), false);
        assert_eq!(update.size(), [1, 2, 2, 1, 1]);
        assert_eq!(update.region().end(2), 4);
    }
}
