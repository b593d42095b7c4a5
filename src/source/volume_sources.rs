//! Image sources reading slices out of in-memory volumes.

use std::sync::PoisonError;

use image::{Rgba, RgbaImage};
use ndarray::Array5;

use super::{FetchError, ImageSource, SourcePatch};
use crate::geometry::Rect;
use crate::volume::{LabelStore, Region, SharedVolume, SliceCoord, plane_axes};

/// Copy the plane of `sub` (read at `region`) into a patch covering `rect`,
/// converting each voxel with `color`.
fn rasterize(
    rect: &Rect,
    region: &Region,
    slice: &SliceCoord,
    sub: &Array5<u8>,
    color: impl Fn(u8) -> Rgba<u8>,
) -> RgbaImage {
    let (a, b) = plane_axes(slice.axis);
    let mut pixels = RgbaImage::new(rect.width.max(0) as u32, rect.height.max(0) as u32);
    let dx = region.offset[1 + a] as i32 - rect.x;
    let dy = region.offset[1 + b] as i32 - rect.y;

    for u in 0..region.shape[1 + a] {
        for v in 0..region.shape[1 + b] {
            let mut index = [0usize; 5];
            index[1 + a] = u;
            index[1 + b] = v;
            let px = color(sub[index]);
            pixels.put_pixel(u as u32 + dx as u32, v as u32 + dy as u32, px);
        }
    }
    pixels
}

fn fetch_plane(
    volume: &SharedVolume,
    rect: &Rect,
    slice: &SliceCoord,
    color: impl Fn(u8) -> Rgba<u8>,
) -> Result<SourcePatch, FetchError> {
    let guard = volume.read().unwrap_or_else(PoisonError::into_inner);
    let Some(region) = slice.region_for_rect(rect, guard.shape()) else {
        return Ok(SourcePatch::invalid(
            rect.width.max(0) as u32,
            rect.height.max(0) as u32,
        ));
    };
    let sub = guard.read_sub_volume(region.offset, region.shape)?;
    drop(guard);
    Ok(SourcePatch::valid(rasterize(rect, &region, slice, &sub, color)))
}

/// Raw intensities of one channel as opaque gray pixels.
pub struct GrayscaleSource {
    name: String,
    volume: SharedVolume,
}

impl GrayscaleSource {
    pub fn new(name: impl Into<String>, volume: SharedVolume) -> Self {
        Self {
            name: name.into(),
            volume,
        }
    }
}

impl ImageSource for GrayscaleSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, rect: Rect, slice: &SliceCoord) -> Result<SourcePatch, FetchError> {
        fetch_plane(&self.volume, &rect, slice, |v| Rgba([v, v, v, 255]))
    }
}

/// Colors for label values. Label 0 is always transparent.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    colors: Vec<Rgba<u8>>,
}

impl ColorTable {
    pub fn new(colors: Vec<Rgba<u8>>) -> Self {
        Self { colors }
    }

    pub fn color(&self, label: u8) -> Rgba<u8> {
        if label == 0 || self.colors.is_empty() {
            return Rgba([0, 0, 0, 0]);
        }
        self.colors[(label as usize - 1) % self.colors.len()]
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::new(vec![
            Rgba([255, 0, 0, 255]),
            Rgba([0, 255, 0, 255]),
            Rgba([255, 255, 0, 255]),
            Rgba([0, 0, 255, 255]),
            Rgba([255, 0, 255, 255]),
            Rgba([0, 255, 255, 255]),
            Rgba([255, 128, 0, 255]),
            Rgba([128, 0, 255, 255]),
        ])
    }
}

/// Label volume through a color table.
pub struct LabelSource {
    name: String,
    volume: SharedVolume,
    colors: ColorTable,
}

impl LabelSource {
    pub fn new(name: impl Into<String>, volume: SharedVolume, colors: ColorTable) -> Self {
        Self {
            name: name.into(),
            volume,
            colors,
        }
    }
}

impl ImageSource for LabelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, rect: Rect, slice: &SliceCoord) -> Result<SourcePatch, FetchError> {
        // Labels have a single channel whatever the raw data shows.
        let slice = SliceCoord {
            channel: 0,
            ..*slice
        };
        fetch_plane(&self.volume, &rect, &slice, |v| self.colors.color(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    fn ramp_volume() -> SharedVolume {
        let mut volume = Volume::zeros([1, 4, 3, 2, 1]);
        for x in 0..4 {
            for y in 0..3 {
                volume.array_mut()[[0, x, y, 1, 0]] = (x * 10 + y) as u8;
            }
        }
        volume.into_shared()
    }

    #[test]
    fn test_grayscale_z_slice() {
        let source = GrayscaleSource::new("raw", ramp_volume());
        let slice = SliceCoord::new(2, 1, 0, 0);
        let patch = source.fetch(Rect::new(0, 0, 4, 3), &slice).unwrap();
        assert!(patch.valid);
        assert_eq!(patch.pixels.dimensions(), (4, 3));
        assert_eq!(*patch.pixels.get_pixel(3, 2), Rgba([32, 32, 32, 255]));
    }

    #[test]
    fn test_partially_outside_rect_is_padded() {
        let source = GrayscaleSource::new("raw", ramp_volume());
        let slice = SliceCoord::new(2, 1, 0, 0);
        let patch = source.fetch(Rect::new(2, 0, 4, 4), &slice).unwrap();
        assert_eq!(patch.pixels.dimensions(), (4, 4));
        assert_eq!(*patch.pixels.get_pixel(0, 1), Rgba([21, 21, 21, 255]));
        assert_eq!(patch.pixels.get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn test_rect_outside_is_invalid() {
        let source = GrayscaleSource::new("raw", ramp_volume());
        let slice = SliceCoord::new(2, 1, 0, 0);
        let patch = source.fetch(Rect::new(10, 10, 4, 4), &slice).unwrap();
        assert!(!patch.valid);
    }

    #[test]
    fn test_label_colors() {
        let volume = ramp_volume();
        let colors = ColorTable::new(vec![Rgba([1, 1, 1, 255]), Rgba([2, 2, 2, 255])]);
        let source = LabelSource::new("labels", volume, colors.clone());
        let patch = source
            .fetch(Rect::new(0, 0, 1, 3), &SliceCoord::new(2, 1, 0, 0))
            .unwrap();
        // (0,0) is label 0, (0,1) label 1, (0,2) label 2
        assert_eq!(patch.pixels.get_pixel(0, 0)[3], 0);
        assert_eq!(*patch.pixels.get_pixel(0, 1), Rgba([1, 1, 1, 255]));
        assert_eq!(*patch.pixels.get_pixel(0, 2), Rgba([2, 2, 2, 255]));
        assert_eq!(colors.color(3), Rgba([1, 1, 1, 255]));
    }
}
