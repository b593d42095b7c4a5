//! Mapping between 2D slice planes and 5D volume regions.

use super::{CHANNEL, Region, TIME};
use crate::geometry::Rect;

/// Number of spatial axes a volume can be sliced along.
pub const SPATIAL_AXES: usize = 3;

/// Spatial axes spanning the plane of a slice along `axis`, in increasing
/// order. The first one is the plane's x, the second its y.
///
/// `axis` is a spatial axis: 0 = x, 1 = y, 2 = z.
pub fn plane_axes(axis: usize) -> (usize, usize) {
    match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}

/// Width and height of the slice plane along `axis` for a 5D volume shape.
pub fn plane_shape(axis: usize, volume: [usize; 5]) -> (u32, u32) {
    let (a, b) = plane_axes(axis);
    (volume[1 + a] as u32, volume[1 + b] as u32)
}

/// Which 2D slice a view displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SliceCoord {
    /// Spatial slicing axis (0 = x, 1 = y, 2 = z).
    pub axis: usize,
    /// Position along `axis`.
    pub index: usize,
    pub time: usize,
    pub channel: usize,
}

impl SliceCoord {
    pub fn new(axis: usize, index: usize, time: usize, channel: usize) -> Self {
        Self {
            axis,
            index,
            time,
            channel,
        }
    }

    /// Whether `axis` names a spatial axis.
    pub fn has_spatial_axis(&self) -> bool {
        self.axis < SPATIAL_AXES
    }

    /// 5D region behind a data-space rectangle of this slice, clipped to a
    /// volume of shape `volume`. `None` when nothing of it lies inside.
    pub fn region_for_rect(&self, rect: &Rect, volume: [usize; 5]) -> Option<Region> {
        if !self.has_spatial_axis() {
            return None;
        }
        let (a, b) = plane_axes(self.axis);
        let (pw, ph) = plane_shape(self.axis, volume);
        let clipped = rect.intersected(&Rect::new(0, 0, pw as i32, ph as i32));
        if clipped.is_empty()
            || self.time >= volume[TIME]
            || self.channel >= volume[CHANNEL]
            || self.index >= volume[1 + self.axis]
        {
            return None;
        }

        let mut offset = [0; 5];
        let mut shape = [1; 5];
        offset[TIME] = self.time;
        offset[CHANNEL] = self.channel;
        offset[1 + self.axis] = self.index;
        offset[1 + a] = clipped.x as usize;
        shape[1 + a] = clipped.width as usize;
        offset[1 + b] = clipped.y as usize;
        shape[1 + b] = clipped.height as usize;
        Some(Region::new(offset, shape))
    }

    /// Data-space rectangle where `region` crosses this slice, ignoring the
    /// channel. `None` when the region misses the slice.
    pub fn plane_rect_of(&self, region: &Region) -> Option<Rect> {
        if !self.has_spatial_axis() {
            return None;
        }
        let spans = |dim: usize, at: usize| region.offset[dim] <= at && at < region.end(dim);
        if region.is_empty() || !spans(TIME, self.time) || !spans(1 + self.axis, self.index) {
            return None;
        }
        let (a, b) = plane_axes(self.axis);
        Some(Rect::new(
            region.offset[1 + a] as i32,
            region.offset[1 + b] as i32,
            region.shape[1 + a] as i32,
            region.shape[1 + b] as i32,
        ))
    }
}

/// Current slice position per spatial axis.
pub trait SlicePosition {
    fn current_slice(&self, axis: usize) -> usize;

    fn set_slice(&mut self, axis: usize, value: usize);
}

/// Slice selectors for the three orthogonal views.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SliceSelectors {
    positions: [usize; 3],
    extents: [usize; 3],
}

impl SliceSelectors {
    /// Selectors for a volume, centred on every axis.
    pub fn for_shape(volume: [usize; 5]) -> Self {
        let extents = [volume[1], volume[2], volume[3]];
        Self {
            positions: extents.map(|e| e / 2),
            extents,
        }
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.extents.get(axis).copied().unwrap_or(0)
    }
}

impl SlicePosition for SliceSelectors {
    fn current_slice(&self, axis: usize) -> usize {
        self.positions.get(axis).copied().unwrap_or(0)
    }

    /// Clamped to the extent of the axis; unknown axes are ignored.
    fn set_slice(&mut self, axis: usize, value: usize) {
        let Some(extent) = self.extents.get(axis).copied() else {
            return;
        };
        self.positions[axis] = value.min(extent.saturating_sub(1));
    }
}
