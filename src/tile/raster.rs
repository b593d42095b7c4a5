//! Software rasterization helpers for tile pixels.

use image::{Rgba, RgbaImage};

use crate::geometry::{PointF, Rect, RectF, Transform};

/// Stroke settings for interactive painting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pen {
    pub color: Rgba<u8>,
    /// Stroke width in display pixels.
    pub width: f32,
}

impl Pen {
    pub fn new(color: Rgba<u8>, width: f32) -> Self {
        Self { color, width }
    }
}

impl Default for Pen {
    fn default() -> Self {
        Self::new(Rgba([255, 0, 0, 255]), 1.0)
    }
}

/// Fully transparent image of the given size.
pub fn blank(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]))
}

/// Pixel dimensions of a buffer backing a display rectangle.
pub fn pixel_size(rect: &RectF) -> (u32, u32) {
    (
        rect.width.ceil().max(0.0) as u32,
        rect.height.ceil().max(0.0) as u32,
    )
}

/// Draw a line segment in image-local coordinates.
///
/// The segment is clipped to the image grown by the pen radius before it
/// is stepped, so endpoints far outside the buffer cost nothing extra.
pub fn draw_line(image: &mut RgbaImage, from: PointF, to: PointF, pen: &Pen) {
    let radius = (pen.width / 2.0).max(0.5);
    let (w, h) = image.dimensions();
    let bounds = RectF::new(
        -radius,
        -radius,
        w as f32 + 2.0 * radius,
        h as f32 + 2.0 * radius,
    );
    let Some((from, to)) = clip_segment(from, to, &bounds) else {
        return;
    };

    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let cx = from.x + dx * t;
        let cy = from.y + dy * t;
        stamp_disc(image, cx, cy, radius, pen.color);
    }
}

/// Liang-Barsky clip of `from`-`to` against `bounds`. `None` when the
/// segment misses it or has a non-finite endpoint.
fn clip_segment(from: PointF, to: PointF, bounds: &RectF) -> Option<(PointF, PointF)> {
    if ![from.x, from.y, to.x, to.y].iter().all(|v| v.is_finite()) {
        return None;
    }
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    let edges = [
        (-dx, from.x - bounds.x),
        (dx, bounds.right() - from.x),
        (-dy, from.y - bounds.y),
        (dy, bounds.bottom() - from.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f32| PointF::new(from.x + dx * t, from.y + dy * t);
    Some((at(t0), at(t1)))
}

fn stamp_disc(image: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
    let (w, h) = image.dimensions();
    let x0 = (cx - radius).floor().max(0.0) as i64;
    let y0 = (cy - radius).floor().max(0.0) as i64;
    let x1 = ((cx + radius).ceil() as i64).min(w as i64 - 1);
    let y1 = ((cy + radius).ceil() as i64).min(h as i64 - 1);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let px = x as f32 + 0.5 - cx;
            let py = y as f32 + 0.5 - cy;
            if px * px + py * py <= radius * radius {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Blend `src` over `dst` with straight alpha, scaled by `opacity`.
///
/// Both images must have the same size; extra pixels of the larger one
/// are left alone.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    for (d, s) in dst.pixels_mut().zip(src.pixels()) {
        let sa = s[3] as f32 / 255.0 * opacity;
        if sa <= 0.0 {
            continue;
        }
        let da = d[3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        for c in 0..3 {
            let sc = s[c] as f32;
            let dc = d[c] as f32;
            let blended = (sc * sa + dc * da * (1.0 - sa)) / out_a;
            d[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
        d[3] = (out_a * 255.0).round() as u8;
    }
}

/// Resample a data-space patch into display orientation.
///
/// `patch` covers `data_rect`; the result covers `scene_rect`. Every
/// display pixel centre is mapped back through `scene2data` and takes the
/// data pixel it lands on.
pub fn to_display(
    patch: &RgbaImage,
    data_rect: &Rect,
    scene_rect: &RectF,
    scene2data: &Transform,
) -> RgbaImage {
    let (w, h) = pixel_size(scene_rect);
    let (pw, ph) = patch.dimensions();
    let mut out = blank(w, h);

    for (x, y, px) in out.enumerate_pixels_mut() {
        let p = PointF::new(scene_rect.x + x as f32 + 0.5, scene_rect.y + y as f32 + 0.5);
        let q = scene2data.map(p);
        let lx = (q.x - data_rect.x as f32).floor();
        let ly = (q.y - data_rect.y as f32).floor();
        if lx < 0.0 || ly < 0.0 || lx >= pw as f32 || ly >= ph as f32 {
            continue;
        }
        *px = *patch.get_pixel(lx as u32, ly as u32);
    }
    out
}
