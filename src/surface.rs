//! Drawing surface abstraction used by the scene.
//!
//! The core never talks to a windowing toolkit. Display layers implement
//! [`Surface`] on top of whatever they render with; [`ImageSurface`] is the
//! software implementation used by the headless binary and the tests.

use image::{Rgba, RgbaImage};

use crate::geometry::{PointF, RectF};

/// Target that scene items paint onto, in display coordinates.
pub trait Surface {
    /// Draw `image` stretched into `target`.
    fn draw_image(&mut self, target: RectF, image: &RgbaImage);

    /// One pixel wide rectangle outline.
    fn stroke_rect(&mut self, rect: RectF, color: Rgba<u8>);

    /// Filled pie slice inscribed in `rect`, angles in degrees
    /// counter-clockwise from the positive x axis.
    fn fill_pie(&mut self, rect: RectF, start_deg: f32, span_deg: f32, color: Rgba<u8>);
}

/// Something that knows its extent and how to paint itself.
pub trait Drawable {
    fn bounding_rect(&self) -> RectF;

    fn paint(&self, surface: &mut dyn Surface);
}

/// Software surface backed by an RGBA image. Display pixel `(x, y)` maps to
/// image pixel `(x, y)`.
#[derive(Debug, Clone)]
pub struct ImageSurface {
    image: RgbaImage,
    /// Opacity applied to everything painted while it is set.
    opacity: f32,
}

impl ImageSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
            opacity: 1.0,
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        let (w, h) = self.image.dimensions();
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            return;
        }
        let a = color[3] as f32 / 255.0 * self.opacity;
        if a <= 0.0 {
            return;
        }
        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            let blended = color[c] as f32 * a + dst[c] as f32 * (1.0 - a);
            dst[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
        let out_a = a + dst[3] as f32 / 255.0 * (1.0 - a);
        dst[3] = (out_a * 255.0).round() as u8;
    }
}

impl Surface for ImageSurface {
    fn draw_image(&mut self, target: RectF, image: &RgbaImage) {
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 || target.is_empty() {
            return;
        }
        let x0 = target.x.floor() as i64;
        let y0 = target.y.floor() as i64;
        let x1 = target.right().ceil() as i64;
        let y1 = target.bottom().ceil() as i64;
        for y in y0..y1 {
            for x in x0..x1 {
                let u = ((x as f32 + 0.5 - target.x) / target.width * iw as f32).floor();
                let v = ((y as f32 + 0.5 - target.y) / target.height * ih as f32).floor();
                if u < 0.0 || v < 0.0 || u >= iw as f32 || v >= ih as f32 {
                    continue;
                }
                let px = *image.get_pixel(u as u32, v as u32);
                self.blend(x, y, px);
            }
        }
    }

    fn stroke_rect(&mut self, rect: RectF, color: Rgba<u8>) {
        let x0 = rect.x.floor() as i64;
        let y0 = rect.y.floor() as i64;
        let x1 = rect.right().ceil() as i64 - 1;
        let y1 = rect.bottom().ceil() as i64 - 1;
        for x in x0..=x1 {
            self.blend(x, y0, color);
            self.blend(x, y1, color);
        }
        for y in (y0 + 1)..y1 {
            self.blend(x0, y, color);
            self.blend(x1, y, color);
        }
    }

    fn fill_pie(&mut self, rect: RectF, start_deg: f32, span_deg: f32, color: Rgba<u8>) {
        if span_deg <= 0.0 || rect.is_empty() {
            return;
        }
        let c = rect.center();
        let rx = rect.width / 2.0;
        let ry = rect.height / 2.0;
        let x0 = rect.x.floor() as i64;
        let y0 = rect.y.floor() as i64;
        let x1 = rect.right().ceil() as i64;
        let y1 = rect.bottom().ceil() as i64;
        for y in y0..y1 {
            for x in x0..x1 {
                let p = PointF::new(x as f32 + 0.5, y as f32 + 0.5) - c;
                let nx = p.x / rx;
                let ny = p.y / ry;
                if nx * nx + ny * ny > 1.0 {
                    continue;
                }
                // Screen y points down, angles grow counter-clockwise.
                let angle = (-ny).atan2(nx).to_degrees().rem_euclid(360.0);
                let rel = (angle - start_deg).rem_euclid(360.0);
                if span_deg >= 360.0 || rel <= span_deg {
                    self.blend(x, y, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_image_scales() {
        let mut surface = ImageSurface::new(4, 4);
        let img = RgbaImage::from_pixel(1, 1, Rgba([50, 60, 70, 255]));
        surface.draw_image(RectF::new(0.0, 0.0, 2.0, 2.0), &img);
        assert_eq!(*surface.image().get_pixel(1, 1), Rgba([50, 60, 70, 255]));
        assert_eq!(*surface.image().get_pixel(2, 2), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_transparent_pixels_leave_background() {
        let mut surface = ImageSurface::new(2, 2);
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 0]));
        surface.draw_image(RectF::new(0.0, 0.0, 2.0, 2.0), &img);
        assert_eq!(*surface.image().get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_stroke_rect_outline_only() {
        let mut surface = ImageSurface::new(5, 5);
        let white = Rgba([255, 255, 255, 255]);
        surface.stroke_rect(RectF::new(0.0, 0.0, 5.0, 5.0), white);
        assert_eq!(*surface.image().get_pixel(0, 0), white);
        assert_eq!(*surface.image().get_pixel(4, 2), white);
        assert_eq!(*surface.image().get_pixel(2, 2), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_half_pie_covers_upper_half() {
        let mut surface = ImageSurface::new(10, 10);
        let red = Rgba([255, 0, 0, 255]);
        surface.fill_pie(RectF::new(0.0, 0.0, 10.0, 10.0), 0.0, 180.0, red);
        assert_eq!(*surface.image().get_pixel(5, 2), red);
        assert_eq!(*surface.image().get_pixel(5, 8), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_zero_span_pie_draws_nothing() {
        let mut surface = ImageSurface::new(4, 4);
        surface.fill_pie(
            RectF::new(0.0, 0.0, 4.0, 4.0),
            0.0,
            0.0,
            Rgba([255, 0, 0, 255]),
        );
        assert!(surface.image().pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }
}
