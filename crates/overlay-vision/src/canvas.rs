use image::{Rgba as Px, RgbaImage};

use crate::pool::MarkerFactory;
use crate::{Quat, Rgba, Vec3};

/// State of one marker as last set by the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasMarker {
    pub active: bool,
    pub position: Vec3,
    pub rotation: Quat,
    pub size: (f32, f32),
    pub color: Rgba,
    pub label: String,
    pub label_color: Rgba,
    pub font_size: u32,
}

/// Headless marker backend: keeps marker state and rasterizes the active
/// boxes as outlines. Marker positions are display units with the origin at
/// the display center and y up.
#[derive(Debug, Clone)]
pub struct ImageCanvas {
    width: u32,
    height: u32,
    thickness: u32,
    markers: Vec<CanvasMarker>,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, thickness: 2, markers: Vec::new() }
    }

    pub fn with_thickness(mut self, px: u32) -> Self {
        self.thickness = px.max(1);
        self
    }

    pub fn markers(&self) -> &[CanvasMarker] { &self.markers }

    pub fn marker(&self, handle: usize) -> Option<&CanvasMarker> { self.markers.get(handle) }

    pub fn render(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for m in self.markers.iter().filter(|m| m.active) {
            if let Some(rect) = self.pixel_rect(m) {
                rect.stroke(&mut img, m.color.to_rgba8(), self.thickness);
            }
        }
        img
    }

    // Box corners in image pixels, clamped; None when entirely off-canvas.
    fn pixel_rect(&self, m: &CanvasMarker) -> Option<PixelRect> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let cx = m.position.x + self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0 - m.position.y;
        let (hw, hh) = (m.size.0.abs() / 2.0, m.size.1.abs() / 2.0);
        let (x0, y0, x1, y1) = (cx - hw, cy - hh, cx + hw, cy + hh);

        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        if x1 < 0.0 || y1 < 0.0 || x0 > max_x || y0 > max_y {
            return None;
        }
        Some(PixelRect {
            x0: x0.max(0.0) as u32,
            y0: y0.max(0.0) as u32,
            x1: x1.min(max_x) as u32,
            y1: y1.min(max_y) as u32,
        })
    }
}

/// Inclusive pixel bounds of a marker, already clamped to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelRect {
    // The ring `t` pixels inside this one, until it collapses.
    fn inset(self, t: u32) -> Option<PixelRect> {
        let r = PixelRect {
            x0: self.x0.checked_add(t)?,
            y0: self.y0.checked_add(t)?,
            x1: self.x1.checked_sub(t)?,
            y1: self.y1.checked_sub(t)?,
        };
        (r.x0 <= r.x1 && r.y0 <= r.y1).then_some(r)
    }

    // Outline drawn inwards, `thickness` rings deep.
    fn stroke(self, img: &mut RgbaImage, color: Px<u8>, thickness: u32) {
        for ring in (0..thickness).map_while(|t| self.inset(t)) {
            for x in ring.x0..=ring.x1 {
                img.put_pixel(x, ring.y0, color);
                img.put_pixel(x, ring.y1, color);
            }
            for y in ring.y0..=ring.y1 {
                img.put_pixel(ring.x0, y, color);
                img.put_pixel(ring.x1, y, color);
            }
        }
    }
}

impl MarkerFactory for ImageCanvas {
    type Handle = usize;

    fn create_marker(&mut self, color: Rgba) -> usize {
        self.markers.push(CanvasMarker {
            active: true,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            size: (0.0, 0.0),
            color,
            label: String::new(),
            label_color: color,
            font_size: 0,
        });
        self.markers.len() - 1
    }

    fn set_active(&mut self, marker: &usize, active: bool) {
        if let Some(m) = self.markers.get_mut(*marker) {
            m.active = active;
        }
    }

    fn set_transform(&mut self, marker: &usize, position: Vec3, rotation: Quat, size: (f32, f32)) {
        if let Some(m) = self.markers.get_mut(*marker) {
            m.position = position;
            m.rotation = rotation;
            m.size = size;
        }
    }

    fn set_color(&mut self, marker: &usize, color: Rgba) {
        if let Some(m) = self.markers.get_mut(*marker) {
            m.color = color;
        }
    }

    fn set_label_text(&mut self, marker: &usize, text: &str, color: Rgba, font_size: u32) {
        if let Some(m) = self.markers.get_mut(*marker) {
            m.label = text.to_string();
            m.label_color = color;
            m.font_size = font_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawn(canvas: &mut ImageCanvas, position: Vec3, size: (f32, f32), color: Rgba) -> usize {
        let h = canvas.create_marker(color);
        canvas.set_transform(&h, position, Quat::IDENTITY, size);
        h
    }

    #[test]
    fn centered_box_lands_in_middle() {
        let mut c = ImageCanvas::new(40, 40).with_thickness(1);
        drawn(&mut c, Vec3::ZERO, (10.0, 10.0), Rgba::RED);
        let img = c.render();
        let red = image::Rgba([255, 0, 0, 255]);
        assert_eq!(img.get_pixel(15, 15), &red);
        assert_eq!(img.get_pixel(25, 25), &red);
        assert_eq!(img.get_pixel(20, 20)[3], 0);
    }

    #[test]
    fn positive_y_is_up() {
        let mut c = ImageCanvas::new(40, 40).with_thickness(1);
        drawn(&mut c, Vec3::new(0.0, 10.0, 0.0), (4.0, 4.0), Rgba::GREEN);
        let img = c.render();
        assert_eq!(img.get_pixel(18, 8)[1], 255);
        assert_eq!(img.get_pixel(18, 28)[3], 0);
    }

    #[test]
    fn inactive_and_offscreen_markers_are_not_drawn() {
        let mut c = ImageCanvas::new(20, 20);
        let h = drawn(&mut c, Vec3::ZERO, (6.0, 6.0), Rgba::BLUE);
        c.set_active(&h, false);
        drawn(&mut c, Vec3::new(500.0, 0.0, 0.0), (6.0, 6.0), Rgba::BLUE);
        let img = c.render();
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn label_state_is_recorded() {
        let mut c = ImageCanvas::new(10, 10);
        let h = c.create_marker(Rgba::WHITE);
        c.set_label_text(&h, "Class: hose", Rgba::BLUE, 12);
        let m = c.marker(h).unwrap();
        assert_eq!(m.label, "Class: hose");
        assert_eq!(m.label_color, Rgba::BLUE);
        assert_eq!(m.font_size, 12);
    }

    #[test]
    fn stroke_fills_rings_inwards() {
        let mut img = RgbaImage::new(40, 40);
        let red = image::Rgba([255, 0, 0, 255]);
        PixelRect { x0: 5, y0: 5, x1: 10, y1: 10 }.stroke(&mut img, red, 2);
        assert_eq!(img.get_pixel(5, 5), &red);
        assert_eq!(img.get_pixel(10, 10), &red);
        assert_eq!(img.get_pixel(6, 9), &red);
        assert_eq!(img.get_pixel(8, 8)[3], 0);
    }

    #[test]
    fn inset_stops_when_rect_collapses() {
        let r = PixelRect { x0: 0, y0: 0, x1: 2, y1: 2 };
        assert_eq!(r.inset(1), Some(PixelRect { x0: 1, y0: 1, x1: 1, y1: 1 }));
        assert_eq!(r.inset(2), None);
        let mut img = RgbaImage::new(3, 3);
        r.stroke(&mut img, image::Rgba([0, 255, 0, 255]), 10);
        assert!(img.pixels().all(|p| p[1] == 255));
    }
}
