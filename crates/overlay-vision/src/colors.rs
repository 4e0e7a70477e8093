use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Linear RGBA with channels in `0..=1`.
///
/// Config files spell it as `[r, g, b]` or `[r, g, b, a]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "[f32; 4]")]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Rgba = Rgba::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Rgba = Rgba::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_rgba8(self) -> image::Rgba<u8> {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        image::Rgba([q(self.r), q(self.g), q(self.b), q(self.a)])
    }
}

impl TryFrom<Vec<f32>> for Rgba {
    type Error = String;

    fn try_from(v: Vec<f32>) -> Result<Self, Self::Error> {
        match v.as_slice() {
            [r, g, b] => Ok(Rgba::new(*r, *g, *b, 1.0)),
            [r, g, b, a] => Ok(Rgba::new(*r, *g, *b, *a)),
            other => Err(format!("color needs 3 or 4 channels, got {}", other.len())),
        }
    }
}

impl From<Rgba> for [f32; 4] {
    fn from(c: Rgba) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassColorEntry {
    pub class_name: String,
    pub color: Rgba,
}

/// Ordered class -> color table. The first entry whose trimmed,
/// case-folded name equals the query wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassColorTable {
    entries: Vec<ClassColorEntry>,
    default_color: Rgba,
}

impl Default for ClassColorTable {
    fn default() -> Self {
        Self { entries: Vec::new(), default_color: Rgba::WHITE }
    }
}

impl ClassColorTable {
    pub fn new(entries: Vec<ClassColorEntry>, default_color: Rgba) -> Self {
        Self { entries, default_color }
    }

    pub fn entries(&self) -> &[ClassColorEntry] { &self.entries }

    pub fn default_color(&self) -> Rgba { self.default_color }

    pub fn lookup(&self, class_name: &str) -> Option<Rgba> {
        let wanted = fold(class_name);
        if wanted.is_empty() {
            return None;
        }
        self.entries.iter().find(|e| fold(&e.class_name) == wanted).map(|e| e.color)
    }

    /// Color for a class, falling back to the default color.
    pub fn resolve(&self, class_name: &str) -> Rgba {
        match self.lookup(class_name) {
            Some(c) => c,
            None => {
                if !class_name.trim().is_empty() {
                    warn!("colors: no match for class '{}', using default", class_name);
                }
                self.default_color
            }
        }
    }

    pub fn log_summary(&self) {
        info!("colors: {} class colors configured", self.entries.len());
        for e in &self.entries {
            info!("colors: class={} color={:?}", e.class_name, e.color);
        }
    }
}

/// Storage form of a class name: trimmed, spaces become underscores.
pub fn normalize_class_name(label: &str) -> String {
    label.trim().replace(' ', "_")
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}
