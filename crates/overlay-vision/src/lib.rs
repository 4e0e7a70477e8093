mod error;
pub mod canvas;
pub mod classify;
pub mod colors;
pub mod geometry;
pub mod labels;
pub mod pool;
pub mod projector;
pub mod raycast;
pub mod tensor;

use serde::{Deserialize, Serialize};

pub use colors::{ClassColorEntry, ClassColorTable, Rgba};
pub use error::{Result, VisionError};
pub use geometry::{Quat, Vec3};
pub use labels::Labels;
pub use projector::{AnnotationProjector, DetectionSink, FrameGeometry, DEFAULT_MAX_ANNOTATIONS};

/// One row of the inference output, still in inference-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub class_id: i32,
}

impl RawDetection {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32, class_id: i32) -> Self {
        Self { cx, cy, w, h, class_id }
    }

    pub fn is_finite(&self) -> bool {
        self.cx.is_finite() && self.cy.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

/// A detection remapped to display space for the current frame.
///
/// `cx`/`cy` are relative to the display center (y grows downwards, like the
/// inference image); `w`/`h` are display units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub slot: usize,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub label: String,
    pub class_name: String,
    pub color: Rgba,
    pub world_pos: Option<Vec3>,
}
