//! Detection-to-annotation projection.
//!
//! Each call remaps a batch of detections from inference-image pixels into
//! display space, resolves class names and colors, asks the placement
//! service for a world anchor at each detection center and draws the result
//! into the marker pool. The pool is the only state carried between calls.

use tracing::{debug, warn};

use crate::colors::normalize_class_name;
use crate::pool::{MarkerFactory, MarkerPool, MarkerUpdate};
use crate::raycast::{AsyncRaycastService, RaycastService};
use crate::{Annotation, ClassColorTable, Labels, Quat, RawDetection, Result, Vec3, VisionError};

pub const DEFAULT_MAX_ANNOTATIONS: usize = 200;
pub const LABEL_FONT_SIZE: u32 = 12;

/// Receives the processed detection count once per frame.
pub trait DetectionSink {
    fn objects_detected(&mut self, count: usize);
}

impl<F: FnMut(usize)> DetectionSink for F {
    fn objects_detected(&mut self, count: usize) {
        self(count)
    }
}

/// Sizes that relate the inference image, the display surface and the
/// camera sensor for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub image_w: f32,
    pub image_h: f32,
    pub display_w: f32,
    pub display_h: f32,
    /// Intrinsic resolution of the camera, used for raycast pixels.
    pub camera_res: (i32, i32),
    /// Where the camera was when the frame was captured; markers face it.
    pub camera_position: Option<Vec3>,
}

impl FrameGeometry {
    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("image_w", self.image_w),
            ("image_h", self.image_h),
            ("display_w", self.display_w),
            ("display_h", self.display_h),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(VisionError::invalid(format!("{} must be finite and > 0, got {}", name, v)));
            }
        }
        if self.camera_res.0 <= 0 || self.camera_res.1 <= 0 {
            return Err(VisionError::invalid(format!("camera resolution must be positive, got {:?}", self.camera_res)));
        }
        if let Some(p) = self.camera_position {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                return Err(VisionError::invalid("camera position is not finite"));
            }
        }
        Ok(())
    }

    fn scale(&self) -> (f32, f32) {
        (self.display_w / self.image_w, self.display_h / self.image_h)
    }
}

// A detection after the screen transform, waiting for its world anchor.
struct Placed {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    class_name: String,
    pixel: (i32, i32),
}

pub struct AnnotationProjector<F: MarkerFactory> {
    pool: MarkerPool<F>,
    labels: Option<Labels>,
    colors: ClassColorTable,
    max_annotations: usize,
    sink: Option<Box<dyn DetectionSink>>,
}

impl<F: MarkerFactory> AnnotationProjector<F> {
    pub fn new(factory: F, colors: ClassColorTable) -> Self {
        colors.log_summary();
        Self {
            pool: MarkerPool::new(factory),
            labels: None,
            colors,
            max_annotations: DEFAULT_MAX_ANNOTATIONS,
            sink: None,
        }
    }

    pub fn with_max_annotations(mut self, max: usize) -> Self {
        self.max_annotations = max;
        self
    }

    pub fn with_sink(mut self, sink: impl DetectionSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn set_labels(&mut self, labels: Labels) {
        self.labels = Some(labels);
    }

    pub fn set_class_colors(&mut self, colors: ClassColorTable) {
        colors.log_summary();
        self.colors = colors;
    }

    pub fn pool(&self) -> &MarkerPool<F> { &self.pool }

    /// Project one frame of detections, placing each via `raycast`.
    ///
    /// Structural problems fail the whole call before any marker changes.
    /// Detections with an unknown class id are skipped.
    pub fn project<R: RaycastService>(
        &mut self,
        detections: &[RawDetection],
        frame: &FrameGeometry,
        raycast: &mut R,
    ) -> Result<Vec<Annotation>> {
        let (take, labels) = check(self.labels.as_ref(), self.max_annotations, detections, frame)?;

        let mut out = Vec::with_capacity(take);
        for (n, det) in detections.iter().take(take).enumerate() {
            let Some(placed) = place(n, det, labels, frame) else { continue };
            let world = raycast.cast(placed.pixel);
            out.push(draw(&mut self.pool, &self.colors, out.len(), placed, world, frame));
        }

        self.finish(out.len(), take);
        Ok(out)
    }

    /// Same as [`project`](Self::project) for placement services that must be
    /// awaited. One await per detection, in input order.
    pub async fn project_async<R: AsyncRaycastService>(
        &mut self,
        detections: &[RawDetection],
        frame: &FrameGeometry,
        raycast: &mut R,
    ) -> Result<Vec<Annotation>> {
        let (take, labels) = check(self.labels.as_ref(), self.max_annotations, detections, frame)?;

        let mut out = Vec::with_capacity(take);
        for (n, det) in detections.iter().take(take).enumerate() {
            let Some(placed) = place(n, det, labels, frame) else { continue };
            let world = raycast.cast(placed.pixel).await;
            out.push(draw(&mut self.pool, &self.colors, out.len(), placed, world, frame));
        }

        self.finish(out.len(), take);
        Ok(out)
    }

    /// Inference failed for this frame: hide everything and report zero.
    pub fn report_error(&mut self) {
        self.pool.deactivate_all();
        self.notify(0);
    }

    fn finish(&mut self, drawn: usize, processed: usize) {
        self.pool.deactivate_from(drawn);
        debug!("projector: processed={} drawn={} pool={}", processed, drawn, self.pool.len());
        self.notify(processed);
    }

    fn notify(&mut self, count: usize) {
        if let Some(sink) = self.sink.as_mut() {
            sink.objects_detected(count);
        }
    }
}

// Validates inputs; returns how many detections this frame processes and the
// label table to resolve them with.
fn check<'a>(
    labels: Option<&'a Labels>,
    max_annotations: usize,
    detections: &[RawDetection],
    frame: &FrameGeometry,
) -> Result<(usize, &'a Labels)> {
    let labels = labels.ok_or_else(|| VisionError::invalid("labels table not loaded"))?;
    frame.validate()?;
    let take = detections.len().min(max_annotations);
    if let Some(n) = detections[..take].iter().position(|d| !d.is_finite()) {
        return Err(VisionError::invalid(format!("detection {} has non-finite geometry", n)));
    }
    Ok((take, labels))
}

fn place(n: usize, det: &RawDetection, labels: &Labels, frame: &FrameGeometry) -> Option<Placed> {
    let Some(label) = labels.get(det.class_id) else {
        warn!("projector: invalid label id {}, skipping box {}", det.class_id, n);
        return None;
    };

    let (scale_x, scale_y) = frame.scale();
    let half_w = frame.display_w / 2.0;
    let half_h = frame.display_h / 2.0;

    let cx = det.cx * scale_x - half_w;
    let cy = det.cy * scale_y - half_h;
    // not clamped: off-screen centers give off-sensor raycast pixels
    let per_x = (cx + half_w) / frame.display_w;
    let per_y = (cy + half_h) / frame.display_h;

    // screen y grows down, sensor pixels grow up
    let (res_w, res_h) = frame.camera_res;
    let pixel = (
        (per_x * res_w as f32).round_ties_even() as i32,
        ((1.0 - per_y) * res_h as f32).round_ties_even() as i32,
    );

    let class_name = normalize_class_name(label);
    debug!("projector: box {} class_name='{}' pixel={:?}", n, class_name, pixel);

    Some(Placed { cx, cy, w: det.w * scale_x, h: det.h * scale_y, class_name, pixel })
}

fn draw<F: MarkerFactory>(
    pool: &mut MarkerPool<F>,
    colors: &ClassColorTable,
    slot: usize,
    placed: Placed,
    world: Option<Vec3>,
    frame: &FrameGeometry,
) -> Annotation {
    let color = colors.resolve(&placed.class_name);
    let label = format!("Class: {}", placed.class_name);

    let depth = world.map(|w| w.z).unwrap_or(0.0);
    let rotation = match (world, frame.camera_position) {
        (Some(w), Some(cam)) => Quat::look_rotation(w.sub(cam), Vec3::UP),
        _ => Quat::IDENTITY,
    };

    pool.draw(
        slot,
        &MarkerUpdate {
            position: Vec3::new(placed.cx, -placed.cy, depth),
            rotation,
            size: (placed.w, placed.h),
            label: &label,
            color,
            font_size: LABEL_FONT_SIZE,
        },
    );

    Annotation {
        slot,
        cx: placed.cx,
        cy: placed.cy,
        w: placed.w,
        h: placed.h,
        label,
        class_name: placed.class_name,
        color,
        world_pos: world,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::ImageCanvas;
    use crate::{ClassColorEntry, Rgba};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn frame() -> FrameGeometry {
        FrameGeometry {
            image_w: 640.0,
            image_h: 640.0,
            display_w: 320.0,
            display_h: 320.0,
            camera_res: (1280, 960),
            camera_position: None,
        }
    }

    fn projector(labels: &[&str]) -> AnnotationProjector<ImageCanvas> {
        let mut p = AnnotationProjector::new(ImageCanvas::new(320, 320), ClassColorTable::default());
        p.set_labels(labels.iter().collect());
        p
    }

    fn miss(_: (i32, i32)) -> Option<Vec3> {
        None
    }

    #[test]
    fn center_detection_maps_to_display_origin() {
        let mut p = projector(&["fire"]);
        let dets = [RawDetection::new(320.0, 320.0, 64.0, 64.0, 0)];
        let out = p.project(&dets, &frame(), &mut miss).unwrap();
        assert_eq!(out.len(), 1);
        let a = &out[0];
        assert_eq!((a.cx, a.cy), (0.0, 0.0));
        assert_eq!((a.w, a.h), (32.0, 32.0));
        assert_eq!(a.class_name, "fire");
        assert_eq!(a.label, "Class: fire");
        assert!(a.world_pos.is_none());
    }

    #[test]
    fn non_uniform_scale() {
        let mut p = projector(&["pin"]);
        let f = FrameGeometry { display_w: 640.0, display_h: 320.0, ..frame() };
        let dets = [RawDetection::new(160.0, 480.0, 10.0, 10.0, 0)];
        let a = &p.project(&dets, &f, &mut miss).unwrap()[0];
        assert_eq!((a.cx, a.cy), (160.0 - 320.0, 240.0 - 160.0));
        assert_eq!((a.w, a.h), (10.0, 5.0));
    }

    #[test]
    fn raycast_pixel_flips_vertical_axis() {
        let mut p = projector(&["hose"]);
        let seen = RefCell::new(Vec::new());
        let mut rc = |px: (i32, i32)| -> Option<Vec3> {
            seen.borrow_mut().push(px);
            Some(Vec3::new(0.1, 0.2, 1.5))
        };
        // top-left quarter of the image
        let dets = [RawDetection::new(160.0, 160.0, 8.0, 8.0, 0)];
        let out = p.project(&dets, &frame(), &mut rc).unwrap();
        assert_eq!(seen.borrow().as_slice(), &[(320, 720)]);
        assert_eq!(out[0].world_pos, Some(Vec3::new(0.1, 0.2, 1.5)));
    }

    #[test]
    fn raycast_pixel_rounds_half_to_even() {
        let mut p = projector(&["hose"]);
        let f = FrameGeometry { camera_res: (5, 5), ..frame() };
        let seen = RefCell::new(Vec::new());
        let mut rc = |px: (i32, i32)| -> Option<Vec3> {
            seen.borrow_mut().push(px);
            None
        };
        // per = 0.5 -> 2.5 -> 2
        p.project(&[RawDetection::new(320.0, 320.0, 1.0, 1.0, 0)], &f, &mut rc).unwrap();
        assert_eq!(seen.borrow()[0], (2, 2));
    }

    #[test]
    fn class_name_is_trimmed_and_underscored() {
        let mut p = projector(&[" fire extinguisher "]);
        let out = p.project(&[RawDetection::new(1.0, 1.0, 1.0, 1.0, 0)], &frame(), &mut miss).unwrap();
        assert_eq!(out[0].class_name, "fire_extinguisher");
    }

    #[test]
    fn colors_follow_table() {
        let mut p = projector(&["Hose", "trigger"]);
        p.set_class_colors(ClassColorTable::new(
            vec![ClassColorEntry { class_name: "hose".into(), color: Rgba::BLUE }],
            Rgba::RED,
        ));
        let dets = [RawDetection::new(1.0, 1.0, 1.0, 1.0, 0), RawDetection::new(1.0, 1.0, 1.0, 1.0, 1)];
        let out = p.project(&dets, &frame(), &mut miss).unwrap();
        assert_eq!(out[0].color, Rgba::BLUE);
        assert_eq!(out[1].color, Rgba::RED);
    }

    #[test]
    fn marker_depth_comes_from_world_anchor() {
        let mut p = projector(&["hose"]);
        let mut rc = |_: (i32, i32)| -> Option<Vec3> { Some(Vec3::new(0.0, 0.0, 2.5)) };
        p.project(&[RawDetection::new(160.0, 160.0, 8.0, 8.0, 0)], &frame(), &mut rc).unwrap();
        let m = p.pool().factory().marker(0).unwrap();
        assert_eq!(m.position, Vec3::new(-80.0, 80.0, 2.5));
    }

    #[test]
    fn markers_face_capture_camera() {
        let mut p = projector(&["hose"]);
        let f = FrameGeometry { camera_position: Some(Vec3::ZERO), ..frame() };
        let mut rc = |_: (i32, i32)| -> Option<Vec3> { Some(Vec3::new(2.0, 0.0, 0.0)) };
        p.project(&[RawDetection::new(1.0, 1.0, 1.0, 1.0, 0)], &f, &mut rc).unwrap();
        let m = p.pool().factory().marker(0).unwrap();
        let fwd = m.rotation.rotate(Vec3::FORWARD);
        assert!((fwd.x - 1.0).abs() < 1e-4 && fwd.y.abs() < 1e-4 && fwd.z.abs() < 1e-4);
    }

    #[test]
    fn empty_batch_reports_zero() {
        let counts = Rc::new(RefCell::new(Vec::new()));
        let c = counts.clone();
        let mut p = projector(&["fire"]).with_sink(move |n: usize| c.borrow_mut().push(n));
        let out = p.project(&[], &frame(), &mut miss).unwrap();
        assert!(out.is_empty());
        assert_eq!(*counts.borrow(), vec![0]);
    }

    #[test]
    fn bad_class_ids_are_skipped_without_consuming_slots() {
        let mut p = projector(&["fire", "hose"]);
        let dets = [
            RawDetection::new(1.0, 1.0, 1.0, 1.0, 5),
            RawDetection::new(2.0, 2.0, 1.0, 1.0, 1),
            RawDetection::new(3.0, 3.0, 1.0, 1.0, -1),
        ];
        let out = p.project(&dets, &frame(), &mut miss).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_name, "hose");
        assert_eq!(out[0].slot, 0);
        assert_eq!(p.pool().len(), 1);
    }

    #[test]
    fn missing_labels_is_invalid_input() {
        let mut p = AnnotationProjector::new(ImageCanvas::new(8, 8), ClassColorTable::default());
        let err = p.project(&[RawDetection::new(1.0, 1.0, 1.0, 1.0, 0)], &frame(), &mut miss).unwrap_err();
        assert!(matches!(err, VisionError::InvalidInput(_)));
    }

    #[test]
    fn malformed_geometry_fails_before_drawing() {
        let counts = Rc::new(RefCell::new(Vec::new()));
        let c = counts.clone();
        let mut p = projector(&["fire"]).with_sink(move |n: usize| c.borrow_mut().push(n));
        p.project(&[RawDetection::new(1.0, 1.0, 1.0, 1.0, 0)], &frame(), &mut miss).unwrap();

        let bad = [RawDetection::new(1.0, 1.0, 1.0, 1.0, 0), RawDetection::new(f32::NAN, 1.0, 1.0, 1.0, 0)];
        assert!(p.project(&bad, &frame(), &mut miss).is_err());
        assert!(p.project(&bad[..1], &FrameGeometry { image_w: 0.0, ..frame() }, &mut miss).is_err());
        assert!(p.project(&bad[..1], &FrameGeometry { display_h: f32::INFINITY, ..frame() }, &mut miss).is_err());
        assert!(p.project(&bad[..1], &FrameGeometry { camera_res: (0, 960), ..frame() }, &mut miss).is_err());

        // previous frame untouched, no extra notifications
        assert_eq!(p.pool().active_count(), 1);
        assert_eq!(*counts.borrow(), vec![1]);
    }

    #[test]
    fn report_error_hides_everything() {
        let counts = Rc::new(RefCell::new(Vec::new()));
        let c = counts.clone();
        let mut p = projector(&["fire"]).with_sink(move |n: usize| c.borrow_mut().push(n));
        let dets = [RawDetection::new(1.0, 1.0, 1.0, 1.0, 0); 3];
        p.project(&dets, &frame(), &mut miss).unwrap();
        p.report_error();
        assert_eq!(p.pool().len(), 3);
        assert_eq!(p.pool().active_count(), 0);
        assert_eq!(*counts.borrow(), vec![3, 0]);
    }
}
