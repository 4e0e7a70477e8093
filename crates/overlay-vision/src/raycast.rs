use crate::Vec3;

/// Placement service: maps a camera pixel to a world-space hit, if any.
///
/// A miss is `None`, not an error.
pub trait RaycastService {
    fn cast(&mut self, pixel: (i32, i32)) -> Option<Vec3>;
}

impl<F: FnMut((i32, i32)) -> Option<Vec3>> RaycastService for F {
    fn cast(&mut self, pixel: (i32, i32)) -> Option<Vec3> {
        self(pixel)
    }
}

/// For hosts whose depth sampling is only available asynchronously.
#[allow(async_fn_in_trait)]
pub trait AsyncRaycastService {
    async fn cast(&mut self, pixel: (i32, i32)) -> Option<Vec3>;
}

/// Pinhole-ish stand-in: every on-sensor pixel hits a plane `depth` meters
/// in front of the camera; off-sensor pixels miss.
#[derive(Debug, Clone, Copy)]
pub struct FixedDepthRaycast {
    pub resolution: (i32, i32),
    pub depth: f32,
}

impl FixedDepthRaycast {
    pub fn new(resolution: (i32, i32), depth: f32) -> Self {
        Self { resolution, depth }
    }

    fn hit(&self, (px, py): (i32, i32)) -> Option<Vec3> {
        let (w, h) = self.resolution;
        if w <= 0 || h <= 0 || px < 0 || py < 0 || px >= w || py >= h {
            return None;
        }
        // pixel origin is bottom-left; plane is centered on the optical axis
        let nx = px as f32 / w as f32 - 0.5;
        let ny = py as f32 / h as f32 - 0.5;
        Some(Vec3::new(nx * self.depth, ny * self.depth, self.depth))
    }
}

impl RaycastService for FixedDepthRaycast {
    fn cast(&mut self, pixel: (i32, i32)) -> Option<Vec3> {
        self.hit(pixel)
    }
}

impl AsyncRaycastService for FixedDepthRaycast {
    async fn cast(&mut self, pixel: (i32, i32)) -> Option<Vec3> {
        self.hit(pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_depth_hits_inside_and_misses_outside() {
        let mut rc = FixedDepthRaycast::new((100, 50), 2.0);
        let center = RaycastService::cast(&mut rc, (50, 25)).unwrap();
        assert_eq!(center, Vec3::new(0.0, 0.0, 2.0));
        assert!(RaycastService::cast(&mut rc, (-1, 10)).is_none());
        assert!(RaycastService::cast(&mut rc, (100, 10)).is_none());
        assert!(RaycastService::cast(&mut rc, (10, 50)).is_none());
    }

    #[test]
    fn closures_are_raycast_services() {
        let mut seen = Vec::new();
        let mut rc = |p: (i32, i32)| -> Option<Vec3> {
            seen.push(p);
            None
        };
        assert!(RaycastService::cast(&mut rc, (3, 4)).is_none());
        assert_eq!(seen, vec![(3, 4)]);
    }

    #[tokio::test]
    async fn fixed_depth_async_matches_sync() {
        let mut rc = FixedDepthRaycast::new((10, 10), 1.0);
        let a = AsyncRaycastService::cast(&mut rc, (2, 8)).await;
        let b = RaycastService::cast(&mut rc, (2, 8));
        assert_eq!(a, b);
    }
}
