// panorama.rs — 视角参数与全景图

use crate::error::{Result, TourError};
use crate::geometry;
use glam::Vec3;
use image::{GenericImage, Rgba, RgbaImage};
use std::f32::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;

pub const MIN_FOV: f32 = 30.0;
pub const MAX_FOV: f32 = 120.0;
pub const DEFAULT_FOV: f32 = 60.0;
pub const MIN_PITCH: f32 = -FRAC_PI_2;
pub const MAX_PITCH: f32 = FRAC_PI_2;

/// Look direction and zoom of the virtual camera.
///
/// `yaw` and `pitch` are radians, `fov` is degrees. The three `apply_*`
/// methods are the only mutators; they keep every field inside its range
/// and silently drop non-finite deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    yaw: f32,
    pitch: f32,
    fov: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::new(DEFAULT_FOV)
    }
}

impl CameraState {
    pub fn new(fov: f32) -> Self {
        let mut camera = Self {
            yaw: 0.0,
            pitch: 0.0,
            fov: DEFAULT_FOV,
        };
        camera.reset(fov);
        camera
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// 回到正前方，fov 取 `fov`（非法值退回默认）。
    pub fn reset(&mut self, fov: f32) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.fov = if fov.is_finite() {
            fov.clamp(MIN_FOV, MAX_FOV)
        } else {
            DEFAULT_FOV
        };
    }

    /// Returns whether the yaw actually changed.
    pub fn apply_yaw_delta(&mut self, d: f32) -> bool {
        if !d.is_finite() {
            log::warn!("ignoring non-finite yaw delta {d}");
            return false;
        }
        let next = wrap_angle(self.yaw + d);
        let changed = next != self.yaw;
        self.yaw = next;
        changed
    }

    pub fn apply_pitch_delta(&mut self, d: f32) -> bool {
        if !d.is_finite() {
            log::warn!("ignoring non-finite pitch delta {d}");
            return false;
        }
        let next = (self.pitch + d).clamp(MIN_PITCH, MAX_PITCH);
        let changed = next != self.pitch;
        self.pitch = next;
        changed
    }

    pub fn apply_fov_delta(&mut self, d: f32) -> bool {
        if !d.is_finite() {
            log::warn!("ignoring non-finite fov delta {d}");
            return false;
        }
        let next = (self.fov + d).clamp(MIN_FOV, MAX_FOV);
        let changed = next != self.fov;
        self.fov = next;
        changed
    }

    /// Like [`apply_yaw_delta`](Self::apply_yaw_delta), but reports a degenerate delta.
    pub fn try_apply_yaw_delta(&mut self, d: f32) -> Result<bool> {
        if !d.is_finite() {
            return Err(TourError::DegenerateInput("yaw delta"));
        }
        Ok(self.apply_yaw_delta(d))
    }

    pub fn try_apply_pitch_delta(&mut self, d: f32) -> Result<bool> {
        if !d.is_finite() {
            return Err(TourError::DegenerateInput("pitch delta"));
        }
        Ok(self.apply_pitch_delta(d))
    }

    pub fn try_apply_fov_delta(&mut self, d: f32) -> Result<bool> {
        if !d.is_finite() {
            return Err(TourError::DegenerateInput("fov delta"));
        }
        Ok(self.apply_fov_delta(d))
    }

    /// World direction seen at the center of the viewport.
    pub fn forward(&self) -> Vec3 {
        geometry::rotate_yaw_pitch(Vec3::Z, self.yaw, self.pitch)
    }

    /// 等效全画幅焦距 (mm)，状态栏显示用
    pub fn equivalent_focal_length(&self) -> f32 {
        let full_frame_diag = (36.0f32 * 36.0 + 24.0 * 24.0).sqrt();
        full_frame_diag / (2.0 * (self.fov.to_radians() * 0.5).tan())
    }
}

fn wrap_angle(a: f32) -> f32 {
    let w = a.rem_euclid(TAU);
    if w >= TAU {
        0.0
    } else {
        w
    }
}

/// Immutable equirectangular texture belonging to one room.
///
/// Cloning is cheap; the pixels are shared.
#[derive(Debug, Clone)]
pub struct PanoramaImage {
    room_id: String,
    pixels: Arc<RgbaImage>,
}

impl PanoramaImage {
    pub fn new(room_id: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            room_id: room_id.into(),
            pixels: Arc::new(pixels),
        }
    }

    /// Downscales to `max_dimension` and pads short images to 2:1.
    pub fn normalized(room_id: impl Into<String>, img: RgbaImage, max_dimension: u32) -> Self {
        let room_id = room_id.into();
        let img = fit_within(&room_id, img, max_dimension);
        Self::new(room_id, pad_to_equirect(img))
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Caller guarantees `x < width` and `y < height`.
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }
}

fn fit_within(room_id: &str, img: RgbaImage, max_dimension: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();
    if max_dimension == 0 || (src_w <= max_dimension && src_h <= max_dimension) {
        return img;
    }
    let scale = (max_dimension as f32 / src_w.max(src_h) as f32).min(1.0);
    let new_w = ((src_w as f32 * scale) as u32).max(1);
    let new_h = ((src_h as f32 * scale) as u32).max(1);
    log::info!(
        "panorama for `{room_id}` is {src_w}x{src_h}, above limit {max_dimension}; scaled to {new_w}x{new_h}"
    );
    image::DynamicImage::ImageRgba8(img)
        .resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
        .to_rgba8()
}

// 兼容非 2:1 图：目标高度 = 宽 / 2，顶部补黑，原图贴在底部
fn pad_to_equirect(img: RgbaImage) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();
    let target_h = src_w / 2;
    if target_h == 0 || src_h >= target_h {
        return img;
    }
    let mut canvas = RgbaImage::from_pixel(src_w, target_h, Rgba([0, 0, 0, 255]));
    let y_offset = target_h - src_h;
    if let Err(e) = canvas.copy_from(&img, 0, y_offset) {
        log::warn!("padding panorama failed: {e}");
        return img;
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use std::f32::consts::PI;

    #[test]
    fn full_turn_is_identity() {
        let mut camera = CameraState::default();
        camera.apply_yaw_delta(1.25);
        let before = camera.yaw();
        camera.apply_yaw_delta(TAU);
        assert_abs_diff_eq!(camera.yaw(), before, epsilon = 1e-5);
    }

    #[test]
    fn negative_yaw_wraps_to_top_of_range() {
        let mut camera = CameraState::default();
        camera.apply_yaw_delta(-0.5);
        assert_abs_diff_eq!(camera.yaw(), TAU - 0.5, epsilon = 1e-5);
    }

    #[test]
    fn pitch_cannot_drift_past_the_poles() {
        let mut camera = CameraState::default();
        camera.apply_pitch_delta(1000.0);
        assert_eq!(camera.pitch(), MAX_PITCH);
        camera.apply_pitch_delta(-1000.0);
        assert_eq!(camera.pitch(), MIN_PITCH);
    }

    #[test]
    fn zero_deltas_report_no_change() {
        let mut camera = CameraState::default();
        camera.apply_pitch_delta(0.3);
        let snapshot = camera;
        assert!(!camera.apply_yaw_delta(0.0));
        assert!(!camera.apply_pitch_delta(0.0));
        assert!(!camera.apply_fov_delta(0.0));
        assert_eq!(camera, snapshot);
    }

    #[test]
    fn non_finite_deltas_never_reach_the_state() {
        let mut camera = CameraState::default();
        let snapshot = camera;
        assert!(!camera.apply_yaw_delta(f32::NAN));
        assert!(!camera.apply_pitch_delta(f32::INFINITY));
        assert!(!camera.apply_fov_delta(f32::NEG_INFINITY));
        assert_eq!(camera, snapshot);
        assert!(matches!(
            camera.try_apply_fov_delta(f32::NAN),
            Err(TourError::DegenerateInput(_))
        ));
    }

    #[test]
    fn new_clamps_initial_fov() {
        assert_eq!(CameraState::new(5.0).fov(), MIN_FOV);
        assert_eq!(CameraState::new(500.0).fov(), MAX_FOV);
        assert_eq!(CameraState::new(f32::NAN).fov(), DEFAULT_FOV);
    }

    #[test]
    fn forward_follows_yaw_and_pitch() {
        let mut camera = CameraState::default();
        camera.apply_yaw_delta(PI / 2.0);
        let f = camera.forward();
        assert_abs_diff_eq!(f.x, 1.0, epsilon = 1e-5);
        camera.apply_pitch_delta(PI / 4.0);
        // +Y 朝下
        assert!(camera.forward().y > 0.0);
    }

    #[test]
    fn short_images_are_padded_at_the_top() {
        let img = RgbaImage::from_pixel(8, 2, Rgba([200, 100, 50, 255]));
        let pano = PanoramaImage::normalized("r", img, 0);
        assert_eq!((pano.width(), pano.height()), (8, 4));
        assert_eq!(pano.texel(0, 0), [0, 0, 0, 255]);
        assert_eq!(pano.texel(7, 3), [200, 100, 50, 255]);
    }

    #[test]
    fn oversized_images_are_downscaled() {
        let img = RgbaImage::from_pixel(64, 32, Rgba([1, 2, 3, 255]));
        let pano = PanoramaImage::normalized("r", img, 16);
        assert_eq!((pano.width(), pano.height()), (16, 8));
    }

    proptest! {
        #[test]
        fn yaw_stays_in_range(deltas in prop::collection::vec(-100.0f32..100.0, 0..64)) {
            let mut camera = CameraState::default();
            for d in deltas {
                camera.apply_yaw_delta(d);
                prop_assert!(camera.yaw() >= 0.0 && camera.yaw() < TAU);
            }
        }

        #[test]
        fn pitch_stays_clamped(deltas in prop::collection::vec(-1000.0f32..1000.0, 0..64)) {
            let mut camera = CameraState::default();
            for d in deltas {
                camera.apply_pitch_delta(d);
                prop_assert!(camera.pitch() >= MIN_PITCH && camera.pitch() <= MAX_PITCH);
            }
        }

        #[test]
        fn fov_stays_clamped(deltas in prop::collection::vec(-1.0e6f32..1.0e6, 0..64)) {
            let mut camera = CameraState::default();
            for d in deltas {
                camera.apply_fov_delta(d);
                prop_assert!(camera.fov() >= MIN_FOV && camera.fov() <= MAX_FOV);
            }
        }
    }
}
