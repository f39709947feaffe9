// geometry.rs — 球面/笛卡尔坐标转换、旋转、透视
//
// 坐标约定：相机看向 +Z，+X 向右，+Y 向下（与屏幕像素行方向一致）。
// 因此 phi = asin(y) 为负时位于等距柱状图的上半部分。

use glam::Vec3;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// Camera-space ray through a normalized device coordinate.
///
/// `ndc_x`/`ndc_y` are in `[-1, 1]`; the horizontal axis is widened by `aspect`.
pub fn screen_ray(ndc_x: f32, ndc_y: f32, fov_deg: f32, aspect: f32) -> Vec3 {
    let half = (fov_deg.to_radians() * 0.5).tan();
    Vec3::new(ndc_x * half * aspect, ndc_y * half, 1.0)
}

/// 先绕相机局部 X 轴俯仰，再绕世界 Y 轴偏航（第一人称环视）。
///
/// Positive pitch tilts the view towards +Y, i.e. looks down, so dragging the
/// pointer down looks down.
pub fn rotate_yaw_pitch(v: Vec3, yaw: f32, pitch: f32) -> Vec3 {
    let (sp, cp) = pitch.sin_cos();
    let pitched = Vec3::new(v.x, v.y * cp + v.z * sp, -v.y * sp + v.z * cp);

    let (sy, cy) = yaw.sin_cos();
    Vec3::new(
        pitched.x * cy + pitched.z * sy,
        pitched.y,
        -pitched.x * sy + pitched.z * cy,
    )
}

/// Exact inverse of [`rotate_yaw_pitch`]: brings a world direction into camera space.
pub fn unrotate_yaw_pitch(v: Vec3, yaw: f32, pitch: f32) -> Vec3 {
    let (sy, cy) = yaw.sin_cos();
    let unyawed = Vec3::new(v.x * cy - v.z * sy, v.y, v.x * sy + v.z * cy);

    let (sp, cp) = pitch.sin_cos();
    Vec3::new(
        unyawed.x,
        unyawed.y * cp - unyawed.z * sp,
        unyawed.y * sp + unyawed.z * cp,
    )
}

/// `(theta, phi)` of a direction. `theta` in `[0, 2π)`, `phi` in `[-π/2, π/2]`.
/// A zero-length input maps to `(0, 0)`.
pub fn cartesian_to_spherical(v: Vec3) -> (f32, f32) {
    let n = v.normalize_or_zero();
    if n == Vec3::ZERO {
        return (0.0, 0.0);
    }
    let mut theta = n.x.atan2(n.z).rem_euclid(TAU);
    // rem_euclid 可能因舍入返回 TAU 本身
    if theta >= TAU {
        theta = 0.0;
    }
    let phi = n.y.clamp(-1.0, 1.0).asin();
    (theta, phi)
}

/// Inverse of [`cartesian_to_spherical`] for unit directions.
pub fn spherical_to_cartesian(theta: f32, phi: f32) -> Vec3 {
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();
    Vec3::new(cp * st, sp, cp * ct)
}

/// Continuous texel coordinates, not yet floored. `u` in `[0, w]`, `v` in `[0, h]`.
pub fn spherical_to_uv(theta: f32, phi: f32, width: u32, height: u32) -> (f32, f32) {
    let u = theta / TAU * width as f32;
    let v = (phi + FRAC_PI_2) / PI * height as f32;
    (u, v)
}

/// Nearest texel for a spherical direction, always inside `0..width` × `0..height`.
///
/// Both dimensions must be non-zero.
pub fn spherical_to_texel(theta: f32, phi: f32, width: u32, height: u32) -> (u32, u32) {
    let (u, v) = spherical_to_uv(theta, phi, width, height);
    (floor_clamped(u, width), floor_clamped(v, height))
}

/// Center of texel `(x, y)` as spherical angles.
pub fn texel_to_spherical(x: u32, y: u32, width: u32, height: u32) -> (f32, f32) {
    let theta = (x as f32 + 0.5) / width as f32 * TAU;
    let phi = (y as f32 + 0.5) / height as f32 * PI - FRAC_PI_2;
    (theta, phi)
}

fn floor_clamped(c: f32, extent: u32) -> u32 {
    // NaN 落到 0
    if !(c > 0.0) {
        return 0;
    }
    (c.floor() as u32).min(extent.saturating_sub(1))
}
