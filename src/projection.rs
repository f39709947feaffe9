// projection.rs — CPU 光线投射渲染 + 世界点投影
//
// 每个目标像素独立映射到一个源纹素，行与行之间无依赖，
// 所以整帧可以按行切分交给 rayon 线程池。

use crate::geometry;
use crate::panorama::{CameraState, PanoramaImage};
use glam::Vec3;
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Output surface of a render pass: `width × height × RGBA`.
pub type PixelBuffer = RgbaImage;

pub const DEFAULT_FALLBACK_COLOR: [u8; 4] = [26, 26, 26, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFilter {
    #[default]
    Nearest,
    Bilinear,
}

/// Render options; the math itself lives in [`geometry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRenderer {
    pub filter: SampleFilter,
    pub fallback_color: [u8; 4],
    pub parallel: bool,
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self {
            filter: SampleFilter::Nearest,
            fallback_color: DEFAULT_FALLBACK_COLOR,
            parallel: true,
        }
    }
}

impl FrameRenderer {
    /// Renders a full frame. A missing or zero-sized image yields a flat
    /// frame in `fallback_color`.
    pub fn render(
        &self,
        image: Option<&PanoramaImage>,
        camera: &CameraState,
        viewport_w: u32,
        viewport_h: u32,
    ) -> PixelBuffer {
        let mut out = PixelBuffer::new(viewport_w, viewport_h);
        self.render_into(image, camera, &mut out);
        out
    }

    /// Same as [`render`](Self::render) but reuses `out` (its size is the viewport).
    pub fn render_into(&self, image: Option<&PanoramaImage>, camera: &CameraState, out: &mut PixelBuffer) {
        let (w, h) = out.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let row_bytes = w as usize * 4;
        let buf: &mut [u8] = out;

        if self.parallel {
            buf.par_chunks_mut(row_bytes).enumerate().for_each(|(y, row)| {
                let y = y as u32;
                self.render_rows(image, camera, w, h, y..y + 1, row);
            });
        } else {
            self.render_rows(image, camera, w, h, 0..h, buf);
        }
    }

    /// Writes rows `rows` of a `viewport_w × viewport_h` frame into `out`,
    /// which holds exactly those rows (`rows.len() * viewport_w * 4` bytes).
    ///
    /// A buffer of any other length is left untouched.
    pub fn render_rows(
        &self,
        image: Option<&PanoramaImage>,
        camera: &CameraState,
        viewport_w: u32,
        viewport_h: u32,
        rows: Range<u32>,
        out: &mut [u8],
    ) {
        let expected = rows.len() * viewport_w as usize * 4;
        if out.len() != expected {
            log::warn!(
                "render_rows: {} byte buffer for {} rows of {viewport_w}x{viewport_h}, expected {expected}",
                out.len(),
                rows.len()
            );
            return;
        }
        if expected == 0 || viewport_h == 0 {
            return;
        }
        let texels: &mut [[u8; 4]] = bytemuck::cast_slice_mut(out);

        let Some(image) = image.filter(|img| !img.is_empty()) else {
            texels.fill(self.fallback_color);
            return;
        };

        let aspect = viewport_w as f32 / viewport_h as f32;
        let (yaw, pitch, fov) = (camera.yaw(), camera.pitch(), camera.fov());
        let (img_w, img_h) = (image.width(), image.height());

        for (row_idx, y) in rows.enumerate() {
            let ndc_y = 2.0 * y as f32 / viewport_h as f32 - 1.0;
            let row = &mut texels[row_idx * viewport_w as usize..(row_idx + 1) * viewport_w as usize];
            for (x, px) in row.iter_mut().enumerate() {
                let ndc_x = 2.0 * x as f32 / viewport_w as f32 - 1.0;
                let ray = geometry::screen_ray(ndc_x, ndc_y, fov, aspect);
                let dir = geometry::rotate_yaw_pitch(ray, yaw, pitch);
                let (theta, phi) = geometry::cartesian_to_spherical(dir);
                let mut rgba = match self.filter {
                    SampleFilter::Nearest => {
                        let (u, v) = geometry::spherical_to_texel(theta, phi, img_w, img_h);
                        image.texel(u, v)
                    }
                    SampleFilter::Bilinear => sample_bilinear(image, theta, phi),
                };
                rgba[3] = 255;
                *px = rgba;
            }
        }
    }
}

/// Renders with default options (nearest sampling, rayon rows).
pub fn render_frame(
    image: Option<&PanoramaImage>,
    camera: &CameraState,
    viewport_w: u32,
    viewport_h: u32,
) -> PixelBuffer {
    FrameRenderer::default().render(image, camera, viewport_w, viewport_h)
}

// 水平方向环绕，垂直方向夹边（与全景纹理的 Repeat/ClampToEdge 采样一致）
fn sample_bilinear(image: &PanoramaImage, theta: f32, phi: f32) -> [u8; 4] {
    let (w, h) = (image.width(), image.height());
    let (u, v) = geometry::spherical_to_uv(theta, phi, w, h);
    let fu = u - 0.5;
    let fv = v - 0.5;
    let x0f = fu.floor();
    let y0f = fv.floor();
    let tx = fu - x0f;
    let ty = fv - y0f;

    let x0 = (x0f as i64).rem_euclid(w as i64) as u32;
    let x1 = (x0 + 1) % w;
    let clamp_y = |y: i64| y.clamp(0, h as i64 - 1) as u32;
    let y0 = clamp_y(y0f as i64);
    let y1 = clamp_y(y0f as i64 + 1);

    let (a, b, c, d) = (
        image.texel(x0, y0),
        image.texel(x1, y0),
        image.texel(x0, y1),
        image.texel(x1, y1),
    );
    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = a[i] as f32 * (1.0 - tx) + b[i] as f32 * tx;
        let bottom = c[i] as f32 * (1.0 - tx) + d[i] as f32 * tx;
        out[i] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Projects a camera-relative world point to screen pixels.
///
/// `None` when the point is on or behind the camera plane. The returned
/// coordinates may fall outside the viewport.
pub fn project_world_point(
    p: Vec3,
    camera: &CameraState,
    viewport_w: u32,
    viewport_h: u32,
) -> Option<(f32, f32)> {
    if viewport_w == 0 || viewport_h == 0 {
        return None;
    }
    let cam = geometry::unrotate_yaw_pitch(p, camera.yaw(), camera.pitch());
    if !cam.is_finite() || cam.z <= 0.0 {
        return None;
    }

    let half = (camera.fov().to_radians() * 0.5).tan();
    let aspect = viewport_w as f32 / viewport_h as f32;
    let ndc_x = cam.x / (cam.z * half * aspect);
    let ndc_y = cam.y / (cam.z * half);

    let sx = (ndc_x + 1.0) * 0.5 * viewport_w as f32;
    let sy = (ndc_y + 1.0) * 0.5 * viewport_h as f32;
    (sx.is_finite() && sy.is_finite()).then_some((sx, sy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgba;

    // R = x, G = y：每个纹素自带坐标
    fn coordinate_image() -> PanoramaImage {
        let img = RgbaImage::from_fn(256, 128, |x, y| Rgba([x as u8, y as u8, 7, 0]));
        PanoramaImage::new("coords", img)
    }

    fn turned(yaw: f32, pitch: f32, fov: f32) -> CameraState {
        let mut camera = CameraState::new(fov);
        camera.apply_yaw_delta(yaw);
        camera.apply_pitch_delta(pitch);
        camera
    }

    #[test]
    fn identical_inputs_render_identical_frames() {
        let image = coordinate_image();
        let camera = turned(1.1, -0.3, 75.0);
        let a = render_frame(Some(&image), &camera, 64, 48);
        let b = render_frame(Some(&image), &camera, 64, 48);
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn parallel_and_serial_passes_agree() {
        let image = coordinate_image();
        let camera = turned(4.0, 0.9, 110.0);
        let serial = FrameRenderer {
            parallel: false,
            ..FrameRenderer::default()
        };
        let a = serial.render(Some(&image), &camera, 37, 23);
        let b = FrameRenderer::default().render(Some(&image), &camera, 37, 23);
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn row_range_matches_full_frame_slice() {
        let image = coordinate_image();
        let camera = turned(0.4, 0.2, 60.0);
        let renderer = FrameRenderer::default();
        let full = renderer.render(Some(&image), &camera, 20, 10);

        let mut part = vec![0u8; 3 * 20 * 4];
        renderer.render_rows(Some(&image), &camera, 20, 10, 4..7, &mut part);
        assert_eq!(&full.as_raw()[4 * 20 * 4..7 * 20 * 4], part.as_slice());
    }

    #[test]
    fn mismatched_row_buffer_is_left_untouched() {
        let image = coordinate_image();
        let camera = CameraState::default();
        let renderer = FrameRenderer::default();
        for len in [3 * 20 * 4 - 4, 3 * 20 * 4 + 2, 7] {
            let mut part = vec![9u8; len];
            renderer.render_rows(Some(&image), &camera, 20, 10, 4..7, &mut part);
            assert!(part.iter().all(|&b| b == 9));
        }
    }

    #[test]
    fn alpha_is_forced_opaque() {
        let frame = render_frame(Some(&coordinate_image()), &CameraState::default(), 16, 16);
        assert!(frame.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn missing_or_empty_image_renders_fallback() {
        let camera = CameraState::default();
        let empty = PanoramaImage::new("empty", RgbaImage::new(0, 0));
        for image in [None, Some(&empty)] {
            let frame = render_frame(image, &camera, 8, 4);
            assert!(frame.pixels().all(|p| p.0 == DEFAULT_FALLBACK_COLOR));
        }
    }

    #[test]
    fn zero_viewport_is_empty() {
        let frame = render_frame(Some(&coordinate_image()), &CameraState::default(), 0, 10);
        assert!(frame.as_raw().is_empty());
    }

    #[test]
    fn center_pixel_samples_the_forward_direction() {
        let image = coordinate_image();
        for (yaw, pitch) in [(0.0, 0.0), (2.5, 0.6), (5.9, -1.2)] {
            let camera = turned(yaw, pitch, 60.0);
            let frame = render_frame(Some(&image), &camera, 40, 30);
            let center = frame.get_pixel(20, 15).0;

            let (theta, phi) = geometry::cartesian_to_spherical(camera.forward());
            let (u, v) = geometry::spherical_to_texel(theta, phi, 256, 128);
            assert_eq!((center[0] as u32, center[1] as u32), (u, v));
        }
    }

    #[test]
    fn bilinear_blends_horizontally_across_the_seam() {
        let mut img = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([200, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([200, 0, 0, 255]));
        let image = PanoramaImage::new("seam", img);
        // theta = 0 是第 0 列的左边缘：一半取第 0 列，一半取最后一列
        let px = sample_bilinear(&image, 0.0, 0.0);
        assert_eq!(px[0], 100);
    }

    #[test]
    fn point_straight_ahead_lands_in_the_center() {
        let (x, y) = project_world_point(Vec3::new(0.0, 0.0, 5.0), &CameraState::default(), 800, 600).unwrap();
        assert_abs_diff_eq!(x, 400.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 300.0, epsilon = 1e-3);
    }

    #[test]
    fn points_behind_or_at_the_camera_are_culled() {
        let camera = CameraState::default();
        assert_eq!(project_world_point(Vec3::ZERO, &camera, 800, 600), None);
        assert_eq!(project_world_point(Vec3::new(0.0, 0.0, -3.0), &camera, 800, 600), None);
        assert_eq!(project_world_point(Vec3::new(4.0, 0.0, 0.0), &camera, 800, 600), None);
    }

    #[test]
    fn projection_follows_the_camera_turn() {
        let camera = turned(std::f32::consts::FRAC_PI_2, 0.0, 60.0);
        let (x, y) = project_world_point(Vec3::new(3.0, 0.0, 0.0), &camera, 100, 100).unwrap();
        assert_abs_diff_eq!(x, 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn projection_inverts_the_render_ray() {
        let camera = turned(0.8, -0.35, 90.0);
        let (w, h) = (320, 200);
        let (px, py) = (250.0f32, 40.0f32);
        let ray = geometry::screen_ray(2.0 * px / w as f32 - 1.0, 2.0 * py / h as f32 - 1.0, camera.fov(), w as f32 / h as f32);
        let world = geometry::rotate_yaw_pitch(ray, camera.yaw(), camera.pitch()) * 7.0;
        let (x, y) = project_world_point(world, &camera, w, h).unwrap();
        assert_abs_diff_eq!(x, px, epsilon = 1e-2);
        assert_abs_diff_eq!(y, py, epsilon = 1e-2);
    }

    #[test]
    fn off_screen_points_still_project() {
        let (x, _) = project_world_point(Vec3::new(10.0, 0.0, 1.0), &CameraState::default(), 100, 100).unwrap();
        assert!(x > 100.0);
    }
}
