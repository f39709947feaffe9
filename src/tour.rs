// tour.rs — 把相机、输入、导航、渲染串起来的会话对象
//
// 单线程事件驱动：宿主把指针事件逐个喂进来，每帧调用 pump() 取回加载结果，
// needs_redraw() 为真时 render()。

use crate::config::ViewerConfig;
use crate::error::Result;
use crate::hotspot::{nearest_within, NavTarget, ProjectedHotspot};
use crate::input::{InteractionController, PointerEvent};
use crate::navigation::{NavigationEvent, NavigationManager, Room};
use crate::panorama::CameraState;
use crate::projection::{FrameRenderer, PixelBuffer};
use crate::provider::ImageProvider;
use glam::Vec3;

/// One rendered frame plus the hotspots visible in it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: PixelBuffer,
    pub hotspots: Vec<ProjectedHotspot>,
}

/// What one pointer event did to the tour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerOutcome {
    /// The camera moved; a redraw is due.
    pub redraw: bool,
    /// A click landed on a hotspot and this target was followed.
    pub followed: Option<NavTarget>,
}

pub struct Tour<P> {
    config: ViewerConfig,
    camera: CameraState,
    controller: InteractionController,
    navigation: NavigationManager<P>,
    renderer: FrameRenderer,
    viewport: (u32, u32),
    dirty: bool,
}

impl<P: ImageProvider> Tour<P> {
    pub fn new(config: ViewerConfig, provider: P) -> Self {
        let config = config.sanitized();
        Self {
            camera: CameraState::new(config.initial_fov),
            controller: InteractionController::new(config.interaction()),
            navigation: NavigationManager::new(provider),
            renderer: config.renderer(),
            viewport: (0, 0),
            dirty: true,
            config,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn navigation(&self) -> &NavigationManager<P> {
        &self.navigation
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn needs_redraw(&self) -> bool {
        self.dirty
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.navigation.current_room()
    }

    pub fn is_loading(&self) -> bool {
        self.navigation.is_loading()
    }

    pub fn set_rooms(&mut self, rooms: Vec<Room>) {
        self.navigation.set_rooms(rooms);
        self.dirty = true;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.viewport != (width, height) {
            self.viewport = (width, height);
            self.dirty = true;
        }
    }

    /// Feeds one input event. A click is hit-tested against the visible
    /// hotspots right away; the room itself changes once its image lands.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> PointerOutcome {
        let outcome = self.controller.handle(event, &mut self.camera);
        if outcome.redraw {
            self.dirty = true;
        }
        PointerOutcome {
            redraw: outcome.redraw,
            followed: outcome.click.and_then(|(x, y)| self.click(x, y)),
        }
    }

    /// Hit-tests a click in viewport pixels and follows the hotspot, if any.
    pub fn click(&mut self, x: f32, y: f32) -> Option<NavTarget> {
        let visible = self.visible_hotspots();
        let index = nearest_within(&visible, x, y, self.config.hotspot_radius)?;
        let target = visible.iter().find(|h| h.index == index)?.target;
        log::debug!("hotspot {index} clicked at ({x}, {y})");
        self.follow(target);
        Some(target)
    }

    pub fn follow(&mut self, target: NavTarget) -> bool {
        self.navigation.follow(target)
    }

    /// Adds a hotspot to the room on screen, relative to its camera.
    pub fn add_hotspot(&mut self, position: Vec3, label: impl Into<String>, target: NavTarget) {
        self.navigation.add_hotspot(position, label, target);
        self.dirty = true;
    }

    pub fn navigate_to(&mut self, index: usize) -> Result<()> {
        self.navigation.navigate_to(index)
    }

    pub fn navigate_to_room_id(&mut self, room_id: &str) -> Result<()> {
        self.navigation.navigate_to_room_id(room_id)
    }

    pub fn next(&mut self) -> bool {
        self.navigation.next()
    }

    pub fn previous(&mut self) -> bool {
        self.navigation.previous()
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.navigation.refresh()
    }

    pub fn reset_view(&mut self) {
        self.camera.reset(self.config.initial_fov);
        self.dirty = true;
    }

    /// Applies finished loads and hands the resulting notifications to the host.
    pub fn pump(&mut self) -> Vec<NavigationEvent> {
        self.navigation.poll();
        let events = self.navigation.drain_events();
        if events
            .iter()
            .any(|e| matches!(e, NavigationEvent::RoomChanged { .. }))
        {
            self.dirty = true;
        }
        events
    }

    pub fn visible_hotspots(&self) -> Vec<ProjectedHotspot> {
        let (w, h) = self.viewport;
        self.navigation.hotspots().project(&self.camera, w, h)
    }

    pub fn render(&mut self) -> Frame {
        let (w, h) = self.viewport;
        self.render_at(w, h)
    }

    /// Renders pixels at `render_scale` of the viewport. Hotspot coordinates
    /// stay in viewport pixels so they line up with pointer events.
    pub fn render_scaled(&mut self) -> Frame {
        let (w, h) = self.viewport;
        let scale = |v: u32| {
            if v == 0 {
                0
            } else {
                ((v as f32 * self.config.render_scale).round() as u32).clamp(1, v)
            }
        };
        self.render_at(scale(w), scale(h))
    }

    fn render_at(&mut self, pixel_w: u32, pixel_h: u32) -> Frame {
        self.dirty = false;
        Frame {
            pixels: self
                .renderer
                .render(self.navigation.active_image(), &self.camera, pixel_w, pixel_h),
            hotspots: self.visible_hotspots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PointerId;
    use crate::provider::SyntheticImageProvider;

    fn tour() -> Tour<SyntheticImageProvider> {
        let mut tour = Tour::new(ViewerConfig::default(), SyntheticImageProvider::new(64, 32));
        tour.resize(200, 100);
        tour.set_rooms(vec![
            Room::new("a", "A", Vec3::ZERO),
            Room::new("b", "B", Vec3::new(0.0, 0.0, 10.0)),
        ]);
        tour
    }

    #[test]
    fn room_change_marks_the_frame_dirty() {
        let mut tour = tour();
        tour.pump();
        tour.render();
        assert!(!tour.needs_redraw());
        tour.navigate_to(1).unwrap();
        assert_eq!(tour.pump().len(), 1);
        assert!(tour.needs_redraw());
    }

    #[test]
    fn render_reports_visible_hotspots() {
        let mut tour = tour();
        tour.pump();
        let frame = tour.render();
        assert_eq!(frame.pixels.dimensions(), (200, 100));
        assert_eq!(frame.hotspots.len(), 1);
        assert_eq!(frame.hotspots[0].label, "B");
    }

    #[test]
    fn scaled_render_keeps_hotspots_in_viewport_pixels() {
        let mut tour = tour();
        tour.pump();
        let frame = tour.render_scaled();
        assert_eq!(frame.pixels.dimensions(), (100, 50));
        approx::assert_abs_diff_eq!(frame.hotspots[0].screen_x, 100.0, epsilon = 1e-3);
        approx::assert_abs_diff_eq!(frame.hotspots[0].screen_y, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn pointer_outcome_reports_the_followed_hotspot() {
        let mut tour = tour();
        tour.pump();
        let down = tour.handle_pointer(PointerEvent::Down { id: PointerId::Mouse, x: 101.0, y: 50.0 });
        assert_eq!(down, PointerOutcome::default());
        let up = tour.handle_pointer(PointerEvent::Up { id: PointerId::Mouse });
        assert_eq!(up.followed, Some(NavTarget::Room(1)));
        assert!(!up.redraw);

        // 空白处点击不导航
        tour.pump();
        tour.handle_pointer(PointerEvent::Down { id: PointerId::Mouse, x: 5.0, y: 5.0 });
        let up = tour.handle_pointer(PointerEvent::Up { id: PointerId::Mouse });
        assert_eq!(up.followed, None);
    }

    #[test]
    fn empty_tour_renders_fallback() {
        let mut tour = Tour::new(ViewerConfig::default(), SyntheticImageProvider::new(8, 4));
        tour.resize(4, 4);
        let frame = tour.render();
        assert!(frame.pixels.pixels().all(|p| p.0 == ViewerConfig::default().fallback_color));
        assert!(frame.hotspots.is_empty());
    }

    #[test]
    fn reset_view_restores_initial_fov() {
        let mut tour = tour();
        tour.handle_pointer(PointerEvent::Wheel { delta_y: 1000.0 });
        approx::assert_abs_diff_eq!(tour.camera().fov(), 70.0, epsilon = 1e-4);
        tour.reset_view();
        assert_eq!(tour.camera().fov(), 60.0);
    }
}
