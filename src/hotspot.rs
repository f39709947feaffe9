// hotspot.rs — 导航热点：逐帧投影 + 点击命中

use crate::panorama::CameraState;
use crate::projection::project_world_point;
use glam::Vec3;

pub const DEFAULT_HIT_RADIUS: f32 = 20.0;

/// What activating a hotspot does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavTarget {
    Room(usize),
    Next,
    Previous,
}

/// A labeled anchor, positioned relative to the camera of the current room.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub position: Vec3,
    pub label: String,
    pub target: NavTarget,
}

/// A hotspot that survived culling this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedHotspot {
    /// Registration order.
    pub index: usize,
    pub screen_x: f32,
    pub screen_y: f32,
    pub label: String,
    pub target: NavTarget,
}

#[derive(Debug, Clone, Default)]
pub struct HotspotRegistry {
    hotspots: Vec<Hotspot>,
}

impl HotspotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hotspot(&mut self, position: Vec3, label: impl Into<String>, target: NavTarget) {
        self.hotspots.push(Hotspot {
            position,
            label: label.into(),
            target,
        });
    }

    /// Swaps the whole set; used on room switch.
    pub fn replace(&mut self, hotspots: Vec<Hotspot>) {
        self.hotspots = hotspots;
    }

    pub fn clear(&mut self) {
        self.hotspots.clear();
    }

    pub fn len(&self) -> usize {
        self.hotspots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotspots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hotspot> {
        self.hotspots.iter()
    }

    /// Hotspots in front of the camera, in registration order.
    pub fn project(&self, camera: &CameraState, viewport_w: u32, viewport_h: u32) -> Vec<ProjectedHotspot> {
        self.hotspots
            .iter()
            .enumerate()
            .filter_map(|(index, h)| {
                let (screen_x, screen_y) = project_world_point(h.position, camera, viewport_w, viewport_h)?;
                Some(ProjectedHotspot {
                    index,
                    screen_x,
                    screen_y,
                    label: h.label.clone(),
                    target: h.target,
                })
            })
            .collect()
    }

    /// Nearest visible hotspot within `radius` (inclusive) of the click.
    /// Equal distances go to the one registered first.
    pub fn hit_test(
        &self,
        click_x: f32,
        click_y: f32,
        camera: &CameraState,
        viewport_w: u32,
        viewport_h: u32,
        radius: f32,
    ) -> Option<&Hotspot> {
        let visible = self.project(camera, viewport_w, viewport_h);
        let index = nearest_within(&visible, click_x, click_y, radius)?;
        self.hotspots.get(index)
    }
}

/// Registration index of the nearest projected hotspot within `radius`.
pub fn nearest_within(visible: &[ProjectedHotspot], click_x: f32, click_y: f32, radius: f32) -> Option<usize> {
    if !(click_x.is_finite() && click_y.is_finite()) {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for h in visible {
        let d = (h.screen_x - click_x).hypot(h.screen_y - click_y);
        if d > radius {
            continue;
        }
        // 严格小于：距离相同保留先注册的
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((h.index, d));
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 800;
    const H: u32 = 600;

    fn ahead_registry() -> HotspotRegistry {
        let mut registry = HotspotRegistry::new();
        registry.add_hotspot(Vec3::new(0.0, 0.0, 10.0), "Kitchen", NavTarget::Room(1));
        registry.add_hotspot(Vec3::new(0.0, 0.0, -10.0), "Hall", NavTarget::Room(2));
        registry
    }

    #[test]
    fn hotspots_behind_the_camera_are_not_projected() {
        let projected = ahead_registry().project(&CameraState::default(), W, H);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].label, "Kitchen");
        assert_eq!(projected[0].index, 0);
    }

    #[test]
    fn click_radius_is_inclusive_at_twenty_pixels() {
        let registry = ahead_registry();
        let camera = CameraState::default();
        let hit = registry.hit_test(400.0 + 20.0, 300.0, &camera, W, H, DEFAULT_HIT_RADIUS);
        assert_eq!(hit.map(|h| h.target), Some(NavTarget::Room(1)));
        assert!(registry.hit_test(400.0 + 21.0, 300.0, &camera, W, H, DEFAULT_HIT_RADIUS).is_none());
    }

    #[test]
    fn culled_hotspot_cannot_be_clicked() {
        let mut registry = HotspotRegistry::new();
        registry.add_hotspot(Vec3::new(0.0, 0.0, -10.0), "Hall", NavTarget::Next);
        let camera = CameraState::default();
        // 正后方的点若不剔除会投影到屏幕中心
        assert!(registry.hit_test(400.0, 300.0, &camera, W, H, 1000.0).is_none());
    }

    #[test]
    fn nearest_wins_and_ties_go_to_first_registered() {
        let mut registry = HotspotRegistry::new();
        registry.add_hotspot(Vec3::new(0.0, 0.0, 10.0), "A", NavTarget::Room(0));
        registry.add_hotspot(Vec3::new(0.0, 0.0, 20.0), "B", NavTarget::Room(1));
        let camera = CameraState::default();
        let hit = registry.hit_test(405.0, 300.0, &camera, W, H, 20.0).unwrap();
        assert_eq!(hit.label, "A");

        let visible = vec![
            ProjectedHotspot { index: 0, screen_x: 10.0, screen_y: 0.0, label: "left".into(), target: NavTarget::Previous },
            ProjectedHotspot { index: 1, screen_x: 0.0, screen_y: 0.0, label: "near".into(), target: NavTarget::Room(3) },
            ProjectedHotspot { index: 2, screen_x: -10.0, screen_y: 0.0, label: "right".into(), target: NavTarget::Next },
        ];
        assert_eq!(nearest_within(&visible, 1.0, 0.0, 20.0), Some(1));
        assert_eq!(nearest_within(&visible, 5.0, 100.0, 20.0), None);
        let tied = [visible[0].clone(), visible[2].clone()];
        assert_eq!(nearest_within(&tied, 0.0, 0.0, 20.0), Some(0));
    }

    #[test]
    fn replace_discards_the_previous_set() {
        let mut registry = ahead_registry();
        registry.replace(vec![Hotspot {
            position: Vec3::X,
            label: "Porch".into(),
            target: NavTarget::Room(0),
        }]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().map(|h| h.label.as_str()), Some("Porch"));
        registry.clear();
        assert!(registry.is_empty());
    }
}
