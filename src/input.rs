// input.rs — 拖拽/滚轮 → 相机增量（单指针状态机）

use crate::panorama::CameraState;
use serde::{Deserialize, Serialize};

/// Which device a pointer event came from. Touches carry the platform id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerId {
    Mouse,
    Touch(u64),
}

/// Abstract input stream consumed by [`InteractionController`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { id: PointerId, x: f32, y: f32 },
    Move { id: PointerId, x: f32, y: f32 },
    Up { id: PointerId },
    Leave { id: PointerId },
    Cancel { id: PointerId },
    Wheel { delta_y: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Radians of yaw/pitch per pixel dragged.
    pub drag_sensitivity: f32,
    /// Degrees of fov per wheel unit.
    pub zoom_sensitivity: f32,
    /// A press released within this many pixels of where it started is a click.
    pub click_slop: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            drag_sensitivity: 0.01,
            zoom_sensitivity: 0.01,
            click_slop: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        pointer: PointerId,
        last_x: f32,
        last_y: f32,
        start_x: f32,
        start_y: f32,
        max_travel: f32,
    },
}

/// Result of feeding one event.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputOutcome {
    /// The camera changed; exactly one re-render is due.
    pub redraw: bool,
    /// A press/release without meaningful movement, at this screen position.
    pub click: Option<(f32, f32)>,
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    config: InteractionConfig,
    state: DragState,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(InteractionConfig::default())
    }
}

impl InteractionController {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            state: DragState::Idle,
        }
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn handle(&mut self, event: PointerEvent, camera: &mut CameraState) -> InputOutcome {
        match event {
            PointerEvent::Down { id, x, y } => {
                self.pointer_down(id, x, y);
                InputOutcome::default()
            }
            PointerEvent::Move { id, x, y } => InputOutcome {
                redraw: self.pointer_move(id, x, y, camera),
                click: None,
            },
            PointerEvent::Up { id } => InputOutcome {
                redraw: false,
                click: self.release(id, true),
            },
            PointerEvent::Leave { id } | PointerEvent::Cancel { id } => {
                self.release(id, false);
                InputOutcome::default()
            }
            PointerEvent::Wheel { delta_y } => InputOutcome {
                redraw: self.wheel(delta_y, camera),
                click: None,
            },
        }
    }

    fn pointer_down(&mut self, id: PointerId, x: f32, y: f32) {
        if !(x.is_finite() && y.is_finite()) {
            log::warn!("ignoring pointer down at non-finite position ({x}, {y})");
            return;
        }
        match self.state {
            DragState::Idle => {
                log::debug!("drag start {id:?} at ({x}, {y})");
                self.state = DragState::Dragging {
                    pointer: id,
                    last_x: x,
                    last_y: y,
                    start_x: x,
                    start_y: y,
                    max_travel: 0.0,
                };
            }
            // 单指针模型：第二个指针（第二根手指）忽略
            DragState::Dragging { pointer, .. } => {
                log::debug!("ignoring {id:?} down while {pointer:?} drags");
            }
        }
    }

    fn pointer_move(&mut self, id: PointerId, x: f32, y: f32, camera: &mut CameraState) -> bool {
        let DragState::Dragging {
            pointer,
            last_x,
            last_y,
            start_x,
            start_y,
            max_travel,
        } = self.state
        else {
            return false;
        };
        if pointer != id {
            return false;
        }
        if !(x.is_finite() && y.is_finite()) {
            log::warn!("ignoring pointer move to non-finite position ({x}, {y})");
            return false;
        }

        let dx = x - last_x;
        let dy = y - last_y;
        let sensitivity = self.config.drag_sensitivity;
        let yaw_changed = camera.apply_yaw_delta(dx * sensitivity);
        let pitch_changed = camera.apply_pitch_delta(dy * sensitivity);

        let travel = ((x - start_x).powi(2) + (y - start_y).powi(2)).sqrt();
        self.state = DragState::Dragging {
            pointer,
            last_x: x,
            last_y: y,
            start_x,
            start_y,
            max_travel: max_travel.max(travel),
        };
        yaw_changed || pitch_changed
    }

    fn release(&mut self, id: PointerId, may_click: bool) -> Option<(f32, f32)> {
        let DragState::Dragging {
            pointer,
            last_x,
            last_y,
            max_travel,
            ..
        } = self.state
        else {
            return None;
        };
        if pointer != id {
            return None;
        }
        log::debug!("drag end {id:?}");
        self.state = DragState::Idle;
        (may_click && max_travel <= self.config.click_slop).then_some((last_x, last_y))
    }

    fn wheel(&mut self, delta_y: f32, camera: &mut CameraState) -> bool {
        camera.apply_fov_delta(delta_y * self.config.zoom_sensitivity)
    }
}
