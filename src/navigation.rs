// navigation.rs — 房间列表、当前房间、全景图切换
//
// 切换房间是异步的：navigate_to 只发出加载请求，图片到达后（poll）才一次性
// 提交 current_index / 图片 / 热点。加载期间旧画面保持显示；
// 新请求会顶替旧请求，旧结果到达时按 ticket + room id 丢弃。

use crate::error::{Result, TourError};
use crate::hotspot::{Hotspot, HotspotRegistry, NavTarget};
use crate::panorama::PanoramaImage;
use crate::provider::{ImageProvider, ImageRequest, ImageResponse};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomDimensions {
    pub width: f32,
    pub height: f32,
}

impl Default for RoomDimensions {
    fn default() -> Self {
        Self {
            width: 4.0,
            height: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub position: Vec3,
    #[serde(default)]
    pub dimensions: RoomDimensions,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: Vec3) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            dimensions: RoomDimensions::default(),
        }
    }
}

/// Ordered rooms plus the committed index.
///
/// `current_index < rooms.len()` whenever the list is non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationState {
    rooms: Vec<Room>,
    current_index: usize,
}

impl NavigationState {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self {
            rooms,
            current_index: 0,
        }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.rooms.get(self.current_index)
    }

    fn check(&self, index: usize) -> Result<&Room> {
        self.rooms.get(index).ok_or(TourError::InvalidNavigationTarget {
            index,
            len: self.rooms.len(),
        })
    }
}

/// Notifications for the host application.
#[derive(Debug)]
pub enum NavigationEvent {
    RoomChanged { index: usize, room: Room },
    ImageLoadFailed { index: usize, room: Room, error: TourError },
}

#[derive(Debug, Clone)]
struct PendingLoad {
    ticket: u64,
    index: usize,
    room_id: String,
}

pub struct NavigationManager<P> {
    state: NavigationState,
    provider: P,
    active_image: Option<PanoramaImage>,
    hotspots: HotspotRegistry,
    pending: Option<PendingLoad>,
    next_ticket: u64,
    reply_tx: Sender<ImageResponse>,
    reply_rx: Receiver<ImageResponse>,
    events: Vec<NavigationEvent>,
}

impl<P: ImageProvider> NavigationManager<P> {
    pub fn new(provider: P) -> Self {
        let (reply_tx, reply_rx) = channel();
        Self {
            state: NavigationState::default(),
            provider,
            active_image: None,
            hotspots: HotspotRegistry::new(),
            pending: None,
            next_ticket: 0,
            reply_tx,
            reply_rx,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.state.current_room()
    }

    pub fn active_image(&self) -> Option<&PanoramaImage> {
        self.active_image.as_ref()
    }

    pub fn hotspots(&self) -> &HotspotRegistry {
        &self.hotspots
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Room a load is in flight for, if any.
    pub fn pending_index(&self) -> Option<usize> {
        self.pending.as_ref().map(|p| p.index)
    }

    /// Replaces the room list and starts loading the first room.
    ///
    /// The old image belongs to a room that no longer exists, so it is dropped
    /// together with its hotspots; the frame shows the fallback colour until
    /// the first load lands.
    pub fn set_rooms(&mut self, rooms: Vec<Room>) {
        log::info!("room list rebuilt with {} rooms", rooms.len());
        self.state = NavigationState::new(rooms);
        self.active_image = None;
        self.hotspots.clear();
        self.pending = None;
        if !self.state.is_empty() {
            // index 0 必然合法
            let _ = self.navigate_to(0);
        }
    }

    /// Adds a hotspot to the current room. The set is rebuilt on the next room switch.
    pub fn add_hotspot(&mut self, position: Vec3, label: impl Into<String>, target: NavTarget) {
        self.hotspots.add_hotspot(position, label, target);
    }

    pub fn navigate_to(&mut self, index: usize) -> Result<()> {
        let room = match self.state.check(index) {
            Ok(room) => room.clone(),
            Err(e) => {
                log::debug!("ignoring navigation: {e}");
                return Err(e);
            }
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        if let Some(old) = self.pending.replace(PendingLoad {
            ticket,
            index,
            room_id: room.id.clone(),
        }) {
            log::debug!("load #{} for `{}` superseded by #{ticket}", old.ticket, old.room_id);
        }
        log::debug!("requesting panorama #{ticket} for `{}`", room.id);
        self.provider
            .request_image(ImageRequest { ticket, room }, self.reply_tx.clone());

        // 同步 provider 会立即回复
        self.poll();
        Ok(())
    }

    pub fn navigate_to_room_id(&mut self, room_id: &str) -> Result<()> {
        let index = self
            .state
            .rooms()
            .iter()
            .position(|r| r.id == room_id)
            .ok_or_else(|| TourError::UnknownRoom(room_id.to_string()))?;
        self.navigate_to(index)
    }

    /// Steps forward with wraparound. No-op with fewer than two rooms.
    pub fn next(&mut self) -> bool {
        let len = self.state.len();
        if len <= 1 {
            return false;
        }
        self.navigate_to((self.target_index() + 1) % len).is_ok()
    }

    pub fn previous(&mut self) -> bool {
        let len = self.state.len();
        if len <= 1 {
            return false;
        }
        self.navigate_to((self.target_index() + len - 1) % len).is_ok()
    }

    /// Reloads the room currently shown (or being loaded).
    pub fn refresh(&mut self) -> Result<()> {
        self.navigate_to(self.target_index())
    }

    pub fn follow(&mut self, target: NavTarget) -> bool {
        match target {
            NavTarget::Room(index) => self.navigate_to(index).is_ok(),
            NavTarget::Next => self.next(),
            NavTarget::Previous => self.previous(),
        }
    }

    /// Drains finished loads without blocking. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(response) = self.reply_rx.try_recv() {
            if self.complete(response) {
                applied += 1;
            }
        }
        applied
    }

    pub fn drain_events(&mut self) -> Vec<NavigationEvent> {
        std::mem::take(&mut self.events)
    }

    fn target_index(&self) -> usize {
        self.pending_index().unwrap_or(self.state.current_index)
    }

    fn complete(&mut self, response: ImageResponse) -> bool {
        let is_current = self
            .pending
            .as_ref()
            .is_some_and(|p| p.ticket == response.ticket && p.room_id == response.room_id);
        if !is_current {
            log::debug!(
                "discarding superseded panorama #{} for `{}`",
                response.ticket,
                response.room_id
            );
            return false;
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };
        let Some(room) = self.state.rooms.get(pending.index).cloned() else {
            return false;
        };

        match response.result {
            Ok(image) => {
                log::info!(
                    "entered room `{}` ({}) with {}x{} panorama",
                    room.name,
                    room.id,
                    image.width(),
                    image.height()
                );
                self.state.current_index = pending.index;
                self.active_image = Some(image);
                self.rebuild_hotspots();
                self.events.push(NavigationEvent::RoomChanged {
                    index: pending.index,
                    room,
                });
            }
            Err(error) => {
                log::warn!("keeping previous panorama: {error}");
                self.events.push(NavigationEvent::ImageLoadFailed {
                    index: pending.index,
                    room,
                    error,
                });
            }
        }
        true
    }

    // 其他每个房间一个热点，坐标相对当前房间
    fn rebuild_hotspots(&mut self) {
        let Some(current) = self.state.current_room() else {
            self.hotspots.clear();
            return;
        };
        let origin = current.position;
        let hotspots: Vec<Hotspot> = self
            .state
            .rooms()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.state.current_index)
            .map(|(i, room)| Hotspot {
                position: room.position - origin,
                label: room.name.clone(),
                target: NavTarget::Room(i),
            })
            .collect();
        self.hotspots.replace(hotspots);
    }
}
