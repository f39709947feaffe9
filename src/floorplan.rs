// floorplan.rs — 从户型图编辑器数据提取房间

use crate::error::Result;
use crate::navigation::{Room, RoomDimensions};
use glam::Vec3;
use serde::Deserialize;
use std::path::Path;

/// Editor canvas export. Only objects tagged with a `roomType` are rooms;
/// all other fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Floorplan {
    #[serde(default)]
    pub objects: Vec<FloorplanObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorplanObject {
    pub room_type: Option<String>,
    /// Editors emit both strings and numbers here.
    pub room_id: Option<serde_json::Value>,
    pub left: Option<f32>,
    pub top: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl Floorplan {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.objects
            .iter()
            .filter_map(|obj| obj.room_type.as_deref().map(|name| (obj, name)))
            .enumerate()
            .map(|(i, (obj, name))| Room {
                id: room_id(obj.room_id.as_ref()).unwrap_or_else(|| format!("room_{i}")),
                name: name.to_string(),
                // 平面 left/top → 场景 x/z，视线高度 y = 0
                position: Vec3::new(truthy(obj.left, 0.0), 0.0, truthy(obj.top, 0.0)),
                dimensions: RoomDimensions {
                    width: truthy(obj.width, 4.0),
                    height: truthy(obj.height, 3.0),
                },
            })
            .collect()
    }
}

fn room_id(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// 0 与缺省一样取默认值
fn truthy(v: Option<f32>, default: f32) -> f32 {
    match v {
        Some(x) if x != 0.0 && x.is_finite() => x,
        _ => default,
    }
}

/// Loads rooms from either a floorplan export (`{"objects": [...]}`) or a
/// plain JSON array of rooms.
pub fn load_rooms(path: &Path) -> Result<Vec<Room>> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(serde_json::from_value::<Floorplan>(value)?.rooms())
    }
}
