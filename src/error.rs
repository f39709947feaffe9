// error.rs — 导航/加载/输入错误

use thiserror::Error;

/// Errors surfaced by the tour engine. None of them is fatal: navigation
/// errors are ignorable, load failures keep the previous room on screen.
#[derive(Debug, Error)]
pub enum TourError {
    #[error("navigation target {index} is outside 0..{len}")]
    InvalidNavigationTarget { index: usize, len: usize },

    #[error("no room with id `{0}`")]
    UnknownRoom(String),

    #[error("failed to load panorama for room `{room_id}`: {reason}")]
    ImageLoadFailure { room_id: String, reason: String },

    #[error("degenerate input: {0}")]
    DegenerateInput(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl TourError {
    pub fn load_failure(room_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::ImageLoadFailure {
            room_id: room_id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TourError>;
