//! Panoramic room-to-room tour engine.
//!
//! Projects an equirectangular image onto a perspective viewport under
//! drag/wheel control, overlays navigation hotspots and switches rooms
//! when one is clicked. Rendering happens on the CPU into an RGBA buffer;
//! the `gui` binary shows it in a window.

pub mod config;
pub mod error;
pub mod floorplan;
pub mod geometry;
pub mod hotspot;
pub mod input;
pub mod navigation;
pub mod panorama;
pub mod projection;
pub mod provider;
pub mod tour;

pub use config::ViewerConfig;
pub use error::{Result, TourError};
pub use floorplan::{load_rooms, Floorplan};
pub use hotspot::{Hotspot, HotspotRegistry, NavTarget, ProjectedHotspot};
pub use input::{InputOutcome, InteractionConfig, InteractionController, PointerEvent, PointerId};
pub use navigation::{NavigationEvent, NavigationManager, NavigationState, Room, RoomDimensions};
pub use panorama::{CameraState, PanoramaImage};
pub use projection::{project_world_point, render_frame, FrameRenderer, PixelBuffer, SampleFilter};
pub use provider::{
    FallbackProvider, FileImageProvider, ImageProvider, ImageRequest, ImageResponse, SyntheticImageProvider,
    ThreadedProvider,
};
pub use tour::{Frame, PointerOutcome, Tour};
