// config.rs — 查看器配置
//
// 配置文件查找顺序：
// - CLI: --config <path>
// - Env: PANORAMA_CONFIG
// - <exe_dir>/panorama.json
// - ./panorama.json
// 都没有则使用默认值。

use crate::error::Result;
use crate::hotspot::DEFAULT_HIT_RADIUS;
use crate::input::InteractionConfig;
use crate::panorama::DEFAULT_FOV;
use crate::projection::{FrameRenderer, SampleFilter, DEFAULT_FALLBACK_COLOR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "panorama.json";
pub const CONFIG_ENV_VAR: &str = "PANORAMA_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub drag_sensitivity: f32,
    pub zoom_sensitivity: f32,
    pub hotspot_radius: f32,
    pub click_slop: f32,
    pub initial_fov: f32,
    pub fallback_color: [u8; 4],
    pub sample_filter: SampleFilter,
    pub parallel_render: bool,
    pub max_image_dimension: u32,
    /// Fraction of the window resolution the frame is rendered at.
    pub render_scale: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let interaction = InteractionConfig::default();
        Self {
            drag_sensitivity: interaction.drag_sensitivity,
            zoom_sensitivity: interaction.zoom_sensitivity,
            hotspot_radius: DEFAULT_HIT_RADIUS,
            click_slop: interaction.click_slop,
            initial_fov: DEFAULT_FOV,
            fallback_color: DEFAULT_FALLBACK_COLOR,
            sample_filter: SampleFilter::Nearest,
            parallel_render: true,
            max_image_dimension: 8192,
            render_scale: 0.5,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config.sanitized())
    }

    /// Finds and loads the config file; any problem falls back to defaults.
    pub fn resolve() -> Self {
        let Some(path) = find_config_file(std::env::args()) else {
            return Self::default();
        };
        match Self::load(&path) {
            Ok(config) => {
                log::info!("using config {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("ignoring config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Replaces nonsensical values with defaults.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        self.drag_sensitivity = finite_or(self.drag_sensitivity, d.drag_sensitivity);
        self.zoom_sensitivity = finite_or(self.zoom_sensitivity, d.zoom_sensitivity);
        self.hotspot_radius = finite_or(self.hotspot_radius, d.hotspot_radius).max(0.0);
        self.click_slop = finite_or(self.click_slop, d.click_slop).max(0.0);
        self.initial_fov = finite_or(self.initial_fov, d.initial_fov);
        self.render_scale = if self.render_scale.is_finite() && self.render_scale > 0.0 {
            self.render_scale.clamp(0.05, 1.0)
        } else {
            d.render_scale
        };
        self
    }

    pub fn interaction(&self) -> InteractionConfig {
        InteractionConfig {
            drag_sensitivity: self.drag_sensitivity,
            zoom_sensitivity: self.zoom_sensitivity,
            click_slop: self.click_slop,
        }
    }

    pub fn renderer(&self) -> FrameRenderer {
        FrameRenderer {
            filter: self.sample_filter,
            fallback_color: self.fallback_color,
            parallel: self.parallel_render,
        }
    }
}

/// `--config <path>` wins, then the env var, then the well-known locations.
pub fn find_config_file(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    if let Some(p) = arg_value(args, "--config") {
        return Some(PathBuf::from(p));
    }

    if let Ok(v) = std::env::var(CONFIG_ENV_VAR) {
        if !v.trim().is_empty() {
            return Some(PathBuf::from(v));
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join(CONFIG_FILE_NAME);
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from(CONFIG_FILE_NAME);
    p.exists().then_some(p)
}

/// Value following `flag` in an argument list.
pub fn arg_value(args: impl IntoIterator<Item = String>, flag: &str) -> Option<String> {
    let mut it = args.into_iter();
    while let Some(a) = it.next() {
        if a == flag {
            return it.next();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: ViewerConfig = serde_json::from_str(r#"{"hotspot_radius": 32.0, "sample_filter": "bilinear"}"#).unwrap();
        assert_eq!(config.hotspot_radius, 32.0);
        assert_eq!(config.sample_filter, SampleFilter::Bilinear);
        assert_eq!(config.drag_sensitivity, 0.01);
        assert_eq!(config.initial_fov, 60.0);
    }

    #[test]
    fn sanitize_repairs_bad_values() {
        let config = ViewerConfig {
            render_scale: -2.0,
            hotspot_radius: -5.0,
            drag_sensitivity: f32::NAN,
            ..ViewerConfig::default()
        }
        .sanitized();
        assert_eq!(config.render_scale, 0.5);
        assert_eq!(config.hotspot_radius, 0.0);
        assert_eq!(config.drag_sensitivity, 0.01);
    }

    #[test]
    fn cli_flag_takes_precedence() {
        let found = find_config_file(args(&["viewer", "--config", "/tmp/custom.json"]));
        assert_eq!(found, Some(PathBuf::from("/tmp/custom.json")));
        assert_eq!(arg_value(args(&["viewer", "--config"]), "--config"), None);
    }

    #[test]
    fn load_reads_json_file() {
        let path = std::env::temp_dir().join(format!("panorama_tour_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"render_scale": 3.0, "click_slop": 2.5}"#).unwrap();
        let config = ViewerConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(config.render_scale, 1.0);
        assert_eq!(config.click_slop, 2.5);
        assert_eq!(config.interaction().click_slop, 2.5);
    }
}
