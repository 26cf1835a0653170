//! Scene configuration
//!
//! Render and finish options for one scene. Loaded from TOML or JSON and
//! validated before a scene is built with it.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::color::{DEFAULT_COLOR, DEFAULT_TRANSPARENT_ALPHA_THRESHOLD};
use crate::constants::smoothing::DEFAULT_SMOOTH_ANGLE_DEGREES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown config format for {path}, expected .toml or .json")]
    UnknownFormat { path: String },

    #[error("rejected config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Honor back-face culling information
    pub bfc: bool,
    /// Bake the instances of every part into the part
    pub flatten_parts: bool,
    pub smooth_curves: bool,
    /// Largest angle between facets that still get one shared normal
    pub smooth_angle_degrees: f32,
    /// Colors with alpha below this go to the transparent bucket
    pub transparent_alpha_threshold: u8,
    pub sort_transparent: bool,
    /// Cutaway rendering draws transparency in its own way; no sort is run
    pub cutaway: bool,
    pub multi_threaded: bool,
    /// Cap on background workers
    pub max_workers: Option<usize>,
    /// Collect every conditional line under the root so visibility can be
    /// computed in the background
    pub flatten_conditionals: bool,
    pub show_conditional_lines: bool,
    pub show_all_conditional_lines: bool,
    /// Draw edge lines
    pub draw_lines: bool,
    pub stud_logo: bool,
    /// Gap left between neighboring parts. Zero disables the shrink.
    pub seam_width: f32,
    pub texmaps: bool,
    pub textures_after_transparent: bool,
    /// Draw lines and transparency in separate color and alpha passes
    pub save_alpha: bool,
    pub compile_parts: bool,
    pub compile_all: bool,
    pub line_width: f32,
    pub use_strips: bool,
    pub polygon_offset: bool,
    /// Color of geometry no instance colors, packed `0xRRGGBBAA`
    pub default_color: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            bfc: true,
            flatten_parts: true,
            smooth_curves: true,
            smooth_angle_degrees: DEFAULT_SMOOTH_ANGLE_DEGREES,
            transparent_alpha_threshold: DEFAULT_TRANSPARENT_ALPHA_THRESHOLD,
            sort_transparent: true,
            cutaway: false,
            multi_threaded: true,
            max_workers: None,
            flatten_conditionals: false,
            show_conditional_lines: false,
            show_all_conditional_lines: false,
            draw_lines: true,
            stud_logo: false,
            seam_width: 0.5,
            texmaps: true,
            textures_after_transparent: false,
            save_alpha: false,
            compile_parts: false,
            compile_all: false,
            line_width: 1.0,
            use_strips: true,
            polygon_offset: true,
            default_color: DEFAULT_COLOR,
        }
    }
}

impl SceneConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.smooth_angle_degrees > 0.0 && self.smooth_angle_degrees < 180.0) {
            return Err(anyhow!(
                "SceneConfig: smooth_angle_degrees {} must be inside (0, 180)",
                self.smooth_angle_degrees
            ));
        }
        if self.transparent_alpha_threshold == 0 {
            return Err(anyhow!(
                "SceneConfig: transparent_alpha_threshold 0 would make nothing transparent"
            ));
        }
        if !self.seam_width.is_finite() || self.seam_width < 0.0 {
            return Err(anyhow!("SceneConfig: seam_width {} must be >= 0", self.seam_width));
        }
        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            return Err(anyhow!("SceneConfig: line_width {} must be > 0", self.line_width));
        }
        if self.max_workers == Some(0) && self.multi_threaded {
            log::warn!("[SceneConfig] max_workers = 0 runs all background work inline");
        }
        Ok(())
    }

    /// The config itself when valid, logged at info level
    pub fn validated(self) -> std::result::Result<Self, ConfigError> {
        self.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        log::info!(
            "[SceneConfig] Configuration validated: bfc={}, smooth={} ({} deg), sort_transparent={}, workers={:?}",
            self.bfc,
            self.smooth_curves,
            self.smooth_angle_degrees,
            self.sort_transparent,
            self.max_workers
        );
        Ok(self)
    }
}

pub fn config_from_toml(text: &str) -> std::result::Result<SceneConfig, ConfigError> {
    toml::from_str::<SceneConfig>(text)?.validated()
}

pub fn config_from_json(text: &str) -> std::result::Result<SceneConfig, ConfigError> {
    serde_json::from_str::<SceneConfig>(text)?.validated()
}

/// Load a config file, choosing the format by extension
pub fn load_config(path: &Path) -> std::result::Result<SceneConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => config_from_toml(&text),
        Some("json") => config_from_json(&text),
        _ => Err(ConfigError::UnknownFormat {
            path: path.display().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = SceneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transparent_alpha_threshold, 240);
        assert_eq!(config.smooth_angle_degrees, 80.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = config_from_toml("sort_transparent = false\nmax_workers = 2\n").expect("toml");
        assert!(!config.sort_transparent);
        assert_eq!(config.max_workers, Some(2));
        assert!(config.bfc);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = config_from_json(r#"{"smooth_angle_degrees": 200.0}"#).expect_err("angle");
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(matches!(config_from_toml("bfc = 3"), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        write!(file, r#"{{"seam_width": 0.0, "compile_parts": true}}"#).expect("write");
        let config = load_config(file.path()).expect("load");
        assert_eq!(config.seam_width, 0.0);
        assert!(config.compile_parts);

        let missing = load_config(Path::new("/nonexistent/scene.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
