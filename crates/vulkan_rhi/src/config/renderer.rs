//! Renderer configuration
//!
//! Application metadata, window geometry, shader locations and frame pacing.
//! Every field has a default so partial files are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

/// Upper bound for frames in flight
const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// Directories searched for compiled shaders, in order
const SHADER_DIRS: [&str; 4] = ["target/shaders/", "shaders/", "resources/shaders/", "./"];

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan RHI".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// SPIR-V shader locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Resolve file names against the usual shader directories, falling back
    /// to `shaders/<name>` when nothing exists yet
    pub fn with_path_resolution(vertex_name: &str, fragment_name: &str) -> Self {
        Self {
            vertex_shader_path: resolve_shader(vertex_name),
            fragment_shader_path: resolve_shader(fragment_name),
        }
    }

    /// Check that both shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.vertex_shader_path, &self.fragment_shader_path] {
            if !Path::new(path).exists() {
                return Err(ConfigError::Invalid(format!("shader not found: {}", path)));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("vert.spv", "frag.spv")
    }
}

fn resolve_shader(name: &str) -> String {
    SHADER_DIRS
        .iter()
        .map(|dir| format!("{}{}", dir, name))
        .find(|candidate| Path::new(candidate).exists())
        .unwrap_or_else(|| format!("shaders/{}", name))
}

/// Top-level renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Texture sampled by the demo quad
    pub texture_path: Option<String>,
    /// Window parameters
    pub window: WindowConfig,
    /// Shader configuration
    pub shaders: ShaderConfig,
}

impl RendererConfig {
    /// Create a configuration with defaults for everything but the name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            max_frames_in_flight: 2,
            enable_validation: None,
            log_level: "info".to_string(),
            texture_path: None,
            window: WindowConfig::default(),
            shaders: ShaderConfig::default(),
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Validation requested explicitly, otherwise on for debug builds
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Reject values the renderer cannot work with. Shader files are checked
    /// separately by [`ShaderConfig::validate`] since they may be built later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }

        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.max_frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "max_frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT_LIMIT, self.max_frames_in_flight
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Vulkan RHI Application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert!(config.validate().is_ok());
        assert!(config.shaders.vertex_shader_path.ends_with("vert.spv"));
        assert!(config.shaders.fragment_shader_path.ends_with("frag.spv"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RendererConfig::new("").validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::default().with_max_frames_in_flight(8).validate().is_ok());

        let mut config = RendererConfig::default();
        config.window.height = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_explicit_validation_flag_wins() {
        assert!(RendererConfig::default().with_validation(true).validation_enabled());
        assert!(!RendererConfig::default().with_validation(false).validation_enabled());
        assert_eq!(RendererConfig::default().validation_enabled(), cfg!(debug_assertions));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "Quad"
            max_frames_in_flight = 3

            [window]
            width = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "Quad");
        assert_eq!(config.max_frames_in_flight, 3);
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = std::env::temp_dir();
        let config = RendererConfig::new("RoundTrip")
            .with_version(2, 1, 0)
            .with_validation(false)
            .with_shaders(ShaderConfig::new("a.spv", "b.spv"));

        for name in ["vulkan_rhi_roundtrip.toml", "vulkan_rhi_roundtrip.ron"] {
            let path = dir.join(name);
            config.save_to_file(&path).unwrap();
            let loaded = RendererConfig::load_from_file(&path).unwrap();
            let _ = std::fs::remove_file(&path);

            assert_eq!(loaded.application_name, "RoundTrip");
            assert_eq!(loaded.application_version, (2, 1, 0));
            assert_eq!(loaded.enable_validation, Some(false));
            assert_eq!(loaded.shaders, ShaderConfig::new("a.spv", "b.spv"));
        }
    }

    #[test]
    fn test_missing_shader_fails_validation() {
        let shaders = ShaderConfig::new("nope/vert.spv", "nope/frag.spv");
        assert!(shaders.validate().is_err());
    }
}
