//! Quad demo application
//!
//! Draws a textured, vertex-colored quad spinning about its normal, using
//! one uniform buffer per swapchain image and the frame queue to pace the CPU.

mod app;
mod scene;
mod ubo;

use std::path::Path;

use vulkan_rhi::config::{Config, RendererConfig, ShaderConfig};
use vulkan_rhi::foundation::logging;

use app::QuadApp;

const CONFIG_PATH: &str = "quad_app.toml";

fn load_config() -> Result<RendererConfig, Box<dyn std::error::Error>> {
    if Path::new(CONFIG_PATH).exists() {
        return Ok(RendererConfig::load_from_file(CONFIG_PATH)?);
    }

    Ok(RendererConfig::new("Quad Demo")
        .with_shaders(ShaderConfig::with_path_resolution("quad_vert.spv", "quad_frag.spv")))
}

/// Log `result`'s error against the step that produced it, then pass it on
fn log_failure<T, E: std::fmt::Display>(step: &str, result: Result<T, E>) -> Result<T, E> {
    if let Err(e) = &result {
        log::error!("Quad demo failed to {}: {}", step, e);
    }
    result
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init(&config.log_level);
    log_failure("validate configuration", config.validate())?;

    log::info!("Starting {}", config.application_name);

    let mut app = log_failure("start", QuadApp::new(config))?;
    log_failure("run", app.run())?;

    log::info!("Quad demo exited cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulkan_rhi::vulkan::VulkanError;

    #[test]
    fn test_log_failure_passes_results_through() {
        assert_eq!(log_failure::<_, String>("start", Ok(3)).unwrap(), 3);

        let err = log_failure::<(), _>("start", Err(VulkanError::PresentationStale)).unwrap_err();
        assert!(matches!(err, VulkanError::PresentationStale));
    }
}
