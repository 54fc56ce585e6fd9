//! Error taxonomy shared by every Vulkan wrapper in this crate

use ash::vk;
use thiserror::Error;

use crate::assets::AssetError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Startup step rejected (loader, layers, instance, device, surface, shaders)
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No enumerated physical device meets the minimum capability bar
    #[error("No suitable GPU found: {reason}")]
    NoSuitableDevice {
        /// Why each candidate was rejected
        reason: String,
    },

    /// No memory type satisfies both the requirement bitmask and the property flags
    #[error("No suitable memory type for filter {type_filter:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        /// `memoryTypeBits` reported by the resource's memory requirements
        type_filter: u32,
        /// Property flags that were requested
        properties: vk::MemoryPropertyFlags,
    },

    /// Image layout transition outside the supported table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// The surface changed and the swapchain must be recreated
    #[error("Presentation surface is out of date; swapchain needs recreation")]
    PresentationStale,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Decoding an image asset failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

impl VulkanError {
    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }

    /// Map a result code from acquire/present, folding surface staleness into
    /// [`VulkanError::PresentationStale`]
    pub fn from_presentation(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => Self::PresentationStale,
            other => Self::Api(other),
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_date_maps_to_stale() {
        assert!(matches!(
            VulkanError::from_presentation(vk::Result::ERROR_OUT_OF_DATE_KHR),
            VulkanError::PresentationStale
        ));
        assert!(matches!(
            VulkanError::from_presentation(vk::Result::SUBOPTIMAL_KHR),
            VulkanError::PresentationStale
        ));
    }

    #[test]
    fn test_other_codes_stay_api_errors() {
        assert!(matches!(
            VulkanError::from_presentation(vk::Result::ERROR_DEVICE_LOST),
            VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn test_messages_name_the_failing_step() {
        let err = VulkanError::UnsupportedTransition {
            old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        };
        let message = err.to_string();
        assert!(message.contains("SHADER_READ_ONLY_OPTIMAL"));
        assert!(message.contains("TRANSFER_DST_OPTIMAL"));

        let err = VulkanError::NoSuitableDevice { reason: "GPU0: no present queue".to_string() };
        assert!(err.to_string().contains("no present queue"));
    }
}
