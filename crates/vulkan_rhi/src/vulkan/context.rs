//! Vulkan context management
//!
//! Instance, validation, physical device selection and logical device
//! creation. The context is created once, passed by reference to every
//! resource constructor, and dropped last.
//!
//! Device suitability and scoring are computed on plain [`DeviceCandidate`]
//! descriptions so the selection rules can be exercised without a GPU.

use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};

use crate::config::RendererConfig;
use crate::vulkan::swapchain::SurfaceSupport;
use crate::vulkan::window::Window;
use crate::vulkan::{VulkanError, VulkanResult};

/// Khronos validation layer
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Score bonus for discrete GPUs
const DISCRETE_GPU_BONUS: u32 = 1000;

const ENGINE_NAME: &str = "vulkan_rhi";

/// Requested layers that are absent from `available`
pub fn missing_layers<'a>(requested: &[&'a str], available: &[String]) -> Vec<&'a str> {
    requested
        .iter()
        .copied()
        .filter(|layer| !available.iter().any(|name| name == layer))
        .collect()
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    layers: Vec<CString>,
}

impl VulkanInstance {
    /// Create an instance with the window system's extensions and, when
    /// requested, the validation layer plus a debug messenger
    pub fn new(window: &Window, app_name: &str, app_version: (u32, u32, u32), enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {}", e)))?;

        let layers = if enable_validation {
            Self::check_validation_layers(&entry)?;
            vec![to_cstring(VALIDATION_LAYER)?]
        } else {
            Vec::new()
        };

        let app_name_cstr = to_cstring(app_name)?;
        let engine_name_cstr = to_cstring(ENGINE_NAME)?;
        let (major, minor, patch) = app_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let required_extensions = window
            .get_required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e)))?;

        let extension_cstrs = required_extensions
            .iter()
            .map(|ext| to_cstring(ext))
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut extensions: Vec<*const c_char> = extension_cstrs.iter().map(|ext| ext.as_ptr()).collect();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| VulkanError::InitializationFailed(format!("Instance creation rejected: {:?}", e)))?;

        log::info!(
            "Created Vulkan 1.2 instance for '{}' (extensions: {:?}, validation: {})",
            app_name,
            required_extensions,
            enable_validation
        );

        let debug_utils = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            layers,
        })
    }

    /// Layers enabled on the instance; the logical device enables the same
    pub fn enabled_layers(&self) -> &[CString] {
        &self.layers
    }

    fn check_validation_layers(entry: &Entry) -> VulkanResult<()> {
        let properties = entry
            .enumerate_instance_layer_properties()
            .map_err(|e| VulkanError::InitializationFailed(format!("Layer enumeration failed: {:?}", e)))?;

        let available: Vec<String> = properties
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_string_lossy().into_owned())
            .collect();

        let missing = missing_layers(&[VALIDATION_LAYER], &available);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(VulkanError::InitializationFailed(format!(
                "Validation layers requested, but not available: {:?}",
                missing
            )))
        }
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(|e| VulkanError::InitializationFailed(format!("Debug messenger setup failed: {:?}", e)))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

fn to_cstring(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|_| VulkanError::InitializationFailed(format!("Interior NUL in '{}'", value)))
}

/// Graphics and present queue family indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics operations
    pub graphics: Option<u32>,
    /// Family able to present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Search queue families, preferring one family that does both graphics
    /// and present, otherwise the first family for each
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> VulkanResult<Self>
    where
        F: FnMut(u32) -> VulkanResult<bool>,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let graphics = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = supports_present(index)?;

            if graphics && present {
                return Ok(Self {
                    graphics: Some(index),
                    present: Some(index),
                });
            }
            if graphics && indices.graphics.is_none() {
                indices.graphics = Some(index);
            }
            if present && indices.present.is_none() {
                indices.present = Some(index);
            }
        }

        Ok(indices)
    }

    /// Both families found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, for queue creation and sharing mode
    pub fn unique(&self) -> Vec<u32> {
        let set: HashSet<u32> = [self.graphics, self.present].into_iter().flatten().collect();
        let mut families: Vec<u32> = set.into_iter().collect();
        families.sort_unstable();
        families
    }
}

/// Everything device selection looks at, gathered up front
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    /// Driver-reported name
    pub name: String,
    /// Integrated, discrete, virtual...
    pub device_type: vk::PhysicalDeviceType,
    /// `limits.maxImageDimension2D`
    pub max_image_dimension_2d: u32,
    /// Geometry shader feature
    pub geometry_shader: bool,
    /// Anisotropic sampling feature
    pub sampler_anisotropy: bool,
    /// Queue family search result
    pub queue_families: QueueFamilyIndices,
    /// Swapchain extension available
    pub supports_swapchain: bool,
    /// Surface formats reported for the target surface
    pub surface_format_count: usize,
    /// Present modes reported for the target surface
    pub present_mode_count: usize,
}

impl DeviceCandidate {
    /// First unmet requirement, if any
    pub fn rejection(&self) -> Option<&'static str> {
        if self.queue_families.graphics.is_none() {
            Some("no graphics queue family")
        } else if self.queue_families.present.is_none() {
            Some("no present queue family")
        } else if !self.supports_swapchain {
            Some("swapchain extension not supported")
        } else if self.surface_format_count == 0 || self.present_mode_count == 0 {
            Some("surface reports no formats or present modes")
        } else if !self.sampler_anisotropy {
            Some("sampler anisotropy not supported")
        } else if !self.geometry_shader {
            Some("geometry shaders not supported")
        } else {
            None
        }
    }

    /// Selection score; zero means disqualified
    pub fn score(&self) -> u32 {
        if self.rejection().is_some() {
            return 0;
        }
        let mut score = self.max_image_dimension_2d;
        if self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score = score.saturating_add(DISCRETE_GPU_BONUS);
        }
        score
    }
}

/// Index of the highest scoring candidate; ties go to the earliest
pub fn select_best(candidates: &[DeviceCandidate]) -> VulkanResult<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = candidate.score();
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index).ok_or_else(|| {
        let reason = if candidates.is_empty() {
            "no Vulkan devices enumerated".to_string()
        } else {
            candidates
                .iter()
                .map(|c| format!("{}: {}", c.name, c.rejection().unwrap_or("scored zero")))
                .collect::<Vec<_>>()
                .join("; ")
        };
        VulkanError::NoSuitableDevice { reason }
    })
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Enumerate, score and pick the best device for `surface`
    pub fn select_suitable_device(instance: &Instance, surface: vk::SurfaceKHR, surface_loader: &Surface) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        let candidates = devices
            .iter()
            .map(|&device| Self::describe(instance, device, surface, surface_loader))
            .collect::<VulkanResult<Vec<_>>>()?;

        for candidate in &candidates {
            match candidate.rejection() {
                Some(reason) => log::info!("Rejected GPU {}: {}", candidate.name, reason),
                None => log::debug!("GPU {} scored {}", candidate.name, candidate.score()),
            }
        }

        let chosen = select_best(&candidates)?;
        let candidate = &candidates[chosen];
        let device = devices[chosen];

        let (graphics_family, present_family) = match candidate.queue_families {
            QueueFamilyIndices {
                graphics: Some(graphics),
                present: Some(present),
            } => (graphics, present),
            _ => {
                return Err(VulkanError::NoSuitableDevice {
                    reason: format!("{}: incomplete queue families", candidate.name),
                })
            }
        };

        log::info!("Selected GPU: {} (score {})", candidate.name, candidate.score());

        unsafe {
            Ok(Self {
                device,
                properties: instance.get_physical_device_properties(device),
                features: instance.get_physical_device_features(device),
                memory_properties: instance.get_physical_device_memory_properties(device),
                graphics_family,
                present_family,
            })
        }
    }

    fn describe(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<DeviceCandidate> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let queue_families = QueueFamilyIndices::find(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .map_err(VulkanError::Api)
        })?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }.map_err(VulkanError::Api)?;
        let supports_swapchain = extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == SwapchainLoader::name());

        let (surface_format_count, present_mode_count) = if supports_swapchain {
            let support = SurfaceSupport::query(surface_loader, device, surface)?;
            (support.formats.len(), support.present_modes.len())
        } else {
            (0, 0)
        };

        Ok(DeviceCandidate {
            name: unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            device_type: properties.device_type,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            geometry_shader: features.geometry_shader == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            queue_families,
            supports_swapchain,
            surface_format_count,
            present_mode_count,
        })
    }

    /// Graphics/present indices as a [`QueueFamilyIndices`]
    pub fn queue_families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics: Some(self.graphics_family),
            present: Some(self.present_family),
        }
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
}

impl LogicalDevice {
    /// One queue per distinct family at priority 1.0, swapchain extension,
    /// anisotropic sampling, and the instance's layers
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo, layers: &[CString]) -> VulkanResult<Self> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = physical_device
            .queue_families()
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = [SwapchainLoader::name().as_ptr()];
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true).build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device.device, &create_info, None) }
            .map_err(|e| VulkanError::InitializationFailed(format!("Logical device creation rejected: {:?}", e)))?;

        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device.present_family, 0) };

        log::info!(
            "Created logical device (graphics family {}, present family {})",
            physical_device.graphics_family,
            physical_device.present_family
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Owns instance, surface, physical and logical device.
///
/// Everything created from the context must be dropped before it.
pub struct VulkanContext {
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Bring up instance, surface and devices for `window`
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(
            window,
            &config.application_name,
            config.application_version,
            config.validation_enabled(),
        )?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let setup = PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader).and_then(
            |physical_device| {
                LogicalDevice::new(&instance.instance, &physical_device, instance.enabled_layers())
                    .map(|device| (physical_device, device))
            },
        );

        let (physical_device, device) = match setup {
            Ok(pair) => pair,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Cloned device handle for RAII wrappers
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Graphics and present family indices
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families()
    }

    /// Memory types for allocation
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Largest anisotropy a sampler may request
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.physical_device.properties.limits.max_sampler_anisotropy
    }

    /// Block until the device has no pending work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(VulkanError::Api)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
        // Fields drop in declaration order: the logical device goes before the instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn good_candidate(name: &str) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            max_image_dimension_2d: 8192,
            geometry_shader: true,
            sampler_anisotropy: true,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            supports_swapchain: true,
            surface_format_count: 2,
            present_mode_count: 1,
        }
    }

    #[test]
    fn test_prefers_family_with_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        // Family 0 cannot present, family 1 and 2 can
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i != 0)).unwrap();
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn test_falls_back_to_distinct_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert!(indices.is_complete());
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn test_present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::find(&families, |_| Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))));
    }

    #[test]
    fn test_no_present_family_means_no_suitable_device() {
        let mut a = good_candidate("GPU A");
        a.queue_families.present = None;
        let mut b = good_candidate("GPU B");
        b.queue_families.present = None;

        match select_best(&[a, b]) {
            Err(VulkanError::NoSuitableDevice { reason }) => {
                assert!(reason.contains("GPU A: no present queue family"));
                assert!(reason.contains("GPU B: no present queue family"));
            }
            other => panic!("expected NoSuitableDevice, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_device_list_is_rejected() {
        assert!(matches!(select_best(&[]), Err(VulkanError::NoSuitableDevice { .. })));
    }

    #[test]
    fn test_discrete_gpu_wins() {
        let integrated = good_candidate("integrated");
        let mut discrete = good_candidate("discrete");
        discrete.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        discrete.max_image_dimension_2d = 4096;

        assert_eq!(integrated.score(), 8192);
        assert_eq!(discrete.score(), 4096 + DISCRETE_GPU_BONUS);
        assert_eq!(select_best(&[integrated, discrete]).unwrap(), 1);
    }

    #[test]
    fn test_missing_geometry_shader_scores_zero() {
        let mut candidate = good_candidate("no-geom");
        candidate.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        candidate.geometry_shader = false;
        assert_eq!(candidate.score(), 0);
        assert!(select_best(&[candidate]).is_err());
    }

    #[test]
    fn test_each_requirement_disqualifies() {
        let mut no_swapchain = good_candidate("a");
        no_swapchain.supports_swapchain = false;
        let mut no_formats = good_candidate("b");
        no_formats.surface_format_count = 0;
        let mut no_modes = good_candidate("c");
        no_modes.present_mode_count = 0;
        let mut no_aniso = good_candidate("d");
        no_aniso.sampler_anisotropy = false;

        for candidate in [no_swapchain, no_formats, no_modes, no_aniso] {
            assert!(candidate.rejection().is_some(), "{} should be rejected", candidate.name);
            assert_eq!(candidate.score(), 0);
        }
    }

    #[test]
    fn test_ties_keep_enumeration_order() {
        let candidates = [good_candidate("first"), good_candidate("second")];
        assert_eq!(select_best(&candidates).unwrap(), 0);
    }

    #[test]
    fn test_missing_layers() {
        let available = vec!["VK_LAYER_LUNARG_monitor".to_string(), VALIDATION_LAYER.to_string()];
        assert!(missing_layers(&[VALIDATION_LAYER], &available).is_empty());
        assert_eq!(missing_layers(&[VALIDATION_LAYER], &[]), vec![VALIDATION_LAYER]);
    }
}
