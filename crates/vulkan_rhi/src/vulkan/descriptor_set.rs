//! Descriptor set layouts, pools and writes derived from a shader's
//! parameter type
//!
//! A shader parameter type declares its bindings once, as an ordered
//! [`BindingTable`] of `(slot, kind, stages)` entries. The layout, the pool
//! sizes and the per-image descriptor writes are all generated from that
//! table, so binding numbers never depend on struct field order.
//!
//! ```ignore
//! impl ShaderParameters for QuadParameters {
//!     fn bindings() -> BindingTable {
//!         BindingTable::new()
//!             .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
//!             .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
//!     }
//!     // ...
//! }
//! ```

use std::collections::HashSet;

use ash::{vk, Device};

use crate::vulkan::context::VulkanContext;
use crate::vulkan::per_image::PerImage;
use crate::vulkan::{VulkanError, VulkanResult};

/// What a binding slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `UNIFORM_BUFFER`
    UniformBuffer,
    /// `COMBINED_IMAGE_SAMPLER`
    CombinedImageSampler,
}

impl ResourceKind {
    /// Vulkan descriptor type for this kind
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            ResourceKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            ResourceKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// One declared binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDecl {
    /// Binding number in the shader
    pub slot: u32,
    /// Resource type at the slot
    pub kind: ResourceKind,
    /// Stages that read the binding
    pub stages: vk::ShaderStageFlags,
}

/// Ordered binding declarations of a shader parameter type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    bindings: Vec<BindingDecl>,
}

impl BindingTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a uniform buffer at `slot`
    pub fn uniform_buffer(self, slot: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with(BindingDecl {
            slot,
            kind: ResourceKind::UniformBuffer,
            stages,
        })
    }

    /// Declare a combined image sampler at `slot`
    pub fn combined_image_sampler(self, slot: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with(BindingDecl {
            slot,
            kind: ResourceKind::CombinedImageSampler,
            stages,
        })
    }

    /// Append a declaration
    pub fn with(mut self, decl: BindingDecl) -> Self {
        self.bindings.push(decl);
        self
    }

    /// Declarations in order
    pub fn bindings(&self) -> &[BindingDecl] {
        &self.bindings
    }

    /// Number of declared bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True when nothing is declared
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Reject duplicate slots and bindings visible to no stage
    pub fn validate(&self) -> VulkanResult<()> {
        let mut seen = HashSet::new();
        for decl in &self.bindings {
            if !seen.insert(decl.slot) {
                return Err(VulkanError::invalid(format!("binding slot {} declared twice", decl.slot)));
            }
            if decl.stages.is_empty() {
                return Err(VulkanError::invalid(format!("binding slot {} has no shader stages", decl.slot)));
            }
        }
        Ok(())
    }

    /// Descriptor set layout bindings, one descriptor each
    pub fn layout_bindings(&self) -> VulkanResult<Vec<vk::DescriptorSetLayoutBinding>> {
        self.validate()?;
        Ok(self
            .bindings
            .iter()
            .map(|decl| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(decl.slot)
                    .descriptor_type(decl.kind.descriptor_type())
                    .descriptor_count(1)
                    .stage_flags(decl.stages)
                    .build()
            })
            .collect())
    }

    /// One pool size per distinct kind, in first-declared order, sized for
    /// one descriptor set per swapchain image
    pub fn pool_sizes(&self, image_count: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<(ResourceKind, u32)> = Vec::new();
        for decl in &self.bindings {
            match sizes.iter_mut().find(|(kind, _)| *kind == decl.kind) {
                Some((_, count)) => *count += 1,
                None => sizes.push((decl.kind, 1)),
            }
        }

        sizes
            .into_iter()
            .map(|(kind, count)| vk::DescriptorPoolSize {
                ty: kind.descriptor_type(),
                descriptor_count: count * image_count,
            })
            .collect()
    }
}

/// Concrete resource bound to one slot
#[derive(Debug, Clone, Copy)]
pub enum BoundResource {
    /// Uniform buffer range
    Buffer(vk::DescriptorBufferInfo),
    /// Image view, sampler and layout
    Image(vk::DescriptorImageInfo),
}

impl BoundResource {
    /// Kind of slot this resource fits
    pub fn kind(&self) -> ResourceKind {
        match self {
            BoundResource::Buffer(_) => ResourceKind::UniformBuffer,
            BoundResource::Image(_) => ResourceKind::CombinedImageSampler,
        }
    }
}

/// A type describing what a shader reads through its descriptor set
pub trait ShaderParameters {
    /// Declared bindings
    fn bindings() -> BindingTable;

    /// Resources for `image_index`, one per declared binding in table order
    fn resources_for_image(&self, image_index: u32) -> VulkanResult<Vec<BoundResource>>;
}

/// Check that `resources` line up one-to-one with the table's declarations
pub fn match_resources(table: &BindingTable, resources: &[BoundResource]) -> VulkanResult<()> {
    if resources.len() != table.len() {
        return Err(VulkanError::invalid(format!(
            "{} resources supplied for {} bindings",
            resources.len(),
            table.len()
        )));
    }

    for (decl, resource) in table.bindings().iter().zip(resources) {
        if decl.kind != resource.kind() {
            return Err(VulkanError::invalid(format!(
                "binding slot {} expects {:?}, got {:?}",
                decl.slot,
                decl.kind,
                resource.kind()
            )));
        }
    }
    Ok(())
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Create a layout from `table`
    pub fn new(device: Device, table: &BindingTable) -> VulkanResult<Self> {
        let bindings = table.layout_bindings()?;
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { layout, device })
    }

    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Pool holding one set of `table` per swapchain image
    pub fn new(device: Device, table: &BindingTable, image_count: u32) -> VulkanResult<Self> {
        let pool_sizes = table.pool_sizes(image_count);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(image_count)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

        log::debug!("Created descriptor pool: {} sets, sizes {:?}", image_count, pool_sizes);
        Ok(Self { pool, device })
    }

    /// Allocate descriptor sets from this pool
    pub fn allocate_descriptor_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Batches descriptor writes and applies them in one update call
#[derive(Default)]
pub struct DescriptorSetWriter {
    pending: Vec<(vk::DescriptorSet, u32, BoundResource)>,
}

impl DescriptorSetWriter {
    /// Create a new descriptor set writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write of `resource` to `binding` of `descriptor_set`
    pub fn write(mut self, descriptor_set: vk::DescriptorSet, binding: u32, resource: BoundResource) -> Self {
        self.pending.push((descriptor_set, binding, resource));
        self
    }

    /// Apply all queued writes
    pub fn update(self, device: &Device) {
        // The write structs point into `self.pending`, which outlives the call
        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|(set, binding, resource)| {
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(resource.kind().descriptor_type());
                match resource {
                    BoundResource::Buffer(info) => write.buffer_info(std::slice::from_ref(info)).build(),
                    BoundResource::Image(info) => write.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Layout, pool and one descriptor set per swapchain image, generated
/// from a [`ShaderParameters`] type's bindings
pub struct ShaderResources {
    sets: PerImage<vk::DescriptorSet>,
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
    table: BindingTable,
    device: Device,
}

impl ShaderResources {
    /// Generate the layout and pool from `P`'s bindings and allocate one set per image
    pub fn new<P: ShaderParameters>(context: &VulkanContext, image_count: usize) -> VulkanResult<Self> {
        let device = context.raw_device();
        let table = P::bindings();
        let layout = DescriptorSetLayout::new(device.clone(), &table)?;
        let pool = DescriptorPool::new(device.clone(), &table, image_count as u32)?;

        let layouts = vec![layout.handle(); image_count];
        let sets = PerImage::new(pool.allocate_descriptor_sets(&layouts)?);

        log::info!("Allocated {} descriptor sets with {} bindings", image_count, table.len());

        Ok(Self {
            sets,
            pool,
            layout,
            table,
            device,
        })
    }

    /// Write every image's set from `parameters`, whose type must declare
    /// the bindings these resources were generated from
    pub fn write_all<P: ShaderParameters>(&self, parameters: &P) -> VulkanResult<()> {
        if P::bindings() != self.table {
            return Err(VulkanError::invalid("shader parameters do not match the descriptor layout"));
        }

        let mut writer = DescriptorSetWriter::new();

        for (image_index, &set) in self.sets.enumerate() {
            let resources = parameters.resources_for_image(image_index)?;
            match_resources(&self.table, &resources)?;

            for (decl, resource) in self.table.bindings().iter().zip(resources) {
                writer = writer.write(set, decl.slot, resource);
            }
        }

        writer.update(&self.device);
        log::debug!("Wrote descriptor sets for {} images", self.sets.len());
        Ok(())
    }

    /// Descriptor set for `image_index`
    pub fn set(&self, image_index: u32) -> VulkanResult<vk::DescriptorSet> {
        self.sets.get(image_index).copied()
    }

    /// Layout handle, for pipeline layout creation
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    /// Pool handle
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool.handle()
    }

    /// Declared bindings
    pub fn table(&self) -> &BindingTable {
        &self.table
    }

    /// Number of descriptor sets
    pub fn image_count(&self) -> usize {
        self.sets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TexturedParameters;

    impl ShaderParameters for TexturedParameters {
        fn bindings() -> BindingTable {
            BindingTable::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
        }

        fn resources_for_image(&self, _image_index: u32) -> VulkanResult<Vec<BoundResource>> {
            Ok(vec![
                BoundResource::Buffer(vk::DescriptorBufferInfo::default()),
                BoundResource::Image(vk::DescriptorImageInfo::default()),
            ])
        }
    }

    #[test]
    fn test_uniform_buffer_then_sampler_binding_order() {
        let bindings = TexturedParameters::bindings().layout_bindings().unwrap();
        assert_eq!(bindings.len(), 2);

        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[0].descriptor_count, 1);

        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let first = TexturedParameters::bindings();
        let second = TexturedParameters::bindings();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pool_sizes_scale_with_images() {
        let sizes = TexturedParameters::bindings().pool_sizes(3);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }

    #[test]
    fn test_pool_sizes_group_by_kind() {
        let table = BindingTable::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .uniform_buffer(2, vk::ShaderStageFlags::FRAGMENT);

        let sizes = table.pool_sizes(2);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 4);
        assert_eq!(sizes[1].descriptor_count, 2);
    }

    #[test]
    fn test_stages_are_taken_from_declaration() {
        let table = BindingTable::new().uniform_buffer(
            0,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        );
        let bindings = table.layout_bindings().unwrap();
        assert_eq!(
            bindings[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let table = BindingTable::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT);
        assert!(table.layout_bindings().is_err());
    }

    #[test]
    fn test_empty_stages_rejected() {
        let table = BindingTable::new().uniform_buffer(0, vk::ShaderStageFlags::empty());
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_resources_match_table() {
        let table = TexturedParameters::bindings();
        let resources = TexturedParameters.resources_for_image(0).unwrap();
        match_resources(&table, &resources).unwrap();
    }

    #[test]
    fn test_resource_kind_mismatch() {
        let table = TexturedParameters::bindings();
        let swapped = vec![
            BoundResource::Image(vk::DescriptorImageInfo::default()),
            BoundResource::Buffer(vk::DescriptorBufferInfo::default()),
        ];
        assert!(matches!(
            match_resources(&table, &swapped),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_resource_count_mismatch() {
        let table = TexturedParameters::bindings();
        let short = vec![BoundResource::Buffer(vk::DescriptorBufferInfo::default())];
        assert!(match_resources(&table, &short).is_err());
    }
}
