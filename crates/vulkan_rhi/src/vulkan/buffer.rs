//! Buffer management for vertex data and uniforms
//!
//! Every buffer owns its memory. Device-local vertex and index data is
//! uploaded through a short-lived [`StagingBuffer`] and a one-shot copy;
//! uniform buffers stay host-visible and are rewritten in full on sync.

use std::marker::PhantomData;
use std::mem;

use ash::{vk, Device};
use bytemuck::Pod;

use crate::vulkan::commands::ExecuteDirectly;
use crate::vulkan::context::VulkanContext;
use crate::vulkan::per_image::PerImage;
use crate::vulkan::{VulkanError, VulkanResult};

/// Index of the first memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = memory_properties.memory_type_count as usize;

    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, memory_type)| type_filter & (1 << i) != 0 && memory_type.property_flags.contains(properties))
        .map(|(i, _)| i as u32)
        .ok_or(VulkanError::NoSuitableMemoryType { type_filter, properties })
}

/// Mapping is only valid on host-visible memory
pub fn ensure_host_visible(properties: vk::MemoryPropertyFlags) -> VulkanResult<()> {
    if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        Ok(())
    } else {
        Err(VulkanError::invalid(format!(
            "cannot map buffer memory with properties {:?}",
            properties
        )))
    }
}

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory with `properties`
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::invalid("buffer size must be non-zero"));
        }

        let device = context.raw_device();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.map_err(VulkanError::Api)?;

        match Self::allocate_and_bind(&device, context.memory_properties(), buffer, properties) {
            Ok((memory, memory_type)) => {
                log::debug!(
                    "Allocated buffer: {} bytes, usage {:?}, memory type {}",
                    size,
                    usage,
                    memory_type
                );
                Ok(Self {
                    device,
                    buffer,
                    memory,
                    size,
                    usage,
                    properties,
                })
            }
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    fn allocate_and_bind(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        buffer: vk::Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<(vk::DeviceMemory, u32)> {
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type = find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)?;

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { device.free_memory(memory, None) };
            return Err(VulkanError::Api(e));
        }

        Ok((memory, memory_type))
    }

    /// Copy `bytes` to the start of the buffer. Memory must be host-visible.
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        ensure_host_visible(self.properties)?;
        let len = bytes.len() as vk::DeviceSize;
        if len > self.size {
            return Err(VulkanError::invalid(format!(
                "write of {} bytes exceeds buffer size {}",
                len, self.size
            )));
        }
        if len == 0 {
            return Ok(());
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Write a slice of plain data
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        self.write_bytes(bytemuck::cast_slice(data))
    }

    /// Read the whole buffer back. Memory must be host-visible.
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        ensure_host_visible(self.properties)?;
        let mut bytes = vec![0u8; self.size as usize];
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), bytes.as_mut_ptr(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(bytes)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Memory properties the backing allocation was requested with
    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Copy the first `size` bytes of `src` into `dst` and wait for completion
pub fn copy_buffer(executor: &impl ExecuteDirectly, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
    if size > src.size() || size > dst.size() {
        return Err(VulkanError::invalid(format!(
            "copy of {} bytes exceeds source ({}) or destination ({})",
            size,
            src.size(),
            dst.size()
        )));
    }

    let region = vk::BufferCopy::builder().size(size).build();
    executor.execute_directly(|recorder| recorder.cmd_copy_buffer(src.handle(), dst.handle(), &[region]))
}

/// Host-visible transfer source, filled once and discarded after the copy
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a staging buffer holding `bytes`
    pub fn new(context: &VulkanContext, bytes: &[u8]) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_bytes(bytes)?;
        Ok(Self { buffer })
    }

    /// Copy the staged bytes into `dst`
    pub fn copy_to_buffer(&self, executor: &impl ExecuteDirectly, dst: &Buffer) -> VulkanResult<()> {
        copy_buffer(executor, &self.buffer, dst, self.buffer.size())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Create a device-local buffer and fill it from `bytes` through staging
fn upload_device_local(
    context: &VulkanContext,
    executor: &impl ExecuteDirectly,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> VulkanResult<Buffer> {
    let staging = StagingBuffer::new(context, bytes)?;
    let buffer = Buffer::new(
        context,
        staging.size(),
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    staging.copy_to_buffer(executor, &buffer)?;
    log::debug!("Uploaded {} bytes through staging", bytes.len());
    Ok(buffer)
}

/// Element type of an index buffer
pub trait IndexElement: Pod {
    /// Matching Vulkan index type
    const INDEX_TYPE: vk::IndexType;
}

impl IndexElement for u16 {
    const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;
}

impl IndexElement for u32 {
    const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT32;
}

/// Device-local vertex buffer of `V`
pub struct VertexBuffer<V: Pod> {
    buffer: Buffer,
    vertex_count: u32,
    _marker: PhantomData<V>,
}

impl<V: Pod> VertexBuffer<V> {
    /// Upload `vertices` through a staging buffer
    pub fn from_data(context: &VulkanContext, executor: &impl ExecuteDirectly, vertices: &[V]) -> VulkanResult<Self> {
        let buffer = upload_device_local(
            context,
            executor,
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
            _marker: PhantomData,
        })
    }

    /// Uninitialized buffer with room for `vertex_count` vertices, to be
    /// filled by a later transfer
    pub fn with_capacity(context: &VulkanContext, vertex_count: u32) -> VulkanResult<Self> {
        let size = vertex_count as vk::DeviceSize * mem::size_of::<V>() as vk::DeviceSize;
        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        Ok(Self {
            buffer,
            vertex_count,
            _marker: PhantomData,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Underlying buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

/// Device-local index buffer of `I`
pub struct IndexBuffer<I: IndexElement> {
    buffer: Buffer,
    index_count: u32,
    _marker: PhantomData<I>,
}

impl<I: IndexElement> IndexBuffer<I> {
    /// Upload `indices` through a staging buffer
    pub fn from_data(context: &VulkanContext, executor: &impl ExecuteDirectly, indices: &[I]) -> VulkanResult<Self> {
        let buffer = upload_device_local(
            context,
            executor,
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
            _marker: PhantomData,
        })
    }

    /// Uninitialized buffer with room for `index_count` indices
    pub fn with_capacity(context: &VulkanContext, index_count: u32) -> VulkanResult<Self> {
        let size = index_count as vk::DeviceSize * mem::size_of::<I>() as vk::DeviceSize;
        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        Ok(Self {
            buffer,
            index_count,
            _marker: PhantomData,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get index count
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Index type to bind with
    pub fn index_type(&self) -> vk::IndexType {
        I::INDEX_TYPE
    }
}

/// Uniform buffer with a CPU-side mirror of its contents
pub struct UniformBuffer<T: Pod> {
    buffer: Buffer,
    value: T,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create a host-visible uniform buffer holding `initial`
    pub fn new(context: &VulkanContext, initial: T) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let uniform = Self { buffer, value: initial };
        uniform.sync()?;
        Ok(uniform)
    }

    /// One uniform buffer per swapchain image, all starting from `initial`
    pub fn per_image(context: &VulkanContext, image_count: usize, initial: T) -> VulkanResult<PerImage<Self>> {
        PerImage::try_from_fn(image_count, |_| Self::new(context, initial))
    }

    /// CPU-side value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Mutable CPU-side value; call [`UniformBuffer::sync`] to upload it
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Upload the full CPU-side value
    pub fn sync(&self) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(&self.value))
    }

    /// Mutate the CPU-side value, then upload it
    pub fn modify_and_sync<F: FnOnce(&mut T)>(&mut self, modify: F) -> VulkanResult<()> {
        modify(&mut self.value);
        self.sync()
    }

    /// Whole-buffer descriptor info for binding
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer.handle(),
            offset: 0,
            range: self.buffer.size(),
        }
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (slot, &flags) in properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        properties
    }

    const HOST: vk::MemoryPropertyFlags =
        vk::MemoryPropertyFlags::from_raw(vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw());

    #[test]
    fn test_uniform_buffer_memory_found() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, HOST]);
        let index = find_memory_type(&properties, 0b11, HOST).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_type_filter_respected() {
        let properties = memory_properties(&[HOST, HOST | vk::MemoryPropertyFlags::HOST_CACHED]);
        assert_eq!(find_memory_type(&properties, 0b10, HOST).unwrap(), 1);
    }

    #[test]
    fn test_no_matching_type_is_error() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&properties, 0b1, HOST).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::NoSuitableMemoryType { type_filter: 0b1, properties } if properties == HOST
        ));
    }

    #[test]
    fn test_types_beyond_count_ignored() {
        let mut properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        properties.memory_types[1].property_flags = HOST;
        assert!(find_memory_type(&properties, 0b11, HOST).is_err());
    }

    #[test]
    fn test_device_local_memory_cannot_be_mapped() {
        let err = ensure_host_visible(vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap_err();
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));
        assert!(ensure_host_visible(HOST).is_ok());
        assert!(ensure_host_visible(vk::MemoryPropertyFlags::HOST_VISIBLE).is_ok());
    }

    #[test]
    fn test_index_types() {
        assert_eq!(<u16 as IndexElement>::INDEX_TYPE, vk::IndexType::UINT16);
        assert_eq!(<u32 as IndexElement>::INDEX_TYPE, vk::IndexType::UINT32);
    }

    #[test]
    #[ignore = "requires a Vulkan device and a display"]
    fn test_staging_upload_round_trip() {
        use crate::config::{RendererConfig, WindowConfig};
        use crate::vulkan::frame_queue::FrameQueue;
        use crate::vulkan::window::Window;

        let window = Window::new(&WindowConfig::default()).unwrap();
        let context = VulkanContext::new(&window, &RendererConfig::default()).unwrap();
        let queue = FrameQueue::new(&context, 1, 1).unwrap();

        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let vertices = VertexBuffer::from_data(&context, &queue, &data).unwrap();

        let readback = Buffer::new(
            &context,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        copy_buffer(&queue, vertices.buffer(), &readback, data.len() as vk::DeviceSize).unwrap();

        assert_eq!(readback.read_bytes().unwrap(), data);
    }
}
