//! Textured quad demo: owns every GPU object and drives the frame loop

use ash::vk;
use glfw::{Action, Key, WindowEvent};
use thiserror::Error;
use vulkan_rhi::assets::ImageData;
use vulkan_rhi::config::{ConfigError, RendererConfig, ShaderConfig};
use vulkan_rhi::vulkan::{
    BoundTexture, FrameQueue, Framebuffer, GraphicsPipeline, IndexBuffer, PerImage, RenderPass, SamplerDesc,
    ScopedFrame, ShaderModule, ShaderResources, Swapchain, TextureLoader, UniformBuffer, VertexBuffer, VulkanContext,
    VulkanError, VulkanResult, Window, WindowError,
};

use crate::scene::{QuadParameters, Vertex, QUAD_INDICES, QUAD_VERTICES};
use crate::ubo::{Tint, Transform};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Window creation or surface failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Any Vulkan failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Bad configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The demo. Fields drop top to bottom, which is the teardown order:
/// per-image resources, pipeline, swapchain, device, window.
pub struct QuadApp {
    frame_queue: FrameQueue,
    shader_resources: ShaderResources,
    pipeline: GraphicsPipeline,
    framebuffers: PerImage<Framebuffer>,
    render_pass: RenderPass,
    tints: PerImage<UniformBuffer<Tint>>,
    transforms: PerImage<UniformBuffer<Transform>>,
    texture: BoundTexture,
    indices: IndexBuffer<u16>,
    vertices: VertexBuffer<Vertex>,
    swapchain: Swapchain,
    context: VulkanContext,
    window: Window,
    config: RendererConfig,
}

impl QuadApp {
    /// Bring up the window, device and every resource the quad needs
    pub fn new(config: RendererConfig) -> Result<Self, AppError> {
        log::info!("Creating window...");
        let window = Window::new(&config.window)?;

        log::info!("Creating Vulkan context...");
        let context = VulkanContext::new(&window, &config)?;
        let swapchain = Swapchain::new(&context, window.framebuffer_extent())?;
        let image_count = swapchain.image_count();

        let frame_queue = FrameQueue::new(&context, image_count, config.max_frames_in_flight)?;

        let vertices = VertexBuffer::from_data(&context, &frame_queue, &QUAD_VERTICES)?;
        let indices = IndexBuffer::from_data(&context, &frame_queue, &QUAD_INDICES)?;
        let texture = load_texture(&context, &frame_queue, &config)?;

        let transforms = UniformBuffer::per_image(&context, image_count, Transform::at_time(0.0, aspect(&swapchain)))?;
        let tints = UniformBuffer::per_image(&context, image_count, Tint::default())?;

        let shader_resources = create_shader_resources(&context, image_count, &transforms, &texture, &tints)?;

        let render_pass = RenderPass::new_present_pass(context.raw_device(), swapchain.format().format)?;
        let pipeline = create_pipeline(&context, &render_pass, &config.shaders, &shader_resources)?;
        let framebuffers = Framebuffer::for_swapchain(context.device(), &render_pass, &swapchain)?;

        let mut app = Self {
            frame_queue,
            shader_resources,
            pipeline,
            framebuffers,
            render_pass,
            tints,
            transforms,
            texture,
            indices,
            vertices,
            swapchain,
            context,
            window,
            config,
        };
        app.record_commands()?;

        log::info!("Quad demo initialized with {} swapchain images", image_count);
        Ok(app)
    }

    /// Run until the window closes
    pub fn run(&mut self) -> Result<(), AppError> {
        while !self.window.should_close() {
            for event in self.window.poll_events() {
                if let WindowEvent::Key(Key::Escape, _, Action::Press, _) = event {
                    self.window.set_should_close(true);
                }
            }

            if self.window.take_resized() {
                self.recreate_swapchain()?;
                continue;
            }

            match self.draw_frame() {
                Ok(()) => {}
                Err(VulkanError::PresentationStale) => self.recreate_swapchain()?,
                Err(e) => return Err(e.into()),
            }
        }

        self.frame_queue.wait_idle()?;
        log::info!("Frame loop finished");
        Ok(())
    }

    fn draw_frame(&mut self) -> VulkanResult<()> {
        let seconds = self.window.time() as f32;
        let aspect = aspect(&self.swapchain);

        let frame = ScopedFrame::begin(&mut self.frame_queue, &mut self.swapchain)?;
        self.transforms
            .get_mut(frame.image_index())?
            .modify_and_sync(|transform| *transform = Transform::at_time(seconds, aspect))?;
        frame.finish()
    }

    fn record_commands(&mut self) -> VulkanResult<()> {
        let extent = self.swapchain.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: CLEAR_COLOR },
        }];

        let render_pass = self.render_pass.handle();
        let pipeline = self.pipeline.handle();
        let pipeline_layout = self.pipeline.layout();
        let framebuffers = &self.framebuffers;
        let shader_resources = &self.shader_resources;
        let vertices = &self.vertices;
        let indices = &self.indices;

        self.frame_queue.prepare_frame_commands(|image_index, recorder| {
            let framebuffer = framebuffers.get(image_index)?.handle();
            let descriptor_set = shader_resources.set(image_index)?;

            let mut pass = recorder.begin_render_pass(render_pass, framebuffer, render_area, &clear_values)?;
            pass.cmd_bind_pipeline(pipeline);
            pass.set_viewport(&viewport);
            pass.set_scissor(&render_area);
            pass.cmd_bind_vertex_buffers(0, &[vertices.handle()], &[0]);
            pass.cmd_bind_index_buffer(indices.handle(), 0, indices.index_type());
            pass.cmd_bind_descriptor_sets(pipeline_layout, &[descriptor_set]);
            pass.cmd_draw_indexed(indices.index_count(), 1, 0, 0, 0);
            Ok(())
        })
    }

    /// Rebuild everything sized by the swapchain. Blocks while the window
    /// is minimized.
    fn recreate_swapchain(&mut self) -> Result<(), AppError> {
        let mut extent = self.window.framebuffer_extent();
        while extent.width == 0 || extent.height == 0 {
            if self.window.should_close() {
                return Ok(());
            }
            self.window.wait_events();
            extent = self.window.framebuffer_extent();
        }

        self.frame_queue.wait_idle()?;
        let previous_format = self.swapchain.format().format;
        self.swapchain.recreate(&self.context, extent)?;
        let image_count = self.swapchain.image_count();

        if self.swapchain.format().format != previous_format {
            log::info!("Surface format changed, rebuilding render pass and pipeline");
            self.render_pass = RenderPass::new_present_pass(self.context.raw_device(), self.swapchain.format().format)?;
            self.pipeline =
                create_pipeline(&self.context, &self.render_pass, &self.config.shaders, &self.shader_resources)?;
        }

        self.framebuffers = Framebuffer::for_swapchain(self.context.device(), &self.render_pass, &self.swapchain)?;

        if image_count != self.transforms.len() {
            log::info!("Swapchain image count changed to {}", image_count);
            self.transforms = UniformBuffer::per_image(&self.context, image_count, *self.transforms.get(0)?.value())?;
            self.tints = UniformBuffer::per_image(&self.context, image_count, Tint::default())?;
            self.shader_resources =
                create_shader_resources(&self.context, image_count, &self.transforms, &self.texture, &self.tints)?;
        }

        self.frame_queue.reset_frame_commands(image_count)?;
        self.record_commands()?;
        Ok(())
    }
}

fn aspect(swapchain: &Swapchain) -> f32 {
    let extent = swapchain.extent();
    extent.width as f32 / extent.height.max(1) as f32
}

fn load_texture(context: &VulkanContext, queue: &FrameQueue, config: &RendererConfig) -> VulkanResult<BoundTexture> {
    let loader = TextureLoader::new(context, queue);

    let image = match &config.texture_path {
        Some(path) => match ImageData::from_file(path) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Falling back to checkerboard texture: {}", e);
                checkerboard()
            }
        },
        None => checkerboard(),
    };

    loader.bound_from_image_data(&image, &SamplerDesc::default())
}

fn checkerboard() -> ImageData {
    ImageData::checkerboard(256, 256, 32, [230, 230, 230, 255], [40, 40, 40, 255])
}

fn create_shader_resources(
    context: &VulkanContext,
    image_count: usize,
    transforms: &PerImage<UniformBuffer<Transform>>,
    texture: &BoundTexture,
    tints: &PerImage<UniformBuffer<Tint>>,
) -> VulkanResult<ShaderResources> {
    let parameters = QuadParameters {
        transforms,
        texture,
        tints,
    };
    let resources = ShaderResources::new::<QuadParameters>(context, image_count)?;
    resources.write_all(&parameters)?;
    Ok(resources)
}

fn create_pipeline(
    context: &VulkanContext,
    render_pass: &RenderPass,
    shaders: &ShaderConfig,
    shader_resources: &ShaderResources,
) -> VulkanResult<GraphicsPipeline> {
    let vertex_shader = ShaderModule::from_file(context.raw_device(), &shaders.vertex_shader_path)?;
    let fragment_shader = ShaderModule::from_file(context.raw_device(), &shaders.fragment_shader_path)?;

    GraphicsPipeline::new::<Vertex>(
        context.raw_device(),
        render_pass.handle(),
        &vertex_shader,
        &fragment_shader,
        &[shader_resources.layout()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_fallback_size() {
        let image = checkerboard();
        assert_eq!((image.width, image.height), (256, 256));
        assert_eq!(image.size_bytes(), 256 * 256 * 4);
    }
}
