pub mod cpu;
pub mod frame;
pub mod gpu;
pub mod kaleidoscope;
pub mod pipeline;

use anyhow::Result;
use bytemuck;
use wgpu;

use crate::uniforms::FrameInput;
use frame::{FrameTarget, TEXTURE_FORMAT};
use gpu::GpuContext;
use pipeline::{FrameUniforms, RenderPipeline, AUDIO_BUFFER_SIZE, KALEIDOSCOPE_WGSL};

/// Turns a `FrameInput` into RGBA8 pixels, rows top to bottom.
pub enum Renderer {
    Cpu { width: u32, height: u32 },
    Gpu(GpuRenderer),
}

impl Renderer {
    pub fn cpu(width: u32, height: u32) -> Self {
        log::info!("Render backend: cpu ({} threads)", rayon::current_num_threads());
        Renderer::Cpu { width, height }
    }

    pub fn gpu(width: u32, height: u32) -> Result<Self> {
        log::info!("Render backend: gpu");
        Ok(Renderer::Gpu(GpuRenderer::new(width, height)?))
    }

    pub fn render(&self, input: &FrameInput) -> Result<Vec<u8>> {
        match self {
            Renderer::Cpu { width, height } => Ok(cpu::render_frame(input, *width, *height)),
            Renderer::Gpu(gpu) => gpu.render(input),
        }
    }
}

pub struct GpuRenderer {
    gpu: GpuContext,
    pipeline: RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    audio_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    target: FrameTarget,
}

impl GpuRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let gpu = GpuContext::new()?;
        let pipeline = RenderPipeline::new(&gpu.device, KALEIDOSCOPE_WGSL, TEXTURE_FORMAT)?;

        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let audio_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("audio_buffer"),
            size: AUDIO_BUFFER_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kaleidoscope_bind_group"),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: audio_buffer.as_entire_binding(),
                },
            ],
        });

        let target = FrameTarget::new(&gpu, width, height);

        Ok(Self {
            gpu,
            pipeline,
            uniform_buffer,
            audio_buffer,
            bind_group,
            target,
        })
    }

    pub fn render(&self, input: &FrameInput) -> Result<Vec<u8>> {
        let uniforms = FrameUniforms::from_input(input);
        let audio = input.audio_texture.normalized();
        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        self.gpu
            .queue
            .write_buffer(&self.audio_buffer, 0, bytemuck::cast_slice(audio.as_slice()));
        self.target.draw(&self.gpu, &self.pipeline.pipeline, &self.bind_group)
    }
}
