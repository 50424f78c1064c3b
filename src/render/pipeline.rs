use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use wgpu;

use crate::audio::bands::TEXTURE_SIZE;
use crate::palette::MAX_COLORS;
use crate::uniforms::FrameInput;

pub const KALEIDOSCOPE_WGSL: &str = include_str!("kaleidoscope.wgsl");

/// Uniform block mirrored by `FrameUniforms` in `kaleidoscope.wgsl`.
///
/// Colour slots past `color_count` are zero and never read by the shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub sensitivity: f32,
    pub brightness: f32,
    pub beat: f32,
    pub color_count: u32,
    pub _padding: u32,
    pub colors: [[f32; 4]; MAX_COLORS],
}

impl FrameUniforms {
    pub fn from_input(input: &FrameInput) -> Self {
        let mut colors = [[0.0; 4]; MAX_COLORS];
        for (slot, c) in colors.iter_mut().zip(input.palette.colors()) {
            *slot = [c.r, c.g, c.b, 1.0];
        }
        Self {
            resolution: input.resolution,
            time: input.time,
            sensitivity: input.sensitivity,
            brightness: input.brightness,
            beat: input.beat_pulse,
            color_count: input.palette_count() as u32,
            _padding: 0,
            colors,
        }
    }
}

/// Byte size of the audio storage buffer (256 floats).
pub const AUDIO_BUFFER_SIZE: u64 = (TEXTURE_SIZE * std::mem::size_of::<f32>()) as u64;

pub struct RenderPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl RenderPipeline {
    pub fn new(device: &wgpu::Device, shader_source: &str, texture_format: wgpu::TextureFormat) -> Result<Self> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kaleidoscope_shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kaleidoscope_bind_group_layout"),
            entries: &[
                // @binding(0): FrameUniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // @binding(1): audio texture, 256 normalized floats (storage)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kaleidoscope_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("kaleidoscope_render_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::bands::AudioTexture;
    use crate::palette::{Palette, Rgb};

    #[test]
    fn uniform_block_matches_wgsl_layout() {
        // vec2 + 6 scalars = 32 bytes, then 5 x vec4 at 16-byte alignment.
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 112);
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
    }

    #[test]
    fn unused_colour_slots_stay_zero() {
        let input = FrameInput {
            time: 2.0,
            resolution: [640.0, 360.0],
            audio_texture: AudioTexture::default(),
            palette: Palette::new(vec![Rgb::new(1.0, 0.5, 0.25)]).unwrap(),
            sensitivity: 1.0,
            brightness: 1.0,
            beat_pulse: 0.0,
        };
        let uniforms = FrameUniforms::from_input(&input);
        assert_eq!(uniforms.color_count, 1);
        assert_eq!(uniforms.colors[0], [1.0, 0.5, 0.25, 1.0]);
        assert!(uniforms.colors[1..].iter().all(|c| *c == [0.0; 4]));
    }

    #[test]
    fn shader_declares_both_entry_points() {
        assert!(KALEIDOSCOPE_WGSL.contains("fn vs_main"));
        assert!(KALEIDOSCOPE_WGSL.contains("fn fs_main"));
    }
}
