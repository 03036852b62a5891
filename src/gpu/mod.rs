//! GPU corner evaluation via wgpu compute (feature `gpu`).
//!
//! A compute-shader rendition of [`crate::eval::CornerEvaluator`]: the
//! octree arrays and the splat buffer are uploaded as storage buffers, one
//! thread evaluates one corner, and the slice image is read back through a
//! staging buffer. The CPU and GPU paths agree to float tolerance; the CPU
//! path remains the reference.
//!
//! # Pipeline
//!
//! 1. Generate the WGSL kernel for the configured workgroup size and shape
//! 2. Upload splats / commands / fine start table
//! 3. Dispatch `ceil(width/wgs.x) x ceil(height/wgs.y)` workgroups per slice
//! 4. Copy the output buffer to a staging buffer and map it for readback

mod shader;

pub use shader::corner_shader_source;

use glam::IVec3;
use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::eval::SliceImage;
use crate::octree::SplatOctree;
use crate::types::{EngineConfig, Grid, SplatBuffer};

/// Error type for GPU evaluation.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Failed to create a GPU adapter.
    #[error("failed to create GPU adapter")]
    NoAdapter,

    /// Failed to create a GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// Shader compilation error.
    #[error("shader compilation error: {0}")]
    ShaderCompilation(String),

    /// Buffer mapping error during readback.
    #[error("buffer mapping error: {0}")]
    BufferMapping(String),
}

/// Uniform parameters for one corner dispatch (64 bytes, 16-byte aligned).
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CornerParams {
    /// xyz = grid vertex dims, w = Morton code shift.
    grid_dims: [i32; 4],
    /// xyz = vertex-space offset, w = Z slice.
    offset: [i32; 4],
    /// x = radius cutoff, y = hits cutoff.
    cutoffs: [f32; 4],
    /// x = image width, y = image height.
    image: [u32; 4],
}

/// Persistent GPU state for repeated slice dispatches over one octree.
pub struct GpuCornerEvaluator {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    splat_buffer: wgpu::Buffer,
    command_buffer: wgpu::Buffer,
    start_buffer: wgpu::Buffer,
    dims: IVec3,
    code_shift: u32,
    hits_cutoff: u32,
    radius_cutoff: f32,
    wgs: [u32; 3],
}

impl GpuCornerEvaluator {
    /// Create a device, compile the kernel, and upload the octree and splat
    /// arrays.
    pub fn new(
        tree: &SplatOctree,
        splats: &SplatBuffer,
        grid: &Grid,
        config: &EngineConfig,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("splatfield corner device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e: wgpu::RequestDeviceError| GpuError::DeviceCreation(e.to_string()))?;

        // an invalid generated kernel must surface as an error, not a
        // device-level validation panic
        let source = corner_shader_source(config.wgs, config.shape);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("corner kernel"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::ShaderCompilation(e.to_string()));
        }

        let splat_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("splat buffer"),
            contents: splats.as_bytes(),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let command_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("command stream"),
            contents: tree.commands_bytes(),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let start_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fine start table"),
            contents: bytemuck::cast_slice(tree.start_fine()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let storage_entry = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("corner bind group layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("corner pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("corner pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("process_corners"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Ok(GpuCornerEvaluator {
            device,
            queue,
            pipeline,
            bind_group_layout,
            splat_buffer,
            command_buffer,
            start_buffer,
            dims: grid.dims(),
            code_shift: 3 * tree.subsampling(),
            hits_cutoff: config.hits_cutoff,
            radius_cutoff: config.radius_cutoff,
            wgs: config.wgs,
        })
    }

    /// Evaluate slice `z` into a padded image, offsetting local coordinates
    /// by `offset` into the splat buffer's vertex space.
    pub fn process_slice(&self, z: i32, offset: IVec3) -> Result<SliceImage, GpuError> {
        let mut image = SliceImage::padded(self.dims.x as u32, self.dims.y as u32, self.wgs);
        let width = image.width() as u32;
        let height = image.height() as u32;
        let output_size = (image.data().len() * std::mem::size_of::<f32>()) as u64;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("corner output buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("corner staging buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params = CornerParams {
            grid_dims: [self.dims.x, self.dims.y, self.dims.z, self.code_shift as i32],
            offset: [offset.x, offset.y, offset.z, z],
            cutoffs: [self.radius_cutoff, self.hits_cutoff as f32, 0.0, 0.0],
            image: [width, height, 0, 0],
        };
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("corner params"),
                contents: bytemuck::cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("corner bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.splat_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.command_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.start_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("corner encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("corner pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                width.div_ceil(self.wgs[0]),
                height.div_ceil(self.wgs[1]),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures_channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver)
            .map_err(|e| GpuError::BufferMapping(format!("channel error: {e}")))?
            .map_err(|e| GpuError::BufferMapping(format!("map error: {e:?}")))?;

        let mapped = buffer_slice.get_mapped_range();
        image.data_mut().copy_from_slice(bytemuck::cast_slice(&mapped));
        drop(mapped);
        staging_buffer.unmap();

        Ok(image)
    }
}
