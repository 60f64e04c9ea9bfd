use bevy::log::debug;
use bytemuck::{
    Pod,
    Zeroable,
};
use static_assertions::const_assert_eq;
use wgpu::util::DeviceExt;

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    render::shader::{
        compile_shader,
        RADIX_SHADER,
    },
    utils::workgroup_grid,
};


pub const RADIX_BITS: u32 = 4;
pub const RADIX_WORKGROUP_SIZE: u32 = 256;
const RADIX: u32 = 1 << RADIX_BITS;


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct SortParams {
    pub count: u32,
    pub shift: u32,
    pub num_blocks: u32,
    pub _pad: u32,
}
const_assert_eq!(std::mem::size_of::<SortParams>(), 16);


pub fn num_blocks(count: u32) -> u32 {
    count.div_ceil(RADIX_WORKGROUP_SIZE)
}

pub fn pass_count(bit_count: u32) -> SplatResult<u32> {
    // an even number of 4-bit passes leaves the result in the caller's buffers
    if bit_count == 0 || bit_count > 32 || bit_count % 8 != 0 {
        return Err(SplatError::InvalidBitCount(bit_count));
    }

    Ok(bit_count / RADIX_BITS)
}


/// layout and the three compute stages shared by every [`RadixSortKernel`]
#[derive(Clone, Debug)]
pub struct RadixSortPipeline {
    pub layout: wgpu::BindGroupLayout,
    pub histogram: wgpu::ComputePipeline,
    pub scan: wgpu::ComputePipeline,
    pub scatter: wgpu::ComputePipeline,
}

impl RadixSortPipeline {
    pub async fn new(device: &wgpu::Device) -> SplatResult<Self> {
        let shader = compile_shader(device, "radix_sort", RADIX_SHADER).await?;

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("radix_sort_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<SortParams>() as u64),
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("radix_sort_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let stage = |entry_point: &'static str| device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module: &shader.module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            histogram: stage("histogram"),
            scan: stage("scan"),
            scatter: stage("scatter"),
            layout,
        })
    }
}


pub struct RadixSortDescriptor<'a> {
    pub keys: &'a wgpu::Buffer,
    pub values: &'a wgpu::Buffer,
    pub count: u32,
    pub bit_count: u32,
}


/// sorts `keys` ascending and permutes `values` alongside, in place.
///
/// the kernel is bound to the buffers it was created with. `count` may change
/// through [`RadixSortKernel::set_count`] as long as it fits the capacity of
/// those buffers.
pub struct RadixSortKernel {
    pipeline: RadixSortPipeline,
    capacity: u32,
    count: u32,
    bit_count: u32,
    pass_buffers: Vec<wgpu::Buffer>,
    bind_groups: Vec<wgpu::BindGroup>,
    _scratch_keys: wgpu::Buffer,
    _scratch_values: wgpu::Buffer,
    _histograms: wgpu::Buffer,
}

impl RadixSortKernel {
    pub fn new(
        device: &wgpu::Device,
        pipeline: &RadixSortPipeline,
        descriptor: RadixSortDescriptor,
    ) -> SplatResult<Self> {
        let passes = pass_count(descriptor.bit_count)?;

        let entry_size = std::mem::size_of::<u32>() as u64;
        let capacity = (descriptor.keys.size().min(descriptor.values.size()) / entry_size) as u32;
        if descriptor.count > capacity {
            return Err(SplatError::SortCapacity {
                count: descriptor.count,
                capacity,
            });
        }

        let scratch_size = capacity.max(1) as u64 * entry_size;
        let scratch_keys = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix_sort_scratch_keys"),
            size: scratch_size,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let scratch_values = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix_sort_scratch_values"),
            size: scratch_size,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let histograms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix_sort_histograms"),
            size: (num_blocks(capacity).max(1) * RADIX) as u64 * entry_size,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let pass_buffers = (0..passes)
            .map(|pass| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: format!("radix_sort_pass_buffer_{}", pass).as_str().into(),
                    contents: bytemuck::bytes_of(&Self::params(descriptor.count, pass)),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                })
            })
            .collect::<Vec<_>>();

        let bind_groups = pass_buffers.iter()
            .enumerate()
            .map(|(pass, pass_buffer)| {
                let (keys_in, values_in, keys_out, values_out) = if pass % 2 == 0 {
                    (descriptor.keys, descriptor.values, &scratch_keys, &scratch_values)
                } else {
                    (&scratch_keys, &scratch_values, descriptor.keys, descriptor.values)
                };

                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: format!("radix_sort_bind_group_{}", pass).as_str().into(),
                    layout: &pipeline.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: pass_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: keys_in.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: values_in.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: keys_out.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: values_out.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: histograms.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect::<Vec<_>>();

        debug!(
            capacity,
            count = descriptor.count,
            bit_count = descriptor.bit_count,
            "created radix sort kernel",
        );

        Ok(Self {
            pipeline: pipeline.clone(),
            capacity,
            count: descriptor.count,
            bit_count: descriptor.bit_count,
            pass_buffers,
            bind_groups,
            _scratch_keys: scratch_keys,
            _scratch_values: scratch_values,
            _histograms: histograms,
        })
    }

    fn params(count: u32, pass: u32) -> SortParams {
        SortParams {
            count,
            shift: pass * RADIX_BITS,
            num_blocks: num_blocks(count),
            _pad: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn bit_count(&self) -> u32 {
        self.bit_count
    }

    pub fn set_count(
        &mut self,
        queue: &wgpu::Queue,
        count: u32,
    ) -> SplatResult<()> {
        if count > self.capacity {
            return Err(SplatError::SortCapacity {
                count,
                capacity: self.capacity,
            });
        }

        if count == self.count {
            return Ok(());
        }

        for (pass, pass_buffer) in self.pass_buffers.iter().enumerate() {
            queue.write_buffer(
                pass_buffer,
                0,
                bytemuck::bytes_of(&Self::params(count, pass as u32)),
            );
        }
        self.count = count;

        Ok(())
    }

    /// records every sort pass into an open compute pass
    pub fn dispatch(&self, pass: &mut wgpu::ComputePass<'_>) {
        if self.count == 0 {
            return;
        }

        let [x, y] = workgroup_grid(num_blocks(self.count));

        for bind_group in &self.bind_groups {
            pass.set_bind_group(0, bind_group, &[]);

            pass.set_pipeline(&self.pipeline.histogram);
            pass.dispatch_workgroups(x, y, 1);

            pass.set_pipeline(&self.pipeline.scan);
            pass.dispatch_workgroups(1, 1, 1);

            pass.set_pipeline(&self.pipeline.scatter);
            pass.dispatch_workgroups(x, y, 1);
        }
    }
}
