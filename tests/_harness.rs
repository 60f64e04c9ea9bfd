#![allow(dead_code)]

use bevy::math::UVec2;

use bevy_progressive_splatting::{
    GpuContext,
    SplatError,
};


// gpu tests run against whatever adapter the host exposes and are skipped
// when there is none (e.g. ci without a software rasterizer)
pub fn test_gpu() -> Option<GpuContext> {
    match GpuContext::new_blocking() {
        Ok(gpu) => Some(gpu),
        Err(SplatError::NoAdapter) => {
            eprintln!("no gpu adapter available, skipping");
            None
        },
        Err(err) => panic!("failed to create gpu context: {err}"),
    }
}


fn map_read(gpu: &GpuContext, buffer: &wgpu::Buffer) -> Vec<u8> {
    let buffer_slice = buffer.slice(..);

    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).unwrap();
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    pollster::block_on(rx.receive()).unwrap().unwrap();

    let bytes = buffer_slice.get_mapped_range().to_vec();
    buffer.unmap();

    bytes
}

pub fn read_buffer_u32(
    gpu: &GpuContext,
    buffer: &wgpu::Buffer,
    count: u32,
) -> Vec<u32> {
    let size = count as u64 * std::mem::size_of::<u32>() as u64;

    let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test_readback_buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("test_readback_encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &readback, 0, size);
    gpu.queue.submit(Some(encoder.finish()));

    bytemuck::cast_slice(&map_read(gpu, &readback)).to_vec()
}

pub fn write_buffer_u32(
    gpu: &GpuContext,
    buffer: &wgpu::Buffer,
    values: &[u32],
) {
    gpu.queue.write_buffer(buffer, 0, bytemuck::cast_slice(values));
    gpu.queue.submit(None);
}

/// tightly packed rgba8 rows of a 4 byte-per-texel texture
pub fn read_texture_rgba8(
    gpu: &GpuContext,
    texture: &wgpu::Texture,
    size: UVec2,
) -> Vec<u8> {
    let unpadded_bytes_per_row = size.x * 4;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test_texture_readback_buffer"),
        size: padded_bytes_per_row as u64 * size.y as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("test_texture_readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(size.y),
            },
        },
        wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(Some(encoder.finish()));

    map_read(gpu, &readback)
        .chunks(padded_bytes_per_row as usize)
        .flat_map(|row| row[..unpadded_bytes_per_row as usize].to_vec())
        .collect()
}
