//! Per-frame and per-instance uniform data

use cgmath::Matrix4;

use crate::error::RenderError;
use crate::gfx::math::{matrix3_to_padded, matrix4_to_array, normal_matrix};

/// Distance between consecutive instance slots in the per-frame uniform buffer
///
/// This is the dynamic-offset alignment GPUs require, not the size of
/// [`InstanceUniforms`].
pub const INSTANCE_UNIFORM_STRIDE: u64 = 256;

/// Model and normal matrices for one drawn node
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceUniforms {
    pub model: [[f32; 4]; 4],
    /// 3x3 normal matrix, columns padded to 16 bytes
    pub normal: [[f32; 4]; 3],
}

impl InstanceUniforms {
    pub fn new(view: Matrix4<f32>, model: Matrix4<f32>) -> Self {
        Self {
            model: matrix4_to_array(model),
            normal: matrix3_to_padded(normal_matrix(view, model)),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>) -> Self {
        Self {
            view: matrix4_to_array(view),
            view_projection: matrix4_to_array(projection * view),
        }
    }
}

/// Host-side staging for one frame's instance slots
///
/// Slots are packed at [`INSTANCE_UNIFORM_STRIDE`] intervals starting at offset 0;
/// the staged bytes are flushed to the GPU buffer with a single write before submit.
#[derive(Debug)]
pub struct InstanceUniformWriter {
    staging: Vec<u8>,
    capacity: usize,
    offset: u64,
}

impl InstanceUniformWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            staging: Vec::with_capacity(capacity * INSTANCE_UNIFORM_STRIDE as usize),
            capacity,
            offset: 0,
        }
    }

    /// Byte size of a GPU buffer holding `capacity` slots
    pub fn buffer_size(capacity: usize) -> u64 {
        capacity as u64 * INSTANCE_UNIFORM_STRIDE
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offset the next slot will be written at
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        (self.offset / INSTANCE_UNIFORM_STRIDE) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Starts a new frame with room for `capacity` slots
    pub fn reset(&mut self, capacity: usize) {
        self.staging.clear();
        self.capacity = capacity;
        self.offset = 0;
    }

    /// Writes the next slot and returns its byte offset
    pub fn write(&mut self, uniforms: &InstanceUniforms) -> Result<u64, RenderError> {
        if self.len() >= self.capacity {
            return Err(RenderError::InstanceCapacityExceeded {
                capacity: self.capacity,
            });
        }
        let offset = self.offset;
        let start = offset as usize;
        self.staging
            .resize(start + INSTANCE_UNIFORM_STRIDE as usize, 0);
        let bytes = bytemuck::bytes_of(uniforms);
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        self.offset += INSTANCE_UNIFORM_STRIDE;
        Ok(offset)
    }

    /// Bytes written so far, one full stride per slot
    pub fn as_bytes(&self) -> &[u8] {
        &self.staging
    }
}
