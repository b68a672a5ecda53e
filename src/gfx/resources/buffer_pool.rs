//! Reusable GPU buffer pool with deferred recycling
//!
//! Buffers handed to a submission are *retired* against that submission's index and
//! only become reusable once the backend reports the submission complete. Resources
//! scheduled for destruction follow the same rule.
//!
//! The pool never blocks: when no free buffer is large enough it allocates a new one.
//! Sustained GPU overrun therefore grows the pool without bound; every time the number
//! of allocations crosses a multiple of the soft limit a warning is logged.

use std::collections::VecDeque;

use crate::gfx::rendering::{
    BufferDescriptor, BufferHandle, RenderBackend, SubmissionIndex, TextureHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PooledBuffer {
    pub handle: BufferHandle,
    pub size: u64,
}

/// A GPU resource waiting for in-flight work before destruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetiredResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

#[derive(Debug)]
pub struct BufferPool {
    label: &'static str,
    usage: wgpu::BufferUsages,
    free: Vec<PooledBuffer>,
    in_flight: VecDeque<(SubmissionIndex, PooledBuffer)>,
    garbage: VecDeque<(SubmissionIndex, RetiredResource)>,
    allocated: usize,
    soft_limit: usize,
}

impl BufferPool {
    pub fn new(label: &'static str, usage: wgpu::BufferUsages, soft_limit: usize) -> Self {
        Self {
            label,
            usage,
            free: Vec::new(),
            in_flight: VecDeque::new(),
            garbage: VecDeque::new(),
            allocated: 0,
            soft_limit: soft_limit.max(1),
        }
    }

    /// Smallest free buffer of at least `min_size` bytes, or a newly allocated one
    pub fn dequeue<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        min_size: u64,
    ) -> PooledBuffer {
        let best = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, b)| b.size >= min_size)
            .min_by_key(|(_, b)| b.size)
            .map(|(i, _)| i);

        if let Some(index) = best {
            return self.free.swap_remove(index);
        }

        let handle = backend.create_buffer(&BufferDescriptor {
            label: self.label,
            size: min_size,
            usage: self.usage,
        });
        self.allocated += 1;
        log::debug!(
            "{}: allocated buffer {} ({} bytes, {} total)",
            self.label,
            handle.raw(),
            min_size,
            self.allocated
        );
        if self.allocated % self.soft_limit == 0 {
            log::warn!(
                "{}: {} buffers allocated ({} in flight); the GPU may be falling behind",
                self.label,
                self.allocated,
                self.in_flight.len()
            );
        }
        PooledBuffer {
            handle,
            size: min_size,
        }
    }

    /// Returns a buffer the GPU never saw
    pub fn enqueue(&mut self, buffer: PooledBuffer) {
        self.free.push(buffer);
    }

    /// Returns a buffer once `submission` has completed
    pub fn retire(&mut self, buffer: PooledBuffer, submission: SubmissionIndex) {
        self.in_flight.push_back((submission, buffer));
    }

    /// Destroys a resource once `submission` has completed
    pub fn retire_resource(&mut self, resource: RetiredResource, submission: SubmissionIndex) {
        self.garbage.push_back((submission, resource));
    }

    /// Recycles buffers and destroys garbage whose submission is complete
    ///
    /// Returns the number of buffers made available again.
    pub fn reclaim<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        completed: SubmissionIndex,
    ) -> usize {
        let mut reclaimed = 0;
        while let Some((submission, _)) = self.in_flight.front() {
            if *submission > completed {
                break;
            }
            if let Some((_, buffer)) = self.in_flight.pop_front() {
                self.free.push(buffer);
                reclaimed += 1;
            }
        }

        while let Some((submission, _)) = self.garbage.front() {
            if *submission > completed {
                break;
            }
            if let Some((_, resource)) = self.garbage.pop_front() {
                match resource {
                    RetiredResource::Buffer(buffer) => backend.destroy_buffer(buffer),
                    RetiredResource::Texture(texture) => backend.destroy_texture(texture),
                }
            }
        }
        reclaimed
    }

    /// Drops free buffers smaller than `min_size`, e.g. after the capacity grew
    pub fn trim_below<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, min_size: u64) {
        let before = self.free.len();
        self.free.retain(|b| {
            if b.size < min_size {
                backend.destroy_buffer(b.handle);
                false
            } else {
                true
            }
        });
        self.allocated -= before - self.free.len();
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn garbage_count(&self) -> usize {
        self.garbage.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::HeadlessBackend;

    fn pool() -> BufferPool {
        BufferPool::new(
            "Test Pool",
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            8,
        )
    }

    #[test]
    fn test_retired_buffer_waits_for_completion() {
        let mut backend = HeadlessBackend::new(16, 16);
        let mut pool = pool();

        let buffer = pool.dequeue(&mut backend, 1024);
        pool.retire(buffer, SubmissionIndex(1));

        assert_eq!(pool.reclaim(&mut backend, SubmissionIndex(0)), 0);
        assert_ne!(pool.dequeue(&mut backend, 1024).handle, buffer.handle);

        assert_eq!(pool.reclaim(&mut backend, SubmissionIndex(1)), 1);
        assert_eq!(pool.dequeue(&mut backend, 1024).handle, buffer.handle);
    }

    #[test]
    fn test_best_fit_and_growth() {
        let mut backend = HeadlessBackend::new(16, 16);
        let mut pool = pool();

        let small = pool.dequeue(&mut backend, 256);
        let large = pool.dequeue(&mut backend, 4096);
        pool.enqueue(large);
        pool.enqueue(small);

        assert_eq!(pool.dequeue(&mut backend, 200).handle, small.handle);
        let grown = pool.dequeue(&mut backend, 8192);
        assert_ne!(grown.handle, large.handle);
        assert_eq!(grown.size, 8192);
        assert_eq!(pool.allocated_count(), 3);
    }

    #[test]
    fn test_garbage_destroyed_after_completion() {
        let mut backend = HeadlessBackend::new(16, 16);
        let mut pool = pool();
        let doomed = pool.dequeue(&mut backend, 64).handle;

        pool.retire_resource(RetiredResource::Buffer(doomed), SubmissionIndex(2));
        pool.reclaim(&mut backend, SubmissionIndex(1));
        assert_eq!(backend.buffer_size(doomed), Some(64));

        pool.reclaim(&mut backend, SubmissionIndex(2));
        assert_eq!(backend.buffer_size(doomed), None);
        assert_eq!(pool.garbage_count(), 0);
    }
}
