//! ### English
//! GPU memory allocation service consumed by the ring: allocates cross-process
//! shareable buffers and clones their handles for transfer.
//!
//! ### 中文
//! 环形缓冲使用的 GPU 内存分配服务：分配可跨进程共享的缓冲，
//! 并克隆其句柄用于传输。

use dpi::PhysicalSize;

use super::handle::NativeBufferHandle;
use crate::output::types::PixelFormat;

/// ### English
/// Intended usage of an allocated buffer.
///
/// ### 中文
/// 分配缓冲的预期用途。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// ### English
    /// Scanout-capable: the consumer may display the buffer directly.
    ///
    /// ### 中文
    /// 可直接扫描输出：消费者可直接显示该缓冲。
    Scanout,
}

/// ### English
/// One allocated GPU-resident buffer with a shareable backing handle.
///
/// ### 中文
/// 一块已分配、带可共享句柄的 GPU 驻留缓冲。
#[derive(Clone, Debug)]
pub struct GpuBuffer {
    /// ### English
    /// Cross-process-shareable backing handle.
    ///
    /// ### 中文
    /// 跨进程共享的底层句柄。
    handle: NativeBufferHandle,
    /// ### English
    /// Buffer dimensions in pixels.
    ///
    /// ### 中文
    /// 缓冲尺寸（像素）。
    size: PhysicalSize<u32>,
    /// ### English
    /// Pixel format of the buffer.
    ///
    /// ### 中文
    /// 缓冲的像素格式。
    format: PixelFormat,
}

impl GpuBuffer {
    /// ### English
    /// Wraps an allocator-produced handle into a buffer description.
    ///
    /// ### 中文
    /// 将分配器产生的句柄包装为缓冲描述。
    pub fn new(handle: NativeBufferHandle, size: PhysicalSize<u32>, format: PixelFormat) -> Self {
        Self {
            handle,
            size,
            format,
        }
    }

    /// ### English
    /// Produces a transferable copy of the backing handle.
    ///
    /// ### 中文
    /// 生成底层句柄的可转移副本。
    pub fn clone_handle(&self) -> NativeBufferHandle {
        self.handle.clone_transferable()
    }

    /// ### English
    /// Buffer dimensions in pixels.
    ///
    /// ### 中文
    /// 缓冲尺寸（像素）。
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// ### English
    /// Pixel format of the buffer.
    ///
    /// ### 中文
    /// 缓冲的像素格式。
    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

/// ### English
/// Allocation service for cross-process-shareable GPU buffers.
///
/// Returns `None` on failure; the caller degrades the affected slot to
/// non-deliverable rather than propagating an error.
///
/// ### 中文
/// 跨进程共享 GPU 缓冲的分配服务。
///
/// 失败时返回 `None`；调用方将对应槽位降级为不可交付，而不是向上传播错误。
pub trait GpuBufferAllocator {
    /// ### English
    /// Allocates one buffer of `size` and `format` for `usage`.
    ///
    /// ### 中文
    /// 为 `usage` 分配一块 `size` × `format` 的缓冲。
    fn allocate(
        &self,
        size: PhysicalSize<u32>,
        format: PixelFormat,
        usage: BufferUsage,
    ) -> Option<GpuBuffer>;
}
