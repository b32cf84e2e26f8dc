//! ### English
//! Polymorphic cross-process GPU buffer handle.
//! One enum covers every platform's opaque handle shape so the core logic never
//! branches on the operating system.
//!
//! ### 中文
//! 多态的跨进程 GPU 缓冲句柄。
//! 用单个 enum 覆盖各平台的不透明句柄形态，使核心逻辑无需按操作系统分支。

/// ### English
/// Cross-process-shareable backing handle for a GPU buffer.
///
/// A handle is only valid for cross-process use between its allocate-notify and
/// the next free-notify on the exchange channel.
///
/// ### 中文
/// GPU 缓冲的跨进程共享句柄。
///
/// 句柄仅在交换通道上的 allocate-notify 与下一次 free-notify 之间对跨进程使用有效。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeBufferHandle {
    /// ### English
    /// Windows DXGI shared handle value.
    ///
    /// ### 中文
    /// Windows DXGI 共享句柄值。
    Dxgi(u64),
    /// ### English
    /// Linux dma-buf file descriptor.
    ///
    /// ### 中文
    /// Linux dma-buf 文件描述符。
    DmaBuf(i32),
    /// ### English
    /// macOS IOSurface identifier.
    ///
    /// ### 中文
    /// macOS IOSurface 标识符。
    IoSurface(u32),
    /// ### English
    /// Opaque handle used by in-process allocators and tests.
    ///
    /// ### 中文
    /// 进程内分配器与测试使用的不透明句柄。
    Opaque(u64),
}

impl NativeBufferHandle {
    /// ### English
    /// Produces a transferable copy suitable for sending over the exchange channel.
    ///
    /// Handle values here are plain ids; duplication of OS-level ownership (e.g.
    /// `DuplicateHandle`, `dup`) is the allocator backend's job at allocate time.
    ///
    /// ### 中文
    /// 生成可通过交换通道发送的可转移副本。
    ///
    /// 这里的句柄是纯 id；OS 层所有权的复制（如 `DuplicateHandle`、`dup`）
    /// 由分配器后端在分配时完成。
    pub fn clone_transferable(&self) -> Self {
        *self
    }
}
