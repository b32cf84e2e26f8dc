//! ### English
//! GPU-facing seams: the graphics-context operations the engine consumes, the
//! buffer allocation service, and the polymorphic cross-process handle.
//!
//! ### 中文
//! 面向 GPU 的接缝：引擎消费的图形上下文操作、缓冲分配服务，
//! 以及多态的跨进程句柄。

mod allocator;
mod context;
mod handle;

pub use allocator::{BufferUsage, GpuBuffer, GpuBufferAllocator};
pub use context::{ExternalImageBinder, GleamGpuContext, GpuContext};
pub use handle::NativeBufferHandle;

/// ### English
/// Opaque marker for a point in the GPU command stream. Completion of the token
/// means every command issued before it has executed.
///
/// ### 中文
/// GPU 命令流中某个执行点的不透明标记。token 完成即表示其之前提交的所有命令
/// 均已执行完毕。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SyncToken(pub u64);
