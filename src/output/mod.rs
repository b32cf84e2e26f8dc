//! ### English
//! Off-screen output engine: multi-buffered GPU surface ring, sync-token frame
//! completion, the cross-process handle-exchange protocol, the software
//! shared-memory fallback, and delivery-path selection.
//!
//! ### 中文
//! 离屏输出引擎：多缓冲 GPU surface 环、sync token 帧完成跟踪、
//! 跨进程句柄交换协议、软件共享内存回退路径，以及交付路径选择。

pub mod capability;
pub mod channel;
pub mod gpu;
pub mod ring;
pub mod software;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::{CapabilitySelector, HostDisplayController, OutputPath, PlatformCapabilities};
pub use channel::{
    handle_exchange_channel, AcceleratedPaintSink, ConsumerEndpoint, ProducerEndpoint,
};
pub use gpu::{
    BufferUsage, ExternalImageBinder, GleamGpuContext, GpuBuffer, GpuBufferAllocator, GpuContext,
    NativeBufferHandle, SyncToken,
};
pub use ring::{BufferRing, Surface, SurfacePhase, SURFACE_COUNT};
pub use software::{SharedMemoryRegion, SoftwarePaintSink, SoftwarePixelBridge};
pub use tracker::{FrameCompletionTracker, OutputClient, NOMINAL_FRAME_INTERVAL};
pub use types::{
    ColorSpace, DamageRect, FrameRequest, LatencyRecord, PixelFormat, PresentationFeedback,
    SwapCompletion,
};
