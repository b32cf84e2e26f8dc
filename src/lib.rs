/// ### English
/// `osr_output_engine` crate root.
/// Core implementation lives under `output`; the commonly used types are
/// re-exported here.
///
/// ### 中文
/// `osr_output_engine` 的 crate 根。
/// 核心实现位于 `output` 模块；常用类型在此处再导出。
pub mod output;

pub use output::{
    handle_exchange_channel, AcceleratedPaintSink, BufferRing, CapabilitySelector, ColorSpace,
    ConsumerEndpoint, DamageRect, FrameCompletionTracker, FrameRequest, GleamGpuContext,
    GpuBufferAllocator, GpuContext, HostDisplayController, NativeBufferHandle, OutputClient,
    OutputPath, PixelFormat, PlatformCapabilities, PresentationFeedback, ProducerEndpoint,
    SharedMemoryRegion, SoftwarePaintSink, SoftwarePixelBridge, SwapCompletion, SURFACE_COUNT,
};
