//! ### English
//! Plain data types shared across the output engine: damage rectangles, color-space
//! tags, pixel formats, and the per-frame request/completion records.
//!
//! ### 中文
//! 输出引擎各模块共享的纯数据类型：damage 矩形、色彩空间标签、像素格式，
//! 以及每帧的 request/completion 记录。

use std::time::{Duration, Instant};

use dpi::PhysicalSize;

/// ### English
/// Sub-region of a frame that changed and must be recomposited, in pixels.
///
/// ### 中文
/// 帧内发生变化、需要重新合成的子区域（像素）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageRect {
    /// ### English
    /// Left edge in pixels.
    ///
    /// ### 中文
    /// 左边界（像素）。
    pub x: i32,
    /// ### English
    /// Top edge in pixels.
    ///
    /// ### 中文
    /// 上边界（像素）。
    pub y: i32,
    /// ### English
    /// Width in pixels.
    ///
    /// ### 中文
    /// 宽度（像素）。
    pub width: i32,
    /// ### English
    /// Height in pixels.
    ///
    /// ### 中文
    /// 高度（像素）。
    pub height: i32,
}

impl DamageRect {
    /// ### English
    /// Full-frame damage covering `size` from the origin. Dimensions beyond
    /// `i32::MAX` saturate instead of wrapping negative.
    ///
    /// ### 中文
    /// 覆盖整个 `size` 的全帧 damage（从原点开始）。
    /// 超过 `i32::MAX` 的尺寸饱和处理，不会回绕成负值。
    pub fn from_size(size: PhysicalSize<u32>) -> Self {
        Self {
            x: 0,
            y: 0,
            width: i32::try_from(size.width).unwrap_or(i32::MAX),
            height: i32::try_from(size.height).unwrap_or(i32::MAX),
        }
    }

    /// ### English
    /// Returns whether this rectangle covers no pixels.
    ///
    /// ### 中文
    /// 返回该矩形是否不覆盖任何像素。
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// ### English
/// Color-space tag carried through to the consumer unmodified.
/// The engine does not negotiate HDR; it only passes the tag along.
///
/// ### 中文
/// 原样透传给消费者的色彩空间标签。
/// 引擎不协商 HDR，只负责透传该标签。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorSpace {
    /// ### English
    /// Standard sRGB (the default for web content).
    ///
    /// ### 中文
    /// 标准 sRGB（web 内容的默认值）。
    #[default]
    Srgb,
    /// ### English
    /// Opaque platform color-space tag, passed through untouched.
    ///
    /// ### 中文
    /// 不透明的平台色彩空间标签，原样透传。
    Tagged(u32),
}

/// ### English
/// Pixel format negotiated for cross-process surfaces and shared-memory buffers.
///
/// ### 中文
/// 跨进程 surface 与共享内存缓冲协商使用的像素格式。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// ### English
    /// 8-bit RGBA, 4 bytes per pixel.
    ///
    /// ### 中文
    /// 8 位 RGBA，每像素 4 字节。
    #[default]
    Rgba8888,
}

impl PixelFormat {
    /// ### English
    /// Bytes occupied by a single pixel in this format.
    ///
    /// ### 中文
    /// 该格式下单个像素占用的字节数。
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
        }
    }

    /// ### English
    /// Total byte length of a tightly packed buffer of `size`, or `None` on overflow.
    ///
    /// ### 中文
    /// `size` 对应的紧凑缓冲总字节数；溢出时返回 `None`。
    pub fn buffer_len(&self, size: PhysicalSize<u32>) -> Option<usize> {
        (size.width as usize)
            .checked_mul(size.height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }
}

/// ### English
/// Timestamp recorded when a frame entered the swap pipeline, echoed back in the
/// completion so the client can measure end-to-end latency.
///
/// ### 中文
/// 帧进入 swap 流水线时记录的时间戳；completion 时回传，
/// 供客户端测量端到端延迟。
#[derive(Clone, Copy, Debug)]
pub struct LatencyRecord {
    /// ### English
    /// When the frame was submitted for swap.
    ///
    /// ### 中文
    /// 该帧提交 swap 的时刻。
    pub issued_at: Instant,
}

/// ### English
/// Input to one reshape/swap cycle.
///
/// ### 中文
/// 一次 reshape/swap 循环的输入。
#[derive(Clone, Debug)]
pub struct FrameRequest {
    /// ### English
    /// Requested frame size in pixels.
    ///
    /// ### 中文
    /// 请求的帧尺寸（像素）。
    pub size: PhysicalSize<u32>,
    /// ### English
    /// Device scale factor (passed through; the engine works in pixels).
    ///
    /// ### 中文
    /// 设备缩放因子（透传；引擎内部按像素工作）。
    pub scale_factor: f32,
    /// ### English
    /// Color-space tag for the frame.
    ///
    /// ### 中文
    /// 该帧的色彩空间标签。
    pub color_space: ColorSpace,
    /// ### English
    /// Whether the frame carries an alpha channel.
    ///
    /// ### 中文
    /// 该帧是否包含 alpha 通道。
    pub has_alpha: bool,
    /// ### English
    /// Whether a stencil buffer was requested.
    ///
    /// ### 中文
    /// 是否请求了 stencil 缓冲。
    pub has_stencil: bool,
    /// ### English
    /// Latency records echoed back on completion.
    ///
    /// ### 中文
    /// completion 时回传的延迟记录。
    pub latency: Vec<LatencyRecord>,
}

impl FrameRequest {
    /// ### English
    /// Convenience constructor for an opaque sRGB frame of `size`.
    ///
    /// ### 中文
    /// 便捷构造：`size` 大小、不透明、sRGB 的帧。
    pub fn new(size: PhysicalSize<u32>) -> Self {
        Self {
            size,
            scale_factor: 1.0,
            color_space: ColorSpace::Srgb,
            has_alpha: false,
            has_stencil: false,
            latency: Vec::new(),
        }
    }
}

/// ### English
/// Swap-acknowledgment payload delivered once the GPU has finished a frame.
///
/// ### 中文
/// GPU 完成一帧后交付的 swap 确认载荷。
#[derive(Clone, Debug)]
pub struct SwapCompletion {
    /// ### English
    /// Latency records carried from the originating `FrameRequest`.
    ///
    /// ### 中文
    /// 来自原始 `FrameRequest` 的延迟记录。
    pub latency: Vec<LatencyRecord>,
    /// ### English
    /// Completion timestamp. Off-screen mode has no real swap, so this is
    /// "now" at signal-delivery time — a deliberate overestimate.
    ///
    /// ### 中文
    /// 完成时间戳。离屏模式没有真实 swap，因此取信号送达时的 “now”，
    /// 是有意的高估值。
    pub completed_at: Instant,
}

/// ### English
/// Presentation-feedback payload for the client's presentation model.
/// There is no vblank off-screen; `interval` is a nominal frame interval.
///
/// ### 中文
/// 提供给客户端呈现模型的 presentation feedback 载荷。
/// 离屏模式没有 vblank；`interval` 为名义帧间隔。
#[derive(Clone, Copy, Debug)]
pub struct PresentationFeedback {
    /// ### English
    /// Presentation timestamp (same overestimate as `SwapCompletion::completed_at`).
    ///
    /// ### 中文
    /// 呈现时间戳（与 `SwapCompletion::completed_at` 相同的高估值）。
    pub timestamp: Instant,
    /// ### English
    /// Nominal frame interval reported to the client.
    ///
    /// ### 中文
    /// 上报给客户端的名义帧间隔。
    pub interval: Duration,
}
