//! ### English
//! Software delivery path: a mapped shared-memory pixel buffer plus an
//! activation flag, for platforms without accelerated texture sharing.
//!
//! ### 中文
//! 软件交付路径：映射的共享内存像素缓冲加一个激活标记，
//! 用于不支持加速纹理共享的平台。

mod region;

use dpi::PhysicalSize;

pub use region::SharedMemoryRegion;

use crate::output::types::{DamageRect, PixelFormat};

/// ### English
/// Host paint sink for the software path.
///
/// ### 中文
/// 软件路径的宿主绘制 sink。
pub trait SoftwarePaintSink {
    /// ### English
    /// `pixels` points at a `pixel_size` buffer in the negotiated format;
    /// `damage` is the region that changed. The pointer is only valid for the
    /// duration of the call.
    ///
    /// ### 中文
    /// `pixels` 指向协商格式下 `pixel_size` 大小的缓冲；`damage` 为变化区域。
    /// 指针仅在本次调用期间有效。
    fn on_paint(&mut self, damage: DamageRect, pixel_size: PhysicalSize<u32>, pixels: *const u8);
}

/// ### English
/// Parallel delivery path over shared memory. Buffer production continues while
/// inactive so delivery can resume without renegotiation.
///
/// ### 中文
/// 基于共享内存的并行交付路径。inactive 时缓冲生产仍在继续，
/// 因此恢复交付无需重新协商。
pub struct SoftwarePixelBridge {
    /// ### English
    /// Whether `draw` forwards pixels to the paint sink.
    ///
    /// ### 中文
    /// `draw` 是否将像素转发给绘制 sink。
    active: bool,
    /// ### English
    /// Current valid mapping, kept across failed renegotiations.
    ///
    /// ### 中文
    /// 当前有效映射；重新协商失败时保留。
    mapping: Option<SharedMemoryRegion>,
    /// ### English
    /// Pixel size negotiated with the current mapping.
    ///
    /// ### 中文
    /// 与当前映射一起协商的像素尺寸。
    pixel_size: PhysicalSize<u32>,
    /// ### English
    /// Negotiated pixel format.
    ///
    /// ### 中文
    /// 协商的像素格式。
    format: PixelFormat,
}

impl SoftwarePixelBridge {
    /// ### English
    /// Creates an inactive bridge with no mapping.
    ///
    /// ### 中文
    /// 创建未激活且无映射的 bridge。
    pub fn new(format: PixelFormat) -> Self {
        Self {
            active: false,
            mapping: None,
            pixel_size: PhysicalSize::new(0, 0),
            format,
        }
    }

    /// ### English
    /// Toggles whether `draw` forwards pixels. The mapping is untouched.
    ///
    /// ### 中文
    /// 切换 `draw` 是否转发像素。映射不受影响。
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// ### English
    /// Returns whether delivery is currently active.
    ///
    /// ### 中文
    /// 返回交付当前是否激活。
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// ### English
    /// Accepts a renegotiated mapping after validating that `region` can hold a
    /// `pixel_size` frame in the negotiated format. A region that is too small
    /// (or an overflowing size) is rejected and any prior mapping is preserved.
    ///
    /// ### 中文
    /// 校验 `region` 能容纳协商格式下 `pixel_size` 的一帧后接受新映射。
    /// 区域过小（或尺寸溢出）则拒绝，并保留任何先前的有效映射。
    pub fn on_allocated_shared_memory(
        &mut self,
        pixel_size: PhysicalSize<u32>,
        region: SharedMemoryRegion,
    ) {
        let Some(required) = self.format.buffer_len(pixel_size) else {
            log::warn!("rejecting shared memory: pixel size {pixel_size:?} overflows");
            return;
        };
        if region.len() < required {
            log::warn!(
                "rejecting shared memory: region holds {} bytes, {required} required",
                region.len()
            );
            return;
        }

        self.pixel_size = pixel_size;
        self.mapping = Some(region);
    }

    /// ### English
    /// One paint cycle: forwards the pixel pointer and `damage` to `sink` when
    /// active and mapped. `done` always runs afterward, regardless of delivery,
    /// so the producer is never blocked on a failed or inactive consumer.
    ///
    /// ### 中文
    /// 一次绘制循环：激活且有映射时，将像素指针与 `damage` 转发给 `sink`。
    /// 无论是否交付，`done` 之后必定执行，确保生产者不会被失败或未激活的
    /// 消费者阻塞。
    pub fn draw(
        &mut self,
        damage: DamageRect,
        sink: &mut dyn SoftwarePaintSink,
        done: impl FnOnce(),
    ) {
        if self.active {
            match self.mapping.as_ref() {
                Some(region) => {
                    sink.on_paint(damage, self.pixel_size, region.as_ptr());
                }
                None => {
                    log::warn!("software draw skipped: no pixel memory mapped");
                }
            }
        }

        done();
    }

    /// ### English
    /// Base pointer of the current mapping, or `None` if no mapping ever
    /// succeeded.
    ///
    /// ### 中文
    /// 当前映射的基指针；若从未成功建立映射则为 `None`。
    pub fn pixel_memory(&self) -> Option<*const u8> {
        self.mapping.as_ref().map(SharedMemoryRegion::as_ptr)
    }

    /// ### English
    /// Pixel size negotiated with the current mapping.
    ///
    /// ### 中文
    /// 与当前映射一起协商的像素尺寸。
    pub fn pixel_size(&self) -> PhysicalSize<u32> {
        self.pixel_size
    }
}
