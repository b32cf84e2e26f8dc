//! ### English
//! One GPU-resident drawable surface, optionally backed by a cross-process
//! shareable buffer. Owned exclusively by the ring slot that created it.
//!
//! ### 中文
//! 单个 GPU 驻留的可绘制 surface，可选地由跨进程共享缓冲支持。
//! 由创建它的环形槽位独占持有。

use dpi::PhysicalSize;

use crate::output::gpu::{BufferUsage, GpuBufferAllocator, GpuContext, NativeBufferHandle};
use crate::output::types::{ColorSpace, PixelFormat};

/// ### English
/// Per-surface delivery state machine. The only exit besides `Idle` is a full
/// ring discard, which may interrupt any phase.
///
/// ### 中文
/// 每个 surface 的交付状态机。除回到 `Idle` 外，唯一出口是整环 discard，
/// 它可以打断任意阶段。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurfacePhase {
    /// ### English
    /// Not in use; may be bound for drawing.
    ///
    /// ### 中文
    /// 未使用；可以绑定用于绘制。
    #[default]
    Idle,
    /// ### English
    /// Bound as the current draw target.
    ///
    /// ### 中文
    /// 已绑定为当前绘制目标。
    Bound,
    /// ### English
    /// Unbound and flushed; awaiting the sync token.
    ///
    /// ### 中文
    /// 已解绑并 flush；等待 sync token 完成。
    Flushed,
    /// ### English
    /// Flip emitted; the consumer may be reading.
    ///
    /// ### 中文
    /// flip 已发出；消费者可能正在读取。
    Delivered,
}

/// ### English
/// GPU texture plus optional shareable backing. When the shareable buffer or its
/// image cannot be created the surface keeps a local-only drawable and is marked
/// non-deliverable: rendering continues, cross-process delivery is skipped.
///
/// ### 中文
/// GPU 纹理加可选的共享底层存储。当共享缓冲或其 image 创建失败时，
/// surface 保留仅本地可用的 drawable 并标记为不可交付：
/// 渲染继续，跨进程交付被跳过。
pub struct Surface {
    /// ### English
    /// GL texture id for drawing.
    ///
    /// ### 中文
    /// 用于绘制的 GL 纹理 id。
    texture_id: u32,
    /// ### English
    /// Platform image bound beneath the texture, when deliverable.
    ///
    /// ### 中文
    /// 可交付时绑定在纹理之下的平台 image。
    image_id: Option<u32>,
    /// ### English
    /// Shareable backing handle, when deliverable.
    ///
    /// ### 中文
    /// 可交付时的共享底层句柄。
    handle: Option<NativeBufferHandle>,
    /// ### English
    /// Whether this surface is currently attached as the draw target.
    ///
    /// ### 中文
    /// 当前是否已附着为绘制目标。
    bound: bool,
    /// ### English
    /// Allocated size in pixels.
    ///
    /// ### 中文
    /// 分配尺寸（像素）。
    size: PhysicalSize<u32>,
    /// ### English
    /// Color-space tag passed through to the consumer.
    ///
    /// ### 中文
    /// 透传给消费者的色彩空间标签。
    color_space: ColorSpace,
    /// ### English
    /// Delivery state machine phase.
    ///
    /// ### 中文
    /// 交付状态机所处阶段。
    phase: SurfacePhase,
}

impl Surface {
    /// ### English
    /// Creates a surface of `size`. Never fails: a failed shareable allocation
    /// degrades to a local-only drawable (logged), it does not crash.
    ///
    /// ### 中文
    /// 创建 `size` 大小的 surface。永不失败：共享分配失败时降级为
    /// 仅本地 drawable（记录日志），不会崩溃。
    pub fn create(
        ctx: &dyn GpuContext,
        allocator: &dyn GpuBufferAllocator,
        size: PhysicalSize<u32>,
        color_space: ColorSpace,
    ) -> Self {
        let texture_id = ctx.create_texture();

        let mut image_id = None;
        let mut handle = None;
        match allocator.allocate(size, PixelFormat::Rgba8888, BufferUsage::Scanout) {
            Some(buffer) => match ctx.create_image(&buffer) {
                Some(image) => {
                    handle = Some(buffer.clone_handle());
                    image_id = Some(image);
                }
                None => {
                    log::warn!("image creation failed; surface degraded to non-deliverable");
                }
            },
            None => {
                log::warn!("GPU buffer allocation failed; surface degraded to non-deliverable");
            }
        }

        if image_id.is_none() {
            /*
            ### English
            Fallback drawable: plain local texture storage so rendering can continue.

            ### 中文
            回退 drawable：普通本地纹理存储，保证渲染可以继续。
            */
            ctx.allocate_texture_storage(texture_id, size);
        }

        Self {
            texture_id,
            image_id,
            handle,
            bound: false,
            size,
            color_space,
            phase: SurfacePhase::Idle,
        }
    }

    /// ### English
    /// Transferable copy of the backing handle, if this surface is deliverable.
    ///
    /// ### 中文
    /// 底层句柄的可转移副本；仅当 surface 可交付时存在。
    pub fn share_handle(&self) -> Option<NativeBufferHandle> {
        self.handle.map(|handle| handle.clone_transferable())
    }

    /// ### English
    /// Whether cross-process delivery is possible for this surface.
    ///
    /// ### 中文
    /// 该 surface 是否可进行跨进程交付。
    pub fn is_deliverable(&self) -> bool {
        self.image_id.is_some() && self.handle.is_some()
    }

    /// ### English
    /// GL texture id for drawing.
    ///
    /// ### 中文
    /// 用于绘制的 GL 纹理 id。
    pub fn texture_id(&self) -> u32 {
        self.texture_id
    }

    /// ### English
    /// Allocated size in pixels.
    ///
    /// ### 中文
    /// 分配尺寸（像素）。
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// ### English
    /// Current state-machine phase.
    ///
    /// ### 中文
    /// 状态机当前阶段。
    pub fn phase(&self) -> SurfacePhase {
        self.phase
    }

    /// ### English
    /// Whether this surface is currently the draw target.
    ///
    /// ### 中文
    /// 该 surface 当前是否为绘制目标。
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// ### English
    /// Binds this surface to `framebuffer_id` as the draw target. No-op if
    /// already bound. A deliverable surface binds through its platform image;
    /// a degraded one attaches its local texture directly.
    ///
    /// ### 中文
    /// 将该 surface 绑定到 `framebuffer_id` 作为绘制目标。已绑定时为 no-op。
    /// 可交付 surface 经平台 image 绑定；降级 surface 直接附着本地纹理。
    pub fn bind(&mut self, ctx: &dyn GpuContext, framebuffer_id: u32) {
        if self.bound {
            return;
        }

        if let Some(image_id) = self.image_id {
            ctx.bind_image_texture(self.texture_id, image_id, self.color_space);
        }
        ctx.attach_framebuffer_texture(framebuffer_id, self.texture_id);

        self.bound = true;
        self.phase = SurfacePhase::Bound;
    }

    /// ### English
    /// Detaches this surface from `framebuffer_id` and flushes. No-op if unbound.
    ///
    /// ### 中文
    /// 将该 surface 从 `framebuffer_id` 分离并 flush。未绑定时为 no-op。
    pub fn unbind(&mut self, ctx: &dyn GpuContext, framebuffer_id: u32) {
        if !self.bound {
            return;
        }

        ctx.detach_framebuffer_texture(framebuffer_id);
        if let Some(image_id) = self.image_id {
            ctx.release_image_texture(self.texture_id, image_id);
        }
        ctx.flush();

        self.bound = false;
    }

    /// ### English
    /// Marks the surface as flushed and awaiting its sync token.
    ///
    /// ### 中文
    /// 标记该 surface 已 flush，正在等待其 sync token。
    pub fn mark_flushed(&mut self) {
        debug_assert_eq!(self.phase, SurfacePhase::Bound);
        self.phase = SurfacePhase::Flushed;
    }

    /// ### English
    /// Buffer-turnover reset so an external reader can safely acquire the
    /// surface, then marks it delivered.
    ///
    /// ### 中文
    /// 执行 buffer 轮转复位，使外部读取方可以安全获取该 surface，
    /// 随后标记为已交付。
    pub fn prepare_for_external_read(&mut self, ctx: &dyn GpuContext) {
        if let Some(image_id) = self.image_id {
            ctx.prepare_for_external_read(image_id);
        }
        self.phase = SurfacePhase::Delivered;
    }

    /// ### English
    /// Returns the surface to `Idle` once the consumer is done with it.
    ///
    /// ### 中文
    /// 消费者使用完毕后，将 surface 复位为 `Idle`。
    pub fn finish_delivery(&mut self) {
        self.phase = SurfacePhase::Idle;
    }

    /// ### English
    /// Releases the GPU resources of this surface. The texture goes first, then
    /// the image beneath it (reverse creation order).
    ///
    /// ### 中文
    /// 释放该 surface 的 GPU 资源。先删除纹理，再销毁其下的 image
    ///（与创建顺序相反）。
    pub fn destroy(mut self, ctx: &dyn GpuContext) {
        debug_assert!(!self.bound, "surface destroyed while bound");
        ctx.delete_texture(self.texture_id);
        if let Some(image_id) = self.image_id.take() {
            ctx.destroy_image(image_id);
        }
    }
}
