//! ### English
//! Fixed-capacity ring of GPU-resident surfaces used for multi-buffered
//! off-screen output: lazy allocation, binding, cyclic reuse, and wholesale
//! discard. The ring never resizes in place; reshape discards and the next
//! ensure reallocates.
//!
//! ### 中文
//! 用于多缓冲离屏输出的固定容量 GPU surface 环：惰性分配、绑定、循环复用与
//! 整体丢弃。环从不就地改变尺寸；reshape 直接丢弃，下一次 ensure 重新分配。

mod surface;

use std::rc::Rc;
use std::time::{Duration, Instant};

use dpi::PhysicalSize;

pub use surface::{Surface, SurfacePhase};

use crate::output::channel::ProducerEndpoint;
use crate::output::gpu::{GpuBufferAllocator, GpuContext};
use crate::output::types::ColorSpace;

/// ### English
/// Fixed surface count (always 3; backpressure is bounded by this depth).
///
/// ### 中文
/// 固定 surface 数量（始终为 3；背压由该深度限定）。
pub const SURFACE_COUNT: usize = 3;

/// ### English
/// Longest the producer polls for a consumer release before reusing a
/// pending-read slot anyway.
///
/// ### 中文
/// 生产者在强行复用 pending-read 槽位前，轮询消费者 release 的最长时间。
const RELEASE_GATE_TIMEOUT: Duration = Duration::from_millis(4);

/// ### English
/// Multi-buffered pool of GPU surfaces. Single-writer: all methods must run on
/// the producer thread that owns the GPU context.
///
/// ### 中文
/// 多缓冲 GPU surface 池。单写者：所有方法必须运行在持有 GPU 上下文的
/// 生产者线程上。
pub struct BufferRing {
    /// ### English
    /// Graphics context all GPU operations go through.
    ///
    /// ### 中文
    /// 全部 GPU 操作经由的图形上下文。
    ctx: Rc<dyn GpuContext>,
    /// ### English
    /// Allocation service for shareable buffers.
    ///
    /// ### 中文
    /// 共享缓冲的分配服务。
    allocator: Rc<dyn GpuBufferAllocator>,
    /// ### English
    /// Producer endpoint of the handle-exchange channel.
    ///
    /// ### 中文
    /// 句柄交换通道的生产者端点。
    producer: ProducerEndpoint,
    /// ### English
    /// Ring slots; fully populated or fully empty between calls.
    ///
    /// ### 中文
    /// 环形槽位；在调用间要么全满要么全空。
    surfaces: [Option<Surface>; SURFACE_COUNT],
    /// ### English
    /// Index of the current draw slot (exactly one at any time).
    ///
    /// ### 中文
    /// 当前绘制槽位索引（任意时刻恰好一个）。
    current: usize,
    /// ### English
    /// Shared framebuffer object all surfaces attach to.
    ///
    /// ### 中文
    /// 所有 surface 共用的 framebuffer 对象。
    framebuffer_id: Option<u32>,
    /// ### English
    /// Target size; the ring allocates lazily once this is non-empty.
    ///
    /// ### 中文
    /// 目标尺寸；非空后环才会惰性分配。
    size: PhysicalSize<u32>,
    /// ### English
    /// Color-space tag for newly created surfaces.
    ///
    /// ### 中文
    /// 新建 surface 使用的色彩空间标签。
    color_space: ColorSpace,
    /// ### English
    /// Ring generation; bumped on every discard so in-flight completion
    /// callbacks referencing dead surfaces are dropped, not dereferenced.
    ///
    /// ### 中文
    /// 环的代数；每次 discard 递增，使引用已销毁 surface 的在途完成回调
    /// 被丢弃而不是被解引用。
    generation: u64,
    /// ### English
    /// Per-slot "consumer may still be reading" flags, set on flip and cleared
    /// by consumer release feedback.
    ///
    /// ### 中文
    /// 每槽位的 “消费者可能仍在读取” 标记：flip 时置位，
    /// 由消费者 release 反馈清除。
    pending_read: [bool; SURFACE_COUNT],
}

impl BufferRing {
    /// ### English
    /// Creates an empty ring. No GPU resources are allocated until a non-empty
    /// size is known and `ensure_backbuffer` (or `bind_framebuffer`) runs.
    ///
    /// ### 中文
    /// 创建空环。在得知非空尺寸并执行 `ensure_backbuffer`
    ///（或 `bind_framebuffer`）之前不分配任何 GPU 资源。
    pub fn new(
        ctx: Rc<dyn GpuContext>,
        allocator: Rc<dyn GpuBufferAllocator>,
        producer: ProducerEndpoint,
    ) -> Self {
        Self {
            ctx,
            allocator,
            producer,
            surfaces: [None, None, None],
            current: 0,
            framebuffer_id: None,
            size: PhysicalSize::new(0, 0),
            color_space: ColorSpace::Srgb,
            generation: 0,
            pending_read: [false; SURFACE_COUNT],
        }
    }

    /// ### English
    /// Allocates the ring if it is empty and a non-empty size is known.
    /// Idempotent when already allocated. Surfaces are clamped to the context's
    /// max texture size; each deliverable slot emits an allocate-notify.
    ///
    /// ### 中文
    /// 当环为空且已知非空尺寸时进行分配。已分配时幂等。
    /// surface 尺寸被钳制到上下文的最大纹理边长；
    /// 每个可交付槽位发出 allocate-notify。
    pub fn ensure_backbuffer(&mut self) {
        if self.size.width == 0 || self.size.height == 0 {
            return;
        }
        if self.surfaces[0].is_some() {
            return;
        }

        let max = self.ctx.max_texture_size();
        let texture_size =
            PhysicalSize::new(self.size.width.min(max), self.size.height.min(max));

        for index in 0..SURFACE_COUNT {
            let surface = Surface::create(
                &*self.ctx,
                &*self.allocator,
                texture_size,
                self.color_space,
            );
            if let Some(handle) = surface.share_handle() {
                self.producer.allocate_notify(index as u32, handle);
            }
            self.surfaces[index] = Some(surface);
        }

        self.framebuffer_id = Some(self.ctx.create_framebuffer());
        self.current = 0;
        self.pending_read = [false; SURFACE_COUNT];
    }

    /// ### English
    /// Binds the current surface for drawing, allocating the ring first if
    /// needed. Waits (bounded) for the consumer to release the slot if its
    /// previous contents may still be read.
    ///
    /// ### 中文
    /// 绑定当前 surface 用于绘制；必要时先分配环。
    /// 若该槽位的旧内容可能仍被读取，则有界等待消费者 release。
    pub fn bind_framebuffer(&mut self) {
        self.ensure_backbuffer();

        let Some(framebuffer_id) = self.framebuffer_id else {
            return;
        };

        self.drain_releases();
        if self.pending_read[self.current] {
            self.wait_for_release_of_current();
        }

        if let Some(surface) = self.surfaces[self.current].as_mut() {
            surface.bind(&*self.ctx, framebuffer_id);
        }
    }

    /// ### English
    /// Unbinds and releases every surface and the shared framebuffer object.
    /// Performs the free handshake first so the consumer drops its handle
    /// references before the GPU resources go away. Idempotent; safe on an
    /// empty ring.
    ///
    /// ### 中文
    /// 解绑并释放所有 surface 与共用 framebuffer 对象。
    /// 先执行 free 握手，使消费者在 GPU 资源消失前释放其句柄引用。
    /// 幂等；对空环安全。
    pub fn discard_backbuffer(&mut self) {
        let was_allocated = self.surfaces[0].is_some() || self.framebuffer_id.is_some();
        if !was_allocated {
            self.current = 0;
            return;
        }

        self.producer.free_notify();

        if let Some(framebuffer_id) = self.framebuffer_id {
            for surface in self.surfaces.iter_mut().flatten() {
                surface.unbind(&*self.ctx, framebuffer_id);
            }
        }

        if let Some(framebuffer_id) = self.framebuffer_id.take() {
            self.ctx.delete_framebuffer(framebuffer_id);
        }

        /*
        ### English
        Surfaces release GPU resources in reverse creation order.

        ### 中文
        surface 按与创建相反的顺序释放 GPU 资源。
        */
        for index in (0..SURFACE_COUNT).rev() {
            if let Some(surface) = self.surfaces[index].take() {
                surface.destroy(&*self.ctx);
            }
        }

        self.current = 0;
        self.pending_read = [false; SURFACE_COUNT];
        self.generation = self.generation.wrapping_add(1);
        self.ctx.flush();
    }

    /// ### English
    /// Discards the current ring and records the new target size and color
    /// space; the next ensure reallocates at the new size.
    ///
    /// ### 中文
    /// 丢弃当前环并记录新的目标尺寸与色彩空间；
    /// 下一次 ensure 按新尺寸重新分配。
    pub fn reshape(&mut self, size: PhysicalSize<u32>, color_space: ColorSpace) {
        self.size = size;
        self.color_space = color_space;
        self.discard_backbuffer();
        self.current = 0;
    }

    /// ### English
    /// Cycles the current index after a completed frame.
    ///
    /// ### 中文
    /// 在一帧完成后循环推进当前索引。
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % SURFACE_COUNT;
    }

    /// ### English
    /// Unbinds the current surface for swap and marks it flushed.
    ///
    /// ### 中文
    /// 为 swap 解绑当前 surface，并标记为已 flush。
    pub(crate) fn unbind_current_for_swap(&mut self) {
        let Some(framebuffer_id) = self.framebuffer_id else {
            return;
        };
        if let Some(surface) = self.surfaces[self.current].as_mut() {
            if surface.is_bound() {
                surface.unbind(&*self.ctx, framebuffer_id);
                surface.mark_flushed();
            }
        }
    }

    /// ### English
    /// Marks `slot` as possibly being read by the consumer (set on flip).
    ///
    /// ### 中文
    /// 标记 `slot` 可能正被消费者读取（flip 时置位）。
    pub(crate) fn mark_pending_read(&mut self, slot: usize) {
        if slot < SURFACE_COUNT {
            self.pending_read[slot] = true;
        }
    }

    /// ### English
    /// Drains consumer release feedback, returning released slots to `Idle`.
    ///
    /// ### 中文
    /// 取空消费者的 release 反馈，将已释放槽位复位为 `Idle`。
    pub fn drain_releases(&mut self) {
        while let Some(slot) = self.producer.try_recv_release() {
            self.clear_pending_read(slot as usize);
        }
    }

    fn wait_for_release_of_current(&mut self) {
        let deadline = Instant::now() + RELEASE_GATE_TIMEOUT;
        while self.pending_read[self.current] {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.producer.wait_release(remaining) {
                Some(slot) => self.clear_pending_read(slot as usize),
                None => break,
            }
        }

        if self.pending_read[self.current] {
            /*
            ### English
            Stalled consumer: reuse the slot rather than wedging the producer.
            Worst case is a torn read on the consumer side, same trade the
            accelerated consumer makes when it holds a frame too long.

            ### 中文
            消费者停滞：复用该槽位而不是卡死生产者。
            最坏情况是消费者侧读取到撕裂内容，与消费者长期持帧时的取舍一致。
            */
            log::warn!(
                "slot {} reused before consumer release; possible torn read",
                self.current
            );
            self.clear_pending_read(self.current);
        }
    }

    fn clear_pending_read(&mut self, slot: usize) {
        if slot >= SURFACE_COUNT {
            return;
        }
        self.pending_read[slot] = false;
        if let Some(surface) = self.surfaces[slot].as_mut() {
            if surface.phase() == SurfacePhase::Delivered {
                surface.finish_delivery();
            }
        }
    }

    /// ### English
    /// Index of the current draw slot.
    ///
    /// ### 中文
    /// 当前绘制槽位的索引。
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// ### English
    /// Current ring generation.
    ///
    /// ### 中文
    /// 环的当前代数。
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// ### English
    /// Whether the ring currently holds allocated surfaces.
    ///
    /// ### 中文
    /// 环当前是否持有已分配的 surface。
    pub fn is_allocated(&self) -> bool {
        self.surfaces[0].is_some()
    }

    /// ### English
    /// Target size recorded by the last reshape.
    ///
    /// ### 中文
    /// 上一次 reshape 记录的目标尺寸。
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// ### English
    /// Borrows the surface in `slot`, if allocated.
    ///
    /// ### 中文
    /// 借用 `slot` 中的 surface（如已分配）。
    pub fn surface(&self, slot: usize) -> Option<&Surface> {
        self.surfaces.get(slot)?.as_ref()
    }

    pub(crate) fn surface_mut(&mut self, slot: usize) -> Option<&mut Surface> {
        self.surfaces.get_mut(slot)?.as_mut()
    }

    /// ### English
    /// Producer endpoint of the handle-exchange channel.
    ///
    /// ### 中文
    /// 句柄交换通道的生产者端点。
    pub fn producer(&self) -> &ProducerEndpoint {
        &self.producer
    }

    pub(crate) fn context(&self) -> &Rc<dyn GpuContext> {
        &self.ctx
    }
}

impl Drop for BufferRing {
    /// ### English
    /// Teardown frees every GPU resource and invalidates every outstanding
    /// cross-process handle (idempotent via `discard_backbuffer`).
    ///
    /// ### 中文
    /// 销毁时释放全部 GPU 资源并使所有在外的跨进程句柄失效
    ///（经 `discard_backbuffer` 实现幂等）。
    fn drop(&mut self) {
        self.discard_backbuffer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::channel::handle_exchange_channel;
    use crate::output::testing::{CollectingSink, MockAllocator, MockGpuContext};
    use crate::output::types::DamageRect;

    fn ring_with_mocks() -> (Rc<MockGpuContext>, Rc<MockAllocator>, BufferRing) {
        let ctx = Rc::new(MockGpuContext::new());
        let allocator = Rc::new(MockAllocator::new());
        let (producer, consumer) = handle_exchange_channel();
        /*
        ### English
        The consumer half is dropped here; ring tests that need it build their
        own pair.

        ### 中文
        这里直接丢弃消费者半边；需要它的测试自行构造通道对。
        */
        drop(consumer);
        let ring = BufferRing::new(ctx.clone(), allocator.clone(), producer);
        (ctx, allocator, ring)
    }

    #[test]
    fn ensure_is_noop_without_a_size() {
        let (ctx, allocator, mut ring) = ring_with_mocks();
        ring.ensure_backbuffer();
        assert!(!ring.is_allocated());
        assert_eq!(allocator.allocation_count(), 0);
        assert_eq!(ctx.live_texture_count(), 0);
    }

    #[test]
    fn ensure_allocates_exactly_once() {
        let (ctx, allocator, mut ring) = ring_with_mocks();
        ring.reshape(PhysicalSize::new(640, 480), ColorSpace::Srgb);

        ring.ensure_backbuffer();
        assert!(ring.is_allocated());
        assert_eq!(allocator.allocation_count(), SURFACE_COUNT);
        assert_eq!(ctx.live_texture_count(), SURFACE_COUNT);
        assert_eq!(ctx.live_framebuffer_count(), 1);

        ring.ensure_backbuffer();
        assert_eq!(allocator.allocation_count(), SURFACE_COUNT);
        assert_eq!(ctx.live_texture_count(), SURFACE_COUNT);
    }

    #[test]
    fn surfaces_are_clamped_to_max_texture_size() {
        let (ctx, _allocator, mut ring) = ring_with_mocks();
        ctx.set_max_texture_size(1024);
        ring.reshape(PhysicalSize::new(4096, 512), ColorSpace::Srgb);
        ring.ensure_backbuffer();

        let surface = ring.surface(0).expect("allocated");
        assert_eq!(surface.size(), PhysicalSize::new(1024, 512));
    }

    #[test]
    fn discard_twice_is_safe_and_leaves_ring_empty() {
        let (ctx, _allocator, mut ring) = ring_with_mocks();
        ring.reshape(PhysicalSize::new(320, 240), ColorSpace::Srgb);
        ring.ensure_backbuffer();

        ring.discard_backbuffer();
        assert!(!ring.is_allocated());
        assert_eq!(ring.current_index(), 0);
        assert_eq!(ctx.live_texture_count(), 0);
        assert_eq!(ctx.live_image_count(), 0);
        assert_eq!(ctx.live_framebuffer_count(), 0);

        ring.discard_backbuffer();
        assert!(!ring.is_allocated());
        assert_eq!(ring.current_index(), 0);
    }

    #[test]
    fn reshape_discards_and_reallocates_at_new_size() {
        let (ctx, allocator, mut ring) = ring_with_mocks();
        ring.reshape(PhysicalSize::new(320, 240), ColorSpace::Srgb);
        ring.bind_framebuffer();
        let first_generation = ring.generation();

        ring.reshape(PhysicalSize::new(800, 600), ColorSpace::Srgb);
        assert!(!ring.is_allocated());
        assert!(ring.generation() > first_generation);

        ring.ensure_backbuffer();
        assert_eq!(allocator.allocation_count(), 2 * SURFACE_COUNT);
        assert_eq!(
            ring.surface(0).expect("allocated").size(),
            PhysicalSize::new(800, 600)
        );
        assert_eq!(ctx.live_texture_count(), SURFACE_COUNT);
    }

    #[test]
    fn failed_slot_degrades_to_non_deliverable() {
        let ctx = Rc::new(MockGpuContext::new());
        let allocator = Rc::new(MockAllocator::new());
        allocator.fail_allocation(1);
        let (producer, mut consumer) = handle_exchange_channel();
        let mut ring = BufferRing::new(ctx.clone(), allocator, producer);

        ring.reshape(PhysicalSize::new(100, 100), ColorSpace::Srgb);
        ring.ensure_backbuffer();

        assert!(ring.surface(0).expect("slot 0").is_deliverable());
        assert!(!ring.surface(1).expect("slot 1").is_deliverable());
        assert!(ring.surface(2).expect("slot 2").is_deliverable());

        let mut sink = CollectingSink::default();
        consumer.pump(&mut sink);
        assert!(consumer.stored_handle(0).is_some());
        assert!(consumer.stored_handle(1).is_none());
        assert!(consumer.stored_handle(2).is_some());

        /*
        ### English
        The degraded slot still binds: rendering continues on a local drawable.

        ### 中文
        降级槽位仍可绑定：渲染在本地 drawable 上继续。
        */
        ring.advance();
        ring.bind_framebuffer();
        assert!(ring.surface(1).expect("slot 1").is_bound());
    }

    #[test]
    fn release_feedback_clears_the_pending_read_gate_without_waiting() {
        let ctx = Rc::new(MockGpuContext::new());
        let allocator = Rc::new(MockAllocator::new());
        let (producer, mut consumer) = handle_exchange_channel();
        let mut ring = BufferRing::new(ctx, allocator, producer);
        ring.reshape(PhysicalSize::new(64, 64), ColorSpace::Srgb);
        ring.ensure_backbuffer();

        ring.producer()
            .flip_notify(0, DamageRect::from_size(ring.size()));
        ring.mark_pending_read(0);

        let mut sink = CollectingSink::default();
        consumer.pump(&mut sink);
        assert_eq!(sink.paints.len(), 1);
        drop(consumer);

        /*
        ### English
        The release is already queued: bind must clear the gate from feedback
        alone, never reaching the timeout path.

        ### 中文
        release 已在队列中：bind 必须仅凭反馈清除门控，绝不进入超时路径。
        */
        let started = Instant::now();
        ring.bind_framebuffer();
        assert!(started.elapsed() < RELEASE_GATE_TIMEOUT);
        assert!(ring.surface(0).expect("slot 0").is_bound());
        assert_eq!(ring.surface(0).expect("slot 0").phase(), SurfacePhase::Bound);
    }

    #[test]
    fn bind_waits_for_consumer_release_then_proceeds() {
        let (_ctx, _allocator, mut ring) = ring_with_mocks();
        ring.reshape(PhysicalSize::new(64, 64), ColorSpace::Srgb);
        ring.ensure_backbuffer();

        ring.mark_pending_read(0);
        ring.bind_framebuffer();
        /*
        ### English
        No consumer ever releases: the gate must time out and bind anyway.

        ### 中文
        没有任何消费者 release：门控必须超时并照常绑定。
        */
        assert!(ring.surface(0).expect("slot 0").is_bound());
    }

    #[test]
    fn drop_releases_all_gpu_resources() {
        let (ctx, _allocator, mut ring) = ring_with_mocks();
        ring.reshape(PhysicalSize::new(128, 128), ColorSpace::Srgb);
        ring.bind_framebuffer();
        drop(ring);

        assert_eq!(ctx.live_texture_count(), 0);
        assert_eq!(ctx.live_image_count(), 0);
        assert_eq!(ctx.live_framebuffer_count(), 0);
    }
}
