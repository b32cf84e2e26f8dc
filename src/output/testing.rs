//! ### English
//! Shared test doubles: a fully in-memory `GpuContext` with manually driven
//! sync tokens, a scriptable allocator, and recording sinks/clients.
//!
//! ### 中文
//! 共享测试替身：纯内存、sync token 手动驱动的 `GpuContext`，
//! 可编排失败的分配器，以及记录型 sink 与客户端。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dpi::PhysicalSize;

use crate::output::channel::AcceleratedPaintSink;
use crate::output::gpu::{
    BufferUsage, GpuBuffer, GpuBufferAllocator, GpuContext, NativeBufferHandle, SyncToken,
};
use crate::output::tracker::OutputClient;
use crate::output::types::{
    ColorSpace, DamageRect, PixelFormat, PresentationFeedback, SwapCompletion,
};

struct MockPendingSignal {
    token: SyncToken,
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

/// ### English
/// In-memory `GpuContext`: tracks live texture/image/framebuffer ids and holds
/// sync-token callbacks until a test fires them with `signal_all_pending`.
///
/// ### 中文
/// 纯内存 `GpuContext`：跟踪存活的纹理/image/framebuffer id，
/// 并保存 sync token 回调，直到测试通过 `signal_all_pending` 触发。
pub(crate) struct MockGpuContext {
    next_id: Cell<u32>,
    textures: RefCell<Vec<u32>>,
    images: RefCell<Vec<u32>>,
    framebuffers: RefCell<Vec<u32>>,
    next_token: Cell<u64>,
    pending: RefCell<Vec<MockPendingSignal>>,
    max_texture_size: Cell<u32>,
}

impl MockGpuContext {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            textures: RefCell::new(Vec::new()),
            images: RefCell::new(Vec::new()),
            framebuffers: RefCell::new(Vec::new()),
            next_token: Cell::new(0),
            pending: RefCell::new(Vec::new()),
            max_texture_size: Cell::new(8192),
        }
    }

    pub(crate) fn set_max_texture_size(&self, max: u32) {
        self.max_texture_size.set(max);
    }

    pub(crate) fn live_texture_count(&self) -> usize {
        self.textures.borrow().len()
    }

    pub(crate) fn live_image_count(&self) -> usize {
        self.images.borrow().len()
    }

    pub(crate) fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.borrow().len()
    }

    pub(crate) fn pending_signal_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// ### English
    /// Completes every outstanding sync token and runs its callbacks, standing
    /// in for the GPU finishing the command stream.
    ///
    /// ### 中文
    /// 完成所有在途 sync token 并执行其回调，模拟 GPU 执行完命令流。
    pub(crate) fn signal_all_pending(&self) {
        let drained: Vec<MockPendingSignal> = self.pending.borrow_mut().drain(..).collect();
        for entry in drained {
            for callback in entry.callbacks {
                callback();
            }
        }
    }

    fn fresh_id(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn remove_id(list: &RefCell<Vec<u32>>, id: u32) {
        let mut list = list.borrow_mut();
        if let Some(position) = list.iter().position(|&entry| entry == id) {
            list.swap_remove(position);
        } else {
            panic!("released id {id} was never created or was already released");
        }
    }
}

impl GpuContext for MockGpuContext {
    fn create_texture(&self) -> u32 {
        let id = self.fresh_id();
        self.textures.borrow_mut().push(id);
        id
    }

    fn allocate_texture_storage(&self, _texture_id: u32, _size: PhysicalSize<u32>) {}

    fn delete_texture(&self, texture_id: u32) {
        Self::remove_id(&self.textures, texture_id);
    }

    fn create_image(&self, _buffer: &GpuBuffer) -> Option<u32> {
        let id = self.fresh_id();
        self.images.borrow_mut().push(id);
        Some(id)
    }

    fn destroy_image(&self, image_id: u32) {
        Self::remove_id(&self.images, image_id);
    }

    fn bind_image_texture(&self, _texture_id: u32, _image_id: u32, _color_space: ColorSpace) {}

    fn release_image_texture(&self, _texture_id: u32, _image_id: u32) {}

    fn prepare_for_external_read(&self, _image_id: u32) {}

    fn create_framebuffer(&self) -> u32 {
        let id = self.fresh_id();
        self.framebuffers.borrow_mut().push(id);
        id
    }

    fn delete_framebuffer(&self, framebuffer_id: u32) {
        Self::remove_id(&self.framebuffers, framebuffer_id);
    }

    fn attach_framebuffer_texture(&self, _framebuffer_id: u32, _texture_id: u32) {}

    fn detach_framebuffer_texture(&self, _framebuffer_id: u32) {}

    fn generate_sync_token(&self) -> SyncToken {
        let token = SyncToken(self.next_token.get().wrapping_add(1));
        self.next_token.set(token.0);
        self.pending.borrow_mut().push(MockPendingSignal {
            token,
            callbacks: Vec::new(),
        });
        token
    }

    fn signal_sync_token(&self, token: SyncToken, on_signal: Box<dyn FnOnce() + Send>) {
        let mut pending = self.pending.borrow_mut();
        match pending.iter_mut().find(|entry| entry.token == token) {
            Some(entry) => entry.callbacks.push(on_signal),
            None => {
                drop(pending);
                on_signal();
            }
        }
    }

    fn flush(&self) {}

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size.get()
    }
}

/// ### English
/// Allocator double handing out opaque handles, with scriptable per-call
/// failures to exercise the non-deliverable degradation path.
///
/// ### 中文
/// 分配器替身：发放 opaque 句柄，可按调用序号编排失败，
/// 用于测试不可交付降级路径。
pub(crate) struct MockAllocator {
    calls: Cell<usize>,
    failing_calls: RefCell<Vec<usize>>,
}

impl MockAllocator {
    pub(crate) fn new() -> Self {
        Self {
            calls: Cell::new(0),
            failing_calls: RefCell::new(Vec::new()),
        }
    }

    /// ### English
    /// Makes the allocation with zero-based index `call` fail.
    ///
    /// ### 中文
    /// 使序号为 `call`（从零计数）的那次分配失败。
    pub(crate) fn fail_allocation(&self, call: usize) {
        self.failing_calls.borrow_mut().push(call);
    }

    pub(crate) fn allocation_count(&self) -> usize {
        self.calls.get()
    }
}

impl GpuBufferAllocator for MockAllocator {
    fn allocate(
        &self,
        size: PhysicalSize<u32>,
        format: PixelFormat,
        _usage: BufferUsage,
    ) -> Option<GpuBuffer> {
        let call = self.calls.get();
        self.calls.set(call + 1);

        if self.failing_calls.borrow().contains(&call) {
            return None;
        }
        let handle = NativeBufferHandle::Opaque(call as u64 + 1);
        Some(GpuBuffer::new(handle, size, format))
    }
}

/// ### English
/// Accelerated paint sink that records every flip it receives.
///
/// ### 中文
/// 记录每次收到的 flip 的加速绘制 sink。
#[derive(Default)]
pub(crate) struct CollectingSink {
    pub(crate) paints: Vec<(DamageRect, NativeBufferHandle)>,
}

impl AcceleratedPaintSink for CollectingSink {
    fn on_accelerated_paint(&mut self, damage: DamageRect, handle: &NativeBufferHandle) {
        self.paints.push((damage, *handle));
    }
}

/// ### English
/// Output client that records every callback it receives.
///
/// ### 中文
/// 记录每次收到的回调的输出客户端。
#[derive(Default)]
pub(crate) struct RecordingClient {
    pub(crate) swap_acks: Vec<SwapCompletion>,
    pub(crate) feedbacks: Vec<PresentationFeedback>,
    pub(crate) sizes: Vec<PhysicalSize<u32>>,
}

impl OutputClient for RecordingClient {
    fn did_receive_swap_ack(&mut self, completion: SwapCompletion) {
        self.swap_acks.push(completion);
    }

    fn did_receive_presentation_feedback(&mut self, feedback: PresentationFeedback) {
        self.feedbacks.push(feedback);
    }

    fn did_swap_with_size(&mut self, size: PhysicalSize<u32>) {
        self.sizes.push(size);
    }
}

/*
### English
Lets fixtures keep a handle on the client after boxing it for the tracker.

### 中文
使测试夹具在将客户端装箱交给 tracker 后仍保留其引用。
*/
impl OutputClient for Rc<RefCell<RecordingClient>> {
    fn did_receive_swap_ack(&mut self, completion: SwapCompletion) {
        self.borrow_mut().did_receive_swap_ack(completion);
    }

    fn did_receive_presentation_feedback(&mut self, feedback: PresentationFeedback) {
        self.borrow_mut().did_receive_presentation_feedback(feedback);
    }

    fn did_swap_with_size(&mut self, size: PhysicalSize<u32>) {
        self.borrow_mut().did_swap_with_size(size);
    }
}
