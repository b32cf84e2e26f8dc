//! ### English
//! Graphics-context seam. `GpuContext` is the exact set of operations the engine
//! consumes; `GleamGpuContext` is the production implementation on top of gleam
//! (drawing GL) and glow (fence/sync GL), with platform image binding delegated
//! to an `ExternalImageBinder`.
//!
//! ### 中文
//! 图形上下文接缝。`GpuContext` 即引擎消费的全部操作集合；
//! `GleamGpuContext` 是基于 gleam（绘制 GL）与 glow（fence/sync GL）的生产实现，
//! 平台相关的 image 绑定委托给 `ExternalImageBinder`。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use dpi::PhysicalSize;
use gleam::gl::{self, Gl};
use glow::HasContext as _;

use super::allocator::GpuBuffer;
use super::SyncToken;
use crate::output::types::ColorSpace;

/// ### English
/// Graphics-context operations consumed by the ring, surfaces, and tracker.
///
/// All calls must come from the single producer thread that owns the context;
/// cross-thread use is a contract violation.
///
/// ### 中文
/// 环形缓冲、surface 与 tracker 消费的图形上下文操作。
///
/// 所有调用必须来自持有上下文的单一生产者线程；跨线程调用属于契约违规。
pub trait GpuContext {
    /// ### English
    /// Creates a texture object (no storage).
    ///
    /// ### 中文
    /// 创建纹理对象（不含存储）。
    fn create_texture(&self) -> u32;

    /// ### English
    /// Allocates local (non-shareable) storage for `texture_id`. Used as the
    /// fallback drawable when a shareable buffer cannot be allocated.
    ///
    /// ### 中文
    /// 为 `texture_id` 分配本地（不可共享）存储。
    /// 在无法分配可共享缓冲时作为回退 drawable 使用。
    fn allocate_texture_storage(&self, texture_id: u32, size: PhysicalSize<u32>);

    /// ### English
    /// Deletes a texture object.
    ///
    /// ### 中文
    /// 删除纹理对象。
    fn delete_texture(&self, texture_id: u32);

    /// ### English
    /// Creates an image from an external GPU buffer; `None` on failure.
    ///
    /// ### 中文
    /// 从外部 GPU 缓冲创建 image；失败返回 `None`。
    fn create_image(&self, buffer: &GpuBuffer) -> Option<u32>;

    /// ### English
    /// Destroys an image created by `create_image`.
    ///
    /// ### 中文
    /// 销毁由 `create_image` 创建的 image。
    fn destroy_image(&self, image_id: u32);

    /// ### English
    /// Binds `image_id` as the backing store of `texture_id`, tagging `color_space`.
    ///
    /// ### 中文
    /// 将 `image_id` 绑定为 `texture_id` 的底层存储，并标记 `color_space`。
    fn bind_image_texture(&self, texture_id: u32, image_id: u32, color_space: ColorSpace);

    /// ### English
    /// Releases the image binding established by `bind_image_texture`.
    ///
    /// ### 中文
    /// 释放 `bind_image_texture` 建立的绑定。
    fn release_image_texture(&self, texture_id: u32, image_id: u32);

    /// ### English
    /// Buffer-turnover reset on a just-presented image so an external reader can
    /// safely acquire it (e.g. cycling a keyed mutex back to its initial state).
    ///
    /// ### 中文
    /// 对刚呈现完的 image 做 buffer 轮转复位，使外部读取方可以安全获取
    ///（例如把 keyed mutex 轮转回初始状态）。
    fn prepare_for_external_read(&self, image_id: u32);

    /// ### English
    /// Creates a framebuffer object.
    ///
    /// ### 中文
    /// 创建 framebuffer 对象。
    fn create_framebuffer(&self) -> u32;

    /// ### English
    /// Deletes a framebuffer object.
    ///
    /// ### 中文
    /// 删除 framebuffer 对象。
    fn delete_framebuffer(&self, framebuffer_id: u32);

    /// ### English
    /// Binds `framebuffer_id` and attaches `texture_id` as its color target.
    ///
    /// ### 中文
    /// 绑定 `framebuffer_id` 并将 `texture_id` 附着为其颜色目标。
    fn attach_framebuffer_texture(&self, framebuffer_id: u32, texture_id: u32);

    /// ### English
    /// Detaches the color target from `framebuffer_id` and unbinds it.
    ///
    /// ### 中文
    /// 从 `framebuffer_id` 分离颜色目标并解绑。
    fn detach_framebuffer_texture(&self, framebuffer_id: u32);

    /// ### English
    /// Generates a synchronization token at the current point of the command stream.
    ///
    /// ### 中文
    /// 在命令流当前执行点生成同步 token。
    fn generate_sync_token(&self) -> SyncToken;

    /// ### English
    /// Registers `on_signal` to run once `token` has completed on the GPU.
    /// The callback may run on an arbitrary thread; callers must post any state
    /// changes back onto the producer thread themselves.
    ///
    /// ### 中文
    /// 注册 `on_signal`，在 `token` 于 GPU 上完成后运行。
    /// 回调可能在任意线程执行；调用方需自行把状态变更投递回生产者线程。
    fn signal_sync_token(&self, token: SyncToken, on_signal: Box<dyn FnOnce() + Send>);

    /// ### English
    /// Flushes the outstanding command stream.
    ///
    /// ### 中文
    /// 冲刷未提交的命令流。
    fn flush(&self);

    /// ### English
    /// Largest texture dimension supported by this context.
    ///
    /// ### 中文
    /// 该上下文支持的最大纹理边长。
    fn max_texture_size(&self) -> u32;
}

/// ### English
/// Platform backend that binds external GPU buffers to GL textures
/// (EGLImage / DXGI / IOSurface work this crate cannot express portably).
///
/// ### 中文
/// 将外部 GPU 缓冲绑定到 GL 纹理的平台后端
///（EGLImage / DXGI / IOSurface 等本 crate 无法可移植表达的部分）。
pub trait ExternalImageBinder {
    /// ### English
    /// Creates a platform image for `buffer`; `None` on failure.
    ///
    /// ### 中文
    /// 为 `buffer` 创建平台 image；失败返回 `None`。
    fn create_image(&self, buffer: &GpuBuffer) -> Option<u32>;

    /// ### English
    /// Destroys a platform image.
    ///
    /// ### 中文
    /// 销毁平台 image。
    fn destroy_image(&self, image_id: u32);

    /// ### English
    /// Attaches `image_id` as the backing of the currently bound `texture_id`.
    ///
    /// ### 中文
    /// 将 `image_id` 附着为当前已绑定 `texture_id` 的底层存储。
    fn attach(&self, texture_id: u32, image_id: u32, color_space: ColorSpace);

    /// ### English
    /// Detaches `image_id` from `texture_id`.
    ///
    /// ### 中文
    /// 将 `image_id` 从 `texture_id` 上分离。
    fn detach(&self, texture_id: u32, image_id: u32);

    /// ### English
    /// Buffer-turnover reset (see `GpuContext::prepare_for_external_read`).
    ///
    /// ### 中文
    /// buffer 轮转复位（见 `GpuContext::prepare_for_external_read`）。
    fn prepare_for_external_read(&self, image_id: u32);
}

struct PendingSignal {
    /// ### English
    /// Token this signal is keyed by.
    ///
    /// ### 中文
    /// 该信号对应的 token。
    token: SyncToken,
    /// ### English
    /// GL fence backing the token, or `None` if fence creation failed
    /// (treated as already signaled).
    ///
    /// ### 中文
    /// token 对应的 GL fence；fence 创建失败时为 `None`（视为已 signal）。
    fence: Option<glow::NativeFence>,
    /// ### English
    /// Callbacks to run when the fence signals.
    ///
    /// ### 中文
    /// fence signal 后要执行的回调。
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

/// ### English
/// Production `GpuContext` over gleam + glow. Lives on the producer thread; the
/// embedder must make the GL context current there before use and call
/// `pump_signals` each frame to poll fence completion without blocking.
///
/// ### 中文
/// 基于 gleam + glow 的生产 `GpuContext`。运行在生产者线程；
/// 宿主需先在该线程 make current，并每帧调用 `pump_signals` 以非阻塞方式
/// 轮询 fence 完成情况。
pub struct GleamGpuContext {
    /// ### English
    /// gleam GL API wrapper used for texture/framebuffer operations.
    ///
    /// ### 中文
    /// 用于纹理/framebuffer 操作的 gleam GL API 封装。
    gl: Rc<dyn Gl>,
    /// ### English
    /// glow GL API used for fence/sync operations.
    ///
    /// ### 中文
    /// 用于 fence/sync 操作的 glow GL API。
    glow: Arc<glow::Context>,
    /// ### English
    /// Platform image binder for external buffers.
    ///
    /// ### 中文
    /// 外部缓冲的平台 image 绑定后端。
    images: Box<dyn ExternalImageBinder>,
    /// ### English
    /// Sync-token id counter owned by this context (never ambient global state).
    ///
    /// ### 中文
    /// 本上下文持有的 sync token 计数器（绝不使用环境全局状态）。
    next_token: Cell<u64>,
    /// ### English
    /// Fences not yet observed signaled, with their registered callbacks.
    ///
    /// ### 中文
    /// 尚未观察到 signal 的 fence 及其已注册回调。
    pending: RefCell<Vec<PendingSignal>>,
    /// ### English
    /// Cached `GL_MAX_TEXTURE_SIZE`, queried once at construction.
    ///
    /// ### 中文
    /// 构造时一次性查询并缓存的 `GL_MAX_TEXTURE_SIZE`。
    max_texture_size: u32,
}

impl GleamGpuContext {
    /// ### English
    /// Wraps an already-current GL context. Must be called on the producer thread.
    ///
    /// ### 中文
    /// 包装一个已经 current 的 GL 上下文。必须在生产者线程调用。
    pub fn new(
        gl: Rc<dyn Gl>,
        glow: Arc<glow::Context>,
        images: Box<dyn ExternalImageBinder>,
    ) -> Result<Self, String> {
        let max_texture_size = unsafe { glow.get_parameter_i32(glow::MAX_TEXTURE_SIZE) };
        if max_texture_size <= 0 {
            return Err(format!(
                "GL reported a non-positive max texture size: {max_texture_size}"
            ));
        }

        Ok(Self {
            gl,
            glow,
            images,
            next_token: Cell::new(0),
            pending: RefCell::new(Vec::new()),
            max_texture_size: max_texture_size as u32,
        })
    }

    /// ### English
    /// Polls all pending fences without blocking and runs the callbacks of those
    /// that have signaled. Call once per frame on the producer thread.
    ///
    /// ### 中文
    /// 非阻塞轮询所有待定 fence，并执行已 signal 者的回调。
    /// 每帧在生产者线程调用一次。
    pub fn pump_signals(&self) {
        let mut signaled = Vec::new();
        {
            let mut pending = self.pending.borrow_mut();
            let mut index = 0;
            while index < pending.len() {
                let done = match pending[index].fence {
                    None => true,
                    Some(fence) => {
                        let status = unsafe { self.glow.client_wait_sync(fence, 0, 0) };
                        status == glow::ALREADY_SIGNALED || status == glow::CONDITION_SATISFIED
                    }
                };

                if done {
                    let entry = pending.swap_remove(index);
                    if let Some(fence) = entry.fence {
                        unsafe {
                            self.glow.delete_sync(fence);
                        }
                    }
                    signaled.push(entry);
                } else {
                    index += 1;
                }
            }
        }

        /*
        ### English
        Run callbacks outside the borrow: a callback may re-enter and register
        a new signal on this context.

        ### 中文
        在 borrow 之外执行回调：回调可能重入并在本上下文注册新的信号。
        */
        for entry in signaled {
            for callback in entry.callbacks {
                callback();
            }
        }
    }
}

impl GpuContext for GleamGpuContext {
    fn create_texture(&self) -> u32 {
        self.gl.gen_textures(1)[0]
    }

    fn allocate_texture_storage(&self, texture_id: u32, size: PhysicalSize<u32>) {
        self.gl.bind_texture(gl::TEXTURE_2D, texture_id);
        self.gl.tex_image_2d(
            gl::TEXTURE_2D,
            0,
            gl::RGBA as gl::GLint,
            size.width as gl::GLsizei,
            size.height as gl::GLsizei,
            0,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
            None,
        );
        self.gl.tex_parameter_i(
            gl::TEXTURE_2D,
            gl::TEXTURE_MAG_FILTER,
            gl::NEAREST as gl::GLint,
        );
        self.gl.tex_parameter_i(
            gl::TEXTURE_2D,
            gl::TEXTURE_MIN_FILTER,
            gl::NEAREST as gl::GLint,
        );
        self.gl.bind_texture(gl::TEXTURE_2D, 0);
    }

    fn delete_texture(&self, texture_id: u32) {
        self.gl.delete_textures(&[texture_id]);
    }

    fn create_image(&self, buffer: &GpuBuffer) -> Option<u32> {
        self.images.create_image(buffer)
    }

    fn destroy_image(&self, image_id: u32) {
        self.images.destroy_image(image_id);
    }

    fn bind_image_texture(&self, texture_id: u32, image_id: u32, color_space: ColorSpace) {
        self.gl.bind_texture(gl::TEXTURE_2D, texture_id);
        self.gl.tex_parameter_i(
            gl::TEXTURE_2D,
            gl::TEXTURE_MAG_FILTER,
            gl::NEAREST as gl::GLint,
        );
        self.gl.tex_parameter_i(
            gl::TEXTURE_2D,
            gl::TEXTURE_MIN_FILTER,
            gl::NEAREST as gl::GLint,
        );
        self.gl.tex_parameter_i(
            gl::TEXTURE_2D,
            gl::TEXTURE_WRAP_S,
            gl::CLAMP_TO_EDGE as gl::GLint,
        );
        self.gl.tex_parameter_i(
            gl::TEXTURE_2D,
            gl::TEXTURE_WRAP_T,
            gl::CLAMP_TO_EDGE as gl::GLint,
        );
        self.images.attach(texture_id, image_id, color_space);
        self.gl.bind_texture(gl::TEXTURE_2D, 0);
    }

    fn release_image_texture(&self, texture_id: u32, image_id: u32) {
        self.gl.bind_texture(gl::TEXTURE_2D, texture_id);
        self.images.detach(texture_id, image_id);
        self.gl.bind_texture(gl::TEXTURE_2D, 0);
    }

    fn prepare_for_external_read(&self, image_id: u32) {
        self.images.prepare_for_external_read(image_id);
    }

    fn create_framebuffer(&self) -> u32 {
        self.gl.gen_framebuffers(1)[0]
    }

    fn delete_framebuffer(&self, framebuffer_id: u32) {
        self.gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer_id);
        self.gl.delete_framebuffers(&[framebuffer_id]);
    }

    fn attach_framebuffer_texture(&self, framebuffer_id: u32, texture_id: u32) {
        self.gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer_id);
        self.gl.framebuffer_texture_2d(
            gl::FRAMEBUFFER,
            gl::COLOR_ATTACHMENT0,
            gl::TEXTURE_2D,
            texture_id,
            0,
        );
    }

    fn detach_framebuffer_texture(&self, framebuffer_id: u32) {
        self.gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer_id);
        self.gl
            .framebuffer_texture_2d(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, 0, 0);
        self.gl.bind_framebuffer(gl::FRAMEBUFFER, 0);
    }

    fn generate_sync_token(&self) -> SyncToken {
        let token = SyncToken(self.next_token.get().wrapping_add(1));
        self.next_token.set(token.0);

        let fence = unsafe { self.glow.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) }.ok();
        if fence.is_none() {
            log::warn!("fence creation failed; sync token {token:?} treated as signaled");
        }

        self.pending.borrow_mut().push(PendingSignal {
            token,
            fence,
            callbacks: Vec::new(),
        });
        token
    }

    fn signal_sync_token(&self, token: SyncToken, on_signal: Box<dyn FnOnce() + Send>) {
        let mut pending = self.pending.borrow_mut();
        match pending.iter_mut().find(|entry| entry.token == token) {
            Some(entry) => entry.callbacks.push(on_signal),
            /*
            ### English
            Unknown token: it already signaled and was reaped. Run immediately.

            ### 中文
            未知 token：说明它已经 signal 并被回收。立即执行回调。
            */
            None => {
                drop(pending);
                on_signal();
            }
        }
    }

    fn flush(&self) {
        self.gl.flush();
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }
}
