//! ### English
//! Frame-completion tracking: issues a sync token per swap, waits for the GPU
//! asynchronously, then flips the finished slot, advances the ring, and feeds
//! timing back into the compositor client's swap/presentation model.
//!
//! ### 中文
//! 帧完成跟踪：每次 swap 生成一个 sync token，异步等待 GPU 完成，
//! 然后 flip 完成的槽位、推进环，并将时间信息反馈给合成器客户端的
//! swap/呈现模型。

use std::rc::Rc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dpi::PhysicalSize;

use crate::output::gpu::GpuContext;
use crate::output::ring::BufferRing;
use crate::output::types::{
    DamageRect, FrameRequest, LatencyRecord, PresentationFeedback, SwapCompletion,
};

/// ### English
/// Nominal frame interval reported in presentation feedback. Off-screen mode
/// has no real vblank, so "now plus this interval" is a deliberate overestimate.
///
/// ### 中文
/// presentation feedback 中上报的名义帧间隔。离屏模式没有真实 vblank，
/// 因此 “now 加该间隔” 是有意的高估。
pub const NOMINAL_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// ### English
/// Compositor-client callbacks invoked on the producer thread after each
/// completed frame.
///
/// ### 中文
/// 每帧完成后在生产者线程上调用的合成器客户端回调。
pub trait OutputClient {
    /// ### English
    /// Swap acknowledgment with latency records and completion timestamp.
    ///
    /// ### 中文
    /// 携带延迟记录与完成时间戳的 swap 确认。
    fn did_receive_swap_ack(&mut self, completion: SwapCompletion);

    /// ### English
    /// Presentation feedback for the client's presentation model.
    ///
    /// ### 中文
    /// 提供给客户端呈现模型的 presentation feedback。
    fn did_receive_presentation_feedback(&mut self, feedback: PresentationFeedback);

    /// ### English
    /// Size notification, only emitted when requested via
    /// `set_needs_swap_size_notifications`.
    ///
    /// ### 中文
    /// 尺寸通知；仅在通过 `set_needs_swap_size_notifications` 请求后发出。
    fn did_swap_with_size(&mut self, size: PhysicalSize<u32>);
}

/// ### English
/// One in-flight frame awaiting its sync token, tagged with the ring generation
/// captured at swap time.
///
/// ### 中文
/// 一个等待其 sync token 的在途帧，携带 swap 时捕获的环代数标签。
struct PendingCompletion {
    /// ### English
    /// Ring generation at swap time; a mismatch at delivery means the surface
    /// was discarded and the completion must be dropped.
    ///
    /// ### 中文
    /// swap 时的环代数；交付时不匹配表示 surface 已被丢弃，
    /// 该 completion 必须被丢弃。
    generation: u64,
    /// ### English
    /// Slot that held the frame when the token was issued.
    ///
    /// ### 中文
    /// 发出 token 时持有该帧的槽位。
    slot: usize,
    /// ### English
    /// Latency records echoed back to the client.
    ///
    /// ### 中文
    /// 回传给客户端的延迟记录。
    latency: Vec<LatencyRecord>,
}

/// ### English
/// Tracks swaps from token generation to client-visible completion. All methods
/// must run on the producer thread; completion signals arriving on other threads
/// are posted through an internal channel and acted on in `pump_completions`.
///
/// ### 中文
/// 跟踪从 token 生成到客户端可见完成的整个 swap 过程。所有方法必须在
/// 生产者线程运行；到达其他线程的完成信号经内部通道投递，
/// 在 `pump_completions` 中处理。
pub struct FrameCompletionTracker {
    /// ### English
    /// Graphics context used for flush and sync-token operations.
    ///
    /// ### 中文
    /// 用于 flush 与 sync token 操作的图形上下文。
    ctx: Rc<dyn GpuContext>,
    /// ### English
    /// Client receiving swap/presentation callbacks.
    ///
    /// ### 中文
    /// 接收 swap/呈现回调的客户端。
    client: Box<dyn OutputClient>,
    /// ### English
    /// Sender cloned into completion callbacks (any thread).
    ///
    /// ### 中文
    /// 克隆进完成回调的发送端（可在任意线程使用）。
    completions_tx: Sender<PendingCompletion>,
    /// ### English
    /// Producer-thread receive side of the completion channel.
    ///
    /// ### 中文
    /// 完成通道在生产者线程的接收端。
    completions_rx: Receiver<PendingCompletion>,
    /// ### English
    /// Whether the client asked for size-change notifications.
    ///
    /// ### 中文
    /// 客户端是否请求了尺寸变化通知。
    needs_swap_size_notifications: bool,
    /// ### English
    /// Thread that owns this tracker; GPU calls from any other thread are a
    /// contract violation caught in debug builds.
    ///
    /// ### 中文
    /// 持有该 tracker 的线程；来自其他线程的 GPU 调用属于契约违规，
    /// 在 debug 构建中被捕获。
    producer_thread: ThreadId,
}

impl FrameCompletionTracker {
    /// ### English
    /// Creates a tracker bound to the calling (producer) thread.
    ///
    /// ### 中文
    /// 创建绑定到调用线程（生产者线程）的 tracker。
    pub fn new(ctx: Rc<dyn GpuContext>, client: Box<dyn OutputClient>) -> Self {
        let (completions_tx, completions_rx) = unbounded();
        Self {
            ctx,
            client,
            completions_tx,
            completions_rx,
            needs_swap_size_notifications: false,
            producer_thread: thread::current().id(),
        }
    }

    /// ### English
    /// Enables or disables `did_swap_with_size` notifications.
    ///
    /// ### 中文
    /// 开启或关闭 `did_swap_with_size` 通知。
    pub fn set_needs_swap_size_notifications(&mut self, needs: bool) {
        self.needs_swap_size_notifications = needs;
    }

    /// ### English
    /// Swaps the current frame: flush, unbind, generate a sync token, and
    /// register an asynchronous completion keyed by it. The frame becomes
    /// client-visible later, in `pump_completions`.
    ///
    /// ### 中文
    /// 交换当前帧：flush、解绑、生成 sync token，并注册以其为键的异步完成。
    /// 该帧稍后在 `pump_completions` 中对客户端可见。
    pub fn swap_buffers(&mut self, ring: &mut BufferRing, frame: FrameRequest) {
        self.assert_producer_thread();
        debug_assert_eq!(frame.size, ring.size(), "swap size differs from ring size");

        if !ring.is_allocated() {
            log::debug!("swap on an unallocated ring ignored");
            return;
        }

        self.ctx.flush();
        ring.unbind_current_for_swap();

        let token = self.ctx.generate_sync_token();
        let pending = PendingCompletion {
            generation: ring.generation(),
            slot: ring.current_index(),
            latency: frame.latency,
        };
        let completions_tx = self.completions_tx.clone();
        self.ctx.signal_sync_token(
            token,
            Box::new(move || {
                let _ = completions_tx.send(pending);
            }),
        );
    }

    /// ### English
    /// Acts on all completion signals received so far: buffer-turnover reset,
    /// flip-notify, ring advance, then client callbacks with a monotonic "now"
    /// plus the nominal frame interval. Completions from a discarded ring
    /// generation are dropped untouched.
    ///
    /// ### 中文
    /// 处理目前收到的全部完成信号：buffer 轮转复位、flip-notify、推进环，
    /// 然后以单调 “now” 加名义帧间隔回调客户端。
    /// 来自已丢弃环代数的 completion 原样丢弃。
    pub fn pump_completions(&mut self, ring: &mut BufferRing) {
        self.assert_producer_thread();

        while let Ok(completion) = self.completions_rx.try_recv() {
            if completion.generation != ring.generation() {
                log::debug!(
                    "completion for stale ring generation {} dropped",
                    completion.generation
                );
                continue;
            }

            let deliverable = {
                let Some(surface) = ring.surface_mut(completion.slot) else {
                    log::error!("completion for missing surface in slot {}", completion.slot);
                    continue;
                };
                surface.prepare_for_external_read(&*self.ctx);
                surface.is_deliverable()
            };

            if deliverable {
                ring.producer()
                    .flip_notify(completion.slot as u32, DamageRect::from_size(ring.size()));
                ring.mark_pending_read(completion.slot);
            } else {
                /*
                ### English
                Degraded slot: rendering happened locally, delivery is skipped.

                ### 中文
                降级槽位：渲染已在本地完成，跳过交付。
                */
                log::debug!("flip skipped for non-deliverable slot {}", completion.slot);
            }

            ring.advance();

            let now = Instant::now();
            self.client.did_receive_swap_ack(SwapCompletion {
                latency: completion.latency,
                completed_at: now,
            });
            self.client
                .did_receive_presentation_feedback(PresentationFeedback {
                    timestamp: now,
                    interval: NOMINAL_FRAME_INTERVAL,
                });
            if self.needs_swap_size_notifications {
                self.client.did_swap_with_size(ring.size());
            }
        }
    }

    #[inline]
    fn assert_producer_thread(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.producer_thread,
            "tracker used off the producer thread"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::output::channel::handle_exchange_channel;
    use crate::output::gpu::GpuBufferAllocator;
    use crate::output::ring::SurfacePhase;
    use crate::output::testing::{CollectingSink, MockAllocator, MockGpuContext, RecordingClient};
    use crate::output::types::ColorSpace;

    struct Fixture {
        ctx: Rc<MockGpuContext>,
        ring: BufferRing,
        tracker: FrameCompletionTracker,
        client: Rc<RefCell<RecordingClient>>,
    }

    fn fixture(size: PhysicalSize<u32>) -> Fixture {
        let ctx = Rc::new(MockGpuContext::new());
        let allocator: Rc<dyn GpuBufferAllocator> = Rc::new(MockAllocator::new());
        let (producer, consumer) = handle_exchange_channel();
        drop(consumer);
        let mut ring = BufferRing::new(ctx.clone(), allocator, producer);
        ring.reshape(size, ColorSpace::Srgb);

        let client = Rc::new(RefCell::new(RecordingClient::default()));
        let tracker = FrameCompletionTracker::new(ctx.clone(), Box::new(client.clone()));
        Fixture {
            ctx,
            ring,
            tracker,
            client,
        }
    }

    fn draw_one_frame(fixture: &mut Fixture) {
        fixture.ring.bind_framebuffer();
        let frame = FrameRequest::new(fixture.ring.size());
        fixture.tracker.swap_buffers(&mut fixture.ring, frame);
        fixture.ctx.signal_all_pending();
        fixture.tracker.pump_completions(&mut fixture.ring);
    }

    #[test]
    fn five_swaps_cycle_the_current_index() {
        let mut fixture = fixture(PhysicalSize::new(256, 256));
        let mut indices = Vec::new();
        for _ in 0..5 {
            draw_one_frame(&mut fixture);
            indices.push(fixture.ring.current_index());
        }
        assert_eq!(indices, vec![1, 2, 0, 1, 2]);
    }

    #[test]
    fn index_returns_to_zero_after_ring_size_swaps() {
        let mut fixture = fixture(PhysicalSize::new(64, 64));
        for _ in 0..crate::output::ring::SURFACE_COUNT {
            draw_one_frame(&mut fixture);
        }
        assert_eq!(fixture.ring.current_index(), 0);
    }

    #[test]
    fn completion_invokes_swap_ack_and_presentation_feedback() {
        let mut fixture = fixture(PhysicalSize::new(128, 128));
        draw_one_frame(&mut fixture);

        let client = fixture.client.borrow();
        assert_eq!(client.swap_acks.len(), 1);
        assert_eq!(client.feedbacks.len(), 1);
        assert_eq!(client.feedbacks[0].interval, NOMINAL_FRAME_INTERVAL);
        assert!(client.sizes.is_empty());
    }

    #[test]
    fn size_notifications_only_fire_when_requested() {
        let mut fixture = fixture(PhysicalSize::new(128, 128));
        fixture.tracker.set_needs_swap_size_notifications(true);
        draw_one_frame(&mut fixture);

        let client = fixture.client.borrow();
        assert_eq!(client.sizes, vec![PhysicalSize::new(128, 128)]);
    }

    #[test]
    fn completion_emits_flip_for_the_swapped_slot() {
        let ctx = Rc::new(MockGpuContext::new());
        let allocator: Rc<dyn GpuBufferAllocator> = Rc::new(MockAllocator::new());
        let (producer, mut consumer) = handle_exchange_channel();
        let mut ring = BufferRing::new(ctx.clone(), allocator, producer);
        ring.reshape(PhysicalSize::new(100, 50), ColorSpace::Srgb);

        let client = Rc::new(RefCell::new(RecordingClient::default()));
        let mut tracker = FrameCompletionTracker::new(ctx.clone(), Box::new(client));

        ring.bind_framebuffer();
        let frame = FrameRequest::new(ring.size());
        tracker.swap_buffers(&mut ring, frame);
        ctx.signal_all_pending();
        tracker.pump_completions(&mut ring);

        let mut sink = CollectingSink::default();
        consumer.pump(&mut sink);
        assert_eq!(sink.paints.len(), 1);
        let (damage, _handle) = &sink.paints[0];
        assert_eq!(*damage, DamageRect::from_size(PhysicalSize::new(100, 50)));
    }

    #[test]
    fn reshape_before_signal_drops_the_completion() {
        let mut fixture = fixture(PhysicalSize::new(200, 200));
        fixture.ring.bind_framebuffer();
        let frame = FrameRequest::new(fixture.ring.size());
        fixture.tracker.swap_buffers(&mut fixture.ring, frame);

        /*
        ### English
        The surface is discarded while its token is in flight; the late signal
        must be dropped without touching the new ring.

        ### 中文
        surface 在其 token 在途时被丢弃；迟到的信号必须被丢弃，
        不得触碰新的环。
        */
        fixture
            .ring
            .reshape(PhysicalSize::new(400, 400), ColorSpace::Srgb);
        fixture.ctx.signal_all_pending();
        fixture.tracker.pump_completions(&mut fixture.ring);

        let client = fixture.client.borrow();
        assert!(client.swap_acks.is_empty());
        assert!(client.feedbacks.is_empty());
        assert_eq!(fixture.ring.current_index(), 0);
    }

    #[test]
    fn reshape_while_bound_discards_without_completion_callback() {
        let mut fixture = fixture(PhysicalSize::new(200, 200));
        fixture.ring.bind_framebuffer();
        assert_eq!(
            fixture.ring.surface(0).expect("bound slot").phase(),
            SurfacePhase::Bound
        );

        fixture
            .ring
            .reshape(PhysicalSize::new(300, 300), ColorSpace::Srgb);
        fixture.tracker.pump_completions(&mut fixture.ring);

        assert!(fixture.client.borrow().swap_acks.is_empty());
        assert!(!fixture.ring.is_allocated());
    }

    #[test]
    fn swap_on_empty_ring_is_ignored() {
        let ctx = Rc::new(MockGpuContext::new());
        let allocator: Rc<dyn GpuBufferAllocator> = Rc::new(MockAllocator::new());
        let (producer, consumer) = handle_exchange_channel();
        drop(consumer);
        let mut ring = BufferRing::new(ctx.clone(), allocator, producer);

        let client = Rc::new(RefCell::new(RecordingClient::default()));
        let mut tracker = FrameCompletionTracker::new(ctx.clone(), Box::new(client.clone()));

        let frame = FrameRequest::new(ring.size());
        tracker.swap_buffers(&mut ring, frame);
        ctx.signal_all_pending();
        tracker.pump_completions(&mut ring);

        assert!(client.borrow().swap_acks.is_empty());
        assert_eq!(ctx.pending_signal_count(), 0);
    }
}
