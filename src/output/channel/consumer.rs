//! ### English
//! Consumer-side endpoint of the handle-exchange protocol. Stores per-slot
//! platform handles, dispatches flips to the host's accelerated paint sink, and
//! defensively ignores flips for freed or never-allocated slots.
//!
//! ### 中文
//! 句柄交换协议的消费者侧端点。按槽位保存平台句柄，将 flip 分发给宿主的
//! 加速绘制 sink，并对已释放或从未分配槽位的 flip 做防御性忽略。

use crossbeam_channel::{Receiver, Sender};

use super::ExchangeMessage;
use crate::output::gpu::NativeBufferHandle;
use crate::output::ring::SURFACE_COUNT;
use crate::output::types::DamageRect;

/// ### English
/// Host paint sink for the accelerated path. Invoked on whatever thread drives
/// the consumer endpoint; it must not assume co-location with the producer.
///
/// ### 中文
/// 加速路径的宿主绘制 sink。在驱动消费者端点的线程上被调用；
/// 不得假设与生产者线程同址。
pub trait AcceleratedPaintSink {
    /// ### English
    /// A synchronized frame is readable through `handle`; `damage` is the region
    /// that changed.
    ///
    /// ### 中文
    /// 可通过 `handle` 读取一帧已同步内容；`damage` 为变化区域。
    fn on_accelerated_paint(&mut self, damage: DamageRect, handle: &NativeBufferHandle);
}

/// ### English
/// Consumer-side endpoint. Runs on the host's own thread via `run` or is pumped
/// manually via `pump`.
///
/// ### 中文
/// 消费者侧端点。可通过 `run` 在宿主自己的线程上循环运行，
/// 也可通过 `pump` 手动驱动。
pub struct ConsumerEndpoint {
    /// ### English
    /// Incoming protocol messages (FIFO).
    ///
    /// ### 中文
    /// 接收的协议消息（FIFO）。
    messages: Receiver<ExchangeMessage>,
    /// ### English
    /// Feedback channel reporting finished reads back to the producer.
    ///
    /// ### 中文
    /// 将读取完成情况反馈给生产者的通道。
    releases: Sender<u32>,
    /// ### English
    /// Platform handle stored for each ring slot, if currently allocated.
    ///
    /// ### 中文
    /// 每个环形槽位当前保存的平台句柄（如已分配）。
    handles: [Option<NativeBufferHandle>; SURFACE_COUNT],
}

impl ConsumerEndpoint {
    pub(super) fn new(messages: Receiver<ExchangeMessage>, releases: Sender<u32>) -> Self {
        Self {
            messages,
            releases,
            handles: [None; SURFACE_COUNT],
        }
    }

    /// ### English
    /// Drains all currently queued messages, dispatching flips into `sink`.
    ///
    /// ### 中文
    /// 取空当前已排队的消息，并将 flip 分发到 `sink`。
    pub fn pump(&mut self, sink: &mut dyn AcceleratedPaintSink) {
        while let Ok(message) = self.messages.try_recv() {
            self.handle_message(message, sink);
        }
    }

    /// ### English
    /// Blocking message loop; returns when the producer endpoint disconnects.
    ///
    /// ### 中文
    /// 阻塞消息循环；生产者端点断开后返回。
    pub fn run(mut self, sink: &mut dyn AcceleratedPaintSink) {
        loop {
            match self.messages.recv() {
                Ok(message) => self.handle_message(message, sink),
                Err(_) => return,
            }
        }
    }

    /// ### English
    /// The platform handle currently stored for `slot`, if any.
    ///
    /// ### 中文
    /// `slot` 当前保存的平台句柄（若有）。
    pub fn stored_handle(&self, slot: u32) -> Option<&NativeBufferHandle> {
        self.handles.get(slot as usize)?.as_ref()
    }

    fn handle_message(&mut self, message: ExchangeMessage, sink: &mut dyn AcceleratedPaintSink) {
        match message {
            ExchangeMessage::Allocate { slot, handle } => {
                match self.handles.get_mut(slot as usize) {
                    Some(stored) => *stored = Some(handle),
                    None => {
                        log::debug!("allocate notify for out-of-range slot {slot} ignored");
                    }
                }
            }
            ExchangeMessage::Free { ack } => {
                /*
                ### English
                Every stored reference must be gone before the ack: the producer
                reuses the underlying resources as soon as it returns.

                ### 中文
                必须在 ack 之前清空全部已存引用：生产者在握手返回后会立即
                复用底层资源。
                */
                for stored in &mut self.handles {
                    *stored = None;
                }
                let _ = ack.send(());
            }
            ExchangeMessage::Flip { slot, damage } => {
                match self.handles.get(slot as usize).and_then(Option::as_ref) {
                    Some(handle) => {
                        sink.on_accelerated_paint(damage, handle);
                        if self.releases.send(slot).is_err() {
                            log::debug!("release feedback dropped: producer endpoint is gone");
                        }
                    }
                    /*
                    ### English
                    Flip for a freed or never-allocated slot: defensive no-op.
                    The stale handle must never be dereferenced.

                    ### 中文
                    针对已释放或从未分配槽位的 flip：防御性 no-op。
                    过期句柄绝不能被解引用。
                    */
                    None => {
                        log::debug!("flip notify for unallocated slot {slot} ignored");
                    }
                }
            }
        }
    }
}
