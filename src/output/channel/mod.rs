//! ### English
//! Asynchronous cross-process handle-exchange protocol between the producer
//! (ring/tracker side) and the consumer (embedding host side). Strict FIFO per
//! channel; the free-notify is a synchronous handshake layered on top.
//!
//! ### 中文
//! 生产者（环/tracker 侧）与消费者（宿主侧）之间的异步跨进程句柄交换协议。
//! 通道内严格 FIFO；free-notify 是叠加其上的同步握手。

mod consumer;

use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Receiver, Sender};

pub use consumer::{AcceleratedPaintSink, ConsumerEndpoint};

use crate::output::gpu::NativeBufferHandle;
use crate::output::types::DamageRect;

/// ### English
/// How long the producer waits for the consumer's free acknowledgment before
/// proceeding with teardown anyway.
///
/// ### 中文
/// 生产者在继续执行销毁前，等待消费者 free 确认的最长时间。
pub const FREE_ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// ### English
/// Producer → consumer protocol messages.
///
/// ### 中文
/// 生产者 → 消费者的协议消息。
pub(crate) enum ExchangeMessage {
    /// ### English
    /// `handle` now backs ring slot `slot`.
    ///
    /// ### 中文
    /// `handle` 现在支撑环形槽位 `slot`。
    Allocate {
        slot: u32,
        handle: NativeBufferHandle,
    },
    /// ### English
    /// All slots are invalidated; the consumer must drop every stored reference
    /// before signaling `ack`.
    ///
    /// ### 中文
    /// 所有槽位失效；消费者必须在触发 `ack` 前释放全部已存引用。
    Free { ack: Sender<()> },
    /// ### English
    /// Slot `slot` now holds a fully synchronized frame ready to read.
    ///
    /// ### 中文
    /// 槽位 `slot` 现在持有一帧已完全同步、可供读取的内容。
    Flip { slot: u32, damage: DamageRect },
}

/// ### English
/// Creates a connected producer/consumer endpoint pair. The transport here is
/// in-process; a real cross-process deployment replaces the channels with its
/// own FIFO transport carrying the same messages.
///
/// ### 中文
/// 创建一对已连接的生产者/消费者端点。此处的传输是进程内实现；
/// 真实跨进程部署用承载相同消息的自有 FIFO 传输替换这对通道。
pub fn handle_exchange_channel() -> (ProducerEndpoint, ConsumerEndpoint) {
    let (message_tx, message_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    (
        ProducerEndpoint {
            messages: message_tx,
            releases: release_rx,
        },
        ConsumerEndpoint::new(message_rx, release_tx),
    )
}

/// ### English
/// Producer-side endpoint. Lives with the ring/tracker on the producer thread.
///
/// ### 中文
/// 生产者侧端点。与环/tracker 一起位于生产者线程。
pub struct ProducerEndpoint {
    /// ### English
    /// Outgoing protocol messages (FIFO).
    ///
    /// ### 中文
    /// 发出的协议消息（FIFO）。
    messages: Sender<ExchangeMessage>,
    /// ### English
    /// Consumer → producer feedback: slot indices the consumer finished reading.
    ///
    /// ### 中文
    /// 消费者 → 生产者的反馈：消费者已读取完毕的槽位索引。
    releases: Receiver<u32>,
}

impl ProducerEndpoint {
    /// ### English
    /// Informs the consumer that `handle` now backs `slot`.
    ///
    /// ### 中文
    /// 告知消费者 `handle` 现在支撑 `slot`。
    pub fn allocate_notify(&self, slot: u32, handle: NativeBufferHandle) {
        if self
            .messages
            .send(ExchangeMessage::Allocate { slot, handle })
            .is_err()
        {
            log::debug!("allocate notify dropped: consumer endpoint is gone");
        }
    }

    /// ### English
    /// Invalidates all slots and waits for the consumer to drop its references.
    /// A disconnected consumer counts as acknowledged (its process, and with it
    /// every stored reference, is gone); a timeout proceeds with a warning so a
    /// stalled consumer cannot wedge producer teardown.
    ///
    /// ### 中文
    /// 使所有槽位失效，并等待消费者释放其引用。
    /// 通道断开视为已确认（消费者进程连同其全部引用已消失）；
    /// 超时则记录警告后继续，避免卡死的消费者阻塞生产者销毁流程。
    pub fn free_notify(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self
            .messages
            .send(ExchangeMessage::Free { ack: ack_tx })
            .is_err()
        {
            return;
        }

        match ack_rx.recv_timeout(FREE_ACK_TIMEOUT) {
            Ok(()) => {}
            Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("free notify not acknowledged within {FREE_ACK_TIMEOUT:?}");
            }
        }
    }

    /// ### English
    /// Declares that `slot` holds a fully synchronized frame covering `damage`.
    ///
    /// ### 中文
    /// 声明 `slot` 持有一帧覆盖 `damage` 的已同步内容。
    pub fn flip_notify(&self, slot: u32, damage: DamageRect) {
        if self
            .messages
            .send(ExchangeMessage::Flip { slot, damage })
            .is_err()
        {
            log::debug!("flip notify dropped: consumer endpoint is gone");
        }
    }

    /// ### English
    /// Non-blocking poll for one consumer-released slot index.
    ///
    /// ### 中文
    /// 非阻塞地取出一个消费者已释放的槽位索引。
    pub fn try_recv_release(&self) -> Option<u32> {
        self.releases.try_recv().ok()
    }

    /// ### English
    /// Bounded wait for one consumer-released slot index.
    ///
    /// ### 中文
    /// 有界等待一个消费者已释放的槽位索引。
    pub fn wait_release(&self, timeout: Duration) -> Option<u32> {
        self.releases.recv_timeout(timeout).ok()
    }
}
