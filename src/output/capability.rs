//! ### English
//! Delivery-path selection: accelerated texture sharing where the platform
//! supports it, software pixel copy otherwise, plus the host-facing controller
//! that owns the software bridge.
//!
//! ### 中文
//! 交付路径选择：平台支持时走加速纹理共享，否则走软件像素拷贝；
//! 另含持有软件 bridge 的宿主侧控制器。

use dpi::PhysicalSize;

use crate::output::software::{SharedMemoryRegion, SoftwarePixelBridge};
use crate::output::types::PixelFormat;

/// ### English
/// Which delivery path frames take to the host.
///
/// ### 中文
/// 帧送达宿主所走的交付路径。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputPath {
    /// ### English
    /// Shareable GPU textures over the handle-exchange channel.
    ///
    /// ### 中文
    /// 经句柄交换通道共享的 GPU 纹理。
    Accelerated,
    /// ### English
    /// Raw pixels through the shared-memory bridge.
    ///
    /// ### 中文
    /// 经共享内存 bridge 的原始像素。
    Software,
}

/// ### English
/// Capability query answered by the surrounding platform layer.
///
/// ### 中文
/// 由外围平台层回答的能力查询。
pub trait PlatformCapabilities {
    /// ### English
    /// Whether GPU textures can be shared across the process boundary here.
    ///
    /// ### 中文
    /// 当前平台能否跨进程边界共享 GPU 纹理。
    fn supports_shared_textures(&self) -> bool;
}

/// ### English
/// Chooses the delivery path from a platform capability query, with an optional
/// forced override for hosts that want software delivery regardless.
///
/// ### 中文
/// 依据平台能力查询选择交付路径；宿主可用强制覆盖无条件选择软件路径。
#[derive(Default)]
pub struct CapabilitySelector {
    /// ### English
    /// Overrides the capability query when set.
    ///
    /// ### 中文
    /// 设置后覆盖能力查询结果。
    forced: Option<OutputPath>,
}

impl CapabilitySelector {
    /// ### English
    /// Selector that follows the platform capability query.
    ///
    /// ### 中文
    /// 跟随平台能力查询的选择器。
    pub fn new() -> Self {
        Self::default()
    }

    /// ### English
    /// Forces a specific path regardless of platform capability.
    ///
    /// ### 中文
    /// 无视平台能力，强制使用指定路径。
    pub fn force(path: OutputPath) -> Self {
        Self { forced: Some(path) }
    }

    /// ### English
    /// Resolves the delivery path for this platform.
    ///
    /// ### 中文
    /// 解析当前平台应使用的交付路径。
    pub fn select(&self, capabilities: &dyn PlatformCapabilities) -> OutputPath {
        if let Some(path) = self.forced {
            return path;
        }

        if capabilities.supports_shared_textures() {
            OutputPath::Accelerated
        } else {
            OutputPath::Software
        }
    }
}

/// ### English
/// Host-facing display controller: resolves the path once, owns the software
/// bridge when that path is selected, and forwards activation state.
///
/// ### 中文
/// 宿主侧显示控制器：一次性解析路径，软件路径下持有软件 bridge，
/// 并负责转发激活状态。
pub struct HostDisplayController {
    /// ### English
    /// Resolved delivery path.
    ///
    /// ### 中文
    /// 已解析的交付路径。
    path: OutputPath,
    /// ### English
    /// Software bridge, present only on the software path.
    ///
    /// ### 中文
    /// 软件 bridge；仅软件路径下存在。
    bridge: Option<SoftwarePixelBridge>,
}

impl HostDisplayController {
    /// ### English
    /// Resolves the path from `selector` and `capabilities` and sets up the
    /// software bridge when needed.
    ///
    /// ### 中文
    /// 依据 `selector` 与 `capabilities` 解析路径，并按需建立软件 bridge。
    pub fn new(selector: &CapabilitySelector, capabilities: &dyn PlatformCapabilities) -> Self {
        let path = selector.select(capabilities);
        let bridge = match path {
            OutputPath::Software => Some(SoftwarePixelBridge::new(PixelFormat::Rgba8888)),
            OutputPath::Accelerated => None,
        };

        Self { path, bridge }
    }

    /// ### English
    /// Resolved delivery path.
    ///
    /// ### 中文
    /// 已解析的交付路径。
    pub fn path(&self) -> OutputPath {
        self.path
    }

    /// ### English
    /// Answers the platform's "use the proxy output device?" query: true when
    /// frames go through the accelerated exchange instead of the platform's own
    /// output device.
    ///
    /// ### 中文
    /// 回答平台的 “是否使用代理输出设备” 查询：帧经加速交换通道而非平台
    /// 自身输出设备交付时为 true。
    pub fn use_proxy_output(&self) -> bool {
        self.path == OutputPath::Accelerated
    }

    /// ### English
    /// Forwards activation state to the software bridge; ignored on the
    /// accelerated path, which has no bridge.
    ///
    /// ### 中文
    /// 将激活状态转发给软件 bridge；加速路径没有 bridge，调用被忽略。
    pub fn set_active(&mut self, active: bool) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.set_active(active);
        }
    }

    /// ### English
    /// Accepts a renegotiated shared-memory mapping on the software path.
    ///
    /// ### 中文
    /// 在软件路径下接受重新协商的共享内存映射。
    pub fn on_allocated_shared_memory(
        &mut self,
        pixel_size: PhysicalSize<u32>,
        region: SharedMemoryRegion,
    ) {
        match self.bridge.as_mut() {
            Some(bridge) => bridge.on_allocated_shared_memory(pixel_size, region),
            None => {
                log::debug!("shared memory offered on the accelerated path ignored");
            }
        }
    }

    /// ### English
    /// Borrows the software bridge, if this controller runs the software path.
    ///
    /// ### 中文
    /// 借用软件 bridge（仅软件路径下存在）。
    pub fn bridge_mut(&mut self) -> Option<&mut SoftwarePixelBridge> {
        self.bridge.as_mut()
    }

    /// ### English
    /// Pixel memory of the software mapping, or `None` on the accelerated path
    /// or before any mapping succeeded.
    ///
    /// ### 中文
    /// 软件映射的像素内存；加速路径下或映射从未成功时为 `None`。
    pub fn pixel_memory(&self) -> Option<*const u8> {
        self.bridge.as_ref().and_then(SoftwarePixelBridge::pixel_memory)
    }

    /// ### English
    /// Pixel size of the software mapping (zero before negotiation).
    ///
    /// ### 中文
    /// 软件映射的像素尺寸（协商前为零）。
    pub fn pixel_size(&self) -> PhysicalSize<u32> {
        self.bridge
            .as_ref()
            .map(SoftwarePixelBridge::pixel_size)
            .unwrap_or_else(|| PhysicalSize::new(0, 0))
    }
}
