//! ### English
//! Host-provided shared-memory region and its mapped pixel view. The transport
//! that negotiates the region is external; this crate only validates and reads.
//!
//! ### 中文
//! 宿主提供的共享内存区域及其映射后的像素视图。协商该区域的传输层在外部；
//! 本 crate 只做校验与读取。

/// ### English
/// One negotiated shared-memory region. Either borrows a raw mapping owned by
/// the host process or owns heap storage (tests, software-only hosts).
///
/// ### 中文
/// 一块协商好的共享内存区域。要么借用宿主进程持有的原始映射，
/// 要么自持堆存储（测试、纯软件宿主）。
pub struct SharedMemoryRegion {
    /// ### English
    /// Base address of the mapping.
    ///
    /// ### 中文
    /// 映射的基地址。
    base: *mut u8,
    /// ### English
    /// Mapping length in bytes.
    ///
    /// ### 中文
    /// 映射长度（字节）。
    len: usize,
    /// ### English
    /// Keeps heap-backed storage alive for the lifetime of the region.
    ///
    /// ### 中文
    /// 为堆存储的区域保留其底层内存。
    _storage: Option<Box<[u8]>>,
}

/*
### English
The producer writes the region from its own thread; the host guarantees the
raw mapping stays valid for the region's lifetime.

### 中文
生产者在其自身线程写入该区域；宿主保证原始映射在区域生命周期内有效。
*/
unsafe impl Send for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// ### English
    /// Wraps a raw mapping owned by the host.
    ///
    /// # Safety
    /// `base` must point to a mapping of at least `len` bytes that stays valid
    /// and writable for the lifetime of the returned region.
    ///
    /// ### 中文
    /// 包装宿主持有的原始映射。
    ///
    /// # Safety
    /// `base` 必须指向至少 `len` 字节的映射，且在返回区域的生命周期内
    /// 保持有效且可写。
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        Self {
            base,
            len,
            _storage: None,
        }
    }

    /// ### English
    /// Allocates a zeroed heap-backed region of `len` bytes.
    ///
    /// ### 中文
    /// 分配 `len` 字节、清零的堆存储区域。
    pub fn from_heap(len: usize) -> Self {
        let mut storage = vec![0u8; len].into_boxed_slice();
        let base = storage.as_mut_ptr();
        Self {
            base,
            len,
            _storage: Some(storage),
        }
    }

    /// ### English
    /// Mapping length in bytes.
    ///
    /// ### 中文
    /// 映射长度（字节）。
    pub fn len(&self) -> usize {
        self.len
    }

    /// ### English
    /// Returns whether the region is zero-length.
    ///
    /// ### 中文
    /// 返回该区域长度是否为零。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// ### English
    /// Base pointer of the mapping.
    ///
    /// ### 中文
    /// 映射的基指针。
    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }
}
