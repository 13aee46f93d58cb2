//! 2D blit/填充加速器。
//!
//! [`Accelerator`] 持有调用方之间共享的全部状态：命令列表、设备、显存块和映射的显存。
//! 这些状态都在同一把互斥锁之后，主屏和离屏的每次提交都被串行化，
//! 调用方看不到别人正在构建的命令列表。
//!
//! 调用顺序即加锁顺序。互斥锁不保证公平，需要跨线程严格先进先出的调用方要自行排队。

pub mod cmdlist;
pub mod dispatch;
mod ops;
pub mod regs;
pub mod vidmem;

#[cfg(test)]
pub(crate) mod testing;

use std::ops::{DerefMut, Range};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use self::cmdlist::{CommandList, CommandWord, SurfaceDescriptor};
pub use self::dispatch::{AccelDevice, Dispatcher};
pub use self::vidmem::{Bucket, BucketId, VidmemBuckets};

use crate::error::AcceleratorError;
use crate::pixels::PixelFormat;
use crate::surface::Surface;

/// 加速器支持的功能
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// 矩形填充
    pub blit_fill: bool,
    /// 表面到表面的 blit
    pub blit_hw: bool,
    /// 带整体 alpha 的表面
    pub blit_hw_alpha: bool,
    /// 带颜色键的表面
    pub blit_hw_colorkey: bool,
    /// 设备接受 blend flags 寄存器
    pub blend_flags: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            blit_fill: true,
            blit_hw: true,
            blit_hw_alpha: true,
            blit_hw_colorkey: true,
            blend_flags: true,
        }
    }
}

/// 可见屏幕的几何信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenMode {
    pub width: u32,
    pub height: u32,
    /// 每行字节数
    pub pitch: u32,
    pub bits_per_pixel: u32,
}

impl ScreenMode {
    pub fn len(&self) -> usize {
        self.pitch as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 映射显存的划分方式。
///
/// `[0, screen.len())` 是屏幕，`[screen.len(), staging.start)` 存放硬件表面，
/// `staging` 是硬件 blit 的渲染目标。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLayout {
    /// 映射第 0 字节的设备地址
    pub device_base: u32,
    pub screen: ScreenMode,
    pub staging: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelOptions {
    /// 命令列表容量，单位为 (寄存器, 值) 对
    pub command_list_capacity: usize,
    pub capabilities: Capabilities,
}

impl Default for AccelOptions {
    fn default() -> Self {
        Self {
            command_list_capacity: CommandList::DEFAULT_CAPACITY,
            capabilities: Capabilities::default(),
        }
    }
}

pub(crate) struct AccelState<D, M> {
    pub(crate) list: CommandList,
    pub(crate) dispatcher: Dispatcher<D>,
    pub(crate) buckets: VidmemBuckets,
    pub(crate) vram: M,
}

impl<D: AccelDevice, M> AccelState<D, M> {
    fn mark_busy(&mut self, surface: &Surface) {
        if let Some(bucket) = surface.bucket {
            if self.buckets.mark_dirty(bucket).is_err() {
                tracing::warn!(?bucket, "表面引用了已释放的显存块");
            }
        }
    }

    fn wait_idle_and_clear_all(&mut self) -> Result<(), AcceleratorError> {
        self.dispatcher.wait_idle()?;
        self.buckets.clear_all_dirty();
        Ok(())
    }
}

/// 紧密排列的表面所需的字节数，溢出时为 `None`
fn packed_len(width: u32, height: u32, format: PixelFormat) -> Option<usize> {
    let pitch = width.checked_mul(format.bytes_per_pixel())?;
    (pitch as usize).checked_mul(height as usize)
}

/// 一个 framebuffer 设备的加速器。
///
/// `D` 是内核接口，`M` 是映射的显存 (真实设备上为 `MmapMut`)。
pub struct Accelerator<D, M> {
    state: Mutex<AccelState<D, M>>,
    layout: VideoLayout,
    capabilities: Capabilities,
    vram_len: usize,
}

impl<D: AccelDevice, M: DerefMut<Target = [u8]>> Accelerator<D, M> {
    pub fn new(
        device: D,
        vram: M,
        layout: VideoLayout,
        options: AccelOptions,
    ) -> Result<Self, AcceleratorError> {
        PixelFormat::from_bpp(layout.screen.bits_per_pixel)?;
        let vram_len = vram.len();
        let screen_len = layout.screen.len();
        if screen_len > layout.staging.start
            || layout.staging.start > layout.staging.end
            || layout.staging.end > vram_len
        {
            return Err(AcceleratorError::InvalidMemoryLayout(format!(
                "screen {} bytes, staging {:?}, mapped {} bytes",
                screen_len, layout.staging, vram_len
            )));
        }

        let mut dispatcher = Dispatcher::new(device);
        dispatcher.set_blend_flags(options.capabilities.blend_flags);

        let state = AccelState {
            list: CommandList::with_capacity(options.command_list_capacity),
            dispatcher,
            buckets: VidmemBuckets::new(screen_len, layout.staging.start),
            vram,
        };
        Ok(Self {
            state: Mutex::new(state),
            layout,
            capabilities: options.capabilities,
            vram_len,
        })
    }

    // 每次提交都会清空命令列表，操作之间状态总是一致的，锁中毒后可以继续使用
    fn lock(&self) -> MutexGuard<'_, AccelState<D, M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 确认设备接受命令列表，并检测是否支持 blend flags
    pub fn probe(&self) -> Result<(), AcceleratorError> {
        let mut state = self.lock();
        let AccelState { list, dispatcher, .. } = &mut *state;
        dispatcher.probe(list)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            blend_flags: self.lock().dispatcher.supports_blend_flags(),
            ..self.capabilities
        }
    }

    pub fn layout(&self) -> &VideoLayout {
        &self.layout
    }

    /// 显存字节偏移对应的设备地址
    pub fn device_addr(&self, offset: usize) -> u32 {
        self.layout.device_base.wrapping_add(offset as u32)
    }

    /// 可见屏幕，对应头部显存块
    pub fn primary_surface(&self) -> Surface {
        let screen = &self.layout.screen;
        let mut surface = Surface::new(0, screen.width, screen.height, screen.bits_per_pixel)
            .with_pitch(screen.pitch)
            .with_bucket(BucketId::HEAD);
        surface.primary = true;
        surface
    }

    /// 在离屏显存中分配一个紧密排列的硬件表面
    pub fn alloc_surface(
        &self,
        width: u32,
        height: u32,
        bits_per_pixel: u32,
    ) -> Result<Surface, AcceleratorError> {
        let format = PixelFormat::from_bpp(bits_per_pixel)?;
        // 大小无法表示的请求按最大值处理，由分配器报告显存不足
        let size = packed_len(width, height, format).unwrap_or(usize::MAX);
        let mut state = self.lock();
        let bucket = state.buckets.alloc(size)?;
        let mut surface = Surface::new(0, width, height, bits_per_pixel);
        surface.offset = state.buckets.get(bucket).map_or(0, |b| b.base);
        surface.bucket = Some(bucket);
        Ok(surface)
    }

    /// 释放硬件表面的显存。表面仍忙时先等待设备空闲。
    pub fn free_surface(&self, surface: &Surface) -> Result<(), AcceleratorError> {
        let bucket = surface.bucket.ok_or(AcceleratorError::UnknownBucket)?;
        let mut state = self.lock();
        if state.buckets.is_dirty(bucket) {
            tracing::debug!(?bucket, "释放忙碌的表面，等待空闲");
            state.wait_idle_and_clear_all()?;
        }
        state.buckets.free(bucket)
    }

    /// 尚未分配给表面的离屏显存字节数
    pub fn memory_left(&self) -> usize {
        self.lock().buckets.memleft()
    }

    /// 把 `surface` 标记为可能仍在被硬件使用
    pub fn mark_busy(&self, surface: &Surface) {
        self.lock().mark_busy(surface);
    }

    /// 不在显存中的表面总是返回 false
    pub fn is_busy(&self, surface: &Surface) -> bool {
        surface
            .bucket
            .is_some_and(|bucket| self.lock().buckets.is_dirty(bucket))
    }

    /// 等待整个设备空闲，然后把所有表面标记为空闲。
    /// 无法只等待单个表面。
    pub fn wait_idle_and_clear_all(&self) -> Result<(), AcceleratorError> {
        self.lock().wait_idle_and_clear_all()
    }

    /// 等待垂直回扫
    pub fn wait_vbl(&self) -> Result<(), AcceleratorError> {
        self.lock().dispatcher.wait_vblank()
    }

    /// 在持有加速器锁的情况下由 CPU 访问显存
    pub fn with_vram<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut state = self.lock();
        f(&mut state.vram[..])
    }
}
