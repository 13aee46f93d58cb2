use std::path::PathBuf;

use memmap2::MmapMut;

use crate::accel::{AccelOptions, Accelerator, Capabilities, ScreenMode, VideoLayout};
use crate::error::AcceleratorError;
use crate::linuxfb::{Framebuffer, FB_ACCEL_VC4};
use crate::pixels::PixelFormat;
use crate::surface::{Rect, Surface};

const DEFAULT_FRAMEBUFFER: &str = "/dev/fb0";
const FRAMEBUFFER_ENV: &str = "BCMFB_FRAMEBUFFER";

/// 真实设备上的加速器：ioctl 走 framebuffer 文件，显存来自 mmap
pub type BcmfbAccelerator = Accelerator<Framebuffer, MmapMut>;

/// BCMFB 加速器构建器
#[derive(Debug, Clone)]
pub struct BcmfbDriverBuilder {
    fb_path: Option<PathBuf>,
    command_list_capacity: usize,
    staging_len: Option<usize>,
    capabilities: Capabilities,
    probe: bool,
}

impl Default for BcmfbDriverBuilder {
    fn default() -> Self {
        Self {
            fb_path: None,
            command_list_capacity: AccelOptions::default().command_list_capacity,
            staging_len: None,
            capabilities: Capabilities::default(),
            probe: true,
        }
    }
}

impl BcmfbDriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 Framebuffer 设备路径 (例如 "/dev/fb1")
    /// 如果不设置，默认尝试使用环境变量 `BCMFB_FRAMEBUFFER`，然后是 /dev/fb0
    pub fn with_framebuffer(mut self, path: impl Into<PathBuf>) -> Self {
        self.fb_path = Some(path.into());
        self
    }

    /// 命令列表容量，单位为 (寄存器, 值) 对 (默认: 1024)
    pub fn with_command_list_capacity(mut self, capacity: usize) -> Self {
        self.command_list_capacity = capacity;
        self
    }

    /// 显存末尾用作 blit 暂存区的字节数 (默认: 与屏幕大小相同)
    pub fn with_staging_len(mut self, len: usize) -> Self {
        self.staging_len = Some(len);
        self
    }

    /// 是否对带 alpha 的表面使用硬件 blit (默认: true)
    pub fn with_alpha_blit(mut self, enable: bool) -> Self {
        self.capabilities.blit_hw_alpha = enable;
        self
    }

    /// 是否对带颜色键的表面使用硬件 blit (默认: true)
    pub fn with_colorkey_blit(mut self, enable: bool) -> Self {
        self.capabilities.blit_hw_colorkey = enable;
        self
    }

    /// 构建时是否探测加速器接口 (默认: true)
    ///
    /// 关闭后不会发送测试命令列表，blend flags 视为可用。
    pub fn with_probe(mut self, enable: bool) -> Self {
        self.probe = enable;
        self
    }

    fn framebuffer_path(&self) -> PathBuf {
        self.fb_path
            .clone()
            .or_else(|| std::env::var(FRAMEBUFFER_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMEBUFFER))
    }

    fn options(&self) -> AccelOptions {
        AccelOptions {
            command_list_capacity: self.command_list_capacity,
            capabilities: self.capabilities,
        }
    }

    /// 打开 framebuffer，检查加速器类型，映射显存并探测加速器
    pub fn build(self) -> Result<BcmfbAccelerator, AcceleratorError> {
        let fb_path = self.framebuffer_path();
        tracing::info!("打开 Framebuffer 设备: {:?}", fb_path);

        let fb = Framebuffer::new(&fb_path)?;
        let id = fb.get_accel();
        if id != FB_ACCEL_VC4 {
            tracing::warn!("{} 不是 BCMFB 加速设备 (accel = {:#x})", fb.get_id(), id);
            return Err(AcceleratorError::NoAccelerator { id });
        }

        PixelFormat::from_fb_info(&fb.vinfo)?;
        let (width, height) = fb.get_size();
        let screen = ScreenMode {
            width,
            height,
            pitch: fb.get_line_length(),
            bits_per_pixel: fb.get_bits_per_pixel(),
        };

        let vram = fb.map()?;
        let staging_len = self.staging_len.unwrap_or_else(|| screen.len());
        let staging = vram.len().saturating_sub(staging_len)..vram.len();
        // 设备地址是 32 位的
        let device_base = fb.finfo.smem_start() as u32;
        tracing::info!(
            "{}: {}x{} {} bpp, 显存 {} 字节于 {:#x}, 暂存区 {:?}",
            fb.get_id(),
            width,
            height,
            screen.bits_per_pixel,
            vram.len(),
            device_base,
            staging
        );

        let layout = VideoLayout { device_base, screen, staging };
        let accel = Accelerator::new(fb, vram, layout, self.options())?;
        if self.probe {
            accel.probe()?;
        }
        Ok(accel)
    }
}

/// 宿主图形库调用的硬件加速回调
pub trait HwAccelCallbacks {
    /// 判断 `src` 到 `dst` 的 blit 能否走硬件，并记录在 `src` 上
    fn check_hw_blit(&self, src: &mut Surface, dst: &Surface) -> bool;

    fn fill_hw_rect(&self, dst: &Surface, rect: Rect, color: u32) -> Result<(), AcceleratorError>;

    fn hw_blit(
        &self,
        src: &Surface,
        src_rect: Rect,
        dst: &Surface,
        dst_rect: Rect,
    ) -> Result<(), AcceleratorError>;

    fn set_hw_color_key(&self, surface: &mut Surface, key: u32) -> Result<(), AcceleratorError>;
}

impl<D, M> HwAccelCallbacks for Accelerator<D, M>
where
    D: crate::accel::AccelDevice,
    M: std::ops::DerefMut<Target = [u8]>,
{
    fn check_hw_blit(&self, src: &mut Surface, dst: &Surface) -> bool {
        self.can_accelerate(src, dst)
    }

    fn fill_hw_rect(&self, dst: &Surface, rect: Rect, color: u32) -> Result<(), AcceleratorError> {
        self.fill_rect(dst, rect, color)
    }

    fn hw_blit(
        &self,
        src: &Surface,
        src_rect: Rect,
        dst: &Surface,
        dst_rect: Rect,
    ) -> Result<(), AcceleratorError> {
        self.blit(src, src_rect, dst, dst_rect)
    }

    fn set_hw_color_key(&self, surface: &mut Surface, key: u32) -> Result<(), AcceleratorError> {
        Accelerator::set_hw_color_key(self, surface, key)
    }
}
