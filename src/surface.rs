//! 表面与矩形。
//!
//! 表面由宿主图形库拥有，这里只描述加速器需要的几何与格式信息。

use crate::accel::vidmem::BucketId;

/// 像素矩形，坐标和尺寸都不为负。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// 矩形是否完全位于 `width` x `height` 的表面内
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x as u64 + self.w as u64;
        let bottom = self.y as u64 + self.h as u64;
        right <= width as u64 && bottom <= height as u64
    }

    pub fn same_origin(&self, other: &Rect) -> bool {
        self.x == other.x && self.y == other.y
    }
}

/// 源表面使用哪条 blit 路径，由 `Accelerator::can_accelerate` 决定。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlitMethod {
    #[default]
    Software,
    Hardware,
}

/// 加速器视角下的表面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    /// 像素 (0, 0) 在映射显存中的字节偏移
    pub offset: usize,
    pub width: u32,
    pub height: u32,
    /// 每行字节数
    pub pitch: u32,
    pub bits_per_pixel: u32,
    /// 8-bpp 索引表面使用的调色板设备地址
    pub palette_addr: Option<u32>,
    /// 整个表面的 alpha (SRCALPHA)
    pub src_alpha: bool,
    /// 颜色键 (SRCCOLORKEY)
    pub color_key: Option<u32>,
    /// 对应的显存块。不在显存中的表面没有显存块，也就不能作为硬件目标。
    pub bucket: Option<BucketId>,
    /// 是否为可见的主屏表面
    pub primary: bool,
    pub blit_method: BlitMethod,
}

impl Surface {
    /// 创建一个紧密排列 (pitch = width * 字节每像素) 的表面描述。
    /// pitch 超出 `u32` 时取 `u32::MAX`，这样的表面不会通过任何边界检查。
    pub fn new(offset: usize, width: u32, height: u32, bits_per_pixel: u32) -> Self {
        Self {
            offset,
            width,
            height,
            pitch: width.saturating_mul(bits_per_pixel / 8),
            bits_per_pixel,
            palette_addr: None,
            src_alpha: false,
            color_key: None,
            bucket: None,
            primary: false,
            blit_method: BlitMethod::Software,
        }
    }

    pub fn with_pitch(mut self, pitch: u32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_palette(mut self, palette_addr: u32) -> Self {
        self.palette_addr = Some(palette_addr);
        self
    }

    pub fn with_alpha(mut self, enable: bool) -> Self {
        self.src_alpha = enable;
        self
    }

    pub fn with_bucket(mut self, bucket: BucketId) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.bits_per_pixel / 8
    }

    /// `rect` 左上角像素的字节偏移: offset + y * pitch + x * bytes_per_pixel
    pub fn pixel_offset(&self, rect: &Rect) -> usize {
        self.offset
            + rect.y as usize * self.pitch as usize
            + rect.x as usize * self.bytes_per_pixel() as usize
    }

    /// 表面占用的字节数 (溢出时为 `usize::MAX`)
    pub fn len(&self) -> usize {
        (self.pitch as usize).saturating_mul(self.height as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
