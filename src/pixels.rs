//! 像素格式定义。
//!
//! 负责把表面的色深映射到 2D 加速器的格式标签。该映射是固定的，运行时不会改变。

use crate::error::AcceleratorError;
use crate::linuxfb::fbio;

/// 调色板的条目数 (8-bpp 索引格式)。
pub const PALETTE_ENTRIES: u32 = 256;

/// 加速器支持的表面像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bpp 索引色, 需要额外的调色板参数
    Indexed8,
    /// 16-bpp RGB565 格式
    Rgb565,
    /// 32-bpp ARGB 格式
    Argb8888,
}

impl PixelFormat {
    /// 根据色深选择格式。其他色深返回 `UnsupportedFormat`，不会生成未定义的标签。
    pub fn from_bpp(bits_per_pixel: u32) -> Result<Self, AcceleratorError> {
        match bits_per_pixel {
            8 => Ok(PixelFormat::Indexed8),
            16 => Ok(PixelFormat::Rgb565),
            32 => Ok(PixelFormat::Argb8888),
            bpp => {
                tracing::warn!("不支持的色深: {} bpp (仅支持 8、16 和 32)", bpp);
                Err(AcceleratorError::UnsupportedFormat(bpp))
            }
        }
    }

    /// 根据 fb_var_screeninfo 检测屏幕的像素格式
    pub fn from_fb_info(vinfo: &fbio::VarScreeninfo) -> Result<Self, AcceleratorError> {
        let format = Self::from_bpp(vinfo.bits_per_pixel())?;
        if format == PixelFormat::Rgb565 {
            let layout = vinfo.pixel_layout();
            let is_565 = layout.red.offset == 11
                && layout.green.offset == 5
                && layout.blue.offset == 0
                && layout.red.length == 5
                && layout.green.length == 6
                && layout.blue.length == 5;
            if !is_565 {
                tracing::warn!("不支持的 16-bpp 布局 (非标准 RGB565)");
                return Err(AcceleratorError::UnsupportedFormat(16));
            }
        }
        Ok(format)
    }

    /// 加速器的格式标签
    pub const fn tag(self) -> u32 {
        match self {
            PixelFormat::Indexed8 => 0x12e4_0008,
            PixelFormat::Rgb565 => 0x06e4_0565,
            PixelFormat::Argb8888 => 0x07e4_8888,
        }
    }

    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Indexed8 => 8,
            PixelFormat::Rgb565 => 16,
            PixelFormat::Argb8888 => 32,
        }
    }

    pub const fn bytes_per_pixel(self) -> u32 {
        self.bits_per_pixel() / 8
    }

    pub const fn is_indexed(self) -> bool {
        matches!(self, PixelFormat::Indexed8)
    }
}
