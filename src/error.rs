//! 定义库的统一错误类型。

use crate::linuxfb::{self, ErrnoError};
use thiserror::Error;

/// 加速器后端的主错误类型。
#[derive(Debug, Error)]
pub enum AcceleratorError {
    /// 命令列表已满。操作的长度是固定的，出现此错误说明容量配置过小。
    #[error("命令列表已满 (容量 {capacity} 对)")]
    CapacityExceeded { capacity: usize },

    /// `FBIO_ACCEL` ioctl 拒绝了命令列表。列表已被丢弃，加速器仍可继续使用。
    #[error("加速器拒绝了命令列表: {0}")]
    DeviceRejected(ErrnoError),

    /// 等待设备空闲失败。
    #[error("等待加速器空闲失败: {0}")]
    WaitIdle(ErrnoError),

    /// 色深不是 8、16 或 32 bpp 之一。
    #[error("不支持的像素格式: {0} bpp")]
    UnsupportedFormat(u32),

    /// 矩形超出了表面或显存范围。
    #[error("矩形超出表面范围")]
    RectOutOfBounds,

    /// 暂存缓冲区装不下目标矩形。
    #[error("加速暂存缓冲区过小: 需要 {needed} 字节, 可用 {available} 字节")]
    StagingTooSmall { needed: usize, available: usize },

    /// 源表面未被标记为硬件 blit，调用方应走软件路径。
    #[error("该表面未启用硬件加速 blit")]
    NotAccelerated,

    /// 显存中没有足够大的空闲区域。
    #[error("显存不足: 请求 {requested} 字节, 最大空闲块 {largest} 字节")]
    OutOfVideoMemory { requested: usize, largest: usize },

    /// 表面不对应任何已分配的显存块。
    #[error("未知的显存块")]
    UnknownBucket,

    /// 显存布局 (屏幕区、暂存区) 与映射长度不一致。
    #[error("显存布局无效: {0}")]
    InvalidMemoryLayout(String),

    /// Framebuffer 报告的加速器不是 VC4。
    #[error("设备没有受支持的 2D 加速器 (accel id {id:#x})")]
    NoAccelerator { id: u32 },

    /// 封装了打开、查询或映射 framebuffer 时的 I/O 或 ioctl 错误。
    #[error("Linux Framebuffer 错误: {0}")]
    Framebuffer(#[from] linuxfb::Error),
}
