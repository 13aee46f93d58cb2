//! Broadcom framebuffer (bcmfb) 的 2D 硬件加速后端
//!
//! 通过私有的 `FBIO_ACCEL` ioctl 向加速器提交 (寄存器, 值) 命令列表，
//! 实现矩形填充和表面 blit，并跟踪哪些显存区域可能仍在被硬件使用。
pub mod accel;
pub mod driver;
pub mod error;
pub mod linuxfb;
pub mod pixels;
pub mod surface;

pub use accel::{AccelDevice, AccelOptions, Accelerator, Capabilities, ScreenMode, VideoLayout};
pub use driver::{BcmfbAccelerator, BcmfbDriverBuilder, HwAccelCallbacks};
pub use error::AcceleratorError;
pub use pixels::PixelFormat;
pub use surface::{BlitMethod, Rect, Surface};

/// 打开默认的 BCMFB 加速器 (使用默认配置)。
///
/// 默认配置打开 `BCMFB_FRAMEBUFFER` 指定的设备或 `/dev/fb0`，
/// 把显存末尾一屏大小的区域用作 blit 暂存区，并探测加速器。
/// 如需自定义，请使用 `BcmfbDriverBuilder`。
///
/// # 返回
/// 成功时返回加速器，如果 framebuffer 无法打开、没有 VC4 加速器或
/// 像素格式不受支持，则返回 `Err(AcceleratorError)`。
pub fn open() -> Result<BcmfbAccelerator, AcceleratorError> {
    BcmfbDriverBuilder::new().build()
}
