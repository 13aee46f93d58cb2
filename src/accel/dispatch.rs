//! 命令列表提交。

use super::cmdlist::CommandList;
use super::regs;
use crate::error::AcceleratorError;
use crate::linuxfb::{fbio, ErrnoError, Framebuffer};

/// 加速器的内核接口。
///
/// 只有 `exec_list` 必须实现：一次阻塞请求，携带展平后的命令字。
/// 驱动接受列表后即返回，此时硬件未必已经执行完。
pub trait AccelDevice: Send {
    fn exec_list(&self, words: &[u32]) -> Result<(), ErrnoError>;

    /// 阻塞直到所有已提交的工作完成
    fn wait_idle(&self) -> Result<(), ErrnoError> {
        Ok(())
    }

    /// 阻塞直到下一次垂直消隐
    fn wait_vblank(&self) -> Result<(), ErrnoError> {
        Ok(())
    }
}

impl AccelDevice for Framebuffer {
    fn exec_list(&self, words: &[u32]) -> Result<(), ErrnoError> {
        fbio::exec_accel_list(&self.file, words)
    }

    // bcmfb 驱动没有等待空闲的请求，FBIO_ACCEL 返回时列表已被处理
    fn wait_idle(&self) -> Result<(), ErrnoError> {
        tracing::trace!("等待空闲");
        Ok(())
    }

    fn wait_vblank(&self) -> Result<(), ErrnoError> {
        fbio::wait_for_vsync(&self.file)
    }
}

/// 把命令列表交给 [`AccelDevice`]
#[derive(Debug)]
pub struct Dispatcher<D> {
    device: D,
    blend_flags: bool,
}

impl<D: AccelDevice> Dispatcher<D> {
    pub fn new(device: D) -> Self {
        Self { device, blend_flags: true }
    }

    /// 提交 `list`，无论结果如何都会清空它。
    ///
    /// 被拒绝的列表直接丢弃，不会重发。
    pub fn submit(&self, list: &mut CommandList) -> Result<(), AcceleratorError> {
        let pairs = list.len();
        let result = self.device.exec_list(list.as_u32_slice());
        list.clear();
        match result {
            Ok(()) => {
                tracing::trace!(pairs, "命令列表已被接受");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(pairs, "BCMFB 加速 ioctl 失败: {}", e);
                Err(AcceleratorError::DeviceRejected(e))
            }
        }
    }

    /// 先检查设备是否接受命令列表，再检查是否接受 blend flags。
    ///
    /// 只有空列表被拒绝时才返回错误。`list` 中残留的内容会先被丢弃。
    pub fn probe(&mut self, list: &mut CommandList) -> Result<(), AcceleratorError> {
        list.clear();
        self.submit(list)?;
        tracing::info!("找到 BCMFB 加速接口");

        list.emit_param(regs::BLEND_FLAGS_PROBE, 0)?;
        if self.submit(list).is_err() {
            tracing::info!("BCMFB 不支持 blend flags");
            self.blend_flags = false;
        }
        Ok(())
    }

    pub fn set_blend_flags(&mut self, enable: bool) {
        self.blend_flags = enable;
    }

    pub fn supports_blend_flags(&self) -> bool {
        self.blend_flags
    }

    pub fn wait_idle(&self) -> Result<(), AcceleratorError> {
        self.device.wait_idle().map_err(AcceleratorError::WaitIdle)
    }

    pub fn wait_vblank(&self) -> Result<(), AcceleratorError> {
        self.device
            .wait_vblank()
            .map_err(|e| AcceleratorError::Framebuffer(e.into()))
    }
}
