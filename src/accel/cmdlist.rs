//! 命令列表的构建。
//!
//! [`CommandList`] 只负责累积命令字，从不访问设备。
//! 提交由 [`Dispatcher`](super::dispatch::Dispatcher) 完成。

use super::regs;
use crate::error::AcceleratorError;
use crate::pixels::{PixelFormat, PALETTE_ENTRIES};
use crate::surface::Rect;

/// 一个 (寄存器, 值) 对，内存布局与内核读取的格式完全一致
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CommandWord {
    pub reg: u32,
    pub value: u32,
}

/// 加速器眼中的表面：几何信息与格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    /// 第一个像素的设备地址
    pub addr: u32,
    /// 每行字节数
    pub stride: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// 调色板的设备地址，仅索引格式会发送
    pub palette_addr: u32,
}

/// 固定容量的硬件命令列表。
///
/// 容量以对为单位。空列表表示可以开始新的操作。
#[derive(Debug)]
pub struct CommandList {
    words: Vec<CommandWord>,
    capacity: usize,
}

impl Default for CommandList {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl CommandList {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn with_capacity(capacity: usize) -> Self {
        Self { words: Vec::with_capacity(capacity), capacity }
    }

    /// 追加一对；列表已满时返回错误且不修改列表
    pub fn emit_param(&mut self, reg: u32, value: u32) -> Result<(), AcceleratorError> {
        if self.words.len() >= self.capacity {
            return Err(AcceleratorError::CapacityExceeded { capacity: self.capacity });
        }
        self.words.push(CommandWord { reg, value });
        Ok(())
    }

    /// 命令就是操作数为 0 的参数写入
    pub fn emit_command(&mut self, opcode: u32) -> Result<(), AcceleratorError> {
        self.emit_param(opcode, 0)
    }

    /// 复位所有流水线阶段。必须位于一次操作的所有其他命令之前，
    /// 否则硬件会沿用上一个列表遗留的状态。
    pub fn reset_pipeline_stages(&mut self) -> Result<(), AcceleratorError> {
        regs::PIPELINE_RESETS
            .iter()
            .try_for_each(|&opcode| self.emit_command(opcode))
    }

    /// 写入表面描述符，索引格式再附带调色板参数。
    /// 之后用某个 `SET_*_SURFACE` 命令锁存。
    pub fn emit_surface(&mut self, surface: &SurfaceDescriptor) -> Result<(), AcceleratorError> {
        self.emit_param(regs::SURFACE_ADDR, surface.addr)?;
        self.emit_param(regs::SURFACE_STRIDE, surface.stride)?;
        self.emit_param(regs::SURFACE_WIDTH, surface.width)?;
        self.emit_param(regs::SURFACE_HEIGHT, surface.height)?;
        self.emit_param(regs::SURFACE_FORMAT, surface.format.tag())?;
        if surface.format.is_indexed() {
            self.emit_param(regs::PALETTE_SIZE, PALETTE_ENTRIES)?;
            self.emit_param(regs::PALETTE_ADDR, surface.palette_addr)?;
            self.emit_param(regs::PALETTE_FORMAT, PixelFormat::Argb8888.tag())?;
        }
        Ok(())
    }

    /// 把表面描述符寄存器清零
    pub fn emit_cleared_surface(&mut self) -> Result<(), AcceleratorError> {
        [
            regs::SURFACE_ADDR,
            regs::SURFACE_STRIDE,
            regs::SURFACE_WIDTH,
            regs::SURFACE_HEIGHT,
            regs::SURFACE_FORMAT,
        ]
        .iter()
        .try_for_each(|&reg| self.emit_param(reg, 0))
    }

    /// 写入矩形，之后用某个 `SET_*_RECT` 命令锁存
    pub fn emit_rect(&mut self, rect: Rect) -> Result<(), AcceleratorError> {
        self.emit_param(regs::RECT_X, rect.x)?;
        self.emit_param(regs::RECT_Y, rect.y)?;
        self.emit_param(regs::RECT_WIDTH, rect.w)?;
        self.emit_param(regs::RECT_HEIGHT, rect.h)
    }

    /// 列表中的对数
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 交给内核的扁平 u32 数组
    pub fn as_u32_slice(&self) -> &[u32] {
        bytemuck::cast_slice(&self.words)
    }

    /// 丢弃所有对，保留已分配的内存
    pub fn clear(&mut self) {
        self.words.clear();
    }
}
