//! Broadcom 2D 引擎的寄存器与操作码。
//!
//! 命令列表是展平的 (寄存器, 值) 对序列。"命令" 就是写入 0 的寄存器，
//! 作用于之前写入的参数。

// 表面描述符，由 SET_*_SURFACE 锁存
pub const SURFACE_ADDR: u32 = 0x00;
pub const SURFACE_STRIDE: u32 = 0x01;
pub const SURFACE_WIDTH: u32 = 0x02;
pub const SURFACE_HEIGHT: u32 = 0x03;
pub const SURFACE_FORMAT: u32 = 0x04;

pub const SET_SOURCE_SURFACE: u32 = 0x05;
pub const SET_PATTERN_SURFACE: u32 = 0x45;
pub const SET_OUTPUT_SURFACE: u32 = 0x69;

pub const FILL_COLOR: u32 = 0x2d;

// 矩形，由 SET_*_RECT 锁存
pub const RECT_X: u32 = 0x2e;
pub const RECT_Y: u32 = 0x2f;
pub const RECT_WIDTH: u32 = 0x30;
pub const RECT_HEIGHT: u32 = 0x31;

pub const SET_SOURCE_RECT: u32 = 0x32;
pub const SET_OUTPUT_RECT: u32 = 0x6e;

pub const RESET_SOURCE: u32 = 0x43;
pub const RESET_DEST: u32 = 0x53;
pub const RESET_PATTERN: u32 = 0x5b;
pub const RESET_BLEND: u32 = 0x67;
pub const RESET_OUTPUT: u32 = 0x75;

/// 每个列表开头必须按此顺序发送的流水线复位
pub const PIPELINE_RESETS: [u32; 5] =
    [RESET_SOURCE, RESET_DEST, RESET_PATTERN, RESET_BLEND, RESET_OUTPUT];

pub const COLORKEY_PARAM_0: u32 = 0x6f;
pub const COLORKEY_PARAM_1: u32 = 0x70;
pub const COLORKEY_PARAM_2: u32 = 0x71;
pub const COLORKEY_PARAM_3: u32 = 0x72;
pub const SELECT_COLORKEY: u32 = 0x73;

/// 填充时写入 COLORKEY_PARAM_0..=3 的值
pub const FILL_COLORKEY_SELECTION: [u32; 4] = [0, 0, 2, 2];

pub const EXECUTE: u32 = 0x77;

// 索引表面的调色板
pub const PALETTE_SIZE: u32 = 0x78;
pub const PALETTE_ADDR: u32 = 0x79;
pub const PALETTE_FORMAT: u32 = 0x7a;

/// 探测时单独写入，不支持 blend flags 的驱动会拒绝
pub const BLEND_FLAGS_PROBE: u32 = 0x60;
pub const BLEND_FLAGS: u32 = 0x80;

// BLEND_FLAGS 的位
pub const BLIT_ALPHA_TEST: u32 = 1;
pub const BLIT_ALPHA_BLEND: u32 = 2;
pub const BLIT_SCALE: u32 = 4;
pub const BLIT_KEEP_ASPECT_RATIO: u32 = 8;
