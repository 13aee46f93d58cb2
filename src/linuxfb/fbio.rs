//! This module wraps the framebuffer API's `ioctl` calls.
//! It uses a generated binding, based on the `<linux/fb.h>` header.
//! The Broadcom accelerator requests are not part of that header and are
//! declared by hand.

#![allow(non_camel_case_types)]
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

use std::os::raw::{c_int, c_void};
use std::os::unix::io::AsRawFd;

// _IOW('F', 0x20, __u32)
const FBIO_WAITFORVSYNC: u32 = 0x40044620;

/// Broadcom accelerator entry point. Not an `_IOW` encoded request, the
/// driver matches the raw number.
pub const FBIO_ACCEL: u32 = 0x23;

/// `fb_fix_screeninfo.accel` value reported by the VC4 2D engine.
pub const FB_ACCEL_VC4: u32 = 0xb0;

/// Represents an error read from the libc global `errno`
///
/// These errors are returned, when `ioctl` or other wrapped
/// libc calls fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("FBIoError {errno}: {message}")]
pub struct ErrnoError {
    /// Error number. Compare this with the `libc::E*` constants,
    /// to handle specific errors.
    pub errno: i32,
    /// Message produced by `strerror(errno)`. This value varies
    /// based on the user's locale, so do not use it for comparisons.
    pub message: String,
}

impl ErrnoError {
    fn new() -> Self {
        let errno = unsafe { *libc::__errno_location() };
        Self::from_errno(errno)
    }

    /// Builds the error for a known `errno` value.
    pub fn from_errno(errno: i32) -> Self {
        let message_c = unsafe { std::ffi::CStr::from_ptr(libc::strerror(errno)) };
        let message = message_c.to_string_lossy().into_owned();
        Self { errno, message }
    }
}

/// Argument of [`FBIO_ACCEL`]: the command words and their count.
#[repr(C)]
struct accel_list {
    ptr: *mut c_void,
    len: c_int,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PixelLayoutChannel {
    /// Start of data, in bits
    pub offset: u32,
    /// Size of data, in bits
    pub length: u32,
    /// When true, the most significant bit is on the right.
    pub msb_right: bool,
}

impl From<fb_bitfield> for PixelLayoutChannel {
    fn from(bitfield: fb_bitfield) -> Self {
        Self {
            offset: bitfield.offset,
            length: bitfield.length,
            msb_right: bitfield.msb_right != 0,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct PixelLayout {
    pub red: PixelLayoutChannel,
    pub green: PixelLayoutChannel,
    pub blue: PixelLayoutChannel,
    pub alpha: PixelLayoutChannel,
}

#[derive(Clone)]
pub struct VarScreeninfo {
    pub internal: fb_var_screeninfo,
}

impl Default for VarScreeninfo {
    fn default() -> Self {
        Self { internal: fb_var_screeninfo::default() }
    }
}

impl VarScreeninfo {
    pub fn size_in_pixels(&self) -> (u32, u32) {
        (self.internal.xres, self.internal.yres)
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.internal.bits_per_pixel
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.internal.bits_per_pixel / 8
    }

    pub fn pixel_layout(&self) -> PixelLayout {
        PixelLayout {
            red: PixelLayoutChannel::from(self.internal.red),
            green: PixelLayoutChannel::from(self.internal.green),
            blue: PixelLayoutChannel::from(self.internal.blue),
            alpha: PixelLayoutChannel::from(self.internal.transp),
        }
    }
}

#[derive(Clone)]
pub struct FixScreeninfo {
    pub internal: fb_fix_screeninfo,
}

impl Default for FixScreeninfo {
    fn default() -> Self {
        Self { internal: fb_fix_screeninfo::default() }
    }
}

impl FixScreeninfo {
    pub fn id(&self) -> String {
        let c_string = unsafe { std::ffi::CStr::from_ptr(self.internal.id.as_ptr()) };
        c_string.to_string_lossy().into_owned()
    }

    /// Bus address of the start of video memory, as seen by the accelerator.
    pub fn smem_start(&self) -> u64 {
        self.internal.smem_start as u64
    }

    /// Length of video memory in bytes.
    pub fn smem_len(&self) -> u32 {
        self.internal.smem_len
    }

    pub fn line_length(&self) -> u32 {
        self.internal.line_length
    }

    /// Accelerator id (`FB_ACCEL_*`).
    pub fn accel(&self) -> u32 {
        self.internal.accel
    }
}

/// Wrapper around `ioctl(fd, FBIOGET_VSCREENINFO, ...)`.
pub fn get_vscreeninfo(file: &impl AsRawFd) -> Result<VarScreeninfo, ErrnoError> {
    let mut vinfo = fb_var_screeninfo::default();
    match unsafe { libc::ioctl(file.as_raw_fd(), FBIOGET_VSCREENINFO as _, &mut vinfo) } {
        -1 => Err(ErrnoError::new()),
        _ => Ok(VarScreeninfo { internal: vinfo }),
    }
}

/// Wrapper around `ioctl(fd, FBIOGET_FSCREENINFO, ...)`.
pub fn get_fscreeninfo(file: &impl AsRawFd) -> Result<FixScreeninfo, ErrnoError> {
    let mut finfo = fb_fix_screeninfo::default();
    match unsafe { libc::ioctl(file.as_raw_fd(), FBIOGET_FSCREENINFO as _, &mut finfo) } {
        -1 => Err(ErrnoError::new()),
        _ => Ok(FixScreeninfo { internal: finfo }),
    }
}

/// Wrapper around `ioctl(fd, FBIO_ACCEL, ...)`.
///
/// `words` is the flat command list, `len` in the request counts words, not
/// (register, value) pairs. Blocks until the driver has accepted or rejected
/// the list; any non-zero return is a rejection.
pub fn exec_accel_list(file: &impl AsRawFd, words: &[u32]) -> Result<(), ErrnoError> {
    let mut list = accel_list {
        ptr: words.as_ptr() as *mut c_void,
        len: words.len() as c_int,
    };
    match unsafe { libc::ioctl(file.as_raw_fd(), FBIO_ACCEL as _, &mut list) } {
        0 => Ok(()),
        -1 => Err(ErrnoError::new()),
        code => Err(ErrnoError::from_errno(code)),
    }
}

/// Wrapper around `ioctl(fd, FBIO_WAITFORVSYNC, ...)`.
///
/// Blocks until the next vertical blanking interval.
pub fn wait_for_vsync(file: &impl AsRawFd) -> Result<(), ErrnoError> {
    let mut dummy: u32 = 0;
    match unsafe { libc::ioctl(file.as_raw_fd(), FBIO_WAITFORVSYNC as _, &mut dummy) } {
        -1 => Err(ErrnoError::new()),
        _ => Ok(()),
    }
}
