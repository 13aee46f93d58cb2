//! Interface to the Linux Framebuffer API
//!
//! Opens a framebuffer console device (`/dev/fb*`), reads its fixed and
//! variable screen information and maps its video memory. The raw
//! accelerator ioctls live in [`fbio`].

extern crate libc;
extern crate memmap2;

pub mod fbio;

use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;

pub use self::fbio::{ErrnoError, PixelLayout, PixelLayoutChannel, FB_ACCEL_VC4};

/// Errors returned by `Framebuffer` methods
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Framebuffer error: {0}")]
    Fb(#[from] fbio::ErrnoError),
}

/// Represents a single framebuffer device
///
/// ```no_run
/// let fb = bcmfb_accel::linuxfb::Framebuffer::new("/dev/fb0").unwrap();
///
/// println!("Device: {}", fb.get_id());
/// println!("Accelerator: {:#x}", fb.get_accel());
///
/// // Map all of video memory, on- and off-screen:
/// let vram = fb.map().unwrap();
/// println!("{} bytes of video memory", vram.len());
/// ```
pub struct Framebuffer {
    pub file: File,
    pub finfo: fbio::FixScreeninfo,
    pub vinfo: fbio::VarScreeninfo,
}

impl Framebuffer {
    /// Attempts to open the framebuffer device at the given `path` and query its properties.
    ///
    /// This operation can fail for one of the following reasons:
    /// * The device cannot be opened. In this case, the error will be the `Error::Io` variant.
    /// * Any of the `ioctl` calls used to query device properties fails. In this case, the
    ///   error will be the `Error::Fb` variant, which wraps an `ErrnoError`.
    pub fn new(path: impl AsRef<Path>) -> Result<Framebuffer, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let finfo = fbio::get_fscreeninfo(&file)?;
        let vinfo = fbio::get_vscreeninfo(&file)?;
        Ok(Framebuffer { file, finfo, vinfo })
    }

    /// Maps the whole of video memory (`smem_len` bytes).
    ///
    /// Unlike a plain display mapping this includes the off-screen area,
    /// which holds hardware surfaces and the accelerator staging buffer.
    /// The region is unmapped when the returned map is dropped.
    pub fn map(&self) -> Result<MmapMut, Error> {
        let size = self.finfo.smem_len() as usize;
        let mmap = unsafe { MmapOptions::new().len(size).map_mut(&self.file) }?;
        Ok(mmap)
    }

    /// Returns the number of bits used to represent one pixel.
    pub fn get_bits_per_pixel(&self) -> u32 {
        self.vinfo.bits_per_pixel()
    }

    /// Returns the size of the display, in pixels.
    pub fn get_size(&self) -> (u32, u32) {
        self.vinfo.size_in_pixels()
    }

    /// Length of one display line in bytes.
    pub fn get_line_length(&self) -> u32 {
        self.finfo.line_length()
    }

    /// Get identifier string of the device, as reported by the driver.
    pub fn get_id(&self) -> String {
        self.finfo.id()
    }

    /// Accelerator type reported by the driver, compare with [`FB_ACCEL_VC4`].
    pub fn get_accel(&self) -> u32 {
        self.finfo.accel()
    }
}
