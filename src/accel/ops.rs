//! 加速填充与 blit。

use std::ops::DerefMut;

use super::cmdlist::{CommandList, SurfaceDescriptor};
use super::dispatch::AccelDevice;
use super::{regs, Accelerator};
use crate::error::AcceleratorError;
use crate::pixels::PixelFormat;
use crate::surface::{BlitMethod, Rect, Surface};

/// 填充命令列表，`dst.addr` 已指向矩形的第一个像素
pub(crate) fn build_fill(
    list: &mut CommandList,
    dst: &SurfaceDescriptor,
    rect: Rect,
    color: u32,
) -> Result<(), AcceleratorError> {
    list.reset_pipeline_stages()?;

    // 硬件要求复用前先清零旧的描述符
    list.emit_cleared_surface()?;
    list.emit_command(regs::SET_PATTERN_SURFACE)?;
    list.emit_cleared_surface()?;
    list.emit_command(regs::SET_SOURCE_SURFACE)?;

    list.emit_param(regs::FILL_COLOR, color)?;

    list.emit_rect(rect)?;
    list.emit_command(regs::SET_OUTPUT_RECT)?;

    list.emit_surface(dst)?;
    list.emit_command(regs::SET_OUTPUT_SURFACE)?;

    let [p0, p1, p2, p3] = regs::FILL_COLORKEY_SELECTION;
    list.emit_param(regs::COLORKEY_PARAM_0, p0)?;
    list.emit_param(regs::COLORKEY_PARAM_1, p1)?;
    list.emit_param(regs::COLORKEY_PARAM_2, p2)?;
    list.emit_param(regs::COLORKEY_PARAM_3, p3)?;
    list.emit_command(regs::SELECT_COLORKEY)?;

    list.emit_command(regs::EXECUTE)
}

/// blit 命令列表。`flags` 只有存在且非零时才会发送
pub(crate) fn build_blit(
    list: &mut CommandList,
    src: &SurfaceDescriptor,
    src_rect: Rect,
    dst: &SurfaceDescriptor,
    dst_rect: Rect,
    flags: Option<u32>,
) -> Result<(), AcceleratorError> {
    list.reset_pipeline_stages()?;

    list.emit_surface(src)?;
    list.emit_command(regs::SET_SOURCE_SURFACE)?;
    list.emit_rect(src_rect)?;
    list.emit_command(regs::SET_SOURCE_RECT)?;

    list.emit_surface(dst)?;
    list.emit_command(regs::SET_OUTPUT_SURFACE)?;
    list.emit_rect(dst_rect)?;
    list.emit_command(regs::SET_OUTPUT_RECT)?;

    if let Some(flags) = flags.filter(|&f| f != 0) {
        list.emit_param(regs::BLEND_FLAGS, flags)?;
    }

    list.emit_command(regs::EXECUTE)
}

pub(crate) fn blit_flags(src: &Surface, src_rect: &Rect, dst: &Surface, dst_rect: &Rect) -> u32 {
    let mut flags = 0;
    if src.src_alpha {
        flags |= regs::BLIT_ALPHA_TEST | regs::BLIT_ALPHA_BLEND;
    }
    if !src_rect.same_origin(dst_rect) {
        flags |= regs::BLIT_SCALE;
    }
    // 两个表面尺寸相同时置位
    if src.width == dst.width && src.height == dst.height {
        flags |= regs::BLIT_KEEP_ASPECT_RATIO;
    }
    flags
}

/// 从 `start` 开始、每行间隔 `stride` 的 `rows` 行 (每行 `row_len` 字节) 的结束位置
fn rect_span(start: usize, stride: usize, row_len: usize, rows: usize) -> usize {
    match rows {
        0 => start,
        rows => start + (rows - 1) * stride + row_len,
    }
}

/// 加速器写入描述符时使用的行跨度：紧密排列，与表面的 pitch 无关
fn descriptor_stride(surface: &Surface, format: PixelFormat) -> u32 {
    surface.width.saturating_mul(format.bytes_per_pixel())
}

impl<D: AccelDevice, M: DerefMut<Target = [u8]>> Accelerator<D, M> {
    /// 表面必须完整位于映射的显存内，且 pitch 不小于一行像素
    fn check_surface(&self, surface: &Surface, format: PixelFormat) -> Result<(), AcceleratorError> {
        let row = surface.width as u64 * format.bytes_per_pixel() as u64;
        let in_vram = surface
            .offset
            .checked_add(surface.len())
            .is_some_and(|end| end <= self.vram_len);
        if (surface.pitch as u64) < row || !in_vram {
            return Err(AcceleratorError::RectOutOfBounds);
        }
        Ok(())
    }

    fn descriptor(&self, surface: &Surface, format: PixelFormat, addr: u32) -> SurfaceDescriptor {
        SurfaceDescriptor {
            addr,
            stride: descriptor_stride(surface, format),
            width: surface.width,
            height: surface.height,
            format,
            palette_addr: surface.palette_addr.unwrap_or(0),
        }
    }

    /// 用 `color` (表面自身的像素格式) 填充 `dst` 的 `rect` 区域。
    ///
    /// 只要命令列表交给了设备，无论是否被接受，目标表面都会被标记为忙。
    pub fn fill_rect(&self, dst: &Surface, rect: Rect, color: u32) -> Result<(), AcceleratorError> {
        if !self.capabilities.blit_fill {
            return Err(AcceleratorError::NotAccelerated);
        }
        let format = PixelFormat::from_bpp(dst.bits_per_pixel)?;
        self.check_surface(dst, format)?;
        if !rect.fits_within(dst.width, dst.height) {
            return Err(AcceleratorError::RectOutOfBounds);
        }

        let descriptor = self.descriptor(dst, format, self.device_addr(dst.pixel_offset(&rect)));
        tracing::debug!(
            dst_addr = format_args!("{:#x}", descriptor.addr),
            dst_width = dst.width,
            dst_height = dst.height,
            stride = descriptor.stride,
            ?rect,
            color = format_args!("{:#x}", color),
            "fill hw rect"
        );

        let mut state = self.lock();
        let state = &mut *state;
        if let Err(e) = build_fill(&mut state.list, &descriptor, rect, color) {
            state.list.clear();
            return Err(e);
        }
        let result = state.dispatcher.submit(&mut state.list);
        state.mark_busy(dst);
        result
    }

    /// 经暂存区把 `src` 的 `src_rect` blit 到 `dst` 的 `dst_rect`。
    ///
    /// 加速器按描述符的行跨度把结果渲染到暂存区中目标矩形对应的位置。
    /// 设备空闲后，再把渲染出的各行按目标表面的 pitch 复制到目标表面。
    pub fn blit_rect(
        &self,
        src: &Surface,
        src_rect: Rect,
        dst: &Surface,
        dst_rect: Rect,
    ) -> Result<(), AcceleratorError> {
        let src_format = PixelFormat::from_bpp(src.bits_per_pixel)?;
        let dst_format = PixelFormat::from_bpp(dst.bits_per_pixel)?;
        // 暂存区固定为 ARGB8888
        if dst_format != PixelFormat::Argb8888 {
            return Err(AcceleratorError::UnsupportedFormat(dst.bits_per_pixel));
        }
        self.check_surface(src, src_format)?;
        self.check_surface(dst, dst_format)?;
        if !src_rect.fits_within(src.width, src.height) || !dst_rect.fits_within(dst.width, dst.height) {
            return Err(AcceleratorError::RectOutOfBounds);
        }

        let bypp = dst_format.bytes_per_pixel() as usize;
        let pitch = dst.pitch as usize;
        let staging_stride = descriptor_stride(dst, dst_format) as usize;
        let row_len = dst_rect.w as usize * bypp;
        let rows = dst_rect.h as usize;

        let staging = &self.layout.staging;
        let staging_offset =
            staging.start + dst_rect.y as usize * staging_stride + dst_rect.x as usize * bypp;
        let staging_end = rect_span(staging_offset, staging_stride, row_len, rows);
        if staging_end > staging.end {
            return Err(AcceleratorError::StagingTooSmall {
                needed: staging_end - staging.start,
                available: staging.len(),
            });
        }
        let flip_offset = dst.pixel_offset(&dst_rect);

        let src_desc = self.descriptor(src, src_format, self.device_addr(src.pixel_offset(&src_rect)));
        let dst_desc = self.descriptor(dst, PixelFormat::Argb8888, self.device_addr(staging_offset));
        let flags = blit_flags(src, &src_rect, dst, &dst_rect);

        tracing::debug!(
            src_addr = format_args!("{:#x}", src_desc.addr),
            src_stride = src_desc.stride,
            ?src_rect,
            dst_addr = format_args!("{:#x}", dst_desc.addr),
            dst_stride = dst_desc.stride,
            ?dst_rect,
            flip_offset,
            flags,
            "hw accel blit"
        );

        let mut state = self.lock();
        let state = &mut *state;
        let flags = state.dispatcher.supports_blend_flags().then_some(flags);
        if let Err(e) = build_blit(&mut state.list, &src_desc, src_rect, &dst_desc, dst_rect, flags) {
            state.list.clear();
            return Err(e);
        }
        if let Err(e) = state.dispatcher.submit(&mut state.list) {
            state.mark_busy(dst);
            return Err(e);
        }

        // 设备空闲后暂存区中的各行才完整
        state.wait_idle_and_clear_all()?;
        for row in 0..rows {
            let from = staging_offset + row * staging_stride;
            state.vram.copy_within(from..from + row_len, flip_offset + row * pitch);
        }

        state.mark_busy(dst);
        Ok(())
    }

    /// 判断 `src` 到 `dst` 的 blit 是否使用硬件，并把选定的 [`BlitMethod`]
    /// 记录在 `src` 上。
    pub fn can_accelerate(&self, src: &mut Surface, dst: &Surface) -> bool {
        let caps = self.capabilities;
        let mut accelerated = caps.blit_hw && self.is_hw_blit_target(src, dst);
        if src.src_alpha && !caps.blit_hw_alpha {
            accelerated = false;
        }
        if src.color_key.is_some() && !caps.blit_hw_colorkey {
            accelerated = false;
        }

        src.blit_method = if accelerated {
            BlitMethod::Hardware
        } else {
            BlitMethod::Software
        };
        tracing::debug!(accelerated, "check hw blit");
        accelerated
    }

    /// 格式与位置检查：目标必须是显存中的 ARGB 表面，源可以是显存中任意受支持的格式
    fn is_hw_blit_target(&self, src: &Surface, dst: &Surface) -> bool {
        let Ok(src_format) = PixelFormat::from_bpp(src.bits_per_pixel) else {
            return false;
        };
        dst.bucket.is_some()
            && dst.bits_per_pixel == PixelFormat::Argb8888.bits_per_pixel()
            && self.check_surface(dst, PixelFormat::Argb8888).is_ok()
            && self.check_surface(src, src_format).is_ok()
    }

    /// 按 [`can_accelerate`](Self::can_accelerate) 选定的方式 blit。
    /// 软件路径的表面返回 `NotAccelerated`，由调用方自行复制。
    pub fn blit(
        &self,
        src: &Surface,
        src_rect: Rect,
        dst: &Surface,
        dst_rect: Rect,
    ) -> Result<(), AcceleratorError> {
        match src.blit_method {
            BlitMethod::Hardware => self.blit_rect(src, src_rect, dst, dst_rect),
            BlitMethod::Software => Err(AcceleratorError::NotAccelerated),
        }
    }

    /// 记录颜色键。硬件本身不保存颜色键状态
    pub fn set_hw_color_key(&self, surface: &mut Surface, key: u32) -> Result<(), AcceleratorError> {
        tracing::debug!(key = format_args!("{:#x}", key), "set hw color key");
        surface.color_key = Some(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::accel::testing::{accelerator, init_logging, pairs, RecordingDevice};
    use crate::accel::{AccelOptions, Capabilities};

    const ARGB8888: u32 = 0x07e48888;

    /// 第一个 `latch` 命令之前最后写入 `reg` 的值
    fn latched(words: &[u32], reg: u32, latch: u32) -> Option<u32> {
        let pairs = pairs(words);
        let end = pairs.iter().position(|&(r, _)| r == latch)?;
        pairs[..end].iter().rev().find(|&&(r, _)| r == reg).map(|&(_, v)| v)
    }

    /// 第 `nth` 个 `latch` 命令之前最后写入 `reg` 的值
    fn latched_nth(words: &[u32], reg: u32, latch: u32, nth: usize) -> Option<u32> {
        let pairs = pairs(words);
        let end = pairs
            .iter()
            .enumerate()
            .filter(|&(_, &(r, _))| r == latch)
            .nth(nth)?
            .0;
        pairs[..end].iter().rev().find(|&&(r, _)| r == reg).map(|&(_, v)| v)
    }

    fn assert_well_formed(words: &[u32]) {
        let pairs = pairs(words);
        let leading: Vec<u32> = pairs.iter().take(5).map(|&(r, _)| r).collect();
        assert_eq!(leading, regs::PIPELINE_RESETS.to_vec());
        assert_eq!(pairs.last(), Some(&(regs::EXECUTE, 0)));
        assert_eq!(pairs.iter().filter(|&&(r, _)| r == regs::EXECUTE).count(), 1);
    }

    #[test]
    fn fill_32bpp_scenario() {
        init_logging();
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let dst = accel.alloc_surface(100, 50, 32).unwrap();

        accel.fill_rect(&dst, Rect::new(10, 10, 20, 20), 0xFF0000FF).unwrap();

        let words = device.last_list();
        assert_well_formed(&words);
        let pairs = pairs(&words);
        assert!(pairs.contains(&(regs::FILL_COLOR, 0xFF0000FF)));
        let rect_at = pairs.iter().position(|&(r, _)| r == regs::RECT_X).unwrap();
        assert_eq!(
            &pairs[rect_at..rect_at + 5],
            &[
                (regs::RECT_X, 10),
                (regs::RECT_Y, 10),
                (regs::RECT_WIDTH, 20),
                (regs::RECT_HEIGHT, 20),
                (regs::SET_OUTPUT_RECT, 0),
            ]
        );
        assert_eq!(latched(&words, regs::SURFACE_FORMAT, regs::SET_OUTPUT_SURFACE), Some(ARGB8888));
        assert!(accel.is_busy(&dst));
    }

    #[test]
    fn fill_starts_with_resets_for_every_depth() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        for bpp in [8, 16, 32] {
            let dst = accel.alloc_surface(16, 8, bpp).unwrap();
            accel.fill_rect(&dst, Rect::new(0, 0, 16, 8), 1).unwrap();
            assert_well_formed(&device.last_list());
        }
    }

    #[test]
    fn fill_address_is_base_plus_rect_offset() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let base = accel.layout().device_base;
        for bpp in [8, 16, 32] {
            let dst = accel.alloc_surface(40, 20, bpp).unwrap();
            for rect in [Rect::new(0, 0, 40, 20), Rect::new(3, 7, 5, 2), Rect::new(39, 19, 1, 1)] {
                accel.fill_rect(&dst, rect, 0).unwrap();
                let expected = base
                    + dst.offset as u32
                    + rect.y * dst.pitch
                    + rect.x * dst.bytes_per_pixel();
                let words = device.last_list();
                assert_eq!(
                    latched(&words, regs::SURFACE_ADDR, regs::SET_OUTPUT_SURFACE),
                    Some(expected)
                );
                assert_eq!(
                    latched(&words, regs::SURFACE_STRIDE, regs::SET_OUTPUT_SURFACE),
                    Some(40 * bpp / 8)
                );
            }
        }
    }

    #[test]
    fn fill_clears_stale_descriptors_first() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        accel.fill_rect(&accel.primary_surface(), Rect::new(0, 0, 4, 4), 7).unwrap();

        let words = device.last_list();
        for reg in [regs::SURFACE_ADDR, regs::SURFACE_FORMAT] {
            assert_eq!(latched(&words, reg, regs::SET_PATTERN_SURFACE), Some(0));
            assert_eq!(latched(&words, reg, regs::SET_SOURCE_SURFACE), Some(0));
        }
        let pairs = pairs(&words);
        let key_at = pairs.iter().position(|&(r, _)| r == regs::COLORKEY_PARAM_0).unwrap();
        assert_eq!(
            &pairs[key_at..key_at + 5],
            &[(0x6f, 0), (0x70, 0), (0x71, 2), (0x72, 2), (regs::SELECT_COLORKEY, 0)]
        );
    }

    #[test]
    fn indexed_fill_sends_palette() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let dst = accel.alloc_surface(16, 16, 8).unwrap().with_palette(0x3f00_0000);
        accel.fill_rect(&dst, Rect::new(0, 0, 16, 16), 3).unwrap();

        let words = device.last_list();
        assert_eq!(latched(&words, regs::SURFACE_FORMAT, regs::SET_OUTPUT_SURFACE), Some(0x12e40008));
        assert_eq!(latched(&words, regs::PALETTE_ADDR, regs::SET_OUTPUT_SURFACE), Some(0x3f00_0000));
    }

    #[test]
    fn unsupported_depth_fails_before_submission() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let dst = Surface::new(0, 8, 8, 24);
        assert!(matches!(
            accel.fill_rect(&dst, Rect::new(0, 0, 1, 1), 0),
            Err(AcceleratorError::UnsupportedFormat(24))
        ));
        assert!(device.lists().is_empty());
    }

    #[test]
    fn fill_outside_surface_is_rejected() {
        let accel = accelerator(RecordingDevice::default());
        let dst = accel.alloc_surface(10, 10, 32).unwrap();
        assert!(matches!(
            accel.fill_rect(&dst, Rect::new(5, 5, 6, 1), 0),
            Err(AcceleratorError::RectOutOfBounds)
        ));
    }

    #[test]
    fn rejected_fill_still_marks_busy_and_leaves_list_empty() {
        let device = RecordingDevice::rejecting_all();
        let accel = accelerator(device.clone());
        let dst = accel.alloc_surface(10, 10, 32).unwrap();

        let err = accel.fill_rect(&dst, Rect::new(0, 0, 10, 10), 0).unwrap_err();
        assert!(matches!(err, AcceleratorError::DeviceRejected(_)));
        assert!(accel.is_busy(&dst));

        // 下一个列表从头开始
        let _ = accel.fill_rect(&dst, Rect::new(0, 0, 1, 1), 0);
        assert_well_formed(&device.last_list());
    }

    #[test]
    fn small_command_list_overflows_cleanly() {
        let device = RecordingDevice::default();
        let options = AccelOptions { command_list_capacity: 10, ..AccelOptions::default() };
        let accel = Accelerator::new(
            device.clone(),
            vec![0u8; 0x10000],
            crate::accel::testing::layout(),
            options,
        )
        .unwrap();
        let dst = accel.primary_surface();

        assert!(matches!(
            accel.fill_rect(&dst, Rect::new(0, 0, 1, 1), 0),
            Err(AcceleratorError::CapacityExceeded { capacity: 10 })
        ));
        assert!(device.lists().is_empty());
    }

    #[test]
    fn blit_renders_into_staging() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let src = accel.alloc_surface(40, 20, 16).unwrap();
        let dst = accel.alloc_surface(40, 20, 32).unwrap();
        let (src_rect, dst_rect) = (Rect::new(2, 3, 8, 4), Rect::new(5, 6, 8, 4));

        accel.blit_rect(&src, src_rect, &dst, dst_rect).unwrap();

        let words = device.last_list();
        assert_well_formed(&words);
        let base = accel.layout().device_base;
        assert_eq!(
            latched(&words, regs::SURFACE_ADDR, regs::SET_SOURCE_SURFACE),
            Some(base + src.offset as u32 + 3 * 80 + 2 * 2)
        );
        assert_eq!(latched(&words, regs::SURFACE_FORMAT, regs::SET_SOURCE_SURFACE), Some(0x06e40565));
        assert_eq!(latched(&words, regs::RECT_X, regs::SET_SOURCE_RECT), Some(2));
        assert_eq!(
            latched(&words, regs::SURFACE_ADDR, regs::SET_OUTPUT_SURFACE),
            Some(base + 0x8000 + 6 * 160 + 5 * 4)
        );
        assert_eq!(latched(&words, regs::SURFACE_FORMAT, regs::SET_OUTPUT_SURFACE), Some(ARGB8888));
        assert_eq!(latched(&words, regs::RECT_Y, regs::SET_OUTPUT_RECT), Some(6));
        // 原点不同且尺寸相同：缩放 + 保持宽高比
        assert_eq!(
            latched(&words, regs::BLEND_FLAGS, regs::EXECUTE),
            Some(regs::BLIT_SCALE | regs::BLIT_KEEP_ASPECT_RATIO)
        );
        assert!(accel.is_busy(&dst));
    }

    #[test]
    fn blit_flags_follow_surface_state() {
        let src = Surface::new(0, 10, 10, 32).with_alpha(true);
        let dst = Surface::new(0, 20, 10, 32);
        let r = Rect::new(1, 1, 2, 2);
        assert_eq!(
            blit_flags(&src, &r, &dst, &r),
            regs::BLIT_ALPHA_TEST | regs::BLIT_ALPHA_BLEND
        );
        let same = Surface::new(0, 10, 10, 32);
        assert_eq!(
            blit_flags(&same, &r, &same, &Rect::new(0, 1, 2, 2)),
            regs::BLIT_SCALE | regs::BLIT_KEEP_ASPECT_RATIO
        );
        assert_eq!(blit_flags(&same, &r, &dst, &r), 0);
    }

    #[test]
    fn blend_flags_omitted_without_support_or_value() {
        let device = RecordingDevice::default();
        let options = AccelOptions {
            capabilities: Capabilities { blend_flags: false, ..Capabilities::default() },
            ..AccelOptions::default()
        };
        let accel =
            Accelerator::new(device.clone(), vec![0u8; 0x10000], crate::accel::testing::layout(), options)
                .unwrap();
        let src = accel.alloc_surface(8, 8, 32).unwrap().with_alpha(true);
        let dst = accel.alloc_surface(8, 8, 32).unwrap();
        accel.blit_rect(&src, Rect::new(0, 0, 8, 8), &dst, Rect::new(0, 0, 8, 8)).unwrap();
        assert_eq!(latched(&device.last_list(), regs::BLEND_FLAGS, regs::EXECUTE), None);

        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let src = accel.alloc_surface(8, 8, 32).unwrap();
        let dst = accel.alloc_surface(16, 8, 32).unwrap();
        accel.blit_rect(&src, Rect::new(0, 0, 8, 8), &dst, Rect::new(0, 0, 8, 8)).unwrap();
        assert_eq!(latched(&device.last_list(), regs::BLEND_FLAGS, regs::EXECUTE), None);
    }

    #[test]
    fn flip_copies_only_the_rendered_rectangle() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let src = accel.alloc_surface(16, 8, 32).unwrap();
        let dst = accel.alloc_surface(16, 8, 32).unwrap();
        let dst_rect = Rect::new(2, 1, 3, 2);
        let staging = accel.layout().staging.start;

        // 代替硬件写满整个暂存区
        accel.with_vram(|vram| {
            for (i, byte) in vram[staging..].iter_mut().enumerate() {
                *byte = (i % 251) as u8 + 1;
            }
        });
        accel.blit_rect(&src, Rect::new(2, 1, 3, 2), &dst, dst_rect).unwrap();

        assert_eq!(device.idle_waits(), 1);
        accel.with_vram(|vram| {
            let pitch = dst.pitch as usize;
            for y in 0..dst.height as usize {
                for x in 0..dst.width as usize * 4 {
                    let at = dst.offset + y * pitch + x;
                    let inside = (1..3).contains(&y) && (8..20).contains(&x);
                    let expected = if inside { vram[staging + y * pitch + x] } else { 0 };
                    assert_eq!(vram[at], expected, "byte ({x}, {y})");
                }
            }
        });
    }

    #[test]
    fn padded_primary_stages_with_descriptor_stride() {
        let device = RecordingDevice::default();
        let accel = Accelerator::new(
            device.clone(),
            vec![0u8; 0x10000],
            crate::accel::VideoLayout {
                screen: crate::accel::ScreenMode { width: 60, height: 32, pitch: 256, bits_per_pixel: 32 },
                ..crate::accel::testing::layout()
            },
            AccelOptions::default(),
        )
        .unwrap();
        let src = accel.alloc_surface(16, 8, 32).unwrap();
        let dst = accel.primary_surface();
        let dst_rect = Rect::new(50, 20, 6, 3);
        let staging = accel.layout().staging.start;
        accel.with_vram(|vram| {
            for (i, byte) in vram[staging..].iter_mut().enumerate() {
                *byte = (i % 251) as u8 + 1;
            }
        });

        accel.blit_rect(&src, Rect::new(0, 0, 6, 3), &dst, dst_rect).unwrap();

        let words = device.last_list();
        let base = accel.layout().device_base;
        assert_eq!(latched(&words, regs::SURFACE_STRIDE, regs::SET_OUTPUT_SURFACE), Some(240));
        assert_eq!(
            latched(&words, regs::SURFACE_ADDR, regs::SET_OUTPUT_SURFACE),
            Some(base + 0x8000 + 20 * 240 + 50 * 4)
        );
        accel.with_vram(|vram| {
            for y in 0..32usize {
                for x in 0..256usize {
                    let inside = (20..23).contains(&y) && (200..224).contains(&x);
                    let expected = if inside { vram[staging + y * 240 + x] } else { 0 };
                    assert_eq!(vram[y * 256 + x], expected, "byte ({x}, {y})");
                }
            }
        });
    }

    #[test]
    fn surfaces_past_the_address_space_are_rejected() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let src = accel.alloc_surface(8, 8, 32).unwrap();
        let wrapping = Surface::new(usize::MAX - 4, 8, 8, 32);
        let wide = Surface::new(0, 0x4000_0000, 1, 32);
        let rect = Rect::new(0, 0, 1, 1);

        assert!(matches!(
            accel.fill_rect(&wrapping, rect, 0),
            Err(AcceleratorError::RectOutOfBounds)
        ));
        assert!(matches!(
            accel.fill_rect(&wide, rect, 0),
            Err(AcceleratorError::RectOutOfBounds)
        ));
        assert!(matches!(
            accel.blit_rect(&wrapping, rect, &src, rect),
            Err(AcceleratorError::RectOutOfBounds)
        ));
        assert!(device.lists().is_empty());
    }

    #[test]
    fn blit_needs_room_in_staging() {
        let device = RecordingDevice::default();
        let accel = Accelerator::new(
            device.clone(),
            vec![0u8; 0x10000],
            crate::accel::VideoLayout { staging: 0xf000..0x10000, ..crate::accel::testing::layout() },
            AccelOptions::default(),
        )
        .unwrap();
        let src = accel.alloc_surface(64, 32, 32).unwrap();
        let dst = accel.alloc_surface(64, 32, 32).unwrap();
        assert!(matches!(
            accel.blit_rect(&src, Rect::new(0, 0, 64, 32), &dst, Rect::new(0, 0, 64, 32)),
            Err(AcceleratorError::StagingTooSmall { needed: 8192, available: 4096 })
        ));
        assert!(device.lists().is_empty());
    }

    #[test]
    fn rejected_blit_skips_flip() {
        let device = RecordingDevice::rejecting_all();
        let accel = accelerator(device.clone());
        let src = accel.alloc_surface(8, 8, 32).unwrap();
        let dst = accel.alloc_surface(8, 8, 32).unwrap();
        assert!(accel.blit_rect(&src, Rect::new(0, 0, 8, 8), &dst, Rect::new(0, 0, 8, 8)).is_err());
        assert_eq!(device.idle_waits(), 0);
        assert!(accel.is_busy(&dst));
    }

    #[test]
    fn sequential_offscreen_blits_use_separate_lists() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let src = accel.alloc_surface(8, 8, 32).unwrap();
        let a = accel.alloc_surface(8, 8, 32).unwrap();
        let b = accel.alloc_surface(8, 8, 32).unwrap();

        accel.blit_rect(&src, Rect::new(0, 0, 4, 4), &a, Rect::new(0, 0, 4, 4)).unwrap();
        accel.blit_rect(&src, Rect::new(4, 4, 4, 4), &b, Rect::new(1, 1, 4, 4)).unwrap();

        let lists = device.lists();
        assert_eq!(lists.len(), 2);
        for words in &lists {
            assert_well_formed(words);
        }
        assert_eq!(latched(&lists[0], regs::RECT_X, regs::SET_SOURCE_RECT), Some(0));
        assert_eq!(latched(&lists[1], regs::RECT_X, regs::SET_SOURCE_RECT), Some(4));
        assert_eq!(latched_nth(&lists[1], regs::RECT_X, regs::SET_OUTPUT_RECT, 0), Some(1));
    }

    #[test]
    fn concurrent_offscreen_fills_never_interleave() {
        let device = RecordingDevice::default();
        let accel = Arc::new(accelerator(device.clone()));
        let surfaces: Vec<Surface> = (0..4).map(|_| accel.alloc_surface(16, 16, 32).unwrap()).collect();

        let handles: Vec<_> = surfaces
            .into_iter()
            .enumerate()
            .map(|(i, surface)| {
                let accel = Arc::clone(&accel);
                std::thread::spawn(move || {
                    for n in 0..25 {
                        let color = (i as u32) << 16 | n;
                        accel.fill_rect(&surface, Rect::new(0, 0, 16, 16), color).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lists = device.lists();
        assert_eq!(lists.len(), 100);
        let expected_len = lists[0].len();
        for words in &lists {
            assert_well_formed(words);
            assert_eq!(words.len(), expected_len);
            assert_eq!(pairs(words).iter().filter(|&&(r, _)| r == regs::FILL_COLOR).count(), 1);
        }
    }

    #[test]
    fn can_accelerate_tags_blit_method() {
        let accel = accelerator(RecordingDevice::default());
        let dst = accel.alloc_surface(8, 8, 32).unwrap();

        let mut src = accel.alloc_surface(8, 8, 16).unwrap();
        assert!(accel.can_accelerate(&mut src, &dst));
        assert_eq!(src.blit_method, BlitMethod::Hardware);

        // 16 bpp 的目标无法接收 ARGB 暂存区的输出
        let narrow = accel.alloc_surface(8, 8, 16).unwrap();
        assert!(!accel.can_accelerate(&mut src, &narrow));
        assert_eq!(src.blit_method, BlitMethod::Software);

        // 目标不在显存中
        let plain = Surface::new(0, 8, 8, 32);
        assert!(!accel.can_accelerate(&mut src, &plain));
    }

    #[test]
    fn can_accelerate_honours_alpha_and_colorkey_capabilities() {
        let options = AccelOptions {
            capabilities: Capabilities {
                blit_hw_alpha: false,
                blit_hw_colorkey: false,
                ..Capabilities::default()
            },
            ..AccelOptions::default()
        };
        let accel = Accelerator::new(
            RecordingDevice::default(),
            vec![0u8; 0x10000],
            crate::accel::testing::layout(),
            options,
        )
        .unwrap();
        let dst = accel.alloc_surface(8, 8, 32).unwrap();

        let mut alpha = accel.alloc_surface(8, 8, 32).unwrap().with_alpha(true);
        assert!(!accel.can_accelerate(&mut alpha, &dst));

        let mut keyed = accel.alloc_surface(8, 8, 32).unwrap();
        accel.set_hw_color_key(&mut keyed, 0xff00ff).unwrap();
        assert!(!accel.can_accelerate(&mut keyed, &dst));

        let mut opaque = accel.alloc_surface(8, 8, 32).unwrap();
        assert!(accel.can_accelerate(&mut opaque, &dst));
    }

    #[test]
    fn blit_dispatches_on_method() {
        let device = RecordingDevice::default();
        let accel = accelerator(device.clone());
        let dst = accel.alloc_surface(8, 8, 32).unwrap();
        let mut src = accel.alloc_surface(8, 8, 32).unwrap();
        let r = Rect::new(0, 0, 8, 8);

        assert!(matches!(accel.blit(&src, r, &dst, r), Err(AcceleratorError::NotAccelerated)));
        assert!(device.lists().is_empty());

        assert!(accel.can_accelerate(&mut src, &dst));
        accel.blit(&src, r, &dst, r).unwrap();
        assert_eq!(device.lists().len(), 1);
    }
}
