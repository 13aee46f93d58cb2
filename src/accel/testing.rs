//! 设备接口的测试替身。

use std::sync::{Arc, Mutex};

use super::dispatch::AccelDevice;
use super::{AccelOptions, Accelerator, ScreenMode, VideoLayout};
use crate::linuxfb::ErrnoError;

#[derive(Default)]
struct Recorded {
    lists: Vec<Vec<u32>>,
    idle_waits: usize,
}

/// 记录每个提交的列表，克隆之间共享记录
#[derive(Clone, Default)]
pub(crate) struct RecordingDevice {
    recorded: Arc<Mutex<Recorded>>,
    reject_all: bool,
    reject_reg: Option<u32>,
}

impl RecordingDevice {
    pub(crate) fn rejecting_all() -> Self {
        Self { reject_all: true, ..Self::default() }
    }

    /// 拒绝写入 `reg` 的列表
    pub(crate) fn rejecting_reg(reg: u32) -> Self {
        Self { reject_reg: Some(reg), ..Self::default() }
    }

    pub(crate) fn lists(&self) -> Vec<Vec<u32>> {
        self.recorded.lock().unwrap().lists.clone()
    }

    pub(crate) fn last_list(&self) -> Vec<u32> {
        self.lists().pop().expect("nothing was submitted")
    }

    pub(crate) fn idle_waits(&self) -> usize {
        self.recorded.lock().unwrap().idle_waits
    }
}

impl AccelDevice for RecordingDevice {
    fn exec_list(&self, words: &[u32]) -> Result<(), ErrnoError> {
        self.recorded.lock().unwrap().lists.push(words.to_vec());
        let hit = self
            .reject_reg
            .is_some_and(|reg| words.chunks(2).any(|pair| pair[0] == reg));
        if self.reject_all || hit {
            return Err(ErrnoError::from_errno(libc::EINVAL));
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), ErrnoError> {
        self.recorded.lock().unwrap().idle_waits += 1;
        Ok(())
    }
}

/// 把展平的命令字还原为 (寄存器, 值) 对
pub(crate) fn pairs(words: &[u32]) -> Vec<(u32, u32)> {
    words.chunks(2).map(|pair| (pair[0], pair[1])).collect()
}

pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// 64 KiB 显存：底部是 64x32 的 ARGB 屏幕，上半部分 32 KiB 用作暂存区
pub(crate) fn layout() -> VideoLayout {
    VideoLayout {
        device_base: 0x4000_0000,
        screen: ScreenMode { width: 64, height: 32, pitch: 256, bits_per_pixel: 32 },
        staging: 0x8000..0x10000,
    }
}

pub(crate) fn accelerator(device: RecordingDevice) -> Accelerator<RecordingDevice, Vec<u8>> {
    Accelerator::new(device, vec![0u8; 0x10000], layout(), AccelOptions::default())
        .expect("valid test layout")
}
