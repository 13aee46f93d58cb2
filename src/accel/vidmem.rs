//! 显存块 (bucket) 管理。
//!
//! 显存用一个双向链表描述，每个块是一段连续的字节区间，要么被某个硬件
//! 表面占用，要么空闲。头块就是可见屏幕，始终存在且不会被释放。每个块都
//! 带一个 dirty 标志，含义是“加速器操作可能仍在访问这段显存”。
//!
//! dirty 标志只能整体清除：[`VidmemBuckets::clear_all_dirty`] 在设备报告
//! 空闲之后调用，没有针对单个块的等待。

use crate::error::AcceleratorError;

/// 显存块的句柄。
///
/// 槽位会被复用，所以句柄带有代数：块被释放或合并后，旧句柄不再指向
/// 任何块，也不会误指向之后在同一槽位分配的新块。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketId {
    index: usize,
    generation: u32,
}

impl BucketId {
    /// 链表头部的屏幕块
    pub const HEAD: BucketId = BucketId { index: 0, generation: 0 };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    prev: Option<usize>,
    next: Option<usize>,
    pub used: bool,
    pub dirty: bool,
    /// 显存内的字节偏移
    pub base: usize,
    pub size: usize,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    bucket: Option<Bucket>,
}

#[derive(Debug)]
pub struct VidmemBuckets {
    slots: Vec<Slot>,
    vacant: Vec<usize>,
    memtotal: usize,
    memleft: usize,
}

impl VidmemBuckets {
    /// 头块覆盖 `[0, screen_len)`，其余到 `end` 为止是一个空闲块
    pub fn new(screen_len: usize, end: usize) -> Self {
        let mut buckets = Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            memtotal: end.saturating_sub(screen_len),
            memleft: 0,
        };
        buckets.insert(Bucket {
            prev: None,
            next: None,
            used: true,
            dirty: false,
            base: 0,
            size: screen_len,
        });
        if buckets.memtotal > 0 {
            let rest = buckets.insert(Bucket {
                prev: Some(0),
                next: None,
                used: false,
                dirty: false,
                base: screen_len,
                size: buckets.memtotal,
            });
            if let Some(head) = buckets.node_mut(0) {
                head.next = Some(rest);
            }
        }
        buckets.memleft = buckets.memtotal;
        tracing::debug!(screen_len, memtotal = buckets.memtotal, "显存块初始化完成");
        buckets
    }

    pub fn get(&self, id: BucketId) -> Option<&Bucket> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.bucket.as_ref())
    }

    fn node(&self, index: usize) -> Option<&Bucket> {
        self.slots.get(index).and_then(|slot| slot.bucket.as_ref())
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut Bucket> {
        self.slots.get_mut(index).and_then(|slot| slot.bucket.as_mut())
    }

    fn id_of(&self, index: usize) -> BucketId {
        let generation = self.slots.get(index).map_or(0, |slot| slot.generation);
        BucketId { index, generation }
    }

    fn insert(&mut self, bucket: Bucket) -> usize {
        match self.vacant.pop() {
            Some(index) => {
                self.slots[index].bucket = Some(bucket);
                index
            }
            None => {
                self.slots.push(Slot { generation: 0, bucket: Some(bucket) });
                self.slots.len() - 1
            }
        }
    }

    // 槽位空出时代数加一
    fn remove(&mut self, index: usize) -> Option<Bucket> {
        let slot = self.slots.get_mut(index)?;
        let bucket = slot.bucket.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(index);
        Some(bucket)
    }

    /// 从头块开始遍历链表
    pub fn iter(&self) -> impl Iterator<Item = (BucketId, &Bucket)> + '_ {
        let mut cursor = Some(0);
        std::iter::from_fn(move || {
            let index = cursor?;
            let bucket = self.node(index)?;
            cursor = bucket.next;
            Some((self.id_of(index), bucket))
        })
    }

    /// 首次适配：从第一个足够大的空闲块中切出 `size` 字节
    pub fn alloc(&mut self, size: usize) -> Result<BucketId, AcceleratorError> {
        let found = self
            .iter()
            .find(|(_, bucket)| !bucket.used && bucket.size >= size)
            .map(|(id, bucket)| (id.index, bucket.clone()));

        let Some((index, bucket)) = found else {
            let largest = self
                .iter()
                .filter(|(_, b)| !b.used)
                .map(|(_, b)| b.size)
                .max()
                .unwrap_or(0);
            tracing::debug!(size, largest, "显存不足");
            return Err(AcceleratorError::OutOfVideoMemory { requested: size, largest });
        };

        let extra = bucket.size - size;
        if extra > 0 {
            let rest = self.insert(Bucket {
                prev: Some(index),
                next: bucket.next,
                used: false,
                dirty: false,
                base: bucket.base + size,
                size: extra,
            });
            if let Some(next) = bucket.next.and_then(|n| self.node_mut(n)) {
                next.prev = Some(rest);
            }
            if let Some(node) = self.node_mut(index) {
                node.next = Some(rest);
            }
        }
        if let Some(node) = self.node_mut(index) {
            node.size = size;
            node.used = true;
            node.dirty = false;
        }
        self.memleft -= size;
        tracing::debug!(base = bucket.base, size, left = self.memleft, "分配显存");
        Ok(self.id_of(index))
    }

    /// 把块归还空闲池，并与相邻的空闲块合并
    pub fn free(&mut self, id: BucketId) -> Result<(), AcceleratorError> {
        if id == BucketId::HEAD || self.get(id).is_none() {
            return Err(AcceleratorError::UnknownBucket);
        }
        let (size, next, prev) = match self.node_mut(id.index) {
            Some(node) if node.used => {
                node.used = false;
                node.dirty = false;
                (node.size, node.next, node.prev)
            }
            _ => return Err(AcceleratorError::UnknownBucket),
        };
        self.memleft += size;
        if let Some(slot) = self.slots.get_mut(id.index) {
            slot.generation = slot.generation.wrapping_add(1);
        }

        if let Some(next) = next.filter(|&n| self.node(n).is_some_and(|b| !b.used)) {
            self.merge_into_prev(next);
        }
        if prev.is_some_and(|p| self.node(p).is_some_and(|b| !b.used)) {
            self.merge_into_prev(id.index);
        }
        tracing::debug!(size, left = self.memleft, "释放显存");
        Ok(())
    }

    /// 把 `index` 处的块并入它的前一个块
    fn merge_into_prev(&mut self, index: usize) {
        let Some(bucket) = self.remove(index) else { return };
        let Some(prev) = bucket.prev else { return };
        if let Some(node) = self.node_mut(prev) {
            node.size += bucket.size;
            node.next = bucket.next;
        }
        if let Some(next) = bucket.next.and_then(|n| self.node_mut(n)) {
            next.prev = Some(prev);
        }
    }

    pub fn mark_dirty(&mut self, id: BucketId) -> Result<(), AcceleratorError> {
        if self.get(id).is_none() {
            return Err(AcceleratorError::UnknownBucket);
        }
        if let Some(node) = self.node_mut(id.index) {
            node.dirty = true;
        }
        Ok(())
    }

    pub fn is_dirty(&self, id: BucketId) -> bool {
        self.get(id).is_some_and(|bucket| bucket.dirty)
    }

    /// 清除所有块 (包括头块) 的 dirty 标志
    pub fn clear_all_dirty(&mut self) {
        for bucket in self.slots.iter_mut().filter_map(|slot| slot.bucket.as_mut()) {
            bucket.dirty = false;
        }
    }

    /// 可用于硬件表面的总字节数，不含屏幕
    pub fn memtotal(&self) -> usize {
        self.memtotal
    }

    /// 尚未分配的字节数
    pub fn memleft(&self) -> usize {
        self.memleft
    }
}
