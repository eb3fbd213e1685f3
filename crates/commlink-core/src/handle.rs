//! 句柄表
//!
//! 每个传输实现持有自己的 `LinkTable`，链路在 `open` 成功时注册，在 `close` 时移除。
//! 句柄带代数（generation），关闭后旧句柄永远不会再命中新链路，
//! 即使底层 fd 数值被内核复用。

use crate::LinkError;
use slotmap::{Key, KeyData, SlotMap, new_key_type};

new_key_type! {
    struct LinkKey;
}

/// 链路句柄（不透明）
///
/// 边界 API 通过 `as_raw()` / `from_raw()` 与 `i64` 互转。
/// 原始值高 32 位存放 `version >> 1`（占用中的槽位代数恒为奇数，最低位可省略），
/// 低 32 位存放槽位下标，所以有效句柄的原始值恒为正数，负数永远不会解析为句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(LinkKey);

impl LinkHandle {
    pub fn as_raw(self) -> i64 {
        let ffi = self.0.data().as_ffi();
        let idx = ffi & 0xFFFF_FFFF;
        let generation = (ffi >> 32) >> 1;
        ((generation << 32) | idx) as i64
    }

    /// 负数 / 零返回 `None`（边界上的 "无句柄"）
    pub fn from_raw(raw: i64) -> Option<Self> {
        if raw <= 0 {
            return None;
        }
        let raw = raw as u64;
        let idx = raw & 0xFFFF_FFFF;
        let version = ((raw >> 32) << 1) | 1;
        let key: LinkKey = KeyData::from_ffi((version << 32) | idx).into();
        Some(Self(key))
    }
}

/// 链路表
#[derive(Debug)]
pub struct LinkTable<T> {
    slots: SlotMap<LinkKey, T>,
}

impl<T> Default for LinkTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkTable<T> {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, link: T) -> LinkHandle {
        LinkHandle(self.slots.insert(link))
    }

    /// 查找链路；未知或已关闭的句柄返回 `LinkError::BadHandle`
    pub fn get(&self, handle: LinkHandle) -> Result<&T, LinkError> {
        self.slots.get(handle.0).ok_or(LinkError::BadHandle)
    }

    pub fn get_mut(&mut self, handle: LinkHandle) -> Result<&mut T, LinkError> {
        self.slots.get_mut(handle.0).ok_or(LinkError::BadHandle)
    }

    pub fn remove(&mut self, handle: LinkHandle) -> Option<T> {
        self.slots.remove(handle.0)
    }

    pub fn contains(&self, handle: LinkHandle) -> bool {
        self.slots.contains_key(handle.0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = LinkHandle> + '_ {
        self.slots.keys().map(LinkHandle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut table = LinkTable::new();
        let h = table.insert("can0");
        assert_eq!(*table.get(h).unwrap(), "can0");
        assert_eq!(table.len(), 1);

        assert_eq!(table.remove(h), Some("can0"));
        assert!(table.is_empty());
        assert!(matches!(table.get(h), Err(LinkError::BadHandle)));
    }

    #[test]
    fn test_stale_handle_does_not_alias_new_link() {
        let mut table = LinkTable::new();
        let old = table.insert(1u32);
        table.remove(old);

        // 同一个槽位被复用，但代数不同
        let new = table.insert(2u32);
        assert_ne!(old, new);
        assert!(table.get(old).is_err());
        assert_eq!(*table.get(new).unwrap(), 2);
    }

    #[test]
    fn test_raw_round_trip_is_positive() {
        let mut table = LinkTable::new();
        let h = table.insert(());
        let raw = h.as_raw();
        assert!(raw > 0, "raw handle should be positive, got {}", raw);
        assert_eq!(LinkHandle::from_raw(raw), Some(h));
    }

    #[test]
    fn test_non_positive_raw_is_no_handle() {
        assert_eq!(LinkHandle::from_raw(-1), None);
        assert_eq!(LinkHandle::from_raw(0), None);
        assert_eq!(LinkHandle::from_raw(i64::MIN), None);
    }

    #[test]
    fn test_high_generation_handle_stays_positive() {
        // 槽位复用约 2^31 次之后代数接近 u32::MAX
        let key: LinkKey = KeyData::from_ffi((0xFFFF_FFFFu64 << 32) | 5).into();
        let h = LinkHandle(key);
        let raw = h.as_raw();
        assert!(raw > 0, "raw handle should be positive, got {}", raw);
        assert_eq!(LinkHandle::from_raw(raw), Some(h));
    }

    #[test]
    fn test_raw_round_trip_survives_slot_reuse() {
        let mut table = LinkTable::new();
        for i in 0..64u32 {
            let h = table.insert(i);
            let raw = h.as_raw();
            assert!(raw > 0);
            assert_eq!(LinkHandle::from_raw(raw), Some(h));
            table.remove(h);
        }
    }

    #[test]
    fn test_forged_raw_handle_is_rejected() {
        let mut table: LinkTable<u8> = LinkTable::new();
        let h = table.insert(7);
        let forged = LinkHandle::from_raw(h.as_raw() + 1).unwrap();
        assert!(!table.contains(forged));
    }
}
