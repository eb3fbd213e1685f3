//! 经典 CAN 帧编解码（无硬件依赖）
//!
//! 线格式与内核 `struct can_frame` 一致（16 字节，主机字节序）：
//!
//! ```text
//! offset  size  field
//! 0       4     can_id   (bit31 = EFF 扩展帧, bit30 = RTR 远程帧, bit29 = ERR)
//! 4       1     can_dlc  (0-8)
//! 5       3     padding / reserved
//! 8       8     data
//! ```
//!
//! 只支持 CAN 2.0：`FD` / `BIT_RATE_SWITCH` 标志在构造时即被拒绝。

use bitflags::bitflags;
use commlink_core::LinkError;

/// 扩展帧标记（EFF）
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// 远程帧标记（RTR）
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
/// 错误帧标记（ERR）
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;
/// 标准帧 ID 掩码（11 bit）
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
/// 扩展帧 ID 掩码（29 bit）
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// 经典 CAN 最大数据长度
pub const CAN_MAX_DLEN: usize = 8;
/// 线格式帧长度（`sizeof(struct can_frame)`）
pub const CAN_FRAME_LEN: usize = 16;

const DLC_OFFSET: usize = 4;
const DATA_OFFSET: usize = 8;

bitflags! {
    /// 帧标志位（与边界 API 的 `flags` 整数一一对应）
    ///
    /// | bit | 含义 |
    /// |-----|------|
    /// | 0 | 扩展帧（29-bit ID） |
    /// | 1 | 远程帧（RTR） |
    /// | 2 | CAN FD（拒绝） |
    /// | 3 | 波特率切换 BRS（拒绝） |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CanFlags: u32 {
        const EXTENDED = 0x01;
        const REMOTE_REQUEST = 0x02;
        const FD = 0x04;
        const BIT_RATE_SWITCH = 0x08;
    }
}

impl CanFlags {
    /// 是否包含经典 CAN 路径不支持的标志
    pub fn requires_fd(self) -> bool {
        self.intersects(CanFlags::FD | CanFlags::BIT_RATE_SWITCH)
    }

    /// 拒绝 FD / BRS
    pub fn ensure_classic(self) -> Result<(), LinkError> {
        if self.requires_fd() {
            return Err(LinkError::Unsupported(format!(
                "CAN FD / bit-rate-switch requested (flags=0x{:X}); only classic CAN is supported",
                self.bits()
            )));
        }
        Ok(())
    }
}

/// 将 ID 与标志编码为线格式的 `can_id`
///
/// 扩展帧：ID 截取低 29 位并置 EFF；标准帧：截取低 11 位。RTR 单独置位。
pub fn encode_id(id: u32, flags: CanFlags) -> u32 {
    let mut raw = if flags.contains(CanFlags::EXTENDED) {
        (id & CAN_EFF_MASK) | CAN_EFF_FLAG
    } else {
        id & CAN_SFF_MASK
    };
    if flags.contains(CanFlags::REMOTE_REQUEST) {
        raw |= CAN_RTR_FLAG;
    }
    raw
}

/// 从线格式 `can_id` 解出 ID 与 `EXTENDED` / `REMOTE_REQUEST` 标志
pub fn decode_id(raw: u32) -> (u32, CanFlags) {
    let mut flags = CanFlags::empty();
    let id = if raw & CAN_EFF_FLAG != 0 {
        flags |= CanFlags::EXTENDED;
        raw & CAN_EFF_MASK
    } else {
        raw & CAN_SFF_MASK
    };
    if raw & CAN_RTR_FLAG != 0 {
        flags |= CanFlags::REMOTE_REQUEST;
    }
    (id, flags)
}

/// 经典 CAN 帧
///
/// - **Copy**：固定 8 字节数据，无堆分配
/// - **ID 已掩码**：构造时按 `EXTENDED` 标志截取 11/29 位
/// - **不含 FD**：`flags` 永远不包含 `FD` / `BIT_RATE_SWITCH`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    flags: CanFlags,
    data: [u8; CAN_MAX_DLEN],
    len: u8,
}

impl CanFrame {
    /// 创建帧
    ///
    /// # 错误
    /// - `LinkError::Unsupported`: `flags` 含 FD / BRS
    /// - `LinkError::InvalidArgument`: payload 超过 8 字节
    pub fn new(id: u32, flags: CanFlags, payload: &[u8]) -> Result<Self, LinkError> {
        flags.ensure_classic()?;
        if payload.len() > CAN_MAX_DLEN {
            return Err(LinkError::invalid(format!(
                "CAN payload of {} bytes exceeds {} bytes",
                payload.len(),
                CAN_MAX_DLEN
            )));
        }

        let (id, flags) = decode_id(encode_id(id, flags));
        let mut data = [0u8; CAN_MAX_DLEN];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            id,
            flags,
            data,
            len: payload.len() as u8,
        })
    }

    /// 标准帧（11-bit ID）
    pub fn new_standard(id: u16, payload: &[u8]) -> Result<Self, LinkError> {
        Self::new(u32::from(id), CanFlags::empty(), payload)
    }

    /// 扩展帧（29-bit ID）
    pub fn new_extended(id: u32, payload: &[u8]) -> Result<Self, LinkError> {
        Self::new(id, CanFlags::EXTENDED, payload)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn flags(&self) -> CanFlags {
        self.flags
    }

    pub fn is_extended(&self) -> bool {
        self.flags.contains(CanFlags::EXTENDED)
    }

    pub fn is_remote(&self) -> bool {
        self.flags.contains(CanFlags::REMOTE_REQUEST)
    }

    /// 声明的数据长度（DLC，0-8）
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 有效数据
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 线格式 `can_id`
    pub fn raw_id(&self) -> u32 {
        encode_id(self.id, self.flags)
    }

    /// 将 payload 拷贝到调用方缓冲区，返回实际拷贝的字节数
    ///
    /// 缓冲区小于 DLC 时只拷贝放得下的部分；调用方应比较 `len()` 与返回值判断截断。
    pub fn copy_payload_into(&self, buf: &mut [u8]) -> usize {
        let n = self.data().len().min(buf.len());
        buf[..n].copy_from_slice(&self.data()[..n]);
        n
    }

    /// 编码为 16 字节线格式
    pub fn encode(&self) -> [u8; CAN_FRAME_LEN] {
        let mut bytes = [0u8; CAN_FRAME_LEN];
        bytes[..DLC_OFFSET].copy_from_slice(&self.raw_id().to_ne_bytes());
        bytes[DLC_OFFSET] = self.len;
        bytes[DATA_OFFSET..].copy_from_slice(&self.data);
        bytes
    }

    /// 从线格式解码
    ///
    /// # 错误
    /// - `LinkError::Os(EIO)`: 数据不足一帧
    /// - `LinkError::Os(EBADMSG)`: DLC > 8
    pub fn decode(bytes: &[u8]) -> Result<Self, LinkError> {
        if bytes.len() < CAN_FRAME_LEN {
            return Err(LinkError::os("decode(can_frame)", libc::EIO));
        }

        let mut raw_id = [0u8; 4];
        raw_id.copy_from_slice(&bytes[..DLC_OFFSET]);
        let (id, flags) = decode_id(u32::from_ne_bytes(raw_id));

        let dlc = bytes[DLC_OFFSET];
        if dlc as usize > CAN_MAX_DLEN {
            return Err(LinkError::os("decode(can_frame)", libc::EBADMSG));
        }

        let mut data = [0u8; CAN_MAX_DLEN];
        data.copy_from_slice(&bytes[DATA_OFFSET..CAN_FRAME_LEN]);

        Ok(Self {
            id,
            flags,
            data,
            len: dlc,
        })
    }
}

/// 接收结果头部（用于 "读入调用方缓冲区" 的接口）
///
/// `len` 永远是帧声明的真实长度，可能大于实际拷贝到缓冲区的字节数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u32,
    pub flags: CanFlags,
    pub len: usize,
}

impl From<&CanFrame> for FrameHeader {
    fn from(frame: &CanFrame) -> Self {
        Self {
            id: frame.id(),
            flags: frame.flags(),
            len: frame.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_standard_id_is_masked_to_11_bits() {
        assert_eq!(encode_id(0xFFFF, CanFlags::empty()), 0x7FF);
        let frame = CanFrame::new(0x1234, CanFlags::empty(), &[1]).unwrap();
        assert_eq!(frame.id(), 0x234);
        assert!(!frame.is_extended());
    }

    #[test]
    fn test_extended_id_sets_eff_flag() {
        let raw = encode_id(0xFFFF_FFFF, CanFlags::EXTENDED);
        assert_eq!(raw, CAN_EFF_MASK | CAN_EFF_FLAG);
        assert_eq!(decode_id(raw), (CAN_EFF_MASK, CanFlags::EXTENDED));
    }

    #[test]
    fn test_rtr_flag() {
        let raw = encode_id(0x123, CanFlags::REMOTE_REQUEST);
        assert_eq!(raw, 0x123 | CAN_RTR_FLAG);
        assert_eq!(decode_id(raw), (0x123, CanFlags::REMOTE_REQUEST));
    }

    #[test]
    fn test_fd_and_brs_rejected() {
        for flags in [
            CanFlags::FD,
            CanFlags::BIT_RATE_SWITCH,
            CanFlags::FD | CanFlags::EXTENDED,
        ] {
            let result = CanFrame::new(0x10, flags, &[1, 2]);
            assert!(
                matches!(result, Err(LinkError::Unsupported(_))),
                "flags {:?} should be unsupported",
                flags
            );
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = CanFrame::new(0x10, CanFlags::empty(), &[0u8; 9]);
        assert!(matches!(result, Err(LinkError::InvalidArgument(_))));
    }

    #[test]
    fn test_encode_layout() {
        let frame = CanFrame::new_standard(0x123, &[1, 2, 3]).unwrap();
        let bytes = frame.encode();
        assert_eq!(bytes.len(), CAN_FRAME_LEN);
        assert_eq!(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0x123);
        assert_eq!(bytes[4], 3);
        assert_eq!(&bytes[5..8], &[0, 0, 0]);
        assert_eq!(&bytes[8..16], &[1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_short_buffer() {
        let result = CanFrame::decode(&[0u8; 15]);
        assert_eq!(result.unwrap_err().errno(), Some(libc::EIO));
    }

    #[test]
    fn test_decode_invalid_dlc() {
        let mut bytes = [0u8; CAN_FRAME_LEN];
        bytes[4] = 9;
        assert_eq!(
            CanFrame::decode(&bytes).unwrap_err().errno(),
            Some(libc::EBADMSG)
        );
    }

    #[test]
    fn test_copy_payload_truncates() {
        let frame = CanFrame::new_standard(0x42, &[1, 2, 3, 4, 5, 6]).unwrap();
        let mut small = [0u8; 4];
        let copied = frame.copy_payload_into(&mut small);
        assert_eq!(copied, 4);
        assert_eq!(small, [1, 2, 3, 4]);
        // 头部保留真实长度，调用方据此发现截断
        assert_eq!(FrameHeader::from(&frame).len, 6);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_layout_matches_kernel_struct() {
        assert_eq!(CAN_FRAME_LEN, std::mem::size_of::<libc::can_frame>());
        assert_eq!(CAN_EFF_FLAG, libc::CAN_EFF_FLAG);
        assert_eq!(CAN_RTR_FLAG, libc::CAN_RTR_FLAG);
        assert_eq!(CAN_ERR_FLAG, libc::CAN_ERR_FLAG);
        assert_eq!(CAN_SFF_MASK, libc::CAN_SFF_MASK);
        assert_eq!(CAN_EFF_MASK, libc::CAN_EFF_MASK);
    }

    fn classic_flags() -> impl Strategy<Value = CanFlags> {
        (0u32..4).prop_map(CanFlags::from_bits_truncate)
    }

    proptest! {
        #[test]
        fn prop_encode_decode_preserves_id_flags_payload(
            id in any::<u32>(),
            flags in classic_flags(),
            payload in proptest::collection::vec(any::<u8>(), 0..=CAN_MAX_DLEN),
        ) {
            let frame = CanFrame::new(id, flags, &payload).unwrap();
            let decoded = CanFrame::decode(&frame.encode()).unwrap();

            let mask = if flags.contains(CanFlags::EXTENDED) { CAN_EFF_MASK } else { CAN_SFF_MASK };
            prop_assert_eq!(decoded.id(), id & mask);
            prop_assert_eq!(decoded.flags(), flags);
            prop_assert_eq!(decoded.data(), payload.as_slice());
        }
    }
}
