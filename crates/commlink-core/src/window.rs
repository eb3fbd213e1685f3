//! 调用方缓冲区窗口校验
//!
//! 串口/CAN 的读写都允许调用方传入 `(buffer, offset, length)`，
//! 越界一律返回 `InvalidArgument`，不会触发任何系统调用。

use crate::LinkError;
use std::ops::Range;

/// 校验 `offset..offset + length` 落在长度为 `buf_len` 的缓冲区内且非空
pub fn buffer_window(buf_len: usize, offset: usize, length: usize) -> Result<Range<usize>, LinkError> {
    if length == 0 {
        return Err(LinkError::invalid("length must be greater than zero"));
    }
    let end = offset
        .checked_add(length)
        .ok_or_else(|| LinkError::invalid("offset + length overflows"))?;
    if end > buf_len {
        return Err(LinkError::invalid(format!(
            "window {}..{} exceeds buffer of {} bytes",
            offset, end, buf_len
        )));
    }
    Ok(offset..end)
}

/// 边界版本：接受有符号的 offset/length（负数即非法）
pub fn checked_window(buf_len: usize, offset: i32, length: i32) -> Result<Range<usize>, LinkError> {
    let offset = usize::try_from(offset)
        .map_err(|_| LinkError::invalid(format!("negative offset {}", offset)))?;
    let length = usize::try_from(length)
        .map_err(|_| LinkError::invalid(format!("negative length {}", length)))?;
    buffer_window(buf_len, offset, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_window() {
        assert_eq!(buffer_window(8, 0, 8).unwrap(), 0..8);
        assert_eq!(buffer_window(10, 3, 4).unwrap(), 3..7);
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(matches!(
            buffer_window(8, 0, 0),
            Err(LinkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        assert!(buffer_window(8, 4, 5).is_err());
        assert!(buffer_window(8, 9, 1).is_err());
        assert!(buffer_window(8, usize::MAX, 2).is_err());
    }

    #[test]
    fn test_negative_values_rejected() {
        assert!(checked_window(8, -1, 4).is_err());
        assert!(checked_window(8, 0, -4).is_err());
        assert_eq!(checked_window(8, 2, 6).unwrap(), 2..8);
    }

    proptest::proptest! {
        #[test]
        fn prop_accepted_window_is_inside_buffer(buf_len in 0usize..64, offset in 0usize..80, length in 0usize..80) {
            if let Ok(range) = buffer_window(buf_len, offset, length) {
                proptest::prop_assert!(range.end <= buf_len);
                proptest::prop_assert!(!range.is_empty());
            }
        }
    }
}
