//! termios 配置
//!
//! 原始模式（非规范、无回显、无流控、无输出处理），`VMIN = 0` / `VTIME = 0`：
//! readiness 确认后 `read` 立即返回当前可用的数据。

use crate::settings::{DataBits, LineSettings, Parity, SerialBaud, StopBits};
use commlink_core::LinkError;
use nix::sys::termios::{
    self, BaudRate, ControlFlags, InputFlags, OutputFlags, SetArg, SpecialCharacterIndices, Termios,
};
use std::os::fd::{AsFd, AsRawFd};
use tracing::{error, trace};

pub(crate) fn baud_rate(baud: SerialBaud) -> BaudRate {
    match baud {
        SerialBaud::B50 => BaudRate::B50,
        SerialBaud::B75 => BaudRate::B75,
        SerialBaud::B110 => BaudRate::B110,
        SerialBaud::B134 => BaudRate::B134,
        SerialBaud::B150 => BaudRate::B150,
        SerialBaud::B200 => BaudRate::B200,
        SerialBaud::B300 => BaudRate::B300,
        SerialBaud::B600 => BaudRate::B600,
        SerialBaud::B1200 => BaudRate::B1200,
        SerialBaud::B1800 => BaudRate::B1800,
        SerialBaud::B2400 => BaudRate::B2400,
        SerialBaud::B4800 => BaudRate::B4800,
        SerialBaud::B9600 => BaudRate::B9600,
        SerialBaud::B19200 => BaudRate::B19200,
        SerialBaud::B38400 => BaudRate::B38400,
        SerialBaud::B57600 => BaudRate::B57600,
        SerialBaud::B115200 => BaudRate::B115200,
        SerialBaud::B230400 => BaudRate::B230400,
        SerialBaud::B460800 => BaudRate::B460800,
        SerialBaud::B500000 => BaudRate::B500000,
        SerialBaud::B576000 => BaudRate::B576000,
        SerialBaud::B921600 => BaudRate::B921600,
        SerialBaud::B1000000 => BaudRate::B1000000,
        SerialBaud::B1152000 => BaudRate::B1152000,
        SerialBaud::B1500000 => BaudRate::B1500000,
        SerialBaud::B2000000 => BaudRate::B2000000,
        SerialBaud::B2500000 => BaudRate::B2500000,
        SerialBaud::B3000000 => BaudRate::B3000000,
        SerialBaud::B3500000 => BaudRate::B3500000,
        SerialBaud::B4000000 => BaudRate::B4000000,
    }
}

/// 把线路参数写入 `Termios`（不触碰设备）
pub(crate) fn apply(tio: &mut Termios, settings: &LineSettings) -> Result<(), LinkError> {
    termios::cfmakeraw(tio);

    let speed = baud_rate(settings.baud);
    termios::cfsetispeed(tio, speed).map_err(|e| LinkError::os("cfsetispeed", e as i32))?;
    termios::cfsetospeed(tio, speed).map_err(|e| LinkError::os("cfsetospeed", e as i32))?;

    let cflag = &mut tio.control_flags;
    cflag.remove(ControlFlags::CSIZE);
    cflag.insert(match settings.data_bits {
        DataBits::Five => ControlFlags::CS5,
        DataBits::Six => ControlFlags::CS6,
        DataBits::Seven => ControlFlags::CS7,
        DataBits::Eight => ControlFlags::CS8,
    });

    cflag.set(ControlFlags::CSTOPB, settings.stop_bits == StopBits::Two);

    cflag.remove(ControlFlags::PARENB | ControlFlags::PARODD);
    match settings.parity {
        Parity::None => {},
        Parity::Odd => cflag.insert(ControlFlags::PARENB | ControlFlags::PARODD),
        Parity::Even => cflag.insert(ControlFlags::PARENB),
    }

    // 忽略调制解调器控制线，开启接收；无硬件流控
    cflag.insert(ControlFlags::CLOCAL | ControlFlags::CREAD);
    cflag.remove(ControlFlags::CRTSCTS);

    tio.input_flags
        .remove(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
    // 开启校验时检查输入校验错误，错误字节不忽略也不标记
    tio.input_flags.remove(InputFlags::IGNPAR | InputFlags::PARMRK);
    tio.input_flags
        .set(InputFlags::INPCK, settings.parity != Parity::None);
    tio.output_flags.remove(OutputFlags::OPOST);

    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    Ok(())
}

/// 读取设备当前 termios，应用线路参数并立即生效
///
/// 非终端设备（例如 `/dev/null`）在 `tcgetattr` 处失败，返回 `Os(ENOTTY)`。
pub fn configure<Fd: AsFd>(fd: Fd, settings: &LineSettings) -> Result<(), LinkError> {
    let fd = fd.as_fd();
    let mut tio = termios::tcgetattr(fd).map_err(|e| {
        error!("tcgetattr(fd={}) failed: {}", fd.as_raw_fd(), e);
        LinkError::os("tcgetattr", e as i32)
    })?;

    apply(&mut tio, settings)?;

    termios::tcsetattr(fd, SetArg::TCSANOW, &tio).map_err(|e| {
        error!("tcsetattr(fd={}) failed: {}", fd.as_raw_fd(), e);
        LinkError::os("tcsetattr", e as i32)
    })?;

    trace!("fd {} configured as {}", fd.as_raw_fd(), settings);
    Ok(())
}
