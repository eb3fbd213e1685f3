//! CAN 网络接口控制
//!
//! 通过一个短生命周期的 `AF_INET/SOCK_DGRAM` 控制 socket 执行
//! `ioctl(SIOCGIFFLAGS / SIOCSIFFLAGS)`，读取或修改接口的 `IFF_UP` 标志。
//!
//! - 查询（`is_up` / `index`）普通用户即可执行
//! - 修改（`bring_up` / `bring_down`）需要 `CAP_NET_ADMIN`；接口已处于目标状态时不发起
//!   `SIOCSIFFLAGS`，因此对已启动的接口调用 `bring_up` 不需要特权
//!
//! 波特率等链路参数由系统工具（`ip link set can0 type can bitrate ...`）配置，不在此处设置。

use commlink_core::LinkError;
use libc::{AF_INET, IFF_UP, SIOCGIFFLAGS, SIOCSIFFLAGS, SOCK_CLOEXEC, SOCK_DGRAM, c_short, ifreq};
use nix::errno::Errno;
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tracing::{error, info, trace};

/// `ifr_name` 为 IFNAMSIZ = 16 字节（含结尾 NUL），所以最大长度是 15
pub const MAX_IFACE_NAME_LEN: usize = libc::IFNAMSIZ - 1;

/// 校验接口名：非空、不超长、不含 NUL
pub fn validate_name(interface: &str) -> Result<(), LinkError> {
    if interface.is_empty() {
        return Err(LinkError::invalid("interface name is empty"));
    }
    if interface.len() > MAX_IFACE_NAME_LEN {
        return Err(LinkError::invalid(format!(
            "interface name '{}' is too long (max {} characters)",
            interface, MAX_IFACE_NAME_LEN
        )));
    }
    if interface.as_bytes().contains(&0) {
        return Err(LinkError::invalid(format!(
            "interface name {:?} contains NUL",
            interface
        )));
    }
    Ok(())
}

/// 构造只填了 `ifr_name` 的 `ifreq`
fn ifreq_for(interface: &str) -> Result<ifreq, LinkError> {
    validate_name(interface)?;

    let mut ifr: ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(interface.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    // zeroed() 已保证结尾 NUL
    Ok(ifr)
}

/// 打开控制 socket，drop 时自动关闭
fn control_socket() -> Result<OwnedFd, LinkError> {
    let fd = unsafe { libc::socket(AF_INET, SOCK_DGRAM | SOCK_CLOEXEC, 0) };
    if fd < 0 {
        let errno = Errno::last();
        error!("socket(AF_INET) failed: {}", errno);
        return Err(LinkError::os("socket(AF_INET)", errno as i32));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn get_flags(sock: &OwnedFd, interface: &str, ifr: &mut ifreq) -> Result<c_short, LinkError> {
    let ret = unsafe { libc::ioctl(sock.as_raw_fd(), SIOCGIFFLAGS, ifr as *mut ifreq) };
    if ret < 0 {
        let errno = Errno::last();
        error!("SIOCGIFFLAGS({}) failed: {}", interface, errno);
        return Err(LinkError::os("ioctl(SIOCGIFFLAGS)", errno as i32));
    }
    // ifru_flags 是 ifr_ifru union 的 c_short 成员，位于 union 起始处
    Ok(unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const c_short) })
}

fn set_flags(sock: &OwnedFd, interface: &str, ifr: &mut ifreq, flags: c_short) -> Result<(), LinkError> {
    unsafe {
        *(std::ptr::addr_of_mut!(ifr.ifr_ifru) as *mut c_short) = flags;
    }
    let ret = unsafe { libc::ioctl(sock.as_raw_fd(), SIOCSIFFLAGS, ifr as *mut ifreq) };
    if ret < 0 {
        let errno = Errno::last();
        error!("SIOCSIFFLAGS({}) failed: {}", interface, errno);
        return Err(LinkError::os("ioctl(SIOCSIFFLAGS)", errno as i32));
    }
    Ok(())
}

/// 检查接口是否处于管理态 UP
pub fn is_up(interface: &str) -> Result<bool, LinkError> {
    let mut ifr = ifreq_for(interface)?;
    let sock = control_socket()?;
    let flags = get_flags(&sock, interface, &mut ifr)?;
    let up = (flags as i32 & IFF_UP) != 0;

    trace!(
        "Interface '{}' status: {}",
        interface,
        if up { "UP" } else { "DOWN" }
    );
    Ok(up)
}

/// 设置或清除 `IFF_UP`
///
/// 读取当前标志；若已是目标状态则直接返回，否则写回修改后的标志。
pub fn set_up(interface: &str, up: bool) -> Result<(), LinkError> {
    let mut ifr = ifreq_for(interface)?;
    let sock = control_socket()?;
    let flags = get_flags(&sock, interface, &mut ifr)?;

    let up_bit = IFF_UP as c_short;
    let wanted = if up { flags | up_bit } else { flags & !up_bit };
    if wanted == flags {
        trace!(
            "Interface '{}' already {}",
            interface,
            if up { "UP" } else { "DOWN" }
        );
        return Ok(());
    }

    set_flags(&sock, interface, &mut ifr, wanted)?;
    info!(
        "Interface '{}' set {}",
        interface,
        if up { "UP" } else { "DOWN" }
    );
    Ok(())
}

/// 启动接口
pub fn bring_up(interface: &str) -> Result<(), LinkError> {
    set_up(interface, true)
}

/// 关闭接口
pub fn bring_down(interface: &str) -> Result<(), LinkError> {
    set_up(interface, false)
}

/// 解析接口索引
///
/// # 错误
/// - `LinkError::InvalidArgument`: 接口名非法
/// - `LinkError::Os`: 接口不存在（通常为 `ENODEV`）
pub fn index(interface: &str) -> Result<u32, LinkError> {
    validate_name(interface)?;
    let c_iface =
        CString::new(interface).map_err(|e| LinkError::invalid(format!("invalid interface name: {}", e)))?;

    let ifindex = unsafe { libc::if_nametoindex(c_iface.as_ptr()) };
    if ifindex == 0 {
        let errno = Errno::last();
        error!("if_nametoindex({}) failed: {}", interface, errno);
        return Err(LinkError::os("if_nametoindex", errno as i32));
    }
    Ok(ifindex)
}

/// 接口是否存在
pub fn exists(interface: &str) -> bool {
    index(interface).is_ok()
}
