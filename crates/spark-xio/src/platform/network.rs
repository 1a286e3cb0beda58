use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use crate::error::{Result, XioError};

/// 操作系统网络协议栈的启动与关闭。
///
/// `platform_init` 先启动协议栈再初始化后端，`platform_deinit` 顺序相反。
pub trait NetworkStack: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn startup(&self) -> Result<()>;

    fn shutdown(&self);
}

/// 基于 socket2 的系统协议栈。
///
/// 启动时创建并立即释放一个 UDP 探测套接字：Windows 上 socket2 会在首次建套接字前完成
/// Winsock 初始化，其余平台借此确认协议栈可用。Winsock 的引用计数由标准库在进程退出时
/// 回收，`shutdown` 因此只记录日志。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemNetworkStack;

impl NetworkStack for SystemNetworkStack {
    fn name(&self) -> &'static str {
        "system"
    }

    fn startup(&self) -> Result<()> {
        let probe = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .or_else(|v4_error| {
                Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).map_err(|_| v4_error)
            })
            .map_err(|error| XioError::NetworkStartup {
                message: error.to_string(),
            })?;
        drop(probe);
        debug!("system network stack ready");
        Ok(())
    }

    fn shutdown(&self) {
        debug!("system network stack released");
    }
}
