use std::{
    fmt,
    io::{self, Read, Write},
};

use rustls::{ClientConnection, ProtocolVersion, StreamOwned};
use tracing::debug;

use crate::bridge::{StreamBridge, TransportStream, broken_pipe};

/// 握手与信任决策完成后的加密字节流。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为协议层提供与明文传输一致的 `read`/`write`/`flush`/`close` 接口，加解密由 `rustls` 在内部完成；
/// - 缓存握手期间计算出的服务端指纹，便于上层记录审计信息。
///
/// ## 逻辑（How）
/// - 以 `rustls::StreamOwned` 组合 `ClientConnection` 与 [`StreamBridge`]，阻塞读写直接落到委托流；
/// - `flush` 先把引擎缓冲的密文写出，再调用委托流自身的 `flush`；
/// - `close` 发送 `close_notify`，注销桥接并恰好一次关闭委托流，此后所有操作返回 `BrokenPipe`。
///
/// ## 契约（What）
/// - 同一实例只能由一个线程驱动；
/// - 对端未发送 `close_notify` 即断开时，`read` 返回 `UnexpectedEof`，防止截断攻击被误认为正常结束；
/// - drop 时若尚未关闭，会尽力执行一次 `close`，错误仅记录日志。
pub struct SecureStream<T: TransportStream> {
    stream: Option<StreamOwned<ClientConnection, StreamBridge<T>>>,
    fingerprint: String,
    protocol: Option<ProtocolVersion>,
}

impl<T: TransportStream> SecureStream<T> {
    pub(crate) fn new(
        conn: ClientConnection,
        bridge: StreamBridge<T>,
        fingerprint: String,
    ) -> Self {
        let protocol = conn.protocol_version();
        Self {
            stream: Some(StreamOwned::new(conn, bridge)),
            fingerprint,
            protocol,
        }
    }

    /// 服务端叶子证书指纹（SHA-512，小写十六进制）。
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn negotiated_protocol(&self) -> Option<ProtocolVersion> {
        self.protocol
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.open()?.read(buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open()?.write(buf)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        let stream = self.open()?;
        stream.flush()?;
        stream.sock.delegate_mut()?.flush()
    }

    /// 发送 `close_notify` 并关闭委托流；重复调用返回 `BrokenPipe`。
    pub fn close(&mut self) -> io::Result<()> {
        let mut stream = self.stream.take().ok_or_else(broken_pipe)?;
        stream.conn.send_close_notify();
        let notified = stream.conn.complete_io(&mut stream.sock).map(|_| ());
        let mut delegate = stream.sock.destroy()?;
        let closed = delegate.close();
        debug!(notified = notified.is_ok(), "secure stream closed");
        notified.and(closed)
    }

    fn open(&mut self) -> io::Result<&mut StreamOwned<ClientConnection, StreamBridge<T>>> {
        self.stream.as_mut().ok_or_else(broken_pipe)
    }
}

impl<T: TransportStream> Read for SecureStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SecureStream::read(self, buf)
    }
}

impl<T: TransportStream> Write for SecureStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SecureStream::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        SecureStream::flush(self)
    }
}

impl<T: TransportStream> Drop for SecureStream<T> {
    fn drop(&mut self) {
        if self.stream.is_some()
            && let Err(err) = self.close()
        {
            debug!(error = %err, "secure stream close on drop failed");
        }
    }
}

impl<T: TransportStream> fmt::Debug for SecureStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureStream")
            .field("fingerprint", &self.fingerprint)
            .field("protocol", &self.protocol)
            .field("closed", &self.stream.is_none())
            .finish()
    }
}
