use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

/// 引擎单次读写可寻址的最大长度，超出部分由调用方在下一轮继续处理。
pub const ENGINE_IO_LIMIT: usize = i32::MAX as usize;

/// 通用双向字节流契约。
///
/// # 契约（What）
/// - `read`/`write`：返回实际传输的字节数，失败以 `io::Error` 表达；
/// - `flush`：把用户态缓冲交给内核，由上层在合适的时机调用；
/// - `close`：释放底层资源，`SecureStream` 与失败的会话都保证对同一实例只调用一次。
pub trait TransportStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn flush(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

impl TransportStream for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(self)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl<T: TransportStream + ?Sized> TransportStream for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// 把任意 [`TransportStream`] 暴露给加密引擎的桥接层。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - `rustls` 通过 `io::Read`/`io::Write` 推送密文，本类型把这两个接口直接转发给委托流，边界处不做拷贝；
/// - 统计握手期间收到的字节数，使会话能区分“对端一声不吭就断开”与真正的协议错误。
///
/// ## 契约（What）
/// - 读写长度截断到 [`ENGINE_IO_LIMIT`]，委托流的结果原样返回；
/// - `puts` 等价于写入整个字符串，`gets` 不受支持；
/// - `io::Write::flush` 即引擎的 flush 控制，总是成功，委托流自身的 flush 由上层另行调用；
/// - `destroy` 在没有已登记委托流时返回 `BrokenPipe`，否则交还委托流并将桥接标记为未初始化。
pub struct StreamBridge<T> {
    delegate: Option<T>,
    received: u64,
    sent: u64,
}

impl<T: TransportStream> StreamBridge<T> {
    pub fn new(delegate: T) -> Self {
        Self {
            delegate: Some(delegate),
            received: 0,
            sent: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.delegate.is_some()
    }

    /// 自创建以来从委托流读到的字节数。
    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    pub fn delegate_mut(&mut self) -> io::Result<&mut T> {
        self.delegate.as_mut().ok_or_else(broken_pipe)
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len().min(ENGINE_IO_LIMIT);
        let written = self.delegate_mut()?.write(&buf[..len])?;
        self.sent += written as u64;
        Ok(written)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(ENGINE_IO_LIMIT);
        let read = self.delegate_mut()?.read(&mut buf[..len])?;
        self.received += read as u64;
        Ok(read)
    }

    pub fn puts(&mut self, line: &str) -> io::Result<usize> {
        self.write(line.as_bytes())
    }

    pub fn gets(&mut self, _line: &mut String) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream bridge does not support gets",
        ))
    }

    pub fn flush_control(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// 注销委托流并交还所有权，重复调用返回 `BrokenPipe`。
    pub fn destroy(&mut self) -> io::Result<T> {
        self.delegate.take().ok_or_else(broken_pipe)
    }
}

impl<T: TransportStream> Read for StreamBridge<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StreamBridge::read(self, buf)
    }
}

impl<T: TransportStream> Write for StreamBridge<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        StreamBridge::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_control()
    }
}

impl<T> fmt::Debug for StreamBridge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBridge")
            .field("initialized", &self.delegate.is_some())
            .field("received", &self.received)
            .field("sent", &self.sent)
            .finish()
    }
}

pub(crate) fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream already closed")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// 内存中的委托流：读取预置字节，记录写入与 flush/close 次数。
    #[derive(Debug, Default)]
    struct MemoryStream {
        inbound: Vec<u8>,
        outbound: Arc<Mutex<Vec<u8>>>,
        flushes: usize,
        closes: Arc<Mutex<usize>>,
    }

    impl TransportStream for MemoryStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            buf[..n].copy_from_slice(&self.inbound[..n]);
            self.inbound.drain(..n);
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.lock().expect("outbound").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            *self.closes.lock().expect("closes") += 1;
            Ok(())
        }
    }

    #[test]
    fn forwards_reads_and_writes_to_delegate() {
        let stream = MemoryStream {
            inbound: b"server hello".to_vec(),
            ..MemoryStream::default()
        };
        let outbound = Arc::clone(&stream.outbound);
        let mut bridge = StreamBridge::new(stream);

        let mut buf = [0u8; 6];
        assert_eq!(Read::read(&mut bridge, &mut buf).expect("read"), 6);
        assert_eq!(&buf, b"server");
        assert_eq!(bridge.bytes_received(), 6);

        assert_eq!(bridge.puts("client hello").expect("puts"), 12);
        assert_eq!(outbound.lock().expect("outbound").as_slice(), b"client hello");
        assert_eq!(bridge.bytes_sent(), 12);
    }

    #[test]
    fn gets_is_unsupported() {
        let mut bridge = StreamBridge::new(MemoryStream::default());
        let err = bridge.gets(&mut String::new()).expect_err("unsupported");
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn flush_control_does_not_touch_delegate() {
        let mut bridge = StreamBridge::new(MemoryStream::default());
        Write::flush(&mut bridge).expect("flush control");
        assert_eq!(bridge.delegate_mut().expect("delegate").flushes, 0);
    }

    #[test]
    fn destroy_twice_is_broken_pipe() {
        let mut bridge = StreamBridge::new(MemoryStream::default());
        assert!(bridge.destroy().is_ok());
        assert!(!bridge.is_initialized());
        let err = bridge.destroy().expect_err("already destroyed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = bridge.write(b"late").expect_err("no delegate");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn boxed_delegate_is_returned_for_single_close() {
        let stream = MemoryStream::default();
        let closes = Arc::clone(&stream.closes);
        let boxed: Box<dyn TransportStream> = Box::new(stream);
        let mut bridge = StreamBridge::new(boxed);
        bridge
            .destroy()
            .expect("registered delegate")
            .close()
            .expect("close");
        assert_eq!(*closes.lock().expect("closes"), 1);
    }
}
