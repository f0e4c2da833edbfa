use std::io;

use thiserror::Error;

/// 环形缓冲操作的错误类型。
///
/// # 契约（What）
/// - `Full`：缓冲已无任何空闲空间，本次写入未发生；
/// - `Io`：与描述符交互时底层 `read_vectored`/`write_vectored` 返回的错误，缓冲状态保持不变。
///
/// 缓冲为空不属于错误：读取类操作在空缓冲上返回 0 或空区间。
#[derive(Debug, Error)]
pub enum BufferError {
    /// 缓冲已满。
    #[error("ring buffer full (capacity {capacity})")]
    Full {
        /// 缓冲总容量，便于日志定位。
        capacity: usize,
    },
    /// 描述符读写失败。
    #[error("ring buffer i/o: {0}")]
    Io(#[from] io::Error),
}

impl BufferError {
    /// 稳定错误码，沿用 `spark.<域>.<语义>` 的命名约定。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::Full { .. } => "spark.buffer.full",
            BufferError::Io(_) => "spark.buffer.io",
        }
    }
}
