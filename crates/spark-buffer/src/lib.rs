//! `spark-buffer` 提供套接字与协议层之间使用的定长环形缓冲。
//!
//! # 模块定位（Why）
//! - 加密流与协议编解码之间需要一块可复用的字节暂存区，既要支持从描述符批量读入，
//!   也要支持按需取出或直接写回描述符，且不能引入额外拷贝。
//! - 缓冲容量固定，数据最多分布在两段连续区间（头段 + 回绕尾段），因此每次操作最多
//!   发起一次包含两个分段的向量化 I/O。
//!
//! # 设计概要（How）
//! - `span` 模块以纯函数计算读写区间（[`Span`] / [`Spans`]），不触碰任何内存；
//! - `ring` 模块中的 [`RingBuffer`] 持有底层字节数组，所有游标与计数的变更都集中在
//!   少数几个带断言的私有方法中；
//! - [`RingBuffer`] 同时实现 [`bytes::Buf`]，便于上层直接以 `bytes` 生态消费已缓存的数据。
//!
//! # 命名约定（Consistency）
//! - `reserve_for_write`/`reserve_for_read` 只计算区间，`append`/`extract`/`read_from`/`write_to`
//!   才真正搬运字节并推进状态。

mod error;
mod ring;
mod span;

pub use error::BufferError;
pub use ring::RingBuffer;
pub use span::{Span, Spans, read_spans, write_spans};
