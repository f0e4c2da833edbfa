use std::io::{IoSlice, IoSliceMut, Read, Write};

use bytes::Buf;

use crate::{
    error::BufferError,
    span::{Span, Spans, read_spans, write_spans},
};

/// 定长环形字节缓冲。
///
/// # 设计动机（Why）
/// - 套接字读写与协议解析的节奏不同，需要一个容量固定、可回绕复用的暂存区；
/// - 区间计算与字节搬运分离：调用方可以先拿到 [`Spans`] 规划零拷贝 I/O，再提交实际搬运量。
///
/// # 逻辑（How）
/// - `storage` 为定长字节数组，`cursor` 指向最早未读字节，`used` 记录已用字节数；
/// - 所有状态变更只经过 `commit_write` 与 `commit_read` 两个入口，二者维护以下不变式：
///   `used <= capacity`、`cursor < capacity`（容量为 0 时为 0）、`used == 0` 时 `cursor == 0`。
///
/// # 契约（What）
/// - 写入类操作在完全没有空闲空间时返回 [`BufferError::Full`]，空间不足时静默截断；
/// - 读取类操作在空缓冲上返回 0，不视为错误；
/// - 描述符 I/O 只按系统调用实际搬运的字节数推进状态，部分读写不会破坏不变式。
///
/// # 风险与权衡（Trade-offs）
/// - 实例不做内部同步，同一时刻只能由一个连接驱动；
/// - `clear` 不擦除旧字节，缓冲内容可能残留敏感明文，调用方需自行决定是否覆写。
#[derive(Debug)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    cursor: usize,
    used: usize,
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// 已缓存、尚未取出的字节数。
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    /// 剩余空闲字节数。
    pub fn free(&self) -> usize {
        self.capacity() - self.used
    }

    /// 最早未读字节相对缓冲起点的偏移。
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 计算接下来至多 `n` 字节写入应落在哪些区间。
    ///
    /// # 契约（What）
    /// - **返回值**：一至两段区间，总长度为 `min(n, free())`；
    /// - **错误**：缓冲没有任何空闲空间时返回 [`BufferError::Full`]。
    pub fn reserve_for_write(&self, n: usize) -> Result<Spans, BufferError> {
        if self.free() == 0 {
            return Err(BufferError::Full {
                capacity: self.capacity(),
            });
        }
        Ok(write_spans(self.capacity(), self.cursor, self.used, n))
    }

    /// 计算按读取顺序覆盖至多 `n` 个已用字节的区间；空缓冲返回空集合。
    pub fn reserve_for_read(&self, n: usize) -> Spans {
        read_spans(self.capacity(), self.cursor, self.used, n)
    }

    /// 将调用方内存中的字节追加到缓冲，返回实际写入量（空间不足时截断）。
    pub fn append(&mut self, src: &[u8]) -> Result<usize, BufferError> {
        let spans = self.reserve_for_write(src.len())?;
        let (head, wrapped) = self.slices_mut(&spans);
        let (src_head, src_rest) = src.split_at(head.len());
        head.copy_from_slice(src_head);
        wrapped.copy_from_slice(&src_rest[..wrapped.len()]);
        let written = spans.total_len();
        self.commit_write(written);
        Ok(written)
    }

    /// 以一次向量化读取从描述符读入至多 `n` 字节。
    ///
    /// # 契约（What）
    /// - **返回值**：`n > 0` 时 `Ok(0)` 表示对端已到达流末尾，否则为实际读入的字节数；
    /// - **零长度请求**：`n == 0` 不发起系统调用，直接返回 `Ok(0)`，调用方不应据此判断 EOF；
    /// - **后置条件**：只有实际读入的字节计入 `len()`，系统调用少填的部分不会被视为已用。
    pub fn read_from<R>(&mut self, reader: &mut R, n: usize) -> Result<usize, BufferError>
    where
        R: Read + ?Sized,
    {
        let spans = self.reserve_for_write(n)?;
        if spans.is_empty() {
            return Ok(0);
        }
        let offered = spans.total_len();
        let (head, wrapped) = self.slices_mut(&spans);
        let mut bufs = [IoSliceMut::new(head), IoSliceMut::new(wrapped)];
        let read = reader.read_vectored(&mut bufs[..spans.len()])?;
        debug_assert!(read <= offered, "reader reported more bytes than offered");
        let read = read.min(offered);
        self.commit_write(read);
        Ok(read)
    }

    /// 按读取顺序把至多 `dst.len()` 字节复制到调用方内存，返回复制量。
    pub fn extract(&mut self, dst: &mut [u8]) -> usize {
        let spans = self.reserve_for_read(dst.len());
        let (head, wrapped) = self.slices(&spans);
        dst[..head.len()].copy_from_slice(head);
        dst[head.len()..head.len() + wrapped.len()].copy_from_slice(wrapped);
        let read = spans.total_len();
        self.commit_read(read);
        read
    }

    /// 以一次向量化写出把至多 `n` 个已缓存字节写到描述符。
    ///
    /// 只有描述符实际接受的字节会被移出缓冲；空缓冲直接返回 0 而不发起系统调用。
    pub fn write_to<W>(&mut self, writer: &mut W, n: usize) -> Result<usize, BufferError>
    where
        W: Write + ?Sized,
    {
        let spans = self.reserve_for_read(n);
        if spans.is_empty() {
            return Ok(0);
        }
        let offered = spans.total_len();
        let (head, wrapped) = self.slices(&spans);
        let bufs = [IoSlice::new(head), IoSlice::new(wrapped)];
        let written = writer.write_vectored(&bufs[..spans.len()])?;
        debug_assert!(written <= offered, "writer reported more bytes than offered");
        let written = written.min(offered);
        self.commit_read(written);
        Ok(written)
    }

    /// 跳过至多 `n` 个已缓存字节而不复制，返回实际跳过量。
    pub fn discard(&mut self, n: usize) -> usize {
        let skipped = n.min(self.used);
        self.commit_read(skipped);
        skipped
    }

    /// 游标归位、计数清零；不触碰底层字节。
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.used = 0;
    }

    /// 以两个只读切片的形式借出至多 `n` 个已缓存字节，顺序即读取顺序。
    pub fn readable(&self, n: usize) -> (&[u8], &[u8]) {
        self.slices(&self.reserve_for_read(n))
    }

    /// 借出单个区间的字节，区间通常来自 [`Self::reserve_for_read`]。
    pub fn span(&self, span: Span) -> &[u8] {
        &self.storage[span.range()]
    }

    fn slices(&self, spans: &Spans) -> (&[u8], &[u8]) {
        let empty: &[u8] = &[];
        match spans.as_slice() {
            [] => (empty, empty),
            [head] => (&self.storage[head.range()], empty),
            [head, wrapped] => (&self.storage[head.range()], &self.storage[wrapped.range()]),
            _ => unreachable!("spans never exceed two runs"),
        }
    }

    fn slices_mut(&mut self, spans: &Spans) -> (&mut [u8], &mut [u8]) {
        match *spans.as_slice() {
            [] => (Default::default(), Default::default()),
            [head] => (&mut self.storage[head.range()], Default::default()),
            [head, wrapped] => {
                debug_assert!(wrapped.offset == 0 && wrapped.end() <= head.offset);
                let (front, back) = self.storage.split_at_mut(head.offset);
                (&mut back[..head.len], &mut front[wrapped.range()])
            }
            _ => unreachable!("spans never exceed two runs"),
        }
    }

    fn commit_write(&mut self, n: usize) {
        debug_assert!(n <= self.free());
        self.used += n;
    }

    fn commit_read(&mut self, n: usize) {
        debug_assert!(n <= self.used);
        if n == 0 {
            return;
        }
        self.used -= n;
        self.cursor = if self.used == 0 {
            0
        } else {
            (self.cursor + n) % self.capacity()
        };
    }
}

impl Buf for RingBuffer {
    fn remaining(&self) -> usize {
        self.used
    }

    fn chunk(&self) -> &[u8] {
        self.readable(self.used).0
    }

    fn chunks_vectored<'a>(&'a self, dst: &mut [IoSlice<'a>]) -> usize {
        let (head, wrapped) = self.readable(self.used);
        let mut filled = 0;
        for run in [head, wrapped] {
            if run.is_empty() || filled == dst.len() {
                continue;
            }
            dst[filled] = IoSlice::new(run);
            filled += 1;
        }
        filled
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.used,
            "cannot advance past remaining: {cnt} > {}",
            self.used
        );
        self.discard(cnt);
    }
}
