use core::ops::Range;

/// 描述缓冲内一段连续区域的 `{offset, len}` 对。
///
/// `offset` 为相对缓冲起点的偏移，不携带任何指针，因此可以在不借用缓冲的情况下自由传递。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// 区间结束位置（不含）。
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

/// 至多两段的区间集合。
///
/// # 契约（What）
/// - 空区间不会被收录，`as_slice()` 的长度即为需要发起的 I/O 分段数（0、1 或 2）；
/// - 存在两段时，第二段总是从偏移 0 开始（回绕段），且位于第一段之前。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Spans {
    spans: [Span; 2],
    count: usize,
}

impl Spans {
    pub const fn empty() -> Self {
        Self {
            spans: [Span::new(0, 0); 2],
            count: 0,
        }
    }

    fn from_runs(head: Span, wrapped: Span) -> Self {
        let mut spans = Self::empty();
        for run in [head, wrapped] {
            if !run.is_empty() {
                spans.spans[spans.count] = run;
                spans.count += 1;
            }
        }
        spans
    }

    pub fn as_slice(&self) -> &[Span] {
        &self.spans[..self.count]
    }

    /// 分段数量。
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 全部分段覆盖的字节数。
    pub fn total_len(&self) -> usize {
        self.as_slice().iter().map(|span| span.len).sum()
    }
}

/// 计算下一次写入可用的目标区间。
///
/// # 逻辑（How）
/// - 请求量先截断到空闲字节数；
/// - 写入起点 `tail = (cursor + used) % capacity`；
/// - 若数据未回绕（`tail >= cursor`），空闲区由 `[tail, capacity)` 与 `[0, cursor)` 两段组成；
///   否则空闲区只剩 `[tail, cursor)` 一段。
///
/// # 契约（What）
/// - **前置条件**：`used <= capacity`，`cursor < capacity`（容量为 0 时游标为 0）；
/// - **返回值**：总长度为 `min(n, capacity - used)` 的区间集合，空闲为 0 时返回空集合。
pub fn write_spans(capacity: usize, cursor: usize, used: usize, n: usize) -> Spans {
    debug_assert!(used <= capacity);
    let n = n.min(capacity - used);
    if n == 0 {
        return Spans::empty();
    }
    let tail = (cursor + used) % capacity;
    if tail >= cursor {
        let head = n.min(capacity - tail);
        Spans::from_runs(Span::new(tail, head), Span::new(0, n - head))
    } else {
        Spans::from_runs(Span::new(tail, n), Span::new(0, 0))
    }
}

/// 计算按游标顺序覆盖至多 `n` 个已用字节的源区间。
///
/// 空缓冲返回空集合而非错误。
pub fn read_spans(capacity: usize, cursor: usize, used: usize, n: usize) -> Spans {
    debug_assert!(used <= capacity);
    let n = n.min(used);
    if n == 0 {
        return Spans::empty();
    }
    let head = n.min(capacity - cursor);
    Spans::from_runs(Span::new(cursor, head), Span::new(0, n - head))
}
