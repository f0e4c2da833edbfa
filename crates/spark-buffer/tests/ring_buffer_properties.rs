//! `RingBuffer` 性质测试。
//!
//! - 性质 1（FIFO）：任意交错的 `append`/`extract`/`discard` 序列，只要未读字节不超过容量，
//!   取出的字节序列与写入的字节序列逐字节一致；
//! - 性质 2（区间守恒）：`reserve_for_write` 规划的区间写满后，`reserve_for_read` 覆盖同一批字节的
//!   区间总长与之相等，与是否回绕无关；
//! - 性质 3（归位）：未读字节归零时游标必然回到起点。
//!
//! 以 `VecDeque<u8>` 作为影子模型对照。

use std::collections::VecDeque;

use proptest::prelude::*;
use spark_buffer::RingBuffer;

#[derive(Clone, Debug)]
enum Op {
    Append(Vec<u8>),
    Extract(usize),
    Discard(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..24).prop_map(Op::Append),
        (0usize..24).prop_map(Op::Extract),
        (0usize..24).prop_map(Op::Discard),
    ]
}

proptest! {
    #[test]
    fn prop_fifo_round_trip(capacity in 1usize..32, ops in prop::collection::vec(op(), 1..64)) {
        let mut ring = RingBuffer::with_capacity(capacity);
        let mut model: VecDeque<u8> = VecDeque::new();

        for op in ops {
            match op {
                Op::Append(bytes) => {
                    let free = capacity - model.len();
                    match ring.append(&bytes) {
                        Ok(written) => {
                            prop_assert_eq!(written, bytes.len().min(free));
                            model.extend(&bytes[..written]);
                        }
                        Err(_) => prop_assert_eq!(free, 0),
                    }
                }
                Op::Extract(n) => {
                    let mut out = vec![0u8; n];
                    let expected_len = n.min(model.len());
                    let read = ring.extract(&mut out);
                    prop_assert_eq!(read, expected_len);
                    let expected: Vec<u8> = model.drain(..read).collect();
                    prop_assert_eq!(&out[..read], &expected[..]);
                }
                Op::Discard(n) => {
                    let skipped = ring.discard(n);
                    prop_assert_eq!(skipped, n.min(model.len()));
                    model.drain(..skipped);
                }
            }
            prop_assert_eq!(ring.len(), model.len());
            prop_assert!(ring.cursor() < capacity);
            if ring.is_empty() {
                prop_assert_eq!(ring.cursor(), 0);
            }
        }

        let mut rest = vec![0u8; capacity];
        let read = ring.extract(&mut rest);
        prop_assert_eq!(&rest[..read], &model.iter().copied().collect::<Vec<_>>()[..]);
    }

    #[test]
    fn prop_reserved_write_matches_later_read(
        capacity in 1usize..64,
        prefill in 0usize..64,
        consumed in 0usize..64,
        request in 0usize..96,
    ) {
        let mut ring = RingBuffer::with_capacity(capacity);
        let prefill = prefill.min(capacity);
        ring.append(&vec![0xAA; prefill]).ok();
        ring.discard(consumed);
        let before = ring.len();

        let Ok(write_spans) = ring.reserve_for_write(request) else {
            prop_assert!(ring.is_full());
            return Ok(());
        };
        let planned = write_spans.total_len();
        prop_assert_eq!(planned, request.min(capacity - before));

        let payload: Vec<u8> = (0..planned).map(|i| i as u8).collect();
        prop_assert_eq!(ring.append(&payload).expect("space was reserved"), planned);

        ring.discard(before);
        let read_spans = ring.reserve_for_read(planned);
        prop_assert_eq!(read_spans.total_len(), planned);
        let (head, wrapped) = ring.readable(planned);
        let mut seen = head.to_vec();
        seen.extend_from_slice(wrapped);
        prop_assert_eq!(seen, payload);
    }
}
