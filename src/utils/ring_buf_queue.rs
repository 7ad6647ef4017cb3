use ringbuf::{Consumer, Producer, RingBuffer};
use std::{borrow::Cow, collections::VecDeque};

/// Single-producer single-consumer byte queue. Writes that do not fit in the
/// ring are parked in an overflow queue on the producer side and retried on
/// the next push or flush, so nothing is dropped.
pub fn write_queue<const SIZE: usize>() -> (WriteQueueProducer, WriteQueueConsumer<SIZE>) {
    let (prod, cons) = RingBuffer::new(SIZE).split();
    (
        WriteQueueProducer {
            overflow: VecDeque::new(),
            prod,
        },
        WriteQueueConsumer {
            buffer: [0u8; SIZE],
            cons,
        },
    )
}

pub struct WriteQueueProducer {
    overflow: VecDeque<Box<[u8]>>,
    prod: Producer<u8>,
}

impl WriteQueueProducer {
    pub fn flush(&mut self) {
        while let Some(first) = self.overflow.pop_front() {
            let pushed = self.prod.push_slice(&first);
            if pushed < first.len() {
                self.overflow.push_front(first[pushed..].into());
                break;
            }
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.flush();
        if bytes.is_empty() {
            return;
        }
        if self.overflow.is_empty() {
            let pushed = self.prod.push_slice(bytes);
            if pushed < bytes.len() {
                self.overflow.push_back(bytes[pushed..].into());
            }
        } else {
            self.overflow.push_back(bytes.into());
        }
    }

    pub fn pending(&self) -> usize {
        self.prod.len() + self.overflow.iter().map(|b| b.len()).sum::<usize>()
    }
}

pub struct WriteQueueConsumer<const SIZE: usize> {
    buffer: [u8; SIZE],
    cons: Consumer<u8>,
}

impl<const SIZE: usize> WriteQueueConsumer<SIZE> {
    /// Returns whatever is in the ring right now, possibly nothing.
    pub fn pop(&mut self) -> Cow<'_, [u8]> {
        let count = self.cons.pop_slice(&mut self.buffer);
        Cow::Borrowed(&self.buffer[..count])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_writes_pass_straight_through() {
        let (mut prod, mut cons) = write_queue::<16>();
        prod.push(b"AT\r\n");
        assert_eq!(prod.pending(), 4);
        assert_eq!(&*cons.pop(), b"AT\r\n");
        assert!(cons.pop().is_empty());
    }

    #[test]
    fn overflow_is_kept_in_order() {
        let (mut prod, mut cons) = write_queue::<4>();
        prod.push(b"abcdef");
        prod.push(b"gh");

        let mut out = vec![];
        for _ in 0..8 {
            out.extend_from_slice(&cons.pop());
            prod.flush();
        }
        assert_eq!(out, b"abcdefgh");
        assert_eq!(prod.pending(), 0);
    }
}
