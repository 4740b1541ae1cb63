//! FIFO of fixed-size byte blocks backing each connection's pending output.
//!
//! Appends land in the tail block, reads drain the head block. Spent blocks
//! go back to a process-wide pool so steady-state traffic stops allocating.

use bytes::BytesMut;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Data capacity of one block.
pub const BLOCK_SIZE: usize = 1024;

/// Pool retention cap; beyond this, spent blocks are dropped.
const POOL_MAX: usize = 64;

static POOL: Lazy<Mutex<Vec<BytesMut>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn alloc_block() -> BytesMut {
    if let Some(mut b) = POOL.lock().pop() {
        b.clear();
        return b;
    }
    BytesMut::with_capacity(BLOCK_SIZE)
}

/// Return a spent block to the pool.
pub fn recycle(block: BytesMut) {
    let mut pool = POOL.lock();
    if pool.len() < POOL_MAX {
        pool.push(block);
    }
}

#[derive(Debug, Default)]
pub struct BlockBuf {
    blocks: VecDeque<BytesMut>,
}

impl BlockBuf {
    pub fn new() -> Self {
        Self { blocks: VecDeque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.is_empty())
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    fn tail_with_room(&mut self) -> &mut BytesMut {
        let needs_new = match self.blocks.back() {
            Some(b) => b.len() >= BLOCK_SIZE,
            None => true,
        };
        if needs_new {
            self.blocks.push_back(alloc_block());
        }
        self.blocks.back_mut().unwrap()
    }

    pub fn put(&mut self, byte: u8) {
        self.tail_with_room().extend_from_slice(&[byte]);
    }

    pub fn put2(&mut self, b1: u8, b2: u8) {
        self.put(b1);
        self.put(b2);
    }

    pub fn put3(&mut self, b1: u8, b2: u8, b3: u8) {
        self.put(b1);
        self.put(b2);
        self.put(b3);
    }

    pub fn extend(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let tail = self.tail_with_room();
            let room = BLOCK_SIZE - tail.len();
            let take = room.min(bytes.len());
            tail.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
    }

    /// Remove and return the head block, recycling exhausted ones.
    pub fn pop_block(&mut self) -> Option<BytesMut> {
        while let Some(b) = self.blocks.pop_front() {
            if b.is_empty() {
                recycle(b);
                continue;
            }
            return Some(b);
        }
        None
    }

    /// Return an unfinished block to the head after a partial write.
    pub fn unpop(&mut self, block: BytesMut) {
        if block.is_empty() {
            recycle(block);
        } else {
            self.blocks.push_front(block);
        }
    }

    /// Drop everything queued; used by telnet ABORT-OUTPUT.
    pub fn clear(&mut self) {
        while let Some(b) = self.blocks.pop_front() {
            recycle(b);
        }
    }

    /// Flatten the whole queue into one contiguous vector, consuming it.
    pub fn flatten(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(b) = self.blocks.pop_front() {
            out.extend_from_slice(&b);
            recycle(b);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_flatten() {
        let mut buf = BlockBuf::new();
        buf.extend(b"hello ");
        buf.put(b'w');
        buf.extend(b"orld");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.flatten(), b"hello world");
        assert!(buf.is_empty());
    }

    #[test]
    fn spans_blocks() {
        let mut buf = BlockBuf::new();
        let big = vec![0xAB_u8; BLOCK_SIZE * 2 + 17];
        buf.extend(&big);
        assert_eq!(buf.len(), big.len());
        assert_eq!(buf.flatten(), big);
    }

    #[test]
    fn pop_and_unpop_preserve_order() {
        let mut buf = BlockBuf::new();
        buf.extend(b"abcdef");
        let mut head = buf.pop_block().unwrap();
        let _ = head.split_to(2); // pretend two bytes were written
        buf.unpop(head);
        assert_eq!(buf.flatten(), b"cdef");
    }

    #[test]
    fn clear_empties() {
        let mut buf = BlockBuf::new();
        buf.extend(b"pending");
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }
}
