//! Bump allocation over a caller-provided buffer.
//!
//! All persistent solver state is carved out of a single caller-owned
//! `&mut [f64]` whose length was computed beforehand by the backend's
//! sizing functions. Carving happens once, at `assign_memory` time;
//! nothing is allocated from the arena during a solve.

use crate::error::{CoreError, CoreResult};

/// Bump allocator handing out disjoint sub-slices of one buffer.
///
/// The returned slices borrow the underlying buffer for `'a`, which
/// encodes the protocol's address-stability obligation: the buffer
/// cannot move or be reused while any carved handle is alive.
#[derive(Debug)]
pub struct Arena<'a> {
    buf: &'a mut [f64],
}

impl<'a> Arena<'a> {
    /// Wrap a caller-provided buffer.
    pub fn new(buf: &'a mut [f64]) -> Self {
        Self { buf }
    }

    /// Carve the next `len` words, zeroed.
    pub fn take(&mut self, len: usize) -> CoreResult<&'a mut [f64]> {
        if len > self.buf.len() {
            return Err(CoreError::ArenaExhausted {
                requested: len,
                remaining: self.buf.len(),
            });
        }
        let buf = std::mem::take(&mut self.buf);
        let (head, tail) = buf.split_at_mut(len);
        self.buf = tail;
        head.fill(0.0);
        Ok(head)
    }

    /// Words not yet carved.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_splits_disjoint() {
        let mut buf = vec![1.0; 10];
        let mut arena = Arena::new(&mut buf);
        let a = arena.take(4).unwrap();
        let b = arena.take(6).unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(b.len(), 6);
        assert_eq!(arena.remaining(), 0);
        // Carved slices come back zeroed.
        assert!(a.iter().all(|&v| v == 0.0));
        a[0] = 7.0;
        b[5] = 8.0;
        assert_eq!(buf[0], 7.0);
        assert_eq!(buf[9], 8.0);
    }

    #[test]
    fn test_take_exhausted() {
        let mut buf = vec![0.0; 3];
        let mut arena = Arena::new(&mut buf);
        arena.take(2).unwrap();
        let err = arena.take(2).unwrap_err();
        match err {
            CoreError::ArenaExhausted { requested, remaining } => {
                assert_eq!(requested, 2);
                assert_eq!(remaining, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_len_take() {
        let mut buf = vec![0.0; 0];
        let mut arena = Arena::new(&mut buf);
        let s = arena.take(0).unwrap();
        assert!(s.is_empty());
    }
}
