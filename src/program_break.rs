//! Sources of contiguous, break-style memory.
//!
//! The engine never touches memory directly: every marker read and payload
//! access goes through [`ProgramBreak::bytes`] / [`ProgramBreak::bytes_mut`],
//! which refuse any range that is not below the current break.

use std::slice;

use libc::{brk, c_void, sbrk};
use log::trace;

/// A monotonic "program break": a single region `[origin, break)` that can be
/// moved up or down.
pub trait ProgramBreak {
  /// With `None`, returns the current break without side effects. With
  /// `Some(target)`, tries to move the break to exactly `target` and returns
  /// the resulting break, which is the previous one if the move was rejected.
  fn query_or_extend(
    &mut self,
    target: Option<usize>,
  ) -> usize;

  /// `len` bytes starting at `addr`, or `None` if any of them lies outside
  /// `[origin, break)`.
  fn bytes(
    &self,
    addr: usize,
    len: usize,
  ) -> Option<&[u8]>;

  fn bytes_mut(
    &mut self,
    addr: usize,
    len: usize,
  ) -> Option<&mut [u8]>;
}

fn contains(
  origin: usize,
  current: usize,
  addr: usize,
  len: usize,
) -> bool {
  addr >= origin && addr.checked_add(len).is_some_and(|end| end <= current)
}

/// The process break, moved with `brk(2)`.
///
/// The break observed at construction is the origin: targets below it are
/// rejected so memory that existed before the allocator is never handed out.
pub struct SbrkBreak {
  origin: usize,
  current: usize,
}

impl SbrkBreak {
  /// # Safety
  ///
  /// Nothing else in the process may move the break while this value is
  /// alive. In particular the system `malloc` must not be using `brk`.
  pub unsafe fn new() -> Self {
    let current = unsafe { sbrk(0) } as usize;

    Self {
      origin: current,
      current,
    }
  }

  pub fn origin(&self) -> usize {
    self.origin
  }
}

impl ProgramBreak for SbrkBreak {
  fn query_or_extend(
    &mut self,
    target: Option<usize>,
  ) -> usize {
    unsafe {
      if let Some(target) = target {
        if target >= self.origin && brk(target as *mut c_void) != 0 {
          trace!("brk({:#x}) rejected", target);
        }
      }

      self.current = sbrk(0) as usize;
    }

    self.current
  }

  fn bytes(
    &self,
    addr: usize,
    len: usize,
  ) -> Option<&[u8]> {
    if !contains(self.origin, self.current, addr, len) {
      return None;
    }

    Some(unsafe { slice::from_raw_parts(addr as *const u8, len) })
  }

  fn bytes_mut(
    &mut self,
    addr: usize,
    len: usize,
  ) -> Option<&mut [u8]> {
    if !contains(self.origin, self.current, addr, len) {
      return None;
    }

    Some(unsafe { slice::from_raw_parts_mut(addr as *mut u8, len) })
  }
}

/// A simulated break over an owned, fixed-capacity buffer.
///
/// ```text
///   base                    base + brk          base + capacity
///   ├───────────────────────────┼───────────────────────┤
///   │  addressable (the heap)   │  beyond the break     │
///   └───────────────────────────┴───────────────────────┘
/// ```
///
/// Addresses are the real addresses of the buffer bytes, so payloads can also
/// be used through raw pointers. Moves past the capacity are rejected the same
/// way the kernel rejects `brk`: the old break is returned.
pub struct ArenaBreak {
  buffer: Box<[u8]>,
  brk: usize,
}

impl ArenaBreak {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      buffer: vec![0u8; capacity].into_boxed_slice(),
      brk: 0,
    }
  }

  pub fn base(&self) -> usize {
    self.buffer.as_ptr() as usize
  }

  pub fn capacity(&self) -> usize {
    self.buffer.len()
  }

  /// Bytes currently below the break.
  pub fn in_use(&self) -> usize {
    self.brk
  }
}

impl ProgramBreak for ArenaBreak {
  fn query_or_extend(
    &mut self,
    target: Option<usize>,
  ) -> usize {
    let base = self.base();

    let Some(target) = target else {
      return base + self.brk;
    };

    let Some(offset) = target.checked_sub(base).filter(|o| *o <= self.capacity()) else {
      trace!("arena break move to {:#x} rejected", target);
      return base + self.brk;
    };

    // Released memory comes back zeroed, as fresh pages would.
    if offset < self.brk {
      self.buffer[offset..self.brk].fill(0);
    }

    self.brk = offset;
    target
  }

  fn bytes(
    &self,
    addr: usize,
    len: usize,
  ) -> Option<&[u8]> {
    let base = self.base();

    if !contains(base, base + self.brk, addr, len) {
      return None;
    }

    let offset = addr - base;
    Some(&self.buffer[offset..offset + len])
  }

  fn bytes_mut(
    &mut self,
    addr: usize,
    len: usize,
  ) -> Option<&mut [u8]> {
    let base = self.base();

    if !contains(base, base + self.brk, addr, len) {
      return None;
    }

    let offset = addr - base;
    Some(&mut self.buffer[offset..offset + len])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_query_has_no_side_effect() {
    let mut arena = ArenaBreak::with_capacity(64);
    let base = arena.base();

    assert_eq!(arena.query_or_extend(None), base);
    assert_eq!(arena.query_or_extend(None), base);
    assert_eq!(arena.in_use(), 0);
  }

  #[test]
  fn test_arena_moves_within_capacity() {
    let mut arena = ArenaBreak::with_capacity(64);
    let base = arena.base();

    assert_eq!(arena.query_or_extend(Some(base + 40)), base + 40);
    assert_eq!(arena.query_or_extend(Some(base + 64)), base + 64);
    assert_eq!(arena.query_or_extend(Some(base + 8)), base + 8);
    assert_eq!(arena.in_use(), 8);
  }

  #[test]
  fn test_arena_rejects_out_of_range_moves() {
    let mut arena = ArenaBreak::with_capacity(64);
    let base = arena.base();

    arena.query_or_extend(Some(base + 16));

    assert_eq!(arena.query_or_extend(Some(base + 65)), base + 16);
    assert_eq!(arena.query_or_extend(Some(base.wrapping_sub(1))), base + 16);
    assert_eq!(arena.in_use(), 16);
  }

  #[test]
  fn test_arena_bytes_are_bounded_by_break() {
    let mut arena = ArenaBreak::with_capacity(64);
    let base = arena.base();

    assert!(arena.bytes(base, 1).is_none());

    arena.query_or_extend(Some(base + 16));

    assert!(arena.bytes(base, 16).is_some());
    assert!(arena.bytes(base + 8, 9).is_none());
    assert!(arena.bytes(base.wrapping_sub(1), 2).is_none());
    assert!(arena.bytes(usize::MAX, 2).is_none());
  }

  #[test]
  fn test_arena_shrink_zeroes_released_bytes() {
    let mut arena = ArenaBreak::with_capacity(32);
    let base = arena.base();

    arena.query_or_extend(Some(base + 32));
    arena.bytes_mut(base, 32).unwrap().fill(0xAB);

    arena.query_or_extend(Some(base + 8));
    arena.query_or_extend(Some(base + 32));

    let bytes = arena.bytes(base, 32).unwrap();
    assert!(bytes[..8].iter().all(|b| *b == 0xAB));
    assert!(bytes[8..].iter().all(|b| *b == 0));
  }

  #[test]
  fn test_sbrk_query_is_stable() {
    let mut brk = unsafe { SbrkBreak::new() };

    let origin = brk.origin();
    assert_ne!(origin, 0);
    assert!(brk.bytes(origin, 1).is_none());
    assert!(brk.query_or_extend(Some(origin - 1)) >= origin);
  }
}
