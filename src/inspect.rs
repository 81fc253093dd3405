//! Read-only views over the marker chain.

use crate::{
  console::Console,
  error::AllocError,
  freelist::FreeList,
  marker::HEADER_SIZE,
  program_break::ProgramBreak,
};

/// One block of the heap as seen by [`FreeList::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub marker: usize,
  pub payload: usize,
  pub size: usize,
  pub occupied: bool,
  pub last: bool,
}

impl BlockInfo {
  /// First address past the payload.
  pub fn end(&self) -> usize {
    self.payload + self.size
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  pub occupied_bytes: usize,
  pub free_bytes: usize,
  /// `heap_end - heap_start`, headers included.
  pub span: usize,
}

/// Iterator over the chain in address order.
///
/// Stops after yielding the first error.
pub struct Blocks<'a, B: ProgramBreak, C: Console> {
  heap: &'a FreeList<B, C>,
  next: Option<usize>,
}

impl<B: ProgramBreak, C: Console> Iterator for Blocks<'_, B, C> {
  type Item = Result<BlockInfo, AllocError>;

  fn next(&mut self) -> Option<Self::Item> {
    let addr = self.next.take()?;

    let marker = match self.heap.read_marker(addr) {
      Ok(marker) => marker,
      Err(err) => return Some(Err(err)),
    };

    let payload = addr + HEADER_SIZE;
    let end = if marker.is_last() {
      self.heap.heap_end().unwrap_or(payload)
    } else {
      self.next = Some(marker.next);
      marker.next
    };

    Some(Ok(BlockInfo {
      marker: addr,
      payload,
      size: end.saturating_sub(payload),
      occupied: marker.occupied,
      last: marker.is_last(),
    }))
  }
}

impl<B: ProgramBreak, C: Console> FreeList<B, C> {
  pub fn blocks(&self) -> Blocks<'_, B, C> {
    let next = match (self.heap_start(), self.heap_end()) {
      (Some(start), Some(end)) if start != end => Some(start),
      _ => None,
    };

    Blocks { heap: self, next }
  }

  pub fn stats(&self) -> Result<HeapStats, AllocError> {
    let mut stats = HeapStats {
      span: match (self.heap_start(), self.heap_end()) {
        (Some(start), Some(end)) => end - start,
        _ => 0,
      },
      ..HeapStats::default()
    };

    for block in self.blocks() {
      let block = block?;

      stats.blocks += 1;
      if block.occupied {
        stats.occupied_bytes += block.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
      }
    }

    Ok(stats)
  }

  /// Walks the whole chain and reports the first broken rule:
  ///
  /// - blocks are contiguous from `heap_start` and the last one ends at
  ///   `heap_end`;
  /// - no two adjacent blocks are free;
  /// - the last block is occupied (a free one would have been trimmed).
  pub fn check_invariants(&self) -> Result<(), AllocError> {
    let (Some(start), Some(end)) = (self.heap_start(), self.heap_end()) else {
      return Ok(());
    };

    let corrupted = |addr, reason| Err(AllocError::Corrupted { addr, reason });

    let mut expected = start;
    let mut prev: Option<BlockInfo> = None;

    for block in self.blocks() {
      let block = block?;

      if block.marker != expected {
        return corrupted(block.marker, "blocks are not contiguous");
      }
      if prev.is_some_and(|prev| !prev.occupied && !block.occupied) {
        return corrupted(block.marker, "adjacent free blocks");
      }
      if block.last {
        if block.end() != end {
          return corrupted(block.marker, "last block does not end at the break");
        }
        if !block.occupied {
          return corrupted(block.marker, "trailing free block");
        }
      }

      expected = block.end();
      prev = Some(block);
    }

    if prev.is_none() && start != end {
      return corrupted(start, "empty chain on a non-empty heap");
    }

    Ok(())
  }
}
