use log::{debug, trace, warn};

use crate::{
  config::{HeapConfig, SearchMode},
  console::{Console, StdConsole, Stream, hex},
  error::AllocError,
  inspect::BlockInfo,
  marker::{HEADER_SIZE, Marker, NULL},
  program_break::{ProgramBreak, SbrkBreak},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
  start: usize,
  end: usize,
}

enum Search {
  Fit { addr: usize, marker: Marker },
  Tail { addr: usize, marker: Marker },
}

/// A heap threaded into alternating occupied / free blocks on top of a
/// [`ProgramBreak`].
///
/// The heap is created lazily by the first [`allocate`](Self::allocate),
/// grows only at its tail and is handed back to the break as soon as its
/// trailing block becomes free.
pub struct FreeList<B: ProgramBreak, C: Console = StdConsole> {
  brk: B,
  console: C,
  config: HeapConfig,
  bounds: Option<Bounds>,
}

impl FreeList<SbrkBreak, StdConsole> {
  /// A heap on the real process break, reporting to stdout / stderr.
  ///
  /// # Safety
  ///
  /// Same contract as [`SbrkBreak::new`].
  pub unsafe fn from_process_break() -> Self {
    Self::new(unsafe { SbrkBreak::new() }, StdConsole)
  }
}

impl<B: ProgramBreak, C: Console> FreeList<B, C> {
  pub fn new(
    brk: B,
    console: C,
  ) -> Self {
    Self::with_config(brk, console, HeapConfig::default())
  }

  pub fn with_config(
    brk: B,
    console: C,
    config: HeapConfig,
  ) -> Self {
    Self {
      brk,
      console,
      config,
      bounds: None,
    }
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn console(&self) -> &C {
    &self.console
  }

  pub fn console_mut(&mut self) -> &mut C {
    &mut self.console
  }

  pub fn program_break(&self) -> &B {
    &self.brk
  }

  #[cfg(test)]
  pub(crate) fn program_break_mut(&mut self) -> &mut B {
    &mut self.brk
  }

  /// Address of the first marker, `None` while no heap exists.
  pub fn heap_start(&self) -> Option<usize> {
    self.bounds.map(|bounds| bounds.start)
  }

  /// Current top of the heap, equal to the break, `None` while no heap exists.
  pub fn heap_end(&self) -> Option<usize> {
    self.bounds.map(|bounds| bounds.end)
  }

  pub fn is_unset(&self) -> bool {
    self.bounds.is_none()
  }

  /// Reserves `requested` bytes and returns the address of the first one.
  ///
  /// ```text
  ///   Split of a free block (first fit):
  ///
  ///   before  ┌────┬──────────────────────────────┬────┐
  ///           │free│                              │next│
  ///           └────┴──────────────────────────────┴────┘
  ///   after   ┌────┬───────────┬────┬─────────────┬────┐
  ///           │occ │ requested │free│  remainder  │next│
  ///           └────┴───────────┴────┴─────────────┴────┘
  ///                ▲
  ///                └── returned address
  /// ```
  ///
  /// A free block is only split when its span exceeds the request by more
  /// than [`HeapConfig::split_slack`] headers. Otherwise the heap grows at the
  /// tail. Errors are also written to [`Stream::Err`].
  pub fn allocate(
    &mut self,
    requested: usize,
  ) -> Result<usize, AllocError> {
    self.try_allocate(requested).map_err(|err| self.report(err))
  }

  /// Gives the block at `addr` back to the heap, merging free neighbours and
  /// retracting the break if the heap ends with a free block.
  ///
  /// With [`HeapConfig::check_release`] on, addresses that are not the payload
  /// of a live block are refused. With it off only the bounds are checked and
  /// releasing a foreign or already freed address is the caller's fault.
  pub fn release(
    &mut self,
    addr: usize,
  ) -> Result<(), AllocError> {
    self.try_release(addr).map_err(|err| self.report(err))
  }

  /// Writes the marker chain to [`Stream::Out`].
  pub fn dump_layout(&mut self) {
    match self.layout_lines() {
      Ok(lines) => {
        for line in lines {
          self.console.line(Stream::Out, &line);
        }
      }
      Err(err) => {
        self.report(err);
      }
    }
  }

  /// The first `len` bytes of the live allocation at `addr`.
  pub fn payload(
    &self,
    addr: usize,
    len: usize,
  ) -> Option<&[u8]> {
    let block = self.live_block(addr)?;

    if len > block.size {
      return None;
    }

    self.brk.bytes(addr, len)
  }

  pub fn payload_mut(
    &mut self,
    addr: usize,
    len: usize,
  ) -> Option<&mut [u8]> {
    let block = self.live_block(addr)?;

    if len > block.size {
      return None;
    }

    self.brk.bytes_mut(addr, len)
  }

  fn live_block(
    &self,
    addr: usize,
  ) -> Option<BlockInfo> {
    self
      .blocks()
      .map_while(Result::ok)
      .find(|block| block.payload == addr && block.occupied)
  }

  fn try_allocate(
    &mut self,
    requested: usize,
  ) -> Result<usize, AllocError> {
    if requested == 0 {
      return Err(AllocError::ZeroSizeRequest);
    }

    let bounds = match self.bounds {
      Some(bounds) => bounds,
      None => {
        let brk = self.brk.query_or_extend(None);
        Bounds {
          start: brk,
          end: brk,
        }
      }
    };

    if bounds.start == bounds.end {
      return self.allocate_first(bounds.start, requested);
    }

    match self.search(requested)? {
      Search::Fit { addr, marker } => self.split(addr, marker, requested),
      Search::Tail { addr, marker } if !marker.occupied => {
        let target = span(addr, requested).ok_or(AllocError::BreakExtensionFailed {
          requested,
          brk: bounds.end,
        })?;

        if target > bounds.end {
          self.move_break(bounds.end, target, requested)?;
          self.set_end(target);
        } else {
          // The block already holds the request: a refused shrink only
          // leaves it larger than asked for.
          let brk = self.brk.query_or_extend(Some(target));
          let end = if brk >= target {
            brk
          } else {
            self.brk.query_or_extend(Some(bounds.end))
          };

          if end != target {
            trace!("trailing block kept up to {}", hex(end));
          }
          self.set_end(end);
        }
        self.write_marker(addr, Marker::new(NULL, true))?;

        debug!("reused trailing block {} for {} bytes", hex(addr), requested);
        Ok(addr + HEADER_SIZE)
      }
      Search::Tail { addr, marker } => {
        let new_marker = bounds.end;
        let target = span(new_marker, requested).ok_or(AllocError::BreakExtensionFailed {
          requested,
          brk: bounds.end,
        })?;

        self.move_break(bounds.end, target, requested)?;
        self.set_end(target);
        self.write_marker(new_marker, Marker::new(NULL, true))?;
        self.write_marker(addr, Marker::new(new_marker, marker.occupied))?;

        debug!("grew heap to {} for {} bytes", hex(target), requested);
        Ok(new_marker + HEADER_SIZE)
      }
    }
  }

  fn allocate_first(
    &mut self,
    start: usize,
    requested: usize,
  ) -> Result<usize, AllocError> {
    let target = span(start, requested).ok_or(AllocError::BreakExtensionFailed {
      requested,
      brk: start,
    })?;

    self.move_break(start, target, requested)?;
    self.bounds = Some(Bounds { start, end: target });
    self.write_marker(start, Marker::new(NULL, true))?;

    debug!("created heap at {} with a {} byte block", hex(start), requested);
    Ok(start + HEADER_SIZE)
  }

  fn search(
    &self,
    requested: usize,
  ) -> Result<Search, AllocError> {
    let mut addr = self.heap_start().ok_or(AllocError::Corrupted {
      addr: NULL,
      reason: "heap is unset",
    })?;
    let mut best: Option<(usize, Marker, usize)> = None;

    let last = loop {
      let marker = self.read_marker(addr)?;
      trace!(
        "visit {} {}",
        hex(addr),
        if marker.occupied { "occupied" } else { "free" }
      );

      if marker.is_last() {
        break marker;
      }

      let gap = marker.next - addr;
      if !marker.occupied && self.config.fits(gap, requested) {
        match self.config.search {
          SearchMode::FirstFit => return Ok(Search::Fit { addr, marker }),
          SearchMode::BestFit => {
            if best.is_none_or(|(_, _, smallest)| gap < smallest) {
              best = Some((addr, marker, gap));
            }
          }
        }
      }

      addr = marker.next;
    };

    Ok(match best {
      Some((addr, marker, _)) => Search::Fit { addr, marker },
      None => Search::Tail { addr, marker: last },
    })
  }

  fn split(
    &mut self,
    addr: usize,
    marker: Marker,
    requested: usize,
  ) -> Result<usize, AllocError> {
    let remainder = addr + HEADER_SIZE + requested;

    self.write_marker(remainder, Marker::new(marker.next, false))?;
    self.write_marker(addr, Marker::new(remainder, true))?;

    debug!(
      "split {} for {} bytes, remainder at {}",
      hex(addr),
      requested,
      hex(remainder)
    );
    Ok(addr + HEADER_SIZE)
  }

  fn try_release(
    &mut self,
    addr: usize,
  ) -> Result<(), AllocError> {
    if addr == NULL {
      return Err(AllocError::NullRelease);
    }

    let invalid = AllocError::InvalidRelease { addr };
    let bounds = self.bounds.ok_or(invalid)?;
    let marker_addr = addr
      .checked_sub(HEADER_SIZE)
      .filter(|marker| *marker >= bounds.start && *marker < bounds.end)
      .ok_or(invalid)?;

    let marker = if self.config.check_release {
      self.find_live(marker_addr, addr)?
    } else {
      self.read_marker(marker_addr).map_err(|_| invalid)?
    };

    self.write_marker(marker_addr, Marker::new(marker.next, false))?;
    debug!("released block {}", hex(marker_addr));

    let (prev, last, marker) = self.coalesce()?;
    self.trim(prev, last, marker)
  }

  fn find_live(
    &self,
    marker_addr: usize,
    addr: usize,
  ) -> Result<Marker, AllocError> {
    let mut current = self.heap_start().ok_or(AllocError::InvalidRelease { addr })?;

    while current <= marker_addr {
      let marker = self.read_marker(current)?;

      if current == marker_addr {
        if !marker.occupied {
          return Err(AllocError::DoubleRelease { addr });
        }
        return Ok(marker);
      }

      if marker.is_last() {
        break;
      }
      current = marker.next;
    }

    Err(AllocError::InvalidRelease { addr })
  }

  /// Merges every run of adjacent free blocks in the chain. Returns the last
  /// marker and its predecessor.
  fn coalesce(&mut self) -> Result<(Option<usize>, usize, Marker), AllocError> {
    let mut prev = None;
    let mut addr = self.heap_start().ok_or(AllocError::Corrupted {
      addr: NULL,
      reason: "heap is unset",
    })?;
    let mut merged = 0;

    loop {
      let marker = self.read_marker(addr)?;

      if marker.is_last() {
        if merged > 0 {
          debug!("coalesced {} free blocks", merged);
        }
        return Ok((prev, addr, marker));
      }

      let next = self.read_marker(marker.next)?;

      if !marker.occupied && !next.occupied {
        trace!("merge {} into {}", hex(marker.next), hex(addr));
        // Stay on `addr`: the block after the absorbed one may be free too.
        self.write_marker(addr, Marker::new(next.next, false))?;
        merged += 1;
      } else {
        prev = Some(addr);
        addr = marker.next;
      }
    }
  }

  fn trim(
    &mut self,
    prev: Option<usize>,
    last: usize,
    marker: Marker,
  ) -> Result<(), AllocError> {
    if marker.occupied {
      return Ok(());
    }

    // Read before the break moves: afterwards `prev.next` points past it.
    let prev = match prev {
      Some(addr) => Some((addr, self.read_marker(addr)?)),
      None => None,
    };

    let brk = self.brk.query_or_extend(Some(last));
    if brk != last {
      warn!("could not retract the break to {}", hex(last));
      return Ok(());
    }

    match prev {
      None => {
        self.bounds = None;
        debug!("heap released completely");
      }
      Some((addr, prev_marker)) => {
        self.set_end(last);
        self.write_marker(addr, Marker::new(NULL, prev_marker.occupied))?;
        debug!("trimmed heap to {}", hex(last));
      }
    }

    Ok(())
  }

  fn move_break(
    &mut self,
    from: usize,
    target: usize,
    requested: usize,
  ) -> Result<(), AllocError> {
    let brk = self.brk.query_or_extend(Some(target));

    if brk == target {
      return Ok(());
    }

    if brk != from {
      self.brk.query_or_extend(Some(from));
    }

    Err(AllocError::BreakExtensionFailed {
      requested,
      brk: from,
    })
  }

  fn set_end(
    &mut self,
    end: usize,
  ) {
    if let Some(bounds) = self.bounds.as_mut() {
      bounds.end = end;
    }
  }

  /// Reads the marker at `addr`, checking that it and the marker it links
  /// to both lie inside the heap.
  pub(crate) fn read_marker(
    &self,
    addr: usize,
  ) -> Result<Marker, AllocError> {
    let corrupted = |reason| AllocError::Corrupted { addr, reason };

    let bounds = self.bounds.ok_or(corrupted("heap is unset"))?;
    if addr < bounds.start || addr.checked_add(HEADER_SIZE).is_none_or(|end| end > bounds.end) {
      return Err(corrupted("marker outside the heap"));
    }

    let bytes = self
      .brk
      .bytes(addr, HEADER_SIZE)
      .ok_or(corrupted("marker above the break"))?;
    let marker = Marker::decode(bytes).ok_or(corrupted("unreadable marker"))?;

    if !marker.is_last() {
      if marker.next < addr + HEADER_SIZE {
        return Err(corrupted("next marker overlaps this one"));
      }
      if marker.next.checked_add(HEADER_SIZE).is_none_or(|end| end > bounds.end) {
        return Err(corrupted("next marker outside the heap"));
      }
    }

    Ok(marker)
  }

  fn write_marker(
    &mut self,
    addr: usize,
    marker: Marker,
  ) -> Result<(), AllocError> {
    let bytes = self
      .brk
      .bytes_mut(addr, HEADER_SIZE)
      .ok_or(AllocError::Corrupted {
        addr,
        reason: "marker above the break",
      })?;

    marker.encode(bytes);
    Ok(())
  }

  fn layout_lines(&self) -> Result<Vec<String>, AllocError> {
    let Some(bounds) = self.bounds.filter(|bounds| bounds.start != bounds.end) else {
      return Ok(vec!["the heap is zero sized".to_string()]);
    };

    let mut lines = vec![format!("the start of the heap: {}", hex(bounds.start))];

    for block in self.blocks() {
      let block = block?;
      lines.push(format!(
        "marker: {} {}{}",
        hex(block.marker),
        if block.occupied { "occupied" } else { "FREE" },
        if block.last { " (last)" } else { "" }
      ));
    }

    lines.push(format!("the end of the heap: {}", hex(bounds.end)));
    Ok(lines)
  }

  fn report(
    &mut self,
    err: AllocError,
  ) -> AllocError {
    warn!("{}", err);
    self.console.line(Stream::Err, &err.to_string());
    err
  }
}

/// End of a block whose marker sits at `addr` and holds `requested` bytes.
fn span(
  addr: usize,
  requested: usize,
) -> Option<usize> {
  addr.checked_add(HEADER_SIZE)?.checked_add(requested)
}
