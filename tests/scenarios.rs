use brkalloc::{
  AllocError, ArenaBreak, BufferConsole, FreeList, HEADER_SIZE, HeapConfig, SearchMode,
};

const MIB: usize = 1024 * 1024;

fn heap() -> FreeList<ArenaBreak, BufferConsole> {
  FreeList::new(ArenaBreak::with_capacity(MIB), BufferConsole::new())
}

fn fill(
  heap: &mut FreeList<ArenaBreak, BufferConsole>,
  addr: usize,
  size: usize,
  seed: u8,
) {
  let bytes = heap.payload_mut(addr, size).unwrap();
  for (i, byte) in bytes.iter_mut().enumerate() {
    *byte = seed.wrapping_add(i as u8);
  }
}

fn verify(
  heap: &FreeList<ArenaBreak, BufferConsole>,
  addr: usize,
  size: usize,
  seed: u8,
) {
  let bytes = heap.payload(addr, size).unwrap();
  for (i, byte) in bytes.iter().enumerate() {
    assert_eq!(*byte, seed.wrapping_add(i as u8), "byte {} of {:#x}", i, addr);
  }
}

#[test]
fn grow_then_shrink() {
  let mut heap = heap();

  let buffer = heap.allocate(512).unwrap();
  let ptrs = heap.allocate(8 * 1024).unwrap();
  heap.check_invariants().unwrap();

  heap.release(buffer).unwrap();
  heap.check_invariants().unwrap();
  assert!(!heap.is_unset());

  heap.release(ptrs).unwrap();
  assert!(heap.is_unset());
  assert_eq!(heap.program_break().in_use(), 0);
}

#[test]
fn full_teardown_resets_to_first_call() {
  let mut heap = heap();
  let base = heap.program_break().base();

  let first = heap.allocate(40).unwrap();
  heap.release(first).unwrap();
  assert!(heap.is_unset());
  assert_eq!(heap.heap_start(), None);
  assert_eq!(heap.heap_end(), None);

  let again = heap.allocate(40).unwrap();
  assert_eq!(again, first);
  assert_eq!(again, base + HEADER_SIZE);
  assert_eq!(heap.heap_end(), Some(base + HEADER_SIZE + 40));
}

#[test]
fn zero_size_leaves_state_unchanged() {
  let mut heap = heap();

  assert_eq!(heap.allocate(0), Err(AllocError::ZeroSizeRequest));
  assert!(heap.is_unset());

  let addr = heap.allocate(16).unwrap();
  let stats = heap.stats().unwrap();

  assert_eq!(heap.allocate(0), Err(AllocError::ZeroSizeRequest));
  assert_eq!(heap.stats().unwrap(), stats);
  assert!(heap.payload(addr, 16).is_some());
}

#[test]
fn many_small_then_free_in_order() {
  const N: usize = 300;
  let mut heap = heap();

  let addrs: Vec<_> = (1..=N).map(|size| heap.allocate(size).unwrap()).collect();
  heap.check_invariants().unwrap();

  for (i, addr) in addrs.iter().enumerate() {
    heap.release(*addr).unwrap();
    heap.check_invariants().unwrap();

    if i + 1 < N {
      assert_eq!(heap.stats().unwrap().free_blocks, 1);
    }
  }

  assert!(heap.is_unset());
  assert_eq!(heap.program_break().in_use(), 0);
}

#[test]
fn many_small_then_free_in_reverse() {
  const N: usize = 300;
  let mut heap = heap();

  let addrs: Vec<_> = (1..=N).map(|size| heap.allocate(size).unwrap()).collect();

  for addr in addrs.iter().rev() {
    heap.release(*addr).unwrap();
    heap.check_invariants().unwrap();
    assert_eq!(heap.stats().unwrap().free_blocks, 0);
  }

  assert!(heap.is_unset());
}

#[test]
fn reuse_over_growth() {
  let mut heap = heap();

  let freed = heap.allocate(1000).unwrap();
  let guard = heap.allocate(10).unwrap();
  heap.release(freed).unwrap();

  let end = heap.heap_end();
  let reused = heap.allocate(500).unwrap();

  assert!(reused >= freed && reused < freed + 1000);
  assert_eq!(heap.heap_end(), end);
  assert!(reused < guard);
}

#[test]
fn live_allocations_never_overlap() {
  let mut heap = FreeList::new(ArenaBreak::with_capacity(4 * MIB), BufferConsole::new());
  let mut live: Vec<(usize, usize, u8)> = Vec::new();
  let mut state: u32 = 0x2545_f491;

  for step in 0..2000u32 {
    state ^= state << 13;
    state ^= state >> 17;
    state ^= state << 5;

    if live.is_empty() || state % 3 != 0 {
      let size = 1 + (state as usize % 700);
      let seed = step as u8;
      let addr = heap.allocate(size).unwrap();

      fill(&mut heap, addr, size, seed);
      live.push((addr, size, seed));
    } else {
      let (addr, _, _) = live.swap_remove(state as usize % live.len());
      heap.release(addr).unwrap();
    }

    heap.check_invariants().unwrap();
  }

  for (addr, size, seed) in &live {
    verify(&heap, *addr, *size, *seed);
  }

  for (addr, _, _) in live.drain(..) {
    heap.release(addr).unwrap();
    heap.check_invariants().unwrap();
  }

  assert!(heap.is_unset());
}

#[test]
fn best_fit_keeps_invariants() {
  let config = HeapConfig::default().with_search(SearchMode::BestFit);
  let mut heap =
    FreeList::with_config(ArenaBreak::with_capacity(MIB), BufferConsole::new(), config);

  let addrs: Vec<_> = (1..=64).map(|i| heap.allocate(i * 7).unwrap()).collect();

  for addr in addrs.iter().step_by(2) {
    heap.release(*addr).unwrap();
  }
  for size in (1..=32).rev() {
    heap.allocate(size * 3).unwrap();
    heap.check_invariants().unwrap();
  }
}

#[test]
fn out_of_memory_is_recoverable() {
  let mut heap = FreeList::new(ArenaBreak::with_capacity(256), BufferConsole::new());

  let a = heap.allocate(100).unwrap();
  assert!(matches!(
    heap.allocate(200),
    Err(AllocError::BreakExtensionFailed { requested: 200, .. })
  ));
  heap.check_invariants().unwrap();

  let b = heap.allocate(100).unwrap();
  heap.release(a).unwrap();
  heap.release(b).unwrap();

  assert!(heap.is_unset());
  assert!(heap.console().err().contains("brk call failed"));
}

#[test]
fn dump_of_demonstration_pattern() {
  let mut heap = heap();

  heap.dump_layout();

  let buffer = heap.allocate(512).unwrap();
  heap.payload_mut(buffer, 26).unwrap().copy_from_slice(b"abcdefghijklmnopqrstuvwxyz");
  let ptrs = heap.allocate(1024 * 8).unwrap();

  let small: Vec<_> = (1..64).map(|size| heap.allocate(size).unwrap()).collect();
  for addr in small {
    heap.release(addr).unwrap();
  }
  heap.dump_layout();

  heap.release(ptrs).unwrap();
  heap.release(buffer).unwrap();
  heap.dump_layout();

  let out = heap.console().out();
  assert_eq!(out.matches("the heap is zero sized").count(), 2);
  assert_eq!(out.matches("(last)").count(), 1);
  assert!(heap.console().err().is_empty());
}
