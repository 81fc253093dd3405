use std::{env, process::ExitCode};

use brkalloc::{ArenaBreak, Console, FreeList, ProgramBreak, StdConsole, Stream};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const SLOTS: usize = 1024;

/// Runs the buffer + pointer-array pattern against any break.
fn run<B: ProgramBreak>(heap: &mut FreeList<B, StdConsole>) -> ExitCode {
  heap.dump_layout();

  // --------------------------------------------------------------------
  // 1) Allocate a 512 byte buffer and copy the alphabet into it.
  // --------------------------------------------------------------------
  let Ok(buffer) = heap.allocate(512) else {
    heap.console_mut().line(Stream::Err, "allocation failed!");
    return ExitCode::FAILURE;
  };

  if let Some(bytes) = heap.payload_mut(buffer, ALPHABET.len()) {
    bytes.copy_from_slice(ALPHABET);
  }
  if let Some(bytes) = heap.payload(buffer, ALPHABET.len()) {
    let text = bytes.to_vec();
    heap.console_mut().write(Stream::Out, &text);
    heap.console_mut().write(Stream::Out, b"\n");
  }
  heap.dump_layout();

  // --------------------------------------------------------------------
  // 2) Allocate an array of pointers, then fill it with 1023 blocks of
  //    growing size. Each address is stored inside the array itself.
  // --------------------------------------------------------------------
  println!("----- lets allocates some pointers ---");
  let word = std::mem::size_of::<usize>();
  let Ok(ptrs) = heap.allocate(SLOTS * word) else {
    return ExitCode::FAILURE;
  };

  println!("----- start allocating {} pointers ---", SLOTS);
  for i in 1..SLOTS {
    let addr = heap.allocate(i).unwrap_or(0);

    if let Some(slot) = heap.payload_mut(ptrs, SLOTS * word) {
      slot[(i - 1) * word..i * word].copy_from_slice(&addr.to_ne_bytes());
    }
  }
  heap.dump_layout();

  // --------------------------------------------------------------------
  // 3) Free every block in allocation order. The free run keeps merging
  //    and is trimmed away once the last block goes.
  // --------------------------------------------------------------------
  for i in 1..SLOTS {
    let addr = heap
      .payload(ptrs, SLOTS * word)
      .and_then(|slot| slot[(i - 1) * word..i * word].try_into().ok())
      .map(usize::from_ne_bytes)
      .unwrap_or(0);

    let _ = heap.release(addr);
  }
  heap.dump_layout();

  // --------------------------------------------------------------------
  // 4) Free the array and the buffer: the heap disappears.
  // --------------------------------------------------------------------
  let _ = heap.release(ptrs);
  let _ = heap.release(buffer);
  heap.dump_layout();

  ExitCode::SUCCESS
}

/// glibc's `malloc` grows its main arena with `brk` too. Serving every
/// request from `mmap` leaves the break to us.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn keep_malloc_off_the_break() {
  unsafe {
    libc::mallopt(libc::M_MMAP_THRESHOLD, 0);
  }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn keep_malloc_off_the_break() {}

fn main() -> ExitCode {
  match env::args().nth(1).as_deref() {
    None | Some("arena") => {
      let mut heap = FreeList::new(ArenaBreak::with_capacity(1024 * 1024), StdConsole);
      run(&mut heap)
    }
    Some("sbrk") => {
      keep_malloc_off_the_break();

      let mut heap = unsafe { FreeList::from_process_break() };
      run(&mut heap)
    }
    Some(other) => {
      eprintln!("unknown backend {:?}, expected `arena` or `sbrk`", other);
      ExitCode::FAILURE
    }
  }
}
