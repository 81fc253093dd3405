//! # brkalloc - A Free-List Allocator on the Program Break
//!
//! This crate implements `allocate` / `release` directly on top of a
//! monotonic "program break" (the `brk`/`sbrk` primitive), without delegating
//! to any other allocator.
//!
//! ## Overview
//!
//! The heap is a single contiguous region. Every block of user memory is
//! preceded by a fixed-size **marker** that links to the next marker and
//! records whether the block is occupied:
//!
//! ```text
//!   heap_start                                          heap_end (break)
//!   │                                                            │
//!   ▼                                                            ▼
//!   ┌─────┬─────────┬──────┬─────────────┬─────┬─────────────────┐
//!   │ occ │ payload │ free │   payload   │ occ │     payload     │
//!   └──┬──┴─────────┴▲──┬──┴─────────────┴▲────┴─────────────────┘
//!      │             │  │                 │      next = null
//!      └─────────────┘  └─────────────────┘
//! ```
//!
//! - **allocate**: first fit over the free blocks, splitting a block when it
//!   is large enough to leave a usable remainder; otherwise the break is
//!   pushed up and a new block is appended at the tail.
//! - **release**: the block is marked free, every run of adjacent free blocks
//!   is merged, and a free block left at the tail is returned to the
//!   operating system by pulling the break back down. Releasing the last
//!   remaining block tears the heap down completely.
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── align          - Alignment macros (align!, align_to!)
//!   ├── marker         - Block header codec
//!   ├── program_break  - ProgramBreak trait, SbrkBreak, ArenaBreak
//!   ├── console        - Output streams for dumps and error lines
//!   ├── config         - HeapConfig, SearchMode
//!   ├── error          - AllocError
//!   ├── freelist       - FreeList engine
//!   └── inspect        - Block iterator, stats, invariant checks
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{ArenaBreak, BufferConsole, FreeList};
//!
//! let mut heap = FreeList::new(ArenaBreak::with_capacity(4096), BufferConsole::new());
//!
//! let addr = heap.allocate(26).unwrap();
//! heap.payload_mut(addr, 26).unwrap().copy_from_slice(b"abcdefghijklmnopqrstuvwxyz");
//! assert_eq!(heap.payload(addr, 3), Some(&b"abc"[..]));
//!
//! heap.release(addr).unwrap();
//! assert!(heap.is_unset());
//! ```
//!
//! ## Memory Sources
//!
//! [`SbrkBreak`] moves the real process break with `brk(2)`:
//!
//! ```text
//!   High Address ┌─────────────────────┐
//!                │       Stack         │ ↓ grows down
//!                │                     │
//!                │         ▲           │
//!                │       Heap          │ ↑ grows up (brk)
//!                ├─────────────────────┤ ← Program Break
//!                │   Uninitialized     │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │   Initialized Data  │
//!                ├─────────────────────┤
//!                │       Text          │
//!   Low Address  └─────────────────────┘
//! ```
//!
//! [`ArenaBreak`] simulates the same primitive over an owned buffer, which
//! gives every heap its own isolated region and a hard capacity.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **Byte alignment only**: payloads are not aligned beyond one byte
//! - **No size classes, no in-place realloc**
//! - **Diagnostics, not hardening**: markers are bounds-checked on every
//!   access but there are no guard pages or randomized layouts
//!
//! ## Safety
//!
//! The engine itself is safe code: all memory goes through
//! [`ProgramBreak::bytes`]. Only constructing an [`SbrkBreak`] is unsafe, since
//! nothing else may move the process break while it is alive.

pub mod align;
mod config;
mod console;
mod error;
mod freelist;
mod inspect;
mod marker;
mod program_break;

pub use config::{HeapConfig, MIN_SPLIT_SLACK, SearchMode};
pub use console::{BufferConsole, Console, StdConsole, Stream, hex};
pub use error::AllocError;
pub use freelist::FreeList;
pub use inspect::{BlockInfo, Blocks, HeapStats};
pub use marker::HEADER_SIZE;
pub use program_break::{ArenaBreak, ProgramBreak, SbrkBreak};
