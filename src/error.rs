use std::{error, fmt};

use crate::console::hex;

/// Errors reported by [`FreeList`](crate::FreeList).
///
/// None of them is fatal: the heap is left exactly as it was before the
/// failing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// `allocate(0)`.
  ZeroSizeRequest,

  /// The break could not be moved far enough to hold the request.
  BreakExtensionFailed { requested: usize, brk: usize },

  /// `release` was given the null address.
  NullRelease,

  /// `release` was given an address that is not the payload of any block.
  InvalidRelease { addr: usize },

  /// `release` was given the payload of a block that is already free.
  DoubleRelease { addr: usize },

  /// A marker could not be read back or breaks the chain rules.
  Corrupted { addr: usize, reason: &'static str },
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::ZeroSizeRequest => write!(f, "zero bytes requested, returning NULL"),
      AllocError::BreakExtensionFailed { requested, brk } => write!(
        f,
        "error: brk call failed! could not grow past {} for {} bytes",
        hex(*brk),
        requested
      ),
      AllocError::NullRelease => write!(f, "cannot free NULL ptr"),
      AllocError::InvalidRelease { addr } => {
        write!(f, "cannot free {}: not an allocated block", hex(*addr))
      }
      AllocError::DoubleRelease { addr } => write!(f, "cannot free {}: already free", hex(*addr)),
      AllocError::Corrupted { addr, reason } => {
        write!(f, "heap corrupted at {}: {}", hex(*addr), reason)
      }
    }
  }
}

impl error::Error for AllocError {}
