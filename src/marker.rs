use std::mem;

use crate::align;

/// Size in bytes of the header that precedes every block.
///
/// The header stores the address of the next marker followed by an occupancy
/// byte, padded to the machine word.
pub const HEADER_SIZE: usize = align!(mem::size_of::<usize>() + mem::size_of::<u8>());

/// Value stored in `next` for the last marker of the chain.
pub const NULL: usize = 0;

const OCCUPIED_AT: usize = mem::size_of::<usize>();

/// In-memory header of a block.
///
/// Markers live inside the managed heap itself; this struct is the decoded
/// copy the engine works with. Use [`Marker::decode`] and [`Marker::encode`]
/// to move between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
  pub next: usize,
  pub occupied: bool,
}

impl Marker {
  pub fn new(
    next: usize,
    occupied: bool,
  ) -> Self {
    Self { next, occupied }
  }

  pub fn is_last(&self) -> bool {
    self.next == NULL
  }

  /// Decodes a marker from exactly [`HEADER_SIZE`] bytes.
  ///
  /// Returns `None` if the occupancy byte is neither 0 nor 1, which can only
  /// happen if the header was overwritten.
  pub fn decode(bytes: &[u8]) -> Option<Self> {
    if bytes.len() != HEADER_SIZE {
      return None;
    }

    let mut next = [0u8; mem::size_of::<usize>()];
    next.copy_from_slice(&bytes[..OCCUPIED_AT]);

    let occupied = match bytes[OCCUPIED_AT] {
      0 => false,
      1 => true,
      _ => return None,
    };

    Some(Self::new(usize::from_ne_bytes(next), occupied))
  }

  pub fn encode(
    &self,
    bytes: &mut [u8],
  ) {
    debug_assert_eq!(bytes.len(), HEADER_SIZE);

    bytes[..OCCUPIED_AT].copy_from_slice(&self.next.to_ne_bytes());
    bytes[OCCUPIED_AT] = self.occupied as u8;
    bytes[OCCUPIED_AT + 1..].fill(0);
  }
}
