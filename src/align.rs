/// Rounds `value` up to the machine word size.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use brkalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(9), 16), // 64 bit machine.
///     4 => assert_eq!(align!(5), 8),  // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to a multiple of `align`, which must be a power of two.
///
/// ```rust
/// use brkalloc::align_to;
///
/// assert_eq!(align_to!(1, 16), 16);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// assert_eq!(align_to!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

#[cfg(test)]
mod tests {
  use std::mem;

  #[test]
  fn test_align() {
    let word = mem::size_of::<usize>();

    for i in 0..10 {
      for size in (word * i + 1)..=(word * (i + 1)) {
        assert_eq!(word * (i + 1), align!(size));
      }
    }
  }

  #[test]
  fn test_align_to_power_of_two() {
    assert_eq!(align_to!(0, 8), 0);
    assert_eq!(align_to!(3, 4), 4);
    assert_eq!(align_to!(17, 16), 32);
    assert_eq!(align_to!(64, 64), 64);
  }
}
