use crate::marker::HEADER_SIZE;

/// Headers of slack a free block must have beyond the request before it is
/// split: one for the new marker, one so the remainder is never empty.
/// Smaller values are raised to this.
pub const MIN_SPLIT_SLACK: usize = 2;

/// How free blocks in the middle of the heap are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
  /// First block in address order that fits.
  #[default]
  FirstFit,
  /// Fitting block with the smallest span; ties go to the lowest address.
  BestFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  pub search: SearchMode,
  pub split_slack: usize,
  /// Verify that released addresses belong to a live block.
  pub check_release: bool,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      search: SearchMode::FirstFit,
      split_slack: MIN_SPLIT_SLACK,
      check_release: true,
    }
  }
}

impl HeapConfig {
  pub fn with_search(
    mut self,
    search: SearchMode,
  ) -> Self {
    self.search = search;
    self
  }

  pub fn with_split_slack(
    mut self,
    split_slack: usize,
  ) -> Self {
    self.split_slack = split_slack;
    self
  }

  pub fn with_check_release(
    mut self,
    check_release: bool,
  ) -> Self {
    self.check_release = check_release;
    self
  }

  /// Whether a free block spanning `gap` bytes, header included, can be split
  /// to serve `requested` bytes.
  pub fn fits(
    &self,
    gap: usize,
    requested: usize,
  ) -> bool {
    self
      .split_slack
      .max(MIN_SPLIT_SLACK)
      .checked_mul(HEADER_SIZE)
      .and_then(|slack| slack.checked_add(requested))
      .is_some_and(|needed| gap > needed)
  }
}
