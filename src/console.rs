//! Byte-stream output used for heap dumps and error lines.

use std::io::{self, Write};

/// Output channel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
  Out,
  Err,
}

pub trait Console {
  fn write(
    &mut self,
    stream: Stream,
    bytes: &[u8],
  );

  fn line(
    &mut self,
    stream: Stream,
    text: &str,
  ) {
    self.write(stream, text.as_bytes());
    self.write(stream, b"\n");
  }
}

/// Writes to the process stdout / stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
  fn write(
    &mut self,
    stream: Stream,
    bytes: &[u8],
  ) {
    // Diagnostics are best effort; a closed pipe must not break the heap.
    let _ = match stream {
      Stream::Out => io::stdout().write_all(bytes),
      Stream::Err => io::stderr().write_all(bytes),
    };
  }
}

/// Keeps everything written in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
  out: String,
  err: String,
}

impl BufferConsole {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn out(&self) -> &str {
    &self.out
  }

  pub fn err(&self) -> &str {
    &self.err
  }

  pub fn clear(&mut self) {
    self.out.clear();
    self.err.clear();
  }
}

impl Console for BufferConsole {
  fn write(
    &mut self,
    stream: Stream,
    bytes: &[u8],
  ) {
    let text = String::from_utf8_lossy(bytes);

    match stream {
      Stream::Out => self.out.push_str(&text),
      Stream::Err => self.err.push_str(&text),
    }
  }
}

/// Renders an address as `0x` followed by 16 lowercase hex digits.
pub fn hex(addr: usize) -> String {
  format!("{:#018x}", addr)
}
