//! Legacy shell output filters.
//!
//! Pre-Lollipop `shell:` sessions run through a pty that rewrites every
//! `\n` as `\r\n`. These adapters undo exactly that: a `\r` immediately
//! followed by `\n` is dropped, every other byte passes through untouched.
//! Both keep a one-byte lookback so a pair split across reads or writes is
//! still recognized.

use std::io::{self, BufRead, Read, Write};

/// Reader collapsing `\r\n` into `\n`.
#[derive(Debug)]
pub struct CrLfReader<R> {
    /// Buffered source.
    inner: R,
    /// A `\r` was read but not yet emitted.
    pending_cr: bool,
}

impl<R: BufRead> CrLfReader<R> {
    /// Wraps a buffered reader.
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            pending_cr: false,
        }
    }

    /// Returns the wrapped reader. A held-back `\r` is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> Read for CrLfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                if self.pending_cr {
                    self.pending_cr = false;
                    buf[n] = b'\r';
                    n += 1;
                }
                break;
            }

            let mut used = 0;
            for &b in available {
                if n == buf.len() {
                    break;
                }
                used += 1;
                if self.pending_cr {
                    self.pending_cr = false;
                    if b == b'\n' {
                        buf[n] = b'\n';
                        n += 1;
                        continue;
                    }
                    buf[n] = b'\r';
                    n += 1;
                    if n == buf.len() {
                        // No room for `b`; leave it for the next read.
                        used -= 1;
                        break;
                    }
                }
                if b == b'\r' {
                    self.pending_cr = true;
                } else {
                    buf[n] = b;
                    n += 1;
                }
            }
            self.inner.consume(used);

            // Only keep blocking while all we hold is a lone `\r`.
            if n > 0 {
                break;
            }
        }
        Ok(n)
    }
}

/// Writer dropping a `\r` that immediately precedes `\n`.
///
/// A trailing `\r` is held until the next byte arrives; call
/// [`CrLfWriter::finish`] to emit it at end of output.
#[derive(Debug)]
pub struct CrLfWriter<W: Write> {
    /// Destination.
    inner: W,
    /// A `\r` was written but not yet forwarded.
    pending_cr: bool,
}

impl<W: Write> CrLfWriter<W> {
    /// Wraps a writer.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            pending_cr: false,
        }
    }

    /// Forwards any held-back `\r`, flushes, and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.pending_cr {
            self.pending_cr = false;
            self.inner.write_all(b"\r")?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for CrLfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = Vec::with_capacity(buf.len() + 1);
        for &b in buf {
            if self.pending_cr {
                self.pending_cr = false;
                if b != b'\n' {
                    out.push(b'\r');
                }
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(b);
            }
        }
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // A held `\r` stays held: the next byte may still be `\n`.
        self.inner.flush()
    }
}
