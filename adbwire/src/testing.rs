//! In-memory stream for channel unit tests.

use std::cell::Cell;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use crate::transport::Stream;

/// Reads from a fixed script and records everything written.
#[derive(Debug, Default)]
pub struct Duplex {
    /// Bytes the fake server "sends".
    input: Cursor<Vec<u8>>,
    /// Bytes the client wrote.
    output: Vec<u8>,
    /// Set once the stream has been shut down.
    shut: Rc<Cell<bool>>,
}

impl Duplex {
    /// A stream whose reads yield `input`.
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            input: Cursor::new(input.to_vec()),
            ..Self::default()
        }
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.output
    }

    /// Unread input bytes.
    pub fn remaining(&self) -> &[u8] {
        let pos = usize::try_from(self.input.position()).unwrap_or(usize::MAX);
        self.input.get_ref().get(pos..).unwrap_or_default()
    }

    /// Handle observing whether the stream was shut down.
    pub fn shut_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.shut)
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for Duplex {
    fn shutdown(&self) -> io::Result<()> {
        self.shut.set(true);
        Ok(())
    }
}
