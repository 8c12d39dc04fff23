use std::io::Write;

/// A [`Write`] adapter that counts the bytes accepted by the wrapped writer.
///
/// Only bytes the inner writer reports as written are counted, so after a
/// successful flush [`CountingWriter::count`] equals the number of bytes that
/// reached the underlying sink.
pub struct CountingWriter<W> {
    writer: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    /// Wraps `writer`, starting at a count of zero.
    pub fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// The number of bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns a reference to the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Consumes this instance and returns the wrapped writer and the final
    /// byte count.
    pub fn into_inner(self) -> (W, u64) {
        (self.writer, self.count)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes = self.writer.write(buf)?;
        self.count += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
