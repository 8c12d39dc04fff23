//! The single-pass encode pipeline behind [`super::LocalBlob`].
//!
//! Every chunk handed to [`Pipeline::write`] passes three stages in a fixed
//! order before the call returns:
//!
//! 1. [`ByteCounter`] adds the chunk length to the uncompressed size,
//! 2. [`DigestStage`] feeds the chunk to the running SHA-256,
//! 3. [`CompressionStage`] gzips the chunk into the sink and counts the
//!    compressed bytes that reach it.
//!
//! The digest is taken before compression so the content address does not
//! depend on the compressor or its settings.

use std::io::Write;

use blobstore_digest::{digest::Digest, CountingWriter, Sha256, Sha256Hash};
use flate2::write::GzEncoder;

/// Select the compression level used for the spool file.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Use the lowest compression level (gzip: 1)
    Lowest,
    /// Use the highest compression level (gzip: 9)
    Highest,
    /// Use the default compression level (gzip: 9)
    #[default]
    Default,
    /// Use a numeric compression level (gzip: 1-9)
    Numeric(u32),
}

impl CompressionLevel {
    pub(crate) fn to_gzip_level(self) -> Result<flate2::Compression, std::io::Error> {
        match self {
            CompressionLevel::Lowest => Ok(flate2::Compression::new(1)),
            CompressionLevel::Highest | CompressionLevel::Default => Ok(flate2::Compression::best()),
            CompressionLevel::Numeric(n) => {
                if !(1..=9).contains(&n) {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "gzip compression level must be between 1 and 9",
                    ))
                } else {
                    Ok(flate2::Compression::new(n))
                }
            }
        }
    }
}

/// One step of the pipeline: accepts every chunk and yields a final value
/// once the pipeline is sealed.
pub(crate) trait Stage {
    type Output;

    fn write(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn finish(self) -> std::io::Result<Self::Output>;
}

/// Counts the bytes entering the pipeline.
#[derive(Default)]
pub(crate) struct ByteCounter {
    count: u64,
}

impl ByteCounter {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Stage for ByteCounter {
    type Output = u64;

    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.count += buf.len() as u64;
        Ok(())
    }

    fn finish(self) -> std::io::Result<u64> {
        Ok(self.count)
    }
}

/// Maintains the running digest of the uncompressed bytes.
#[derive(Default)]
pub(crate) struct DigestStage {
    hasher: Sha256,
}

impl Stage for DigestStage {
    type Output = Sha256Hash;

    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.hasher.update(buf);
        Ok(())
    }

    fn finish(self) -> std::io::Result<Sha256Hash> {
        Ok(self.hasher.finalize())
    }
}

/// Gzips bytes into `W`, counting the compressed bytes written to it.
pub(crate) struct CompressionStage<W: Write> {
    encoder: GzEncoder<CountingWriter<W>>,
}

impl<W: Write> CompressionStage<W> {
    pub fn new(sink: W, level: flate2::Compression) -> Self {
        Self {
            encoder: GzEncoder::new(CountingWriter::new(sink), level),
        }
    }

    /// Compressed bytes that reached the sink so far. Bytes still buffered
    /// inside the encoder are not included until a flush.
    pub fn count(&self) -> u64 {
        self.encoder.get_ref().count()
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.encoder.flush()
    }
}

impl<W: Write> Stage for CompressionStage<W> {
    type Output = (W, u64);

    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.encoder.write_all(buf)
    }

    fn finish(self) -> std::io::Result<(W, u64)> {
        let counting = self.encoder.finish()?;
        let (mut sink, count) = counting.into_inner();
        sink.flush()?;
        Ok((sink, count))
    }
}

/// Final values of a sealed pipeline.
pub(crate) struct PipelineOutput<W> {
    pub sink: W,
    pub digest: Sha256Hash,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

/// Composes the three stages behind a single `write` entry point.
pub(crate) struct Pipeline<W: Write> {
    uncompressed: ByteCounter,
    digest: DigestStage,
    compressor: CompressionStage<W>,
}

impl<W: Write> Pipeline<W> {
    pub fn new(sink: W, level: flate2::Compression) -> Self {
        Self {
            uncompressed: ByteCounter::default(),
            digest: DigestStage::default(),
            compressor: CompressionStage::new(sink, level),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.uncompressed.write(buf)?;
        self.digest.write(buf)?;
        self.compressor.write(buf)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.compressor.flush()
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed.count()
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressor.count()
    }

    /// Flushes the compressor and the sink and freezes all counters.
    pub fn finish(self) -> std::io::Result<PipelineOutput<W>> {
        let (sink, compressed_size) = self.compressor.finish()?;
        Ok(PipelineOutput {
            sink,
            digest: self.digest.finish()?,
            uncompressed_size: self.uncompressed.finish()?,
            compressed_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobstore_digest::compute_bytes_digest;
    use rstest::rstest;
    use std::io::Read;

    fn sample_data() -> Vec<u8> {
        (0..100_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
    }

    #[rstest]
    #[case(CompressionLevel::Lowest)]
    #[case(CompressionLevel::Default)]
    #[case(CompressionLevel::Numeric(5))]
    fn test_pipeline_outputs(#[case] level: CompressionLevel) {
        let data = sample_data();
        let mut pipeline = Pipeline::new(Vec::new(), level.to_gzip_level().unwrap());
        for chunk in data.chunks(7_919) {
            pipeline.write(chunk).unwrap();
        }
        let output = pipeline.finish().unwrap();

        assert_eq!(output.uncompressed_size, data.len() as u64);
        assert_eq!(output.compressed_size, output.sink.len() as u64);
        assert_eq!(output.digest, compute_bytes_digest::<Sha256>(&data));

        let mut decompressed = Vec::new();
        flate2::read::GzDecoder::new(output.sink.as_slice())
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_counters_update_per_write() {
        let mut pipeline = Pipeline::new(Vec::new(), flate2::Compression::fast());
        pipeline.write(b"hello").unwrap();
        assert_eq!(pipeline.uncompressed_size(), 5);
        pipeline.write(b"world").unwrap();
        assert_eq!(pipeline.uncompressed_size(), 10);

        // The gzip header is emitted lazily, a flush forces compressed
        // bytes into the sink.
        pipeline.flush().unwrap();
        assert!(pipeline.compressed_size() > 0);
    }

    #[test]
    fn test_invalid_compression_level() {
        assert!(CompressionLevel::Numeric(0).to_gzip_level().is_err());
        assert!(CompressionLevel::Numeric(10).to_gzip_level().is_err());
        assert!(CompressionLevel::Numeric(9).to_gzip_level().is_ok());
    }
}
