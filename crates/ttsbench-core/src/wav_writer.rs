//! WAV file writer
//!
//! Exports synthesized audio as mono 16-bit PCM RIFF files.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BenchError, BenchResult};

const HEADER_LEN: u32 = 44;
const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Convert a float sample to 16-bit PCM, clamping to `[-1, 1]` first
#[must_use]
pub fn to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    #[allow(clippy::cast_possible_truncation)]
    let pcm = (s * f32::from(i16::MAX)).round() as i16;
    pcm
}

/// Streaming mono PCM16 writer; sizes are patched into the header on finalize
pub struct WavWriter {
    writer: BufWriter<File>,
    data_bytes: u32,
}

impl WavWriter {
    /// Create `path` (parent directories included) and write a placeholder header
    ///
    /// # Errors
    ///
    /// Returns an error for a zero sample rate or when the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> BenchResult<Self> {
        if sample_rate == 0 {
            return Err(BenchError::invalid_input("WAV sample rate must be positive"));
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .map_err(|e| BenchError::file(format!("Failed to create WAV file {}: {e}", path.display())))?;

        let mut writer = BufWriter::new(file);
        Self::write_header(&mut writer, sample_rate, 0)?;

        Ok(Self {
            writer,
            data_bytes: 0,
        })
    }

    fn write_header<W: Write>(writer: &mut W, sample_rate: u32, data_size: u32) -> BenchResult<()> {
        let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
        let byte_rate = sample_rate * u32::from(block_align);

        writer.write_all(b"RIFF")?;
        writer.write_all(&(HEADER_LEN - 8 + data_size).to_le_bytes())?;
        writer.write_all(b"WAVE")?;

        writer.write_all(b"fmt ")?;
        writer.write_all(&16u32.to_le_bytes())?;
        writer.write_all(&1u16.to_le_bytes())?; // PCM
        writer.write_all(&CHANNELS.to_le_bytes())?;
        writer.write_all(&sample_rate.to_le_bytes())?;
        writer.write_all(&byte_rate.to_le_bytes())?;
        writer.write_all(&block_align.to_le_bytes())?;
        writer.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

        writer.write_all(b"data")?;
        writer.write_all(&data_size.to_le_bytes())?;
        Ok(())
    }

    /// Append float samples
    ///
    /// # Errors
    ///
    /// Returns an error when the data chunk would exceed the RIFF size limit
    /// or the write fails.
    pub fn write_samples(&mut self, samples: &[f32]) -> BenchResult<()> {
        let added = u32::try_from(samples.len())
            .ok()
            .and_then(|n| n.checked_mul(2))
            .and_then(|n| n.checked_add(self.data_bytes))
            .filter(|&n| n <= u32::MAX - HEADER_LEN)
            .ok_or_else(|| BenchError::invalid_input("audio too long for a WAV file"))?;

        for &sample in samples {
            self.writer.write_all(&to_pcm16(sample).to_le_bytes())?;
        }
        self.data_bytes = added;
        Ok(())
    }

    /// Patch the RIFF and data sizes and flush to disk
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be rewritten.
    pub fn finalize(mut self) -> BenchResult<()> {
        self.writer.flush()?;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| BenchError::file(format!("Failed to finalize WAV writer: {e}")))?;

        file.seek(SeekFrom::Start(4))?;
        file.write_all(&(HEADER_LEN - 8 + self.data_bytes).to_le_bytes())?;
        file.seek(SeekFrom::Start(40))?;
        file.write_all(&self.data_bytes.to_le_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Write `samples` to `path` in one go
///
/// # Errors
///
/// See [`WavWriter::create`] and [`WavWriter::write_samples`].
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> BenchResult<()> {
    let mut writer = WavWriter::create(path, sample_rate)?;
    writer.write_samples(samples)?;
    writer.finalize()
}
