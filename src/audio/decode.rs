use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::WavError;

const RIFF_TAG: [u8; 4] = *b"RIFF";
const WAVE_TAG: [u8; 4] = *b"WAVE";
const FMT_ID: [u8; 4] = *b"fmt ";
const DATA_ID: [u8; 4] = *b"data";

const PCM_FORMAT: u16 = 1;

/// A decoded PCM container. Immutable once built.
#[derive(Clone, Debug)]
pub struct PcmStream {
    /// Declared RIFF size plus the 8 header bytes it does not count.
    pub file_size: u32,
    pub format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Data chunk size as declared in the file.
    pub data_size: u32,
    /// Bytes per multi-channel sample group.
    pub frame_size: usize,
    data: Vec<u8>,
}

/// One magnitude per audio frame, taken from the left channel.
#[derive(Clone, Debug, Default)]
pub struct MonoBuffer {
    samples: Vec<u16>,
}

impl PcmStream {
    #[cfg(test)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.frame_size
    }

    pub fn duration(&self) -> f32 {
        self.frame_count() as f32 / self.sample_rate as f32
    }

    /// Raw bytes for frames `start..end`, clamped to the end of the stream.
    pub fn frames(&self, start: usize, end: usize) -> &[u8] {
        let total = self.frame_count();
        let start = start.min(total);
        let end = end.clamp(start, total);
        &self.data[start * self.frame_size..end * self.frame_size]
    }

    /// Collapse the stereo stream to one magnitude per frame.
    ///
    /// Only the left sample contributes; the right sample of each frame is
    /// decoded to keep the cursor aligned and then dropped.
    pub fn downmix(&self) -> MonoBuffer {
        let mut samples = Vec::with_capacity(self.frame_count());
        for frame in self.data.chunks_exact(self.frame_size) {
            let left = i16::from_le_bytes([frame[0], frame[1]]);
            let _right = i16::from_le_bytes([frame[2], frame[3]]);
            samples.push(left.unsigned_abs());
        }
        MonoBuffer { samples }
    }
}

impl MonoBuffer {
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }
}

pub fn decode_pcm(path: &Path) -> Result<PcmStream, WavError> {
    let file = File::open(path)?;
    let stream = parse_pcm(BufReader::new(file))?;

    log::info!(
        "Decoded PCM: {} bytes, format {}, {} channel(s), {}Hz, {} bytes/s, block {}, {} bits",
        stream.file_size,
        stream.format,
        stream.channels,
        stream.sample_rate,
        stream.byte_rate,
        stream.block_align,
        stream.bits_per_sample
    );
    log::info!(
        "Sample data: {} bytes, frame size {}, {} frames, {:.1}s",
        stream.data_size,
        stream.frame_size,
        stream.frame_count(),
        stream.duration()
    );

    Ok(stream)
}

/// Parse a RIFF/WAVE container from any byte source.
pub fn parse_pcm<R: Read>(reader: R) -> Result<PcmStream, WavError> {
    let mut bytes = ByteReader { inner: reader };

    bytes.expect_tag("RIFF", RIFF_TAG)?;
    let file_size = bytes.u32_le()?.wrapping_add(8);
    bytes.expect_tag("WAVE", WAVE_TAG)?;
    bytes.expect_tag("fmt", FMT_ID)?;

    // The fmt chunk size is not trusted; the data marker scan below skips
    // whatever extension bytes or extra chunks follow the fixed fields.
    bytes.u32_le()?;

    let format = bytes.u16_le()?;
    let channels = bytes.u16_le()?;
    let sample_rate = bytes.u32_le()?;
    let byte_rate = bytes.u32_le()?;
    let block_align = bytes.u16_le()?;
    let bits_per_sample = bytes.u16_le()?;

    if format != PCM_FORMAT || channels != 2 || bits_per_sample != 16 {
        return Err(WavError::UnsupportedLayout {
            format,
            channels,
            bits_per_sample,
        });
    }

    bytes.scan_for_marker(DATA_ID)?;

    let data_size = bytes.u32_le()?;
    let mut data = Vec::new();
    (&mut bytes.inner).take(data_size as u64).read_to_end(&mut data)?;
    if data.len() < data_size as usize {
        return Err(WavError::Io(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("data chunk declares {} bytes but only {} follow", data_size, data.len()),
        )));
    }

    let frame_size = (bits_per_sample as usize / 8) * channels as usize;
    let whole = data.len() - data.len() % frame_size;
    if whole != data.len() {
        log::warn!(
            "Dropping {} trailing byte(s) that do not form a whole frame",
            data.len() - whole
        );
        data.truncate(whole);
    }

    Ok(PcmStream {
        file_size,
        format,
        channels,
        sample_rate,
        byte_rate,
        block_align,
        bits_per_sample,
        data_size,
        frame_size,
        data,
    })
}

struct ByteReader<R> {
    inner: R,
}

impl<R: Read> ByteReader<R> {
    fn byte(&mut self) -> Result<u8, WavError> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn u16_le(&mut self) -> Result<u16, WavError> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn u32_le(&mut self) -> Result<u32, WavError> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn expect_tag(&mut self, chunk: &'static str, expected: [u8; 4]) -> Result<(), WavError> {
        let mut found = [0u8; 4];
        self.inner.read_exact(&mut found)?;
        if found != expected {
            return Err(WavError::BadSignature {
                chunk,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Advance past the next occurrence of `marker`.
    ///
    /// A byte equal to the marker's first byte starts a comparison of the
    /// following bytes. The comparison consumes bytes as it goes and the scan
    /// resumes after the first mismatching byte, so a marker that begins
    /// inside a failed partial match is never seen.
    fn scan_for_marker(&mut self, marker: [u8; 4]) -> Result<(), WavError> {
        loop {
            let byte = self.byte().map_err(|err| match err {
                WavError::Io(e) if e.kind() == ErrorKind::UnexpectedEof => WavError::Io(
                    std::io::Error::new(ErrorKind::UnexpectedEof, "no data chunk before end of file"),
                ),
                other => other,
            })?;
            if byte != marker[0] {
                continue;
            }
            let mut matched = true;
            for &expected in &marker[1..] {
                if self.byte()? != expected {
                    matched = false;
                    break;
                }
            }
            if matched {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a canonical 44-byte-header WAV around interleaved stereo frames.
    pub(crate) fn wav_bytes(rate: u32, frames: &[(i16, i16)]) -> Vec<u8> {
        let data_len = (frames.len() * 4) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * 4).to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for &(l, r) in frames {
            out.extend_from_slice(&l.to_le_bytes());
            out.extend_from_slice(&r.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_minimal_container() {
        let bytes = wav_bytes(44100, &[(0x0102, -2)]);
        let stream = parse_pcm(Cursor::new(bytes)).unwrap();

        assert_eq!(stream.channels, 2);
        assert_eq!(stream.sample_rate, 44100);
        assert_eq!(stream.bits_per_sample, 16);
        assert_eq!(stream.frame_size, 4);
        assert_eq!(stream.file_size, 48);
        assert_eq!(stream.data(), &[0x02, 0x01, 0xFE, 0xFF]);
        assert_eq!(stream.frame_count(), 1);
    }

    #[test]
    fn corrupt_riff_tag_is_format_error() {
        let mut bytes = wav_bytes(8000, &[(1, 1)]);
        bytes[0] = b'X';
        let err = parse_pcm(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_format());
        assert!(matches!(err, WavError::BadSignature { chunk: "RIFF", .. }));
    }

    #[test]
    fn corrupt_fmt_id_is_format_error() {
        let mut bytes = wav_bytes(8000, &[(1, 1)]);
        bytes[12] = b'F';
        let err = parse_pcm(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, WavError::BadSignature { chunk: "fmt", .. }));
    }

    #[test]
    fn truncated_before_data_chunk_fails() {
        let bytes = wav_bytes(8000, &[(1, 1), (2, 2)]);
        for cut in [4, 20, 36, 38] {
            let err = parse_pcm(Cursor::new(bytes[..cut].to_vec())).unwrap_err();
            assert!(matches!(err, WavError::Io(_)), "cut at {}", cut);
        }
    }

    #[test]
    fn truncated_sample_data_fails() {
        let bytes = wav_bytes(8000, &[(1, 1), (2, 2)]);
        let err = parse_pcm(Cursor::new(bytes[..bytes.len() - 1].to_vec())).unwrap_err();
        assert!(matches!(err, WavError::Io(_)));
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let mut bytes = wav_bytes(8000, &[(-5, 7), (3, -100)]);
        bytes[40..44].copy_from_slice(&9u32.to_le_bytes());
        bytes.push(0xAB);

        let stream = parse_pcm(Cursor::new(bytes)).unwrap();
        assert_eq!(stream.data_size, 9);
        assert_eq!(stream.data().len() % stream.frame_size, 0);
        assert_eq!(stream.frame_count(), 2);
        assert_eq!(stream.downmix().samples(), &[5, 3]);
    }

    #[test]
    fn rejects_mono_layout() {
        let mut bytes = wav_bytes(8000, &[(1, 1)]);
        bytes[22] = 1;
        let err = parse_pcm(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, WavError::UnsupportedLayout { channels: 1, .. }));
    }

    #[test]
    fn skips_chunks_before_data() {
        let mut bytes = wav_bytes(8000, &[(7, 8)]);
        let list = b"LIST\x04\x00\x00\x00wxyz";
        bytes.splice(36..36, list.iter().copied());
        let stream = parse_pcm(Cursor::new(bytes)).unwrap();
        assert_eq!(stream.data(), &[7, 0, 8, 0]);
    }

    #[test]
    fn marker_scan_does_not_backtrack() {
        // "dd" fails on the second 'd', which is consumed, so the real
        // marker that starts there is skipped and the file has no data.
        let mut bytes = wav_bytes(8000, &[(7, 8)]);
        bytes.insert(36, b'd');
        let err = parse_pcm(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, WavError::Io(_)));
    }

    #[test]
    fn downmix_keeps_left_magnitude() {
        let bytes = wav_bytes(8000, &[(-5, 7), (3, -100)]);
        let mono = parse_pcm(Cursor::new(bytes)).unwrap().downmix();
        assert_eq!(mono.samples(), &[5, 3]);
    }

    #[test]
    fn downmix_handles_most_negative_sample() {
        let bytes = wav_bytes(8000, &[(i16::MIN, 0)]);
        let mono = parse_pcm(Cursor::new(bytes)).unwrap().downmix();
        assert_eq!(mono.samples(), &[32768]);
    }

    #[test]
    fn frames_clamp_to_stream_end() {
        let bytes = wav_bytes(8000, &[(1, 1), (2, 2), (3, 3)]);
        let stream = parse_pcm(Cursor::new(bytes)).unwrap();
        assert_eq!(stream.frames(2, 10).len(), 4);
        assert!(stream.frames(5, 10).is_empty());
    }
}
