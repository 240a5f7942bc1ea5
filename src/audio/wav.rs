//! RIFF/WAVE header parsing.
//!
//! Only the chunks needed to locate PCM data are interpreted. Unknown chunks
//! between `fmt ` and `data` are skipped.

use embedded_io::{
    Read,
    ReadExactError,
    Seek,
    SeekFrom,
};

const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_MIN_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum WavError {
    /// The file ends before the `data` chunk header.
    TooShort,
    /// Not a RIFF/WAVE file, or a malformed `fmt ` chunk.
    InvalidHeader,
    /// Anything but 16-bit PCM.
    UnsupportedFormat,
    /// The underlying file failed to read or seek.
    Io,
}

impl core::fmt::Display for WavError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooShort => f.write_str("file shorter than a wav header"),
            Self::InvalidHeader => f.write_str("invalid wav header"),
            Self::UnsupportedFormat => f.write_str("only 16-bit pcm is supported"),
            Self::Io => f.write_str("i/o error while reading wav header"),
        }
    }
}

impl core::error::Error for WavError {}

impl<E> From<ReadExactError<E>> for WavError {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => Self::TooShort,
            ReadExactError::Other(_) => Self::Io,
        }
    }
}

/// Contents of the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct WavFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct WavHeader {
    pub format: WavFormat,
    /// Byte offset of the first sample.
    pub data_offset: u64,
    /// Size of the `data` chunk in bytes.
    pub data_len: u32,
}

/// Parse the header and leave `file` positioned at the first sample.
pub fn read_header<F: Read + Seek>(file: &mut F) -> Result<WavHeader, WavError> {
    let mut descriptor = [0u8; 12];
    file.read_exact(&mut descriptor)?;
    if &descriptor[0..4] != b"RIFF" || &descriptor[8..12] != b"WAVE" {
        return Err(WavError::InvalidHeader);
    }

    let mut format = None;
    loop {
        let mut chunk = [0u8; 8];
        file.read_exact(&mut chunk)?;
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

        match &chunk[0..4] {
            b"fmt " => {
                if size < FMT_CHUNK_MIN_SIZE {
                    return Err(WavError::InvalidHeader);
                }
                let mut body = [0u8; FMT_CHUNK_MIN_SIZE as usize];
                file.read_exact(&mut body)?;
                format = Some(parse_format(&body));
                skip(file, size - FMT_CHUNK_MIN_SIZE)?;
            }
            b"data" => {
                let format = format.ok_or(WavError::InvalidHeader)?;
                if format.format_tag != FORMAT_PCM || format.bits_per_sample != 16 {
                    return Err(WavError::UnsupportedFormat);
                }
                let data_offset = file.stream_position().map_err(|_| WavError::Io)?;
                return Ok(WavHeader {
                    format,
                    data_offset,
                    data_len: size,
                });
            }
            _ => skip(file, size)?,
        }
    }
}

fn parse_format(body: &[u8; 16]) -> WavFormat {
    let u16_at = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
    let u32_at = |at: usize| u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]]);
    WavFormat {
        format_tag: u16_at(0),
        channels: u16_at(2),
        sample_rate: u32_at(4),
        byte_rate: u32_at(8),
        block_align: u16_at(12),
        bits_per_sample: u16_at(14),
    }
}

/// Chunks are padded to an even size.
fn skip<F: Seek>(file: &mut F, size: u32) -> Result<(), WavError> {
    let padded = i64::from(size) + i64::from(size & 1);
    if padded > 0 {
        file.seek(SeekFrom::Current(padded))
            .map_err(|_| WavError::Io)?;
    }
    Ok(())
}

/// Builds WAV images for tests.
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fs::AssetFile;

    /// Mono 16-bit PCM at 8 kHz, with an optional `LIST` chunk before `data`.
    pub(crate) fn wav_image(samples: &[i16], with_list_chunk: bool) -> Vec<u8> {
        wav_image_with_format(samples, with_list_chunk, FORMAT_PCM, 16)
    }

    pub(crate) fn wav_image_with_format(
        samples: &[i16],
        with_list_chunk: bool,
        format_tag: u16,
        bits_per_sample: u16,
    ) -> Vec<u8> {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(b"WAVE");

        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&format_tag.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8000u32.to_le_bytes());
        out.extend_from_slice(&16000u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&bits_per_sample.to_le_bytes());

        if with_list_chunk {
            out.extend_from_slice(b"LIST");
            out.extend_from_slice(&3u32.to_le_bytes());
            out.extend_from_slice(&[1, 2, 3, 0]);
        }

        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);

        let riff_size = (out.len() - 8) as u32;
        out[4..8].copy_from_slice(&riff_size.to_le_bytes());
        out
    }

    fn parse(image: Vec<u8>) -> Result<WavHeader, WavError> {
        let mut file = AssetFile::new(image.leak());
        read_header(&mut file)
    }

    #[test]
    fn finds_the_data_chunk() {
        let header = parse(wav_image(&[1, 2, 3], false)).unwrap();
        assert_eq!(header.data_offset, 44);
        assert_eq!(header.data_len, 6);
        assert_eq!(header.format.sample_rate, 8000);
        assert_eq!(header.format.channels, 1);
        assert_eq!(header.format.bits_per_sample, 16);
    }

    #[test]
    fn skips_unknown_padded_chunks() {
        let header = parse(wav_image(&[7; 4], true)).unwrap();
        assert_eq!(header.data_offset, 44 + 12);
        assert_eq!(header.data_len, 8);
    }

    #[test]
    fn leaves_the_file_at_the_first_sample() {
        let image = wav_image(&[0x1234], false);
        let mut file = AssetFile::new(image.leak());
        read_header(&mut file).unwrap();
        let mut sample = [0u8; 2];
        file.read_exact(&mut sample).unwrap();
        assert_eq!(i16::from_le_bytes(sample), 0x1234);
    }

    #[test]
    fn truncated_files_are_too_short() {
        let image = wav_image(&[1, 2], false);
        assert_eq!(parse(image[..30].to_vec()), Err(WavError::TooShort));
        assert_eq!(parse(Vec::new()), Err(WavError::TooShort));
    }

    #[test]
    fn rejects_foreign_containers() {
        let mut image = wav_image(&[1], false);
        image[8..12].copy_from_slice(b"AVI ");
        assert_eq!(parse(image), Err(WavError::InvalidHeader));
    }

    #[test]
    fn rejects_non_pcm_and_8_bit() {
        assert_eq!(
            parse(wav_image_with_format(&[1], false, 3, 16)),
            Err(WavError::UnsupportedFormat)
        );
        assert_eq!(
            parse(wav_image_with_format(&[1], false, FORMAT_PCM, 8)),
            Err(WavError::UnsupportedFormat)
        );
    }
}
