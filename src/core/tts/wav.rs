//! PCM to WAV conversion helpers.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::TtsError;

/// Wrap raw signed 16-bit little-endian mono PCM in a WAV container.
pub fn pcm_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, TtsError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| TtsError::AudioGenerationFailed(format!("wav header: {e}")))?;
        for chunk in pcm_data.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| TtsError::AudioGenerationFailed(format!("wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| TtsError::AudioGenerationFailed(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Write PCM data as a WAV file, creating parent directories as needed.
pub async fn write_wav_file(
    pcm_data: &[u8],
    path: &Path,
    sample_rate: u32,
) -> Result<PathBuf, TtsError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TtsError::AudioGenerationFailed(format!("mkdir {parent:?}: {e}")))?;
    }

    let wav_data = pcm_to_wav(pcm_data, sample_rate)?;
    tokio::fs::write(path, wav_data)
        .await
        .map_err(|e| TtsError::AudioGenerationFailed(format!("write {path:?}: {e}")))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_to_wav_header_and_length() {
        let pcm: Vec<u8> = (0..200i16).flat_map(|s| s.to_le_bytes()).collect();
        let wav = pcm_to_wav(&pcm, 24_000).unwrap();

        // RIFF header plus the sample payload.
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + pcm.len());
    }

    #[test]
    fn test_pcm_round_trip() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = pcm_to_wav(&pcm, 24_000).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(back, samples);
    }
}
