//! Audio file loading and decoding functionality.
//!
//! Decoding turns arbitrary bytes into an immutable stereo [`SampleBuffer`]
//! at the source's own sample rate. Every failure is a [`SampleLoadError`];
//! nothing here panics on bad input.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSource,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::audio_engine::errors::SampleLoadError;
use crate::messages::SampleBuffer;

/// Decodes an audio file from disk.
///
/// The file extension, when present, is used as a format hint.
pub fn decode_audio_file(path: &Path) -> Result<SampleBuffer, SampleLoadError> {
    let file = File::open(path)?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    decode_source(Box::new(file), hint)
}

/// Decodes an in-memory encoded file (WAV, FLAC, MP3, OGG, ...).
pub fn decode_audio_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
) -> Result<SampleBuffer, SampleLoadError> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    decode_source(Box::new(Cursor::new(bytes)), hint)
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<SampleBuffer, SampleLoadError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or(SampleLoadError::NoDefaultTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(SampleLoadError::MissingSampleRate)?;
    let file_channels = track
        .codec_params
        .channels
        .ok_or(SampleLoadError::MissingChannels)?
        .count();

    if !(1..=2).contains(&file_channels) {
        return Err(SampleLoadError::UnsupportedChannels { file_channels });
    }

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut decoded: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(SampleLoadError::Decode(err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());
    }

    if decoded.is_empty() {
        return Err(SampleLoadError::Empty);
    }

    let stereo = to_stereo(decoded, file_channels)?;
    Ok(SampleBuffer::new(2, sample_rate, stereo))
}

/// Converts interleaved mono or stereo samples to interleaved stereo.
///
/// Mono is duplicated to both sides; anything wider is rejected.
pub fn to_stereo(samples: Vec<f32>, file_channels: usize) -> Result<Vec<f32>, SampleLoadError> {
    match file_channels {
        2 => Ok(samples),
        1 => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                out.push(s);
                out.push(s);
            }
            Ok(out)
        }
        _ => Err(SampleLoadError::UnsupportedChannels { file_channels }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use super::*;

    /// Builds a PCM16 WAV file in memory.
    pub(crate) fn pcm16_wav(channels: u16, sample_rate_hz: u32, samples: &[i16]) -> Vec<u8> {
        let bits_per_sample = 16u16;
        let block_align = channels * (bits_per_sample / 8);
        let byte_rate = sample_rate_hz * u32::from(block_align);
        let data_len_bytes = u32::try_from(samples.len() * 2).expect("sample data too large");
        let chunk_size = 36 + data_len_bytes;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&chunk_size.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");

        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate_hz.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());

        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len_bytes.to_le_bytes());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        bytes
    }

    fn write_wav(path: &Path, channels: u16, sample_rate_hz: u32, samples: &[i16]) {
        let mut file = File::create(path).unwrap();
        file.write_all(&pcm16_wav(channels, sample_rate_hz, samples))
            .unwrap();
    }

    #[test]
    fn test_decode_wav_file_to_stereo_buffer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("kick.wav");

        let samples = [0i16, 16_384i16, -16_384i16, 32_767i16];
        write_wav(&path, 1, 44_100, &samples);

        let decoded = decode_audio_file(&path).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.frames(), samples.len());
        assert!(decoded.samples.iter().all(|s| (-1.0..=1.0).contains(s)));

        // Mono is duplicated to both sides.
        for frame in decoded.samples.chunks_exact(2) {
            assert!((frame[0] - frame[1]).abs() < 1e-6);
        }
        assert!((decoded.samples[2] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_keeps_native_sample_rate() {
        let bytes = pcm16_wav(2, 22_050, &[1_000, -1_000, 2_000, -2_000]);
        let decoded = decode_audio_bytes(bytes, Some("wav")).unwrap();

        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.frames(), 2);
        assert!(decoded.samples[0] > 0.0 && decoded.samples[1] < 0.0);
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        let result = decode_audio_bytes(b"definitely not audio".to_vec(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_surround() {
        let bytes = pcm16_wav(4, 44_100, &[0; 8]);
        assert!(decode_audio_bytes(bytes, Some("wav")).is_err());
    }

    #[test]
    fn test_decode_empty_data_chunk() {
        let bytes = pcm16_wav(1, 44_100, &[]);
        assert!(decode_audio_bytes(bytes, Some("wav")).is_err());
    }

    #[test]
    fn test_to_stereo() {
        let output = to_stereo(vec![0.5, -0.3, 0.8], 1).unwrap();
        assert_eq!(output, vec![0.5, 0.5, -0.3, -0.3, 0.8, 0.8]);

        let input = vec![0.5, -0.3, 0.8, 0.2];
        assert_eq!(to_stereo(input.clone(), 2).unwrap(), input);

        assert!(matches!(
            to_stereo(vec![0.0; 6], 3),
            Err(SampleLoadError::UnsupportedChannels { file_channels: 3 })
        ));
    }

    #[test]
    fn test_decode_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nonexistent.wav");

        let result = decode_audio_file(&path);
        assert!(matches!(result, Err(SampleLoadError::Io(_))));
    }
}
