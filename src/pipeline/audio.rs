//! Audio post-processing: tempo change by resampling, then silence padding.
//!
//! The tempo change is the classic "reinterpret the frame
//! rate" trick: samples recorded at `rate` are declared to be at
//! `floor(rate × speed)` and then resampled back to `rate`. Playback gets
//! shorter by `1/speed` and the pitch rises with it.
//!
//! The duration reported here is authoritative: the compositor fixes each
//! page segment to exactly this length.

use crate::error::MovieError;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// PCM layout of synthesised audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for SampleFormat {
    /// What the speech service returns: 24 kHz mono 16-bit.
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

/// Little-endian PCM bytes as returned by the speech service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAudio {
    pub pcm: Vec<u8>,
    pub format: SampleFormat,
}

impl RawAudio {
    pub fn new(pcm: Vec<u8>, format: SampleFormat) -> Self {
        Self { pcm, format }
    }

    /// Decode into interleaved 16-bit samples.
    pub fn samples(&self) -> Result<Vec<i16>, MovieError> {
        if self.format.bits_per_sample != 16 {
            return Err(MovieError::AudioProcessing(format!(
                "Unsupported sample width: {} bits",
                self.format.bits_per_sample
            )));
        }
        if self.format.channels == 0 || self.format.sample_rate == 0 {
            return Err(MovieError::AudioProcessing(format!(
                "Invalid sample format: {:?}",
                self.format
            )));
        }
        let block = 2 * self.format.channels as usize;
        if self.pcm.len() % block != 0 {
            return Err(MovieError::AudioProcessing(format!(
                "PCM length {} is not a multiple of the {}-byte frame size",
                self.pcm.len(),
                block
            )));
        }
        Ok(self
            .pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    pub fn duration_secs(&self) -> f64 {
        let block = 2 * self.format.channels.max(1) as usize;
        (self.pcm.len() / block) as f64 / self.format.sample_rate.max(1) as f64
    }
}

/// A page's finished audio track.
#[derive(Debug)]
pub struct ProcessedAudio {
    file: NamedTempFile,
    /// Total length in frames at `sample_rate`.
    pub frames: u64,
    pub sample_rate: u32,
    /// Authoritative duration in seconds: `frames / sample_rate`.
    pub duration_secs: f64,
}

impl ProcessedAudio {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Tempo-adjust and pad `samples` (interleaved, `channels` wide) recorded at `rate`.
///
/// Pure and deterministic; [`process_audio`] is this plus a WAV file.
pub fn stretch_and_pad(
    samples: &[i16],
    channels: u16,
    rate: u32,
    speed: f64,
    silence_before_ms: u32,
    silence_after_ms: u32,
) -> Result<Vec<i16>, MovieError> {
    if !(speed.is_finite() && speed > 0.0) {
        return Err(MovieError::InvalidConfig(format!(
            "Audio speed must be a positive number, got {speed}"
        )));
    }
    let channels = channels.max(1) as usize;
    let declared_rate = (rate as f64 * speed).floor() as u64;
    if declared_rate == 0 {
        return Err(MovieError::InvalidConfig(format!(
            "Audio speed {speed} is too small for {rate} Hz audio"
        )));
    }

    let stretched = resample_linear(samples, channels, declared_rate, rate as u64);
    let before = silence_frames(rate, silence_before_ms) * channels;
    let after = silence_frames(rate, silence_after_ms) * channels;

    let mut out = Vec::with_capacity(before + stretched.len() + after);
    out.resize(before, 0);
    out.extend_from_slice(&stretched);
    out.resize(out.len() + after, 0);
    Ok(out)
}

fn silence_frames(rate: u32, ms: u32) -> usize {
    (rate as u64 * ms as u64 / 1000) as usize
}

/// Linear resampling of interleaved frames from `from_rate` to `to_rate`.
fn resample_linear(samples: &[i16], channels: usize, from_rate: u64, to_rate: u64) -> Vec<i16> {
    let in_frames = samples.len() / channels;
    if from_rate == to_rate || in_frames == 0 {
        return samples[..in_frames * channels].to_vec();
    }

    let out_frames = (in_frames as u64 * to_rate / from_rate) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_frames * channels);

    for j in 0..out_frames {
        let pos = j as f64 * step;
        let i = (pos.floor() as usize).min(in_frames - 1);
        let next = (i + 1).min(in_frames - 1);
        let frac = pos - i as f64;
        for c in 0..channels {
            let a = samples[i * channels + c] as f64;
            let b = samples[next * channels + c] as f64;
            let v = a + (b - a) * frac;
            out.push(v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
        }
    }
    out
}

/// Post-process one page's synthesised audio into a WAV temp file.
pub fn process_audio(
    raw: &RawAudio,
    speed: f64,
    silence_before_ms: u32,
    silence_after_ms: u32,
) -> Result<ProcessedAudio, MovieError> {
    let format = raw.format;
    let samples = raw.samples()?;
    let processed = stretch_and_pad(
        &samples,
        format.channels,
        format.sample_rate,
        speed,
        silence_before_ms,
        silence_after_ms,
    )?;

    let file = tempfile::Builder::new()
        .prefix("pdf2movie-audio-")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| MovieError::AudioProcessing(format!("tempfile: {e}")))?;
    write_wav(&processed, format, file.path())?;

    let frames = (processed.len() / format.channels.max(1) as usize) as u64;
    let duration_secs = frames as f64 / format.sample_rate as f64;
    debug!(
        "Audio: {:.2}s raw → {:.2}s at {}x with {}ms/{}ms padding",
        raw.duration_secs(),
        duration_secs,
        speed,
        silence_before_ms,
        silence_after_ms
    );

    Ok(ProcessedAudio {
        file,
        frames,
        sample_rate: format.sample_rate,
        duration_secs,
    })
}

/// Persist raw synthesised PCM as a WAV file, unchanged.
pub fn save_pcm_as_wav(raw: &RawAudio, path: &Path) -> Result<(), MovieError> {
    write_wav(&raw.samples()?, raw.format, path)
}

fn write_wav(samples: &[i16], format: SampleFormat, path: &Path) -> Result<(), MovieError> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_err = |e: hound::Error| MovieError::AudioProcessing(format!("WAV write: {e}"));

    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &s in samples {
        writer.write_sample(s).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize) -> Vec<i16> {
        (0..frames).map(|i| ((i % 100) as i16 - 50) * 200).collect()
    }

    fn raw(frames: usize) -> RawAudio {
        let pcm = tone(frames).iter().flat_map(|s| s.to_le_bytes()).collect();
        RawAudio::new(pcm, SampleFormat::default())
    }

    #[test]
    fn one_second_at_1_2x_with_default_padding() {
        let processed = process_audio(&raw(24_000), 1.2, 1000, 500).unwrap();
        // 24 000 frames declared at 28 800 Hz → 20 000 frames at 24 kHz.
        assert_eq!(processed.frames, 24_000 + 20_000 + 12_000);
        assert!((processed.duration_secs - (1.0 + 20_000.0 / 24_000.0 + 0.5)).abs() < 1e-9);

        let reader = hound::WavReader::open(processed.path()).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.duration() as u64, processed.frames);
    }

    #[test]
    fn padding_is_silent_and_content_is_in_the_middle() {
        let out = stretch_and_pad(&tone(1000), 1, 1000, 1.0, 100, 50).unwrap();
        assert_eq!(out.len(), 100 + 1000 + 50);
        assert!(out[..100].iter().all(|&s| s == 0));
        assert!(out[1100..].iter().all(|&s| s == 0));
        assert_eq!(&out[100..1100], tone(1000).as_slice());
    }

    #[test]
    fn processing_is_deterministic() {
        let a = process_audio(&raw(5_000), 1.2, 1000, 500).unwrap();
        let b = process_audio(&raw(5_000), 1.2, 1000, 500).unwrap();
        assert_eq!(a.frames, b.frames);
        assert_eq!(a.duration_secs, b.duration_secs);
        assert_eq!(
            std::fs::read(a.path()).unwrap(),
            std::fs::read(b.path()).unwrap()
        );
    }

    #[test]
    fn slower_speed_lengthens() {
        let out = stretch_and_pad(&tone(1000), 1, 1000, 0.5, 0, 0).unwrap();
        assert_eq!(out.len(), 2000);
    }

    #[test]
    fn fractional_speed_declares_rate_without_float_drift() {
        // 24 000 Hz × 0.9 is exactly 21 600 Hz; a narrower float lands on 21 599.
        let out = stretch_and_pad(&vec![0; 24_000], 1, 24_000, 0.9, 0, 0).unwrap();
        assert_eq!(out.len(), 26_666);
    }

    #[test]
    fn stereo_keeps_channels_interleaved() {
        let stereo: Vec<i16> = (0..200).flat_map(|_| [1000i16, -1000]).collect();
        let out = stretch_and_pad(&stereo, 2, 100, 2.0, 0, 0).unwrap();
        assert_eq!(out.len(), 200);
        assert!(out.chunks(2).all(|f| f[0] == 1000 && f[1] == -1000));
    }

    #[test]
    fn non_positive_speed_is_rejected() {
        for speed in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                stretch_and_pad(&tone(10), 1, 24_000, speed, 0, 0),
                Err(MovieError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn odd_pcm_length_is_rejected() {
        let bad = RawAudio::new(vec![0, 1, 2], SampleFormat::default());
        assert!(matches!(bad.samples(), Err(MovieError::AudioProcessing(_))));
    }

    #[test]
    fn empty_audio_is_just_silence() {
        let processed = process_audio(&raw(0), 1.2, 1000, 500).unwrap();
        assert!((processed.duration_secs - 1.5).abs() < 1e-9);
    }

    #[test]
    fn raw_pcm_round_trips_through_wav() {
        let audio = raw(480);
        let tmp = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        save_pcm_as_wav(&audio, tmp.path()).unwrap();
        let samples: Vec<i16> = hound::WavReader::open(tmp.path())
            .unwrap()
            .into_samples::<i16>()
            .map(Result::unwrap)
            .collect();
        assert_eq!(samples, tone(480));
        assert!((audio.duration_secs() - 0.02).abs() < 1e-9);
    }
}
