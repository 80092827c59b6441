//! Wave decomposition: turn a speech clip into low-frequency cosine tracks.
//!
//! Each source clip is reduced to its pitch contour and per-harmonic
//! amplitude envelopes, then re-synthesised as cosine waves whose frequency
//! is rescaled into the target speaker slot's band. A dynamic gain curve
//! forces the mix envelope to track the source envelope so the water moves
//! with the voice.
//!
//! Runs on dedicated worker threads; everything here is synchronous CPU
//! work.

use realfft::RealFftPlanner;
use realfft::num_complex::Complex32;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use crate::core::agents::SlotId;

/// Processing sample rate; the source clip is resampled down to this.
pub const DEFAULT_PROCESSING_SR: u32 = 8_000;

/// STFT / envelope analysis parameters.
const N_FFT: usize = 512;
const HOP_LENGTH: usize = 128;

/// Pitch tracker window and constraints (C2..C7).
const PITCH_FRAME: usize = 1_024;
const PITCH_FMIN: f32 = 65.406; // C2
const PITCH_FMAX: f32 = 2_093.0; // C7
const VOICED_THRESHOLD: f32 = 0.5;

/// Amplitude normalization applied to extracted harmonic envelopes.
const AMP_NORMALIZATION: f32 = (2.0 / 512.0) * 3.0;

/// Gain curve ceiling; keeps silence/noise frames from exploding.
const GAIN_CLIP: f32 = 10.0;

/// Slot-specific frequency ranges: a symmetric dome, outer slots high,
/// center slots low.
pub fn slot_freq_range(slot_id: SlotId) -> (f32, f32) {
    match slot_id {
        1 | 6 => (80.0, 100.0),
        2 | 5 => (50.0, 70.0),
        _ => (20.0, 40.0),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DecomposeError {
    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("audio read failed: {0}")]
    Read(String),

    #[error("audio write failed: {0}")]
    Write(String),

    #[error("decomposition failed: {0}")]
    Dsp(String),
}

/// One synthesised track on disk.
#[derive(Debug, Clone)]
pub struct DecomposedTrack {
    pub wave_num: u8,
    pub target_slot_id: SlotId,
    pub path: PathBuf,
    pub freq_range_hz: (f32, f32),
}

/// Result of decomposing one clip.
#[derive(Debug, Clone)]
pub struct DecomposeOutcome {
    pub tracks: Vec<DecomposedTrack>,
    pub rmse: f32,
    pub nrmse: f32,
    pub snr_db: f32,
    pub env_corr: f32,
}

/// Decompose `input_path` into one wave track per entry of `target_slots`,
/// written as `<basename>_v3_wave<k>.wav` under `output_dir`.
pub fn decompose_audio_to_waves(
    input_path: &Path,
    output_dir: &Path,
    target_slots: &[SlotId],
    processing_sr: u32,
) -> Result<DecomposeOutcome, DecomposeError> {
    if !input_path.exists() {
        return Err(DecomposeError::InputNotFound(
            input_path.display().to_string(),
        ));
    }
    std::fs::create_dir_all(output_dir)
        .map_err(|e| DecomposeError::Write(format!("mkdir {}: {e}", output_dir.display())))?;

    let samples = load_mono_resampled(input_path, processing_sr)?;
    if samples.is_empty() {
        return Err(DecomposeError::Dsp("clip contains no samples".to_string()));
    }
    let sr = processing_sr as f32;
    let n_waves = target_slots.len();

    // Frame grid shared by the pitch, spectrogram, and envelope analyses.
    let n_frames = samples.len() / HOP_LENGTH + 1;
    let times_frames: Vec<f32> = (0..n_frames).map(|n| (n * HOP_LENGTH) as f32 / sr).collect();
    let times_samples: Vec<f32> = (0..samples.len()).map(|i| i as f32 / sr).collect();

    // Pitch contour; unvoiced frames are zero and interpolated over below.
    let f0_clean = track_pitch(&samples, sr, n_frames);
    let f0_interp = interp(&times_samples, &times_frames, &f0_clean);

    let voiced: Vec<f32> = f0_clean.iter().copied().filter(|&f| f > 0.0).collect();
    let (min_f0, max_f0) = if voiced.is_empty() {
        // Silent / unvoiced clip: assume a generic speech range.
        (100.0, 300.0)
    } else {
        let min = voiced.iter().copied().fold(f32::INFINITY, f32::min);
        let max = voiced.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max == min { (min, max + 1.0) } else { (min, max) }
    };

    // Short-time magnitude spectrum for harmonic envelope extraction.
    let spectrogram = stft_magnitude(&samples, n_frames);

    // One amplitude envelope per harmonic, interpolated to sample rate.
    let amplitudes: Vec<Vec<f32>> = (1..=n_waves)
        .map(|harmonic_num| {
            extract_harmonic_amp(
                &spectrogram,
                &f0_clean,
                harmonic_num as f32,
                sr,
                &times_samples,
                &times_frames,
            )
        })
        .collect();

    // Synthesise one wave per target slot, pitch contour rescaled into the
    // slot's band.
    let raw_waves: Vec<Vec<f32>> = amplitudes
        .iter()
        .zip(target_slots)
        .map(|(amp, &slot)| {
            synthesize_in_range(&f0_interp, min_f0, max_f0, slot_freq_range(slot), amp, sr)
        })
        .collect();

    let raw_mix = sum_waves(&raw_waves, samples.len());

    // Dynamic amplitude matching: force the mix envelope onto the source's.
    let env_original = rms_envelope(&samples, n_frames);
    let env_mix = rms_envelope(&raw_mix, n_frames);
    let gain_frames: Vec<f32> = env_original
        .iter()
        .zip(&env_mix)
        .map(|(o, m)| (o / (m + 1e-8)).clamp(0.0, GAIN_CLIP))
        .collect();
    let gain_curve = interp(&times_samples, &times_frames, &gain_frames);

    let final_waves: Vec<Vec<f32>> = raw_waves
        .iter()
        .map(|wave| {
            wave.iter()
                .zip(&gain_curve)
                .map(|(w, g)| w * g)
                .collect()
        })
        .collect();
    let mix = sum_waves(&final_waves, samples.len());

    // Reconstruction metrics.
    let mse = samples
        .iter()
        .zip(&mix)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        / samples.len() as f32;
    let rmse = mse.sqrt();
    let nrmse = rmse / (std_dev(&samples) + 1e-10);
    let signal_power = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let snr_db = 10.0 * (signal_power / (mse + 1e-10)).log10();
    let env_mix_final = rms_envelope(&mix, n_frames);
    let env_corr = correlation(&env_original, &env_mix_final);

    // Write one file per track.
    let base_name = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clip")
        .to_string();

    let mut tracks = Vec::with_capacity(n_waves);
    for (i, wave) in final_waves.iter().enumerate() {
        let wave_num = (i + 1) as u8;
        let path = output_dir.join(format!("{base_name}_v3_wave{wave_num}.wav"));
        write_float_wav(&path, wave, processing_sr)?;
        tracks.push(DecomposedTrack {
            wave_num,
            target_slot_id: target_slots[i],
            path,
            freq_range_hz: slot_freq_range(target_slots[i]),
        });
    }

    Ok(DecomposeOutcome {
        tracks,
        rmse,
        nrmse,
        snr_db,
        env_corr,
    })
}

/// Load a WAV as mono f32 in [-1, 1] and resample to `target_sr`.
fn load_mono_resampled(path: &Path, target_sr: u32) -> Result<Vec<f32>, DecomposeError> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| DecomposeError::Read(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| DecomposeError::Read(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| DecomposeError::Read(e.to_string()))?
        }
    };

    let mono: Vec<f32> = if channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(resample_linear(&mono, spec.sample_rate, target_sr))
}

/// Linear-interpolation resampler. The wave bands live below 100 Hz, far
/// under the Nyquist of either rate, so this is plenty.
fn resample_linear(samples: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    if from_sr == to_sr || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_sr as f64 / to_sr as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Frame-wise autocorrelation pitch tracker constrained to C2..C7.
///
/// Returns one f0 value per frame; unvoiced / silent frames are 0.
fn track_pitch(samples: &[f32], sr: f32, n_frames: usize) -> Vec<f32> {
    let lag_min = (sr / PITCH_FMAX).floor().max(2.0) as usize;
    let lag_max = ((sr / PITCH_FMIN).ceil() as usize).min(PITCH_FRAME / 2);

    let mut f0 = vec![0.0f32; n_frames];
    for (frame_idx, f0_out) in f0.iter_mut().enumerate() {
        let start = frame_idx * HOP_LENGTH;
        if start >= samples.len() {
            break;
        }
        let end = (start + PITCH_FRAME).min(samples.len());
        let frame = &samples[start..end];
        if frame.len() < lag_max * 2 {
            continue;
        }

        let energy: f32 = frame.iter().map(|s| s * s).sum();
        if energy / (frame.len() as f32) < 1e-6 {
            continue; // silence
        }

        // Normalised autocorrelation over the allowed lag range.
        let mut best_lag = 0usize;
        let mut best_corr = 0.0f32;
        for lag in lag_min..=lag_max {
            let n = frame.len() - lag;
            let mut dot = 0.0f32;
            let mut norm_a = 0.0f32;
            let mut norm_b = 0.0f32;
            for i in 0..n {
                dot += frame[i] * frame[i + lag];
                norm_a += frame[i] * frame[i];
                norm_b += frame[i + lag] * frame[i + lag];
            }
            let denom = (norm_a * norm_b).sqrt();
            if denom <= 0.0 {
                continue;
            }
            let corr = dot / denom;
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }

        if best_corr >= VOICED_THRESHOLD && best_lag > 0 {
            // Parabolic refinement around the winning lag.
            let refined = if best_lag > lag_min && best_lag < lag_max {
                let y0 = autocorr_at(frame, best_lag - 1);
                let y1 = autocorr_at(frame, best_lag);
                let y2 = autocorr_at(frame, best_lag + 1);
                let denom = y0 - 2.0 * y1 + y2;
                if denom.abs() > 1e-12 {
                    best_lag as f32 + 0.5 * (y0 - y2) / denom
                } else {
                    best_lag as f32
                }
            } else {
                best_lag as f32
            };
            let candidate = sr / refined;
            if (PITCH_FMIN..=PITCH_FMAX).contains(&candidate) {
                *f0_out = candidate;
            }
        }
    }
    f0
}

fn autocorr_at(frame: &[f32], lag: usize) -> f32 {
    let n = frame.len().saturating_sub(lag);
    (0..n).map(|i| frame[i] * frame[i + lag]).sum()
}

/// Centered short-time magnitude spectrum: `n_frames` columns of
/// `N_FFT / 2 + 1` bins, Hann-windowed with reflect padding.
fn stft_magnitude(samples: &[f32], n_frames: usize) -> Vec<Vec<f32>> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N_FFT);
    let mut scratch = fft.make_scratch_vec();
    let mut spectrum = fft.make_output_vec();

    let window: Vec<f32> = (0..N_FFT)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / N_FFT as f32).cos())
        .collect();

    let half = N_FFT / 2;
    let padded_at = |idx: i64| -> f32 {
        // Reflect padding around the signal edges.
        let len = samples.len() as i64;
        if len == 0 {
            return 0.0;
        }
        let reflected = if idx < 0 {
            (-idx).min(len - 1)
        } else if idx >= len {
            (2 * (len - 1) - idx).max(0)
        } else {
            idx
        };
        samples[reflected as usize]
    };

    let mut frames = Vec::with_capacity(n_frames);
    let mut input = vec![0.0f32; N_FFT];
    for frame_idx in 0..n_frames {
        let center = (frame_idx * HOP_LENGTH) as i64;
        for (i, slot) in input.iter_mut().enumerate() {
            *slot = padded_at(center - half as i64 + i as i64) * window[i];
        }
        spectrum.fill(Complex32::new(0.0, 0.0));
        if fft
            .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
            .is_err()
        {
            frames.push(vec![0.0; N_FFT / 2 + 1]);
            continue;
        }
        frames.push(spectrum.iter().map(|c| c.norm()).collect());
    }
    frames
}

/// Pull the amplitude envelope of one harmonic off the spectrogram.
fn extract_harmonic_amp(
    spectrogram: &[Vec<f32>],
    f0_clean: &[f32],
    harmonic_num: f32,
    sr: f32,
    times_samples: &[f32],
    times_frames: &[f32],
) -> Vec<f32> {
    let bin_width = sr / N_FFT as f32;
    let n_bins = N_FFT / 2 + 1;

    let amps: Vec<f32> = f0_clean
        .iter()
        .enumerate()
        .map(|(frame_idx, &f0)| {
            if f0 <= 0.0 {
                return 0.0;
            }
            let bin = ((f0 * harmonic_num / bin_width).round() as usize).min(n_bins - 1);
            spectrogram
                .get(frame_idx)
                .and_then(|frame| frame.get(bin))
                .copied()
                .unwrap_or(0.0)
        })
        .collect();

    interp(times_samples, times_frames, &amps)
        .into_iter()
        .map(|a| a * AMP_NORMALIZATION)
        .collect()
}

/// Synthesise a cosine wave whose frequency follows the pitch contour,
/// linearly rescaled into `(min_freq, max_freq)`.
fn synthesize_in_range(
    f0_interp: &[f32],
    min_f0: f32,
    max_f0: f32,
    freq_range: (f32, f32),
    amplitude_env: &[f32],
    sr: f32,
) -> Vec<f32> {
    let (min_freq, max_freq) = freq_range;
    let span = max_f0 - min_f0;

    let mut phase = 0.0f32;
    f0_interp
        .iter()
        .zip(amplitude_env)
        .map(|(&f0, &amp)| {
            let mapped = if f0 > 0.0 {
                if span > 0.0 {
                    min_freq + (f0 - min_f0) / span * (max_freq - min_freq)
                } else {
                    (min_freq + max_freq) / 2.0
                }
            } else {
                0.0
            };
            phase += 2.0 * PI * mapped / sr;
            amp * phase.cos()
        })
        .collect()
}

fn sum_waves(waves: &[Vec<f32>], len: usize) -> Vec<f32> {
    let mut mix = vec![0.0f32; len];
    for wave in waves {
        for (m, w) in mix.iter_mut().zip(wave) {
            *m += w;
        }
    }
    mix
}

/// Centered RMS envelope on the shared frame grid.
fn rms_envelope(samples: &[f32], n_frames: usize) -> Vec<f32> {
    let half = N_FFT / 2;
    (0..n_frames)
        .map(|frame_idx| {
            let center = frame_idx * HOP_LENGTH;
            let start = center.saturating_sub(half);
            let end = (center + half).min(samples.len());
            if end <= start {
                return 0.0;
            }
            let window = &samples[start..end];
            (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt()
        })
        .collect()
}

/// `np.interp` equivalent: piecewise-linear sampling of `(xp, fp)` at `x`.
/// Assumes `xp` is sorted ascending; clamps outside the range.
fn interp(x: &[f32], xp: &[f32], fp: &[f32]) -> Vec<f32> {
    if xp.is_empty() || fp.is_empty() {
        return vec![0.0; x.len()];
    }
    let n = xp.len().min(fp.len());
    x.iter()
        .map(|&xi| {
            if xi <= xp[0] {
                return fp[0];
            }
            if xi >= xp[n - 1] {
                return fp[n - 1];
            }
            // Binary search for the surrounding segment.
            let mut lo = 0usize;
            let mut hi = n - 1;
            while hi - lo > 1 {
                let mid = (lo + hi) / 2;
                if xp[mid] <= xi {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            let t = (xi - xp[lo]) / (xp[hi] - xp[lo]).max(1e-12);
            fp[lo] + (fp[hi] - fp[lo]) * t
        })
        .collect()
}

fn std_dev(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    (samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / samples.len() as f32).sqrt()
}

fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let a = &a[..n];
    let b = &b[..n];
    let mean_a = a.iter().sum::<f32>() / n as f32;
    let mean_b = b.iter().sum::<f32>() / n as f32;
    let mut cov = 0.0f32;
    let mut var_a = 0.0f32;
    let mut var_b = 0.0f32;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= 1e-12 { 0.0 } else { cov / denom }
}

fn write_float_wav(path: &Path, samples: &[f32], sr: u32) -> Result<(), DecomposeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| DecomposeError::Write(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| DecomposeError::Write(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| DecomposeError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_test_clip(path: &Path, freq: f32, seconds: f32, sr: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: sr,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let n = (seconds * sr as f32) as usize;
        for i in 0..n {
            let t = i as f32 / sr as f32;
            // Amplitude-modulated tone so the envelope has structure.
            let env = 0.4 + 0.3 * (2.0 * PI * 2.0 * t).sin();
            let value = env * (2.0 * PI * freq * t).sin();
            writer.write_sample((value * 16_384.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_slot_freq_ranges_form_a_dome() {
        assert_eq!(slot_freq_range(1), (80.0, 100.0));
        assert_eq!(slot_freq_range(2), (50.0, 70.0));
        assert_eq!(slot_freq_range(3), (20.0, 40.0));
        assert_eq!(slot_freq_range(4), (20.0, 40.0));
        assert_eq!(slot_freq_range(5), (50.0, 70.0));
        assert_eq!(slot_freq_range(6), (80.0, 100.0));
    }

    #[test]
    fn test_decompose_produces_one_track_per_target() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        write_test_clip(&input, 220.0, 0.5, 24_000);

        let out_dir = dir.path().join("waves");
        let outcome =
            decompose_audio_to_waves(&input, &out_dir, &[3, 4], DEFAULT_PROCESSING_SR).unwrap();

        assert_eq!(outcome.tracks.len(), 2);
        assert_eq!(outcome.tracks[0].wave_num, 1);
        assert_eq!(outcome.tracks[0].target_slot_id, 3);
        assert_eq!(outcome.tracks[1].target_slot_id, 4);
        assert!(outcome.tracks[0].path.ends_with("clip_v3_wave1.wav"));
        assert!(outcome.tracks[1].path.ends_with("clip_v3_wave2.wav"));
        for track in &outcome.tracks {
            assert!(track.path.exists());
            assert_eq!(track.freq_range_hz, (20.0, 40.0));
        }
        assert!(outcome.rmse.is_finite());
        assert!(outcome.env_corr.is_finite());
    }

    #[test]
    fn test_decompose_summary_produces_six_tracks() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("summary.wav");
        write_test_clip(&input, 180.0, 0.4, 24_000);

        let out_dir = dir.path().join("waves");
        let outcome = decompose_audio_to_waves(
            &input,
            &out_dir,
            &[1, 2, 3, 4, 5, 6],
            DEFAULT_PROCESSING_SR,
        )
        .unwrap();

        assert_eq!(outcome.tracks.len(), 6);
        let targets: Vec<SlotId> = outcome.tracks.iter().map(|t| t.target_slot_id).collect();
        assert_eq!(targets, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_synthesised_wave_stays_in_slot_band() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        write_test_clip(&input, 220.0, 0.5, 24_000);

        let out_dir = dir.path().join("waves");
        let outcome =
            decompose_audio_to_waves(&input, &out_dir, &[1], DEFAULT_PROCESSING_SR).unwrap();

        // A steady 220 Hz source maps near the middle of the 80-100 Hz band;
        // verify via zero-crossing rate of the written track.
        let mut reader = hound::WavReader::open(&outcome.tracks[0].path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] <= 0.0) != (w[1] <= 0.0))
            .count();
        let seconds = samples.len() as f32 / DEFAULT_PROCESSING_SR as f32;
        let estimated_hz = crossings as f32 / 2.0 / seconds;
        assert!(
            (20.0..=140.0).contains(&estimated_hz),
            "estimated {estimated_hz} Hz outside plausible low band"
        );
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = tempdir().unwrap();
        let result = decompose_audio_to_waves(
            &dir.path().join("nope.wav"),
            dir.path(),
            &[1, 2],
            DEFAULT_PROCESSING_SR,
        );
        assert!(matches!(result, Err(DecomposeError::InputNotFound(_))));
    }

    #[test]
    fn test_gain_curve_is_clipped() {
        // Pure silence would otherwise divide by a near-zero mix envelope.
        let dir = tempdir().unwrap();
        let input = dir.path().join("silence.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&input, spec).unwrap();
        for _ in 0..4_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let outcome = decompose_audio_to_waves(
            &input,
            &dir.path().join("waves"),
            &[1],
            DEFAULT_PROCESSING_SR,
        )
        .unwrap();
        let mut reader = hound::WavReader::open(&outcome.tracks[0].path).unwrap();
        for sample in reader.samples::<f32>() {
            assert!(sample.unwrap().is_finite());
        }
    }

    #[test]
    fn test_interp_matches_endpoints() {
        let xp = vec![0.0, 1.0, 2.0];
        let fp = vec![10.0, 20.0, 40.0];
        let out = interp(&[-1.0, 0.0, 0.5, 1.5, 3.0], &xp, &fp);
        assert_eq!(out[0], 10.0);
        assert_eq!(out[1], 10.0);
        assert!((out[2] - 15.0).abs() < 1e-6);
        assert!((out[3] - 30.0).abs() < 1e-6);
        assert_eq!(out[4], 40.0);
    }

    #[test]
    fn test_pitch_tracker_finds_steady_tone() {
        let sr = 8_000.0;
        let n = 8_000usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 220.0 * i as f32 / sr).sin() * 0.5)
            .collect();
        let n_frames = n / HOP_LENGTH + 1;
        let f0 = track_pitch(&samples, sr, n_frames);
        let voiced: Vec<f32> = f0.into_iter().filter(|&f| f > 0.0).collect();
        assert!(!voiced.is_empty());
        let mean = voiced.iter().sum::<f32>() / voiced.len() as f32;
        assert!(
            (mean - 220.0).abs() < 15.0,
            "expected ~220 Hz, estimated {mean}"
        );
    }
}
