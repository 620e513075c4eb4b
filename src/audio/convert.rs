//! Down-mixing and resampling to the recognizer's input format.
//!
//! Whisper wants **16 kHz mono `f32`**.  The microphone delivers whatever
//! the device prefers (commonly 44.1/48 kHz stereo), so every chunk goes
//! through [`to_mono_16k`] before endpointing and transcription.

/// Sample rate expected by the recognizer.
pub const TARGET_RATE: u32 = 16_000;

/// Average interleaved channels into one.  `channels == 0` yields nothing.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Linear-interpolation resample from `source_rate` to [`TARGET_RATE`].
pub fn resample(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == TARGET_RATE || source_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = TARGET_RATE as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}

/// Convenience: [`downmix`] then [`resample`].
pub fn to_mono_16k(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<f32> {
    resample(&downmix(samples, channels), sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_stereo_averages_frames() {
        let out = downmix(&[1.0, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels_is_empty() {
        assert!(downmix(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn resample_48k_output_length() {
        // 10 ms @ 48 kHz → 10 ms @ 16 kHz
        assert_eq!(resample(&vec![0.5; 480], 48_000).len(), 160);
    }

    #[test]
    fn resample_upsamples_8k() {
        assert_eq!(resample(&vec![0.0; 80], 8_000).len(), 160);
    }

    #[test]
    fn resample_keeps_dc_level() {
        for s in resample(&vec![0.5; 441], 44_100) {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn to_mono_16k_combines_both_steps() {
        // 10 ms of 48 kHz stereo
        let out = to_mono_16k(&vec![0.25; 960], 48_000, 2);
        assert_eq!(out.len(), 160);
        assert!((out[0] - 0.25).abs() < 1e-6);
    }
}
