use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::BoxError;

const BEEP_SECS: f32 = 0.15;

/// Audible cue around voice capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Microphone opened: ascending 600→900 Hz
    ListenStart,
    /// Microphone closed: descending 900→600 Hz
    ListenStop,
}

impl Cue {
    fn sweep(self) -> (f32, f32) {
        match self {
            Cue::ListenStart => (600.0, 900.0),
            Cue::ListenStop => (900.0, 600.0),
        }
    }
}

/// Play a cue. Spawns a thread and returns immediately.
pub fn play_cue(cue: Cue) {
    std::thread::spawn(move || {
        if let Err(e) = play_cue_blocking(cue) {
            log::warn!("Cue failed: {e}");
        }
    });
}

/// Faded frequency sweep for `cue` at `sample_rate`.
fn cue_samples(cue: Cue, sample_rate: f32) -> Vec<f32> {
    let total = (sample_rate * BEEP_SECS) as usize;
    let (freq_start, freq_end) = cue.sweep();

    (0..total)
        .map(|i| {
            let t = i as f32 / sample_rate;
            let progress = i as f32 / total as f32;
            let freq = freq_start + (freq_end - freq_start) * progress;
            let envelope = 1.0 - progress;
            (2.0 * PI * freq * t).sin() * envelope * 0.3
        })
        .collect()
}

fn play_cue_blocking(cue: Cue) -> Result<(), BoxError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("No output device found")?;
    let config = device.default_output_config()?;
    let channels = config.channels() as usize;

    let samples = Arc::new(cue_samples(cue, config.sample_rate() as f32));
    let position = Arc::new(AtomicUsize::new(0));

    let stream = {
        let samples = samples.clone();
        let position = position.clone();
        device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut idx = position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let value = samples.get(idx).copied().unwrap_or(0.0);
                    frame.fill(value);
                    idx += 1;
                }
                position.store(idx, Ordering::Relaxed);
            },
            |err| log::error!("Audio output error: {err}"),
            None,
        )?
    };

    stream.play()?;

    // Wait for playback to finish + small buffer
    std::thread::sleep(std::time::Duration::from_millis(200));

    drop(stream);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_fades_out() {
        let samples = cue_samples(Cue::ListenStart, 16_000.0);
        assert_eq!(samples.len(), 2_400);
        assert!(samples.iter().all(|s| s.abs() <= 0.3));
        let tail = samples[samples.len() - 10..].iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(tail < 0.01);
    }

    #[test]
    fn start_and_stop_sweep_opposite_ways() {
        assert_eq!(Cue::ListenStart.sweep(), (600.0, 900.0));
        assert_eq!(Cue::ListenStop.sweep(), (900.0, 600.0));
    }
}
