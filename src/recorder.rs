use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::ListenConfig;
use crate::error::BoxError;

/// How often the endpointer looks at the input level.
const TICK: Duration = Duration::from_millis(80);

/// Sample rate whisper expects.
pub const WHISPER_RATE: u32 = 16_000;

/// Start capturing audio from the default input device.
/// Samples are appended to the shared buffer at ~16kHz mono f32.
/// Drop the returned `Stream` to stop recording.
pub fn start_capture(buffer: Arc<Mutex<Vec<f32>>>) -> Result<(cpal::Stream, u32), BoxError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or("No input device found")?;

    log::info!("Input device: {:?}", device.description());

    let supported_configs: Vec<_> = device.supported_input_configs()?.collect();

    // Try to find a config that supports 16kHz mono
    let target_rate = WHISPER_RATE;
    let desired = supported_configs.iter().find(|c| {
        c.channels() == 1
            && c.min_sample_rate() <= target_rate
            && c.max_sample_rate() >= target_rate
            && c.sample_format() == cpal::SampleFormat::F32
    });

    let (config, native_rate, downsample_factor) = if let Some(cfg) = desired {
        let config = cfg.with_sample_rate(target_rate).config();
        (config, WHISPER_RATE, 1usize)
    } else {
        // Fall back to default config, downsample later
        let default_config = device.default_input_config()?;
        let rate = default_config.sample_rate();
        let factor = (rate / WHISPER_RATE).max(1) as usize;
        let actual_rate = rate / factor as u32;
        log::info!("Using native rate {rate}Hz, downsampling by {factor}x to ~{actual_rate}Hz");
        (default_config.config(), actual_rate, factor)
    };

    let channels = config.channels as usize;

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let Ok(mut buf) = buffer.lock() else {
                return;
            };
            for (i, chunk) in data.chunks(channels).enumerate() {
                if i % downsample_factor == 0 {
                    let mono = chunk.iter().sum::<f32>() / channels as f32;
                    buf.push(mono);
                }
            }
        },
        |err| log::error!("Input stream error: {err}"),
        None,
    )?;

    stream.play()?;
    Ok((stream, native_rate))
}

/// RMS of the last ~1280 samples in the buffer.
pub fn compute_rms(buffer: &Mutex<Vec<f32>>) -> f32 {
    let buf = buffer.lock().unwrap_or_else(|e| e.into_inner());
    rms_tail(&buf, 1280)
}

fn rms_tail(samples: &[f32], window: usize) -> f32 {
    let n = samples.len().min(window);
    if n == 0 {
        return 0.0;
    }
    let start = samples.len() - n;
    let sum_sq: f32 = samples[start..].iter().map(|&s| s * s).sum();
    (sum_sq / n as f32).sqrt()
}

/// Linear resample from `from_rate` to `to_rate`.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

/// Decision after each level reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Continue,
    /// Speech was heard and has ended (or hit the length cap).
    Finished,
    /// Nothing was said before the timeout.
    NoSpeech,
}

/// Decides when a spoken utterance is over from input levels.
#[derive(Debug, Clone)]
pub struct Endpointer {
    threshold: f32,
    silence: Duration,
    no_speech_timeout: Duration,
    max_utterance: Duration,
    last_voice: Option<Duration>,
}

impl Endpointer {
    pub fn new(config: &ListenConfig) -> Self {
        Self {
            threshold: config.speech_threshold,
            silence: Duration::from_millis(config.silence_ms),
            no_speech_timeout: Duration::from_millis(config.no_speech_timeout_ms),
            max_utterance: Duration::from_millis(config.max_utterance_ms),
            last_voice: None,
        }
    }

    /// Feed the level measured `elapsed` after capture started.
    pub fn update(&mut self, rms: f32, elapsed: Duration) -> Endpoint {
        if rms >= self.threshold {
            self.last_voice = Some(elapsed);
        }

        match self.last_voice {
            None if elapsed >= self.no_speech_timeout.min(self.max_utterance) => Endpoint::NoSpeech,
            None => Endpoint::Continue,
            Some(_) if elapsed >= self.max_utterance => Endpoint::Finished,
            Some(at) if elapsed.saturating_sub(at) >= self.silence => Endpoint::Finished,
            Some(_) => Endpoint::Continue,
        }
    }
}

/// Record one utterance from the default microphone. Blocks; run it on a
/// blocking thread.
///
/// Returns the samples and their rate, or `None` if nothing was said or
/// `stop` was raised.
pub fn record_utterance(
    config: &ListenConfig,
    stop: &AtomicBool,
) -> Result<Option<(Vec<f32>, u32)>, BoxError> {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let (stream, sample_rate) = start_capture(buffer.clone())?;

    let mut endpointer = Endpointer::new(config);
    let started = Instant::now();
    let outcome = loop {
        if stop.load(Ordering::Relaxed) {
            log::info!("Recording stopped early");
            break Endpoint::NoSpeech;
        }
        std::thread::sleep(TICK);
        match endpointer.update(compute_rms(&buffer), started.elapsed()) {
            Endpoint::Continue => {}
            done => break done,
        }
    };
    drop(stream);

    if outcome == Endpoint::NoSpeech {
        return Ok(None);
    }

    let samples = std::mem::take(&mut *buffer.lock().unwrap_or_else(|e| e.into_inner()));
    log::info!(
        "Captured {} samples ({:.1}s at {}Hz)",
        samples.len(),
        samples.len() as f32 / sample_rate as f32,
        sample_rate
    );
    Ok((!samples.is_empty()).then_some((samples, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn config() -> ListenConfig {
        ListenConfig {
            speech_threshold: 0.1,
            silence_ms: 500,
            no_speech_timeout_ms: 2_000,
            max_utterance_ms: 5_000,
            ..ListenConfig::default()
        }
    }

    #[test]
    fn rms_of_constant_signal() {
        assert_eq!(rms_tail(&[], 10), 0.0);
        let rms = rms_tail(&[0.5; 100], 10);
        assert!((rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rms_only_looks_at_the_tail() {
        let mut samples = vec![1.0; 50];
        samples.extend([0.0; 10]);
        assert_eq!(rms_tail(&samples, 10), 0.0);
    }

    #[test]
    fn resample_keeps_duration() {
        // 22.05 kHz is what integer downsampling leaves from a 44.1 kHz device.
        let input = vec![0.25; 22_050];
        let out = resample(&input, 22_050, WHISPER_RATE);
        assert_eq!(out.len(), 16_000);
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn resample_interpolates_between_samples() {
        let out = resample(&[0.0, 1.0, 2.0, 3.0], 4, 2);
        assert_eq!(out, vec![0.0, 2.0]);

        let up = resample(&[0.0, 1.0], 1, 2);
        assert_eq!(up, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn resample_at_target_rate_is_identity() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&input, WHISPER_RATE, WHISPER_RATE), input);
    }

    #[test]
    fn silence_times_out_as_no_speech() {
        let mut ep = Endpointer::new(&config());
        assert_eq!(ep.update(0.0, ms(1_000)), Endpoint::Continue);
        assert_eq!(ep.update(0.0, ms(2_000)), Endpoint::NoSpeech);
    }

    #[test]
    fn trailing_silence_ends_utterance() {
        let mut ep = Endpointer::new(&config());
        assert_eq!(ep.update(0.3, ms(100)), Endpoint::Continue);
        assert_eq!(ep.update(0.3, ms(400)), Endpoint::Continue);
        assert_eq!(ep.update(0.0, ms(800)), Endpoint::Continue);
        assert_eq!(ep.update(0.0, ms(900)), Endpoint::Finished);
    }

    #[test]
    fn speech_after_quiet_start_resets_the_timeout() {
        let mut ep = Endpointer::new(&config());
        assert_eq!(ep.update(0.0, ms(1_900)), Endpoint::Continue);
        assert_eq!(ep.update(0.5, ms(1_950)), Endpoint::Continue);
        assert_eq!(ep.update(0.0, ms(2_100)), Endpoint::Continue);
    }

    #[test]
    fn long_speech_is_capped() {
        let mut ep = Endpointer::new(&config());
        assert_eq!(ep.update(0.5, ms(4_900)), Endpoint::Continue);
        assert_eq!(ep.update(0.5, ms(5_000)), Endpoint::Finished);
    }
}
