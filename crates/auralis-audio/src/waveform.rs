//! Procedural waveforms and file decoding.
//!
//! Produces the [`SampleData`] that backs an audio buffer, either by
//! synthesising one of the supported wave shapes or by decoding a file with
//! rodio's decoder.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rodio::{Decoder, Source};
use tracing::debug;

use crate::buffer::{BufferError, BufferResult};
use crate::engine::SampleData;

/// Sample rate used for synthesised waveforms.
pub const WAVEFORM_SAMPLE_RATE: u32 = 44_100;

/// Longest waveform that may be synthesised, in seconds.
pub const MAX_WAVEFORM_SECONDS: f32 = 600.0;

/// Supported procedural wave shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WaveShape {
    /// Sine wave.
    Sine = 1,
    /// Square wave.
    Square = 2,
    /// Sawtooth wave.
    Sawtooth = 3,
    /// White noise.
    WhiteNoise = 4,
    /// One impulse per cycle.
    Impulse = 5,
}

impl WaveShape {
    /// Parse from the numeric wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Sine),
            2 => Some(Self::Square),
            3 => Some(Self::Sawtooth),
            4 => Some(Self::WhiteNoise),
            5 => Some(Self::Impulse),
            _ => None,
        }
    }

    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Lowercase name used in buffer keys.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Square => "square",
            Self::Sawtooth => "sawtooth",
            Self::WhiteNoise => "whitenoise",
            Self::Impulse => "impulse",
        }
    }
}

impl fmt::Display for WaveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of a procedural buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformSpec {
    /// Wave shape.
    pub shape: WaveShape,
    /// Frequency in Hz.
    pub frequency: f32,
    /// Phase shift in degrees, -180 to 180.
    pub phase: f32,
    /// Duration in seconds.
    pub duration: f32,
}

impl WaveformSpec {
    /// Create a waveform description.
    #[must_use]
    pub const fn new(shape: WaveShape, frequency: f32, phase: f32, duration: f32) -> Self {
        Self {
            shape,
            frequency,
            phase,
            duration,
        }
    }

    /// Check the parameters can be synthesised.
    pub fn validate(&self) -> BufferResult<()> {
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(BufferError::InvalidWaveform(format!(
                "frequency must be positive, got {}",
                self.frequency
            )));
        }
        if !self.phase.is_finite() || !(-180.0..=180.0).contains(&self.phase) {
            return Err(BufferError::InvalidWaveform(format!(
                "phase must be within -180..180 degrees, got {}",
                self.phase
            )));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 || self.duration > MAX_WAVEFORM_SECONDS
        {
            return Err(BufferError::InvalidWaveform(format!(
                "duration must be within 0..{MAX_WAVEFORM_SECONDS} seconds, got {}",
                self.duration
            )));
        }
        Ok(())
    }

    /// Cache key identifying this waveform.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "waveform:{}:{}:{}:{}",
            self.shape, self.frequency, self.phase, self.duration
        )
    }

    /// Synthesise mono samples at [`WAVEFORM_SAMPLE_RATE`].
    pub fn synthesize(&self) -> BufferResult<SampleData> {
        self.validate()?;

        let rate = f64::from(WAVEFORM_SAMPLE_RATE);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frames = (f64::from(self.duration) * rate).round().max(1.0) as usize;
        let frequency = f64::from(self.frequency);
        let phase = f64::from(self.phase) / 360.0;

        let mut samples = Vec::with_capacity(frames);
        let mut last_cycle = None;
        for i in 0..frames {
            let t = i as f64 / rate;
            let cycle_pos = frequency * t + phase;
            let p = cycle_pos - cycle_pos.floor();

            let sample = match self.shape {
                WaveShape::Sine => (std::f64::consts::TAU * p).sin(),
                WaveShape::Square => {
                    if p < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                },
                WaveShape::Sawtooth => 2.0 * p - 1.0,
                WaveShape::WhiteNoise => fastrand::f64() * 2.0 - 1.0,
                WaveShape::Impulse => {
                    let cycle = cycle_pos.floor();
                    let fired = last_cycle != Some(cycle);
                    last_cycle = Some(cycle);
                    if fired {
                        1.0
                    } else {
                        0.0
                    }
                },
            };
            #[allow(clippy::cast_possible_truncation)]
            samples.push(sample as f32);
        }

        debug!("Synthesised {} waveform: {} frames", self.shape, frames);
        Ok(SampleData::new(samples, WAVEFORM_SAMPLE_RATE, 1))
    }
}

/// Decode an audio file into interleaved f32 samples.
pub fn decode_file(path: &Path) -> BufferResult<SampleData> {
    let load_failed = |message: String| BufferError::LoadFailed {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| load_failed(e.to_string()))?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| load_failed(e.to_string()))?;

    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

    let data = SampleData::new(samples, sample_rate, channels);
    if !data.is_playable() {
        return Err(load_failed("file contains no audio".to_string()));
    }
    debug!("Decoded {:?}: {} frames", path, data.frame_count());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_codes() {
        for code in 1..=5 {
            let shape = WaveShape::from_code(code).expect("known code");
            assert_eq!(shape.code(), code);
        }
        assert!(WaveShape::from_code(0).is_none());
        assert!(WaveShape::from_code(6).is_none());
    }

    #[test]
    fn test_sine_synthesis() {
        let spec = WaveformSpec::new(WaveShape::Sine, 440.0, 0.0, 2.0);
        let data = spec.synthesize().expect("valid waveform");
        assert_eq!(data.sample_rate, WAVEFORM_SAMPLE_RATE);
        assert_eq!(data.channels, 1);
        assert_eq!(data.frame_count(), 88_200);
        assert!(data.samples[0].abs() < 1e-6);
        assert!(data.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_phase_shift() {
        let spec = WaveformSpec::new(WaveShape::Sine, 100.0, 90.0, 0.1);
        let data = spec.synthesize().expect("valid waveform");
        assert!((data.samples[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_square_and_sawtooth_ranges() {
        let square = WaveformSpec::new(WaveShape::Square, 10.0, 0.0, 0.5)
            .synthesize()
            .expect("square");
        assert!(square.samples.iter().all(|s| (s.abs() - 1.0).abs() < f32::EPSILON));

        let saw = WaveformSpec::new(WaveShape::Sawtooth, 10.0, 0.0, 0.5)
            .synthesize()
            .expect("sawtooth");
        assert!((saw.samples[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_impulse_fires_once_per_cycle() {
        let data = WaveformSpec::new(WaveShape::Impulse, 10.0, 0.0, 1.0)
            .synthesize()
            .expect("impulse");
        let impulses = data.samples.iter().filter(|s| **s > 0.5).count();
        assert_eq!(impulses, 10);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(WaveformSpec::new(WaveShape::Sine, 0.0, 0.0, 1.0).validate().is_err());
        assert!(WaveformSpec::new(WaveShape::Sine, 440.0, 200.0, 1.0).validate().is_err());
        assert!(WaveformSpec::new(WaveShape::Sine, 440.0, 0.0, 0.0).validate().is_err());
        assert!(WaveformSpec::new(WaveShape::Sine, 440.0, 0.0, f32::NAN).validate().is_err());
        assert!(WaveformSpec::new(WaveShape::Sine, 440.0, 0.0, 1000.0).validate().is_err());
    }

    #[test]
    fn test_keys_distinguish_parameters() {
        let a = WaveformSpec::new(WaveShape::Sine, 440.0, 0.0, 2.0);
        let b = WaveformSpec::new(WaveShape::Sine, 440.0, 0.0, 3.0);
        let c = WaveformSpec::new(WaveShape::Square, 440.0, 0.0, 2.0);
        assert_eq!(a.key(), "waveform:sine:440:0:2");
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_decode_missing_file() {
        let result = decode_file(Path::new("definitely/not/here.wav"));
        assert!(matches!(result, Err(BufferError::LoadFailed { .. })));
    }

    #[test]
    fn test_decode_garbage_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"not really audio").expect("write");
        assert!(decode_file(&path).is_err());
    }
}
