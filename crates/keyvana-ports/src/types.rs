use serde::{Deserialize, Serialize};
use std::fmt;

pub type SampleTime = u64; // audio sample index, monotonic while stream running

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bus {
    UserMonitor,
    MetronomeFx,
}

impl Bus {
    pub const ALL: [Bus; 2] = [Bus::UserMonitor, Bus::MetronomeFx];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiInputDevice {
    pub id: DeviceId,
    pub name: String,
    pub is_available: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioOutputDevice {
    pub id: DeviceId,
    pub name: String,
    pub default_config: AudioConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub channels: u16, // fixed 2
    pub buffer_size_frames: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 48_000,
            channels: 2,
            buffer_size_frames: None,
        }
    }
}

/// A reading of the audio clock: the next sample the render callback will
/// produce, and the rate it runs at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub sample_time: SampleTime,
    pub sample_rate_hz: u32,
}

impl ClockTime {
    pub fn samples_for_ms(&self, ms: f64) -> f64 {
        ms * self.sample_rate_hz as f64 / 1000.0
    }

    pub fn as_millis(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.sample_time as f64 * 1000.0 / self.sample_rate_hz as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Volume01(pub f32);

impl Volume01 {
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
