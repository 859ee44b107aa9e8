use keyvana_ports::audio::AudioError;
use keyvana_ports::types::{ClockTime, SampleTime};
use serde::{Deserialize, Serialize};

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 200;
pub const BPM_STEP: i32 = 5;
pub const BEATS_PER_BAR: u64 = 4;

/// How far ahead of the audio clock clicks are queued.
pub const LOOKAHEAD_MS: f64 = 100.0;
/// Gap between `start` and the first click, so it is not already late.
pub const START_DELAY_MS: f64 = 50.0;

#[derive(thiserror::Error, Debug)]
pub enum MetronomeError {
    #[error("audio clock could not be started: {0}")]
    ClockStart(#[from] AudioError),
    #[error("audio clock not running")]
    ClockNotRunning,
}

pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

pub fn nudge(bpm: u32, delta: i32) -> u32 {
    let nudged = (bpm as i64 + delta as i64).clamp(MIN_BPM as i64, MAX_BPM as i64);
    nudged as u32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleHandle(pub u64);

/// One beat, scheduled on the audio clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub beat: u64,
    pub sample_time: SampleTime,
    pub accent: bool,
}

#[derive(Clone, Debug)]
struct Run {
    handle: ScheduleHandle,
    sample_rate_hz: u32,
    // beat `anchor_beat` sits at `anchor_sample`; later beats are derived from
    // it so rounding never accumulates
    anchor_sample: f64,
    anchor_beat: u64,
    interval: f64,
    next_beat: u64,
}

impl Run {
    fn sample_of(&self, beat: u64) -> f64 {
        self.anchor_sample + (beat - self.anchor_beat) as f64 * self.interval
    }
}

fn interval_samples(bpm: u32, sample_rate_hz: u32) -> f64 {
    sample_rate_hz as f64 * 60.0 / bpm as f64
}

/// Repeating beat schedule against the audio clock.
///
/// The clock does no I/O: the owner polls it with the current clock reading
/// and forwards the returned clicks to the audio trigger.
#[derive(Clone, Debug)]
pub struct MetronomeClock {
    bpm: u32,
    run: Option<Run>,
    next_handle: u64,
}

impl MetronomeClock {
    pub fn new(bpm: u32) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            run: None,
            next_handle: 1,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn handle(&self) -> Option<ScheduleHandle> {
        self.run.as_ref().map(|run| run.handle)
    }

    /// Start ticking at `bpm`. Already running: retune and keep the handle.
    pub fn start(&mut self, bpm: u32, now: ClockTime) -> ScheduleHandle {
        if let Some(handle) = self.handle() {
            self.set_bpm(bpm);
            return handle;
        }

        self.bpm = clamp_bpm(bpm);
        let handle = ScheduleHandle(self.next_handle);
        self.next_handle += 1;
        self.run = Some(Run {
            handle,
            sample_rate_hz: now.sample_rate_hz,
            anchor_sample: now.sample_time as f64 + now.samples_for_ms(START_DELAY_MS),
            anchor_beat: 0,
            interval: interval_samples(self.bpm, now.sample_rate_hz),
            next_beat: 0,
        });
        handle
    }

    /// Change the tempo. While running, the next beat is placed one new
    /// interval after the last beat already handed out.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = clamp_bpm(bpm);
        let bpm = self.bpm;
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.next_beat > run.anchor_beat {
            let last = run.next_beat - 1;
            run.anchor_sample = run.sample_of(last);
            run.anchor_beat = last;
        }
        run.interval = interval_samples(bpm, run.sample_rate_hz);
    }

    pub fn stop(&mut self) -> Option<ScheduleHandle> {
        self.run.take().map(|run| run.handle)
    }

    /// Hand out every beat due before `now + LOOKAHEAD_MS`. Beats that are
    /// already in the past are skipped, not played late.
    pub fn poll(&mut self, now: ClockTime) -> Vec<Click> {
        let mut clicks = Vec::new();
        let Some(run) = self.run.as_mut() else {
            return clicks;
        };

        let horizon = now.sample_time as f64 + now.samples_for_ms(LOOKAHEAD_MS);
        loop {
            let at = run.sample_of(run.next_beat);
            if at >= horizon {
                break;
            }
            let beat = run.next_beat;
            run.next_beat += 1;
            let sample_time = at.round() as SampleTime;
            if sample_time < now.sample_time {
                log::debug!("metronome beat {beat} missed");
                continue;
            }
            clicks.push(Click {
                beat,
                sample_time,
                accent: beat % BEATS_PER_BAR == 0,
            });
        }
        clicks
    }
}

impl Default for MetronomeClock {
    fn default() -> Self {
        Self::new(keyvana_ports::DEFAULT_METRONOME_BPM)
    }
}
