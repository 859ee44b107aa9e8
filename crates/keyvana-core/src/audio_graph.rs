use crate::audio_params::AudioParams;
use keyvana_ports::audio::{AudioRenderCallback, ScheduledEvent};
use keyvana_ports::midi::MidiLikeEvent;
use keyvana_ports::synth::SynthPort;
use keyvana_ports::types::{Bus, SampleTime};
use rtrb::Consumer;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Sample counter advanced by the render callback: the next sample it will
/// produce.
pub struct AudioClock {
    sample_time: AtomicU64,
}

impl AudioClock {
    pub fn new() -> Self {
        Self {
            sample_time: AtomicU64::new(0),
        }
    }

    pub fn set(&self, sample_time: SampleTime) {
        self.sample_time.store(sample_time, Ordering::Relaxed);
    }

    pub fn get(&self) -> SampleTime {
        self.sample_time.load(Ordering::Relaxed)
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AudioGraph {
    synth: Arc<dyn SynthPort>,
    params: Arc<AudioParams>,
    clock: Arc<AudioClock>,
    consumer: Consumer<ScheduledEvent>,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
    events: Vec<ScheduledEvent>,
    // events popped from the queue that belong to a later buffer
    waiting: Vec<ScheduledEvent>,
    limiter_gain: f32,
}

impl AudioGraph {
    pub fn new(
        synth: Arc<dyn SynthPort>,
        params: Arc<AudioParams>,
        consumer: Consumer<ScheduledEvent>,
        clock: Arc<AudioClock>,
        max_frames: usize,
    ) -> Self {
        Self {
            synth,
            params,
            clock,
            consumer,
            scratch_l: vec![0.0; max_frames],
            scratch_r: vec![0.0; max_frames],
            events: Vec::with_capacity(512),
            waiting: Vec::with_capacity(512),
            limiter_gain: 1.0,
        }
    }

    /// Clicks are queued ahead of time while user notes are queued for "now",
    /// so the queue is not in time order: drain it all and keep what is not
    /// due yet.
    fn collect_events(&mut self, sample_time_end: SampleTime) {
        self.events.clear();

        while let Ok(event) = self.consumer.pop() {
            self.waiting.push(event);
        }

        let mut idx = 0;
        while idx < self.waiting.len() {
            if self.waiting[idx].sample_time < sample_time_end {
                self.events.push(self.waiting.swap_remove(idx));
            } else {
                idx += 1;
            }
        }

        self.events
            .sort_by_key(|event| (event.sample_time, event_order(&event.event)));
    }

    fn should_drop(&self, event: &ScheduledEvent, click_epoch: u32, muted: bool) -> bool {
        if !matches!(event.event, MidiLikeEvent::NoteOn { .. }) {
            return false;
        }
        muted || (event.bus == Bus::MetronomeFx && event.epoch != click_epoch)
    }

    fn ensure_scratch(&mut self, frames: usize) {
        if self.scratch_l.len() < frames {
            self.scratch_l.resize(frames, 0.0);
            self.scratch_r.resize(frames, 0.0);
        }
    }

    fn render_segment(&mut self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        out_l.fill(0.0);
        out_r.fill(0.0);

        let master = self.params.master();
        for bus in Bus::ALL {
            let gain = self.params.bus(bus) * master;
            let scratch_l = &mut self.scratch_l[..frames];
            let scratch_r = &mut self.scratch_r[..frames];
            self.synth.render(bus, frames, scratch_l, scratch_r);
            mix_into(out_l, scratch_l, gain);
            mix_into(out_r, scratch_r, gain);
        }

        let peak = out_l
            .iter()
            .chain(out_r.iter())
            .fold(0.0_f32, |acc, s| acc.max(s.abs()));
        self.limiter_gain = limiter_step(self.limiter_gain, peak);
        if self.limiter_gain < 0.999 {
            let gain = self.limiter_gain;
            out_l.iter_mut().chain(out_r.iter_mut()).for_each(|s| *s *= gain);
        }
    }
}

const LIMIT: f32 = 0.98;

fn mix_into(out: &mut [f32], bus: &[f32], gain: f32) {
    for (dst, src) in out.iter_mut().zip(bus) {
        *dst += src * gain;
    }
}

/// Fast attack, slow release towards the gain that keeps `peak` under LIMIT.
fn limiter_step(current: f32, peak: f32) -> f32 {
    let target = if peak > LIMIT { LIMIT / peak } else { 1.0 };
    let coeff = if target < current { 0.25 } else { 0.01 };
    (current + coeff * (target - current)).clamp(0.0, 1.0)
}

/// Same-sample ordering: pedal down, note-offs, note-ons, pedal up.
fn event_order(event: &MidiLikeEvent) -> (u8, u8) {
    match *event {
        MidiLikeEvent::Cc64 { value } if value >= 64 => (0, 0),
        MidiLikeEvent::NoteOff { note } => (1, note),
        MidiLikeEvent::NoteOn { note, .. } => (2, note),
        MidiLikeEvent::Cc64 { .. } => (3, 0),
    }
}

impl AudioRenderCallback for AudioGraph {
    fn render(&mut self, sample_time_start: SampleTime, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len());
        let sample_time_end = sample_time_start.saturating_add(frames as u64);

        self.ensure_scratch(frames);
        self.collect_events(sample_time_end);

        let click_epoch = self.params.click_epoch();
        let muted = self.params.muted();
        let mut cursor_sample = sample_time_start;
        let mut cursor_frame = 0usize;

        let events_len = self.events.len();
        for idx in 0..events_len {
            let event = self.events[idx];
            if self.should_drop(&event, click_epoch, muted) {
                continue;
            }

            // late events (queued for a sample already rendered) play at once
            let event_sample = event.sample_time.max(cursor_sample);
            let event_frame = (event_sample - cursor_sample) as usize;
            if event_frame > 0 {
                let end = cursor_frame + event_frame;
                self.render_segment(
                    event_frame,
                    &mut out_l[cursor_frame..end],
                    &mut out_r[cursor_frame..end],
                );
                cursor_frame = end;
                cursor_sample = event_sample;
            }
            self.synth.handle_event(event.bus, event.event, event_sample);
        }

        if cursor_frame < frames {
            self.render_segment(
                frames - cursor_frame,
                &mut out_l[cursor_frame..frames],
                &mut out_r[cursor_frame..frames],
            );
        }

        self.clock.set(sample_time_end);
    }
}
