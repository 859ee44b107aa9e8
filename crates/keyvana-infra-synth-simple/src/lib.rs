use keyvana_ports::midi::MidiLikeEvent;
use keyvana_ports::synth::{SoundFontInfo, SynthError, SynthPort};
use keyvana_ports::types::{Bus, SampleTime};
use parking_lot::Mutex;
use std::f32::consts::TAU;

/// Click length and envelope rate: a sine that dies out within ~50 ms.
const CLICK_SECONDS: f32 = 0.05;
const CLICK_DECAY: f32 = 40.0;

/// Oscillator synth with no assets: soft tones for the user's notes and a
/// percussive click on the metronome bus.
pub struct SimpleSynth {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    sample_rate_hz: f32,
    max_voices: usize,
    buses: [BusState; 2],
}

#[derive(Clone, Debug)]
struct BusState {
    sustain_down: bool,
    voices: Vec<Voice>,
    note_counter: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VoiceKind {
    Tone,
    Click,
}

#[derive(Clone, Debug)]
struct Voice {
    kind: VoiceKind,
    note: u8,
    freq: f32,
    phase: f32,
    velocity: f32,
    key_down: bool,
    sustained: bool,
    release_samples_left: u32,
    release_total_samples: u32,
    elapsed_samples: u32,
    age: u64,
}

impl Voice {
    fn is_alive(&self, click_samples: u32) -> bool {
        match self.kind {
            VoiceKind::Tone => self.key_down || self.sustained || self.release_samples_left > 0,
            VoiceKind::Click => self.elapsed_samples < click_samples,
        }
    }
}

impl SimpleSynth {
    pub fn new(sample_rate_hz: u32, max_voices: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sample_rate_hz: sample_rate_hz as f32,
                max_voices: max_voices.max(8),
                buses: [BusState::new(), BusState::new()],
            }),
        }
    }

    /// Voices still sounding on `bus`.
    pub fn active_voices(&self, bus: Bus) -> usize {
        let inner = self.inner.lock();
        inner.buses[Inner::bus_index(bus)].voices.len()
    }
}

impl Default for SimpleSynth {
    fn default() -> Self {
        Self::new(48_000, 64)
    }
}

impl Inner {
    fn bus_index(bus: Bus) -> usize {
        match bus {
            Bus::UserMonitor => 0,
            Bus::MetronomeFx => 1,
        }
    }

    fn click_samples(&self) -> u32 {
        (self.sample_rate_hz * CLICK_SECONDS) as u32
    }

    fn note_on(&mut self, bus: Bus, note: u8, velocity: u8) {
        let kind = match bus {
            Bus::UserMonitor => VoiceKind::Tone,
            Bus::MetronomeFx => VoiceKind::Click,
        };
        let release_total_samples = ((self.sample_rate_hz * 0.2) as u32).max(1);
        let state = &mut self.buses[Self::bus_index(bus)];
        state.note_counter = state.note_counter.wrapping_add(1);

        if state.voices.len() >= self.max_voices {
            if let Some((idx, _)) = state
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, voice)| voice.age)
            {
                state.voices.swap_remove(idx);
            }
        }

        // a re-struck tone restarts instead of stacking
        if kind == VoiceKind::Tone {
            state.voices.retain(|voice| voice.note != note);
        }

        state.voices.push(Voice {
            kind,
            note,
            freq: 440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0),
            phase: 0.0,
            velocity: (velocity as f32 / 127.0).clamp(0.05, 1.0),
            key_down: kind == VoiceKind::Tone,
            sustained: false,
            release_samples_left: 0,
            release_total_samples,
            elapsed_samples: 0,
            age: state.note_counter,
        });
    }

    fn note_off(&mut self, bus: Bus, note: u8) {
        let state = &mut self.buses[Self::bus_index(bus)];
        for voice in &mut state.voices {
            if voice.note == note && voice.key_down {
                voice.key_down = false;
                if state.sustain_down {
                    voice.sustained = true;
                } else {
                    voice.release_samples_left = voice.release_total_samples;
                }
            }
        }
    }

    fn sustain(&mut self, bus: Bus, down: bool) {
        let state = &mut self.buses[Self::bus_index(bus)];
        state.sustain_down = down;

        if !down {
            for voice in &mut state.voices {
                if !voice.key_down && voice.sustained {
                    voice.sustained = false;
                    voice.release_samples_left = voice.release_total_samples;
                }
            }
        }
    }

    fn render_bus(&mut self, bus: Bus, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        out_l[..frames].fill(0.0);
        out_r[..frames].fill(0.0);

        let sample_rate = self.sample_rate_hz;
        let click_samples = self.click_samples();
        let state = &mut self.buses[Self::bus_index(bus)];

        for voice in &mut state.voices {
            let phase_step = TAU * voice.freq / sample_rate;
            for i in 0..frames {
                let gain = match voice.kind {
                    VoiceKind::Tone => {
                        let mut gain = voice.velocity * 0.2;
                        if voice.release_samples_left > 0 {
                            gain *= voice.release_samples_left as f32
                                / voice.release_total_samples as f32;
                            voice.release_samples_left -= 1;
                        }
                        gain
                    }
                    VoiceKind::Click => {
                        if voice.elapsed_samples >= click_samples {
                            break;
                        }
                        let t = voice.elapsed_samples as f32 / sample_rate;
                        voice.velocity * 0.5 * (-t * CLICK_DECAY).exp()
                    }
                };

                let sample = voice.phase.sin() * gain;
                out_l[i] += sample;
                out_r[i] += sample;
                voice.phase += phase_step;
                if voice.phase >= TAU {
                    voice.phase -= TAU;
                }
                voice.elapsed_samples = voice.elapsed_samples.saturating_add(1);
            }
        }

        state.voices.retain(|voice| voice.is_alive(click_samples));
    }
}

impl BusState {
    fn new() -> Self {
        Self {
            sustain_down: false,
            voices: Vec::new(),
            note_counter: 0,
        }
    }
}

impl SynthPort for SimpleSynth {
    fn load_soundfont_from_path(&self, _path: &str) -> Result<SoundFontInfo, SynthError> {
        Err(SynthError::UnsupportedFormat)
    }

    fn set_sample_rate(&self, sample_rate_hz: u32) {
        let mut inner = self.inner.lock();
        inner.sample_rate_hz = sample_rate_hz as f32;
    }

    fn handle_event(&self, bus: Bus, event: MidiLikeEvent, _at: SampleTime) {
        let mut inner = self.inner.lock();
        match event {
            MidiLikeEvent::NoteOn { note, velocity } => inner.note_on(bus, note, velocity),
            MidiLikeEvent::NoteOff { note } => inner.note_off(bus, note),
            MidiLikeEvent::Cc64 { value } => inner.sustain(bus, value >= 64),
        }
    }

    fn render(&self, bus: Bus, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        let mut inner = self.inner.lock();
        inner.render_bus(bus, frames, out_l, out_r);
    }
}
