use keyvana_infra_synth_simple::SimpleSynth;
use keyvana_ports::midi::MidiLikeEvent;
use keyvana_ports::synth::{SoundFontInfo, SynthError, SynthPort};
use keyvana_ports::types::{Bus, SampleTime};
use parking_lot::Mutex;
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// SoundFont piano for the user's notes.
///
/// Until a soundfont loads, and always for the metronome bus, events go to
/// the built-in [`SimpleSynth`].
pub struct SoundFontSynth {
    fallback: SimpleSynth,
    sample_rate_hz: AtomicU32,
    enabled: AtomicBool,
    sound_font: Mutex<Option<Arc<SoundFont>>>,
    piano: Mutex<Option<Synthesizer>>,
}

impl Default for SoundFontSynth {
    fn default() -> Self {
        Self::new(48_000, 64)
    }
}

impl SoundFontSynth {
    pub fn new(sample_rate_hz: u32, max_voices: usize) -> Self {
        Self {
            fallback: SimpleSynth::new(sample_rate_hz, max_voices),
            sample_rate_hz: AtomicU32::new(sample_rate_hz),
            enabled: AtomicBool::new(false),
            sound_font: Mutex::new(None),
            piano: Mutex::new(None),
        }
    }

    pub fn has_soundfont(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn uses_soundfont(&self, bus: Bus) -> bool {
        bus == Bus::UserMonitor && self.enabled.load(Ordering::Relaxed)
    }

    fn rebuild_synthesizer(&self, sound_font: &Arc<SoundFont>) -> Result<(), SynthError> {
        let sample_rate_hz = self.sample_rate_hz.load(Ordering::Relaxed) as i32;
        let mut settings = SynthesizerSettings::new(sample_rate_hz);
        settings.enable_reverb_and_chorus = false;

        let mut synth = Synthesizer::new(sound_font, &settings)
            .map_err(|e| SynthError::Backend(e.to_string()))?;
        synth.set_master_volume(0.25);
        *self.piano.lock() = Some(synth);
        Ok(())
    }

    fn with_piano<T>(&self, f: impl FnOnce(&mut Synthesizer) -> T) -> Option<T> {
        // never block the audio thread behind a reload
        let mut guard = self.piano.try_lock()?;
        let synth = guard.as_mut()?;
        Some(f(synth))
    }
}

fn display_name(sound_font: &SoundFont, path: &str) -> String {
    let name = sound_font.get_info().get_bank_name().trim().to_string();
    if !name.is_empty() {
        return name;
    }
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("SoundFont")
        .to_string()
}

impl SynthPort for SoundFontSynth {
    fn load_soundfont_from_path(&self, path: &str) -> Result<SoundFontInfo, SynthError> {
        let mut file = File::open(path).map_err(|e| SynthError::SoundFontLoad(e.to_string()))?;
        let sound_font = Arc::new(
            SoundFont::new(&mut file).map_err(|e| SynthError::SoundFontLoad(e.to_string()))?,
        );

        let info = SoundFontInfo {
            name: display_name(&sound_font, path),
            preset_count: sound_font.get_presets().len(),
        };

        self.rebuild_synthesizer(&sound_font)?;
        *self.sound_font.lock() = Some(sound_font);
        self.enabled.store(true, Ordering::Relaxed);

        Ok(info)
    }

    fn set_sample_rate(&self, sample_rate_hz: u32) {
        self.sample_rate_hz.store(sample_rate_hz, Ordering::Relaxed);
        self.fallback.set_sample_rate(sample_rate_hz);

        let sound_font = self.sound_font.lock().clone();
        if let Some(sound_font) = sound_font {
            if let Err(err) = self.rebuild_synthesizer(&sound_font) {
                log::warn!("soundfont rebuild at {sample_rate_hz} Hz failed: {err}");
            }
        }
    }

    fn handle_event(&self, bus: Bus, event: MidiLikeEvent, at: SampleTime) {
        if !self.uses_soundfont(bus) {
            self.fallback.handle_event(bus, event, at);
            return;
        }

        self.with_piano(|synth| match event {
            MidiLikeEvent::NoteOn { note, velocity } => {
                synth.note_on(0, note as i32, velocity as i32);
            }
            MidiLikeEvent::NoteOff { note } => {
                synth.note_off(0, note as i32);
            }
            MidiLikeEvent::Cc64 { value } => {
                synth.process_midi_message(0, 0xB0, 0x40, value as i32);
            }
        });
    }

    fn render(&self, bus: Bus, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        if !self.uses_soundfont(bus) {
            self.fallback.render(bus, frames, out_l, out_r);
            return;
        }

        out_l.fill(0.0);
        out_r.fill(0.0);

        self.with_piano(|synth| {
            let frames = frames.min(out_l.len()).min(out_r.len());
            synth.render(&mut out_l[..frames], &mut out_r[..frames]);
        });
    }
}
