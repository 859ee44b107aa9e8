use crate::audio_graph::{AudioClock, AudioGraph};
use crate::audio_params::AudioParams;
use keyvana_ports::audio::{AudioError, AudioOutputPort, AudioStreamHandle, ScheduledEvent};
use keyvana_ports::midi::MidiLikeEvent;
use keyvana_ports::synth::{SoundFontInfo, SynthError, SynthPort};
use keyvana_ports::trigger::AudioTrigger;
use keyvana_ports::types::{AudioConfig, Bus, ClockTime, DeviceId, SampleTime, Volume01};
use keyvana_ports::SettingsDto;
use rtrb::{Producer, RingBuffer};
use std::sync::Arc;

pub const CLICK_NOTE: u8 = 76;
pub const ACCENT_CLICK_NOTE: u8 = 81;
const CLICK_VELOCITY: u8 = 100;
const ACCENT_VELOCITY: u8 = 127;
const QUEUE_CAPACITY: usize = 4096;

/// `AudioTrigger` over a real output: user notes and clicks are queued to an
/// `AudioGraph` that renders them through the synth on the audio thread.
///
/// The output stream is opened lazily, on the first note or on
/// `ensure_started`.
pub struct GraphAudioTrigger {
    audio_port: Box<dyn AudioOutputPort>,
    synth: Arc<dyn SynthPort>,
    params: Arc<AudioParams>,
    clock: Arc<AudioClock>,
    device_id: DeviceId,
    config: AudioConfig,
    stream: Option<Box<dyn AudioStreamHandle>>,
    queue_tx: Option<Producer<ScheduledEvent>>,
    start_failed: bool,
    muted: bool,
}

impl GraphAudioTrigger {
    pub fn new(
        audio_port: Box<dyn AudioOutputPort>,
        synth: Arc<dyn SynthPort>,
        device_id: DeviceId,
        settings: &SettingsDto,
    ) -> Self {
        let config = AudioConfig {
            buffer_size_frames: settings.audio_buffer_size_frames,
            ..AudioConfig::default()
        };
        Self {
            audio_port,
            synth,
            params: Arc::new(AudioParams::new(settings)),
            clock: Arc::new(AudioClock::new()),
            device_id,
            config,
            stream: None,
            queue_tx: None,
            start_failed: false,
            muted: settings.muted,
        }
    }

    pub fn params(&self) -> &Arc<AudioParams> {
        &self.params
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn open(&mut self) -> Result<(), AudioError> {
        let (producer, consumer) = RingBuffer::new(QUEUE_CAPACITY);
        self.synth.set_sample_rate(self.config.sample_rate_hz);
        let max_frames = self.config.buffer_size_frames.unwrap_or(1024) as usize;
        let graph = AudioGraph::new(
            self.synth.clone(),
            self.params.clone(),
            consumer,
            self.clock.clone(),
            max_frames,
        );

        let stream = self
            .audio_port
            .open_output(&self.device_id, self.config, Box::new(graph))?;
        log::info!(
            "audio output {} started at {} Hz",
            self.device_id,
            self.config.sample_rate_hz
        );
        self.stream = Some(stream);
        self.queue_tx = Some(producer);
        Ok(())
    }

    /// Start on demand for note playback; failures are logged once.
    fn started(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        if self.start_failed {
            return false;
        }
        match self.open() {
            Ok(()) => true,
            Err(err) => {
                log::warn!("audio output unavailable, notes will be silent: {err}");
                self.start_failed = true;
                false
            }
        }
    }

    fn push(&mut self, sample_time: SampleTime, bus: Bus, event: MidiLikeEvent) {
        let epoch = self.params.click_epoch();
        let Some(producer) = self.queue_tx.as_mut() else {
            return;
        };
        let scheduled = ScheduledEvent {
            sample_time,
            bus,
            event,
            epoch,
        };
        if producer.push(scheduled).is_err() {
            log::warn!("audio queue full, dropped {event:?}");
        }
    }

    fn flush_notes(&mut self) {
        let now = self.clock.get();
        for note in 0..128u8 {
            self.push(now, Bus::UserMonitor, MidiLikeEvent::NoteOff { note });
        }
        self.push(now, Bus::UserMonitor, MidiLikeEvent::Cc64 { value: 0 });
    }
}

impl AudioTrigger for GraphAudioTrigger {
    fn ensure_started(&mut self) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.open()?;
        self.start_failed = false;
        Ok(())
    }

    fn clock(&self) -> Option<ClockTime> {
        self.stream.as_ref()?;
        Some(ClockTime {
            sample_time: self.clock.get(),
            sample_rate_hz: self.config.sample_rate_hz,
        })
    }

    fn play_note(&mut self, note: u8, velocity: u8) {
        if self.muted || !self.started() {
            return;
        }
        let now = self.clock.get();
        self.push(now, Bus::UserMonitor, MidiLikeEvent::NoteOn { note, velocity });
    }

    fn stop_note(&mut self, note: u8) {
        let now = self.clock.get();
        self.push(now, Bus::UserMonitor, MidiLikeEvent::NoteOff { note });
    }

    fn stop_all(&mut self) {
        self.flush_notes();
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.params.set_muted(muted);
        if muted {
            self.flush_notes();
        }
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn schedule_click(&mut self, at: SampleTime, accent: bool) {
        let (note, velocity) = if accent {
            (ACCENT_CLICK_NOTE, ACCENT_VELOCITY)
        } else {
            (CLICK_NOTE, CLICK_VELOCITY)
        };
        self.push(at, Bus::MetronomeFx, MidiLikeEvent::NoteOn { note, velocity });
    }

    fn cancel_clicks(&mut self) {
        let epoch = self.params.bump_click_epoch();
        log::debug!("click epoch now {epoch}");
    }

    fn set_master_volume(&mut self, volume: Volume01) {
        self.params.set_master(volume);
    }

    fn set_bus_volume(&mut self, bus: Bus, volume: Volume01) {
        self.params.set_bus(bus, volume);
    }

    fn load_soundfont(&mut self, path: &str) -> Result<SoundFontInfo, SynthError> {
        let info = self.synth.load_soundfont_from_path(path)?;
        log::info!("soundfont {} loaded ({} presets)", info.name, info.preset_count);
        Ok(info)
    }
}

impl Drop for GraphAudioTrigger {
    fn drop(&mut self) {
        self.queue_tx = None;
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
    }
}
