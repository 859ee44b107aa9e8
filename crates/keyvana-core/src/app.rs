use crate::ipc::{Command, DisconnectReason, Event, ScoreSource};
use crate::metronome::{clamp_bpm, nudge, Click, MetronomeClock, MetronomeError, ScheduleHandle};
use keyvana_domain_practice::{
    piano_keys, HandMode, HeldNotes, InputSource, KeyboardInput, KeyboardMap, PianoKey,
    PracticeEvent, PracticeSession, PressOutcome,
};
use keyvana_domain_score::{
    JsonPositionsFile, PositionIndex, PositionSource, ScoreError, ScorePositions,
};
use keyvana_ports::audio::AudioError;
use keyvana_ports::midi::{MidiError, MidiInputPort, MidiInputStream, MidiLikeEvent, PlayerEvent};
use keyvana_ports::storage::{SettingsDto, StorageError, StoragePort};
use keyvana_ports::synth::SynthError;
use keyvana_ports::trigger::AudioTrigger;
use keyvana_ports::types::{Bus, DeviceId, MidiInputDevice};
use parking_lot::Mutex;
use rtrb::{Consumer, RingBuffer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const KEYBOARD_VELOCITY: u8 = 100;
const MIDI_QUEUE_CAPACITY: usize = 2048;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("midi error: {0}")]
    Midi(#[from] MidiError),
    #[error("synth error: {0}")]
    Synth(#[from] SynthError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("score load failed: {0}")]
    Score(#[from] ScoreError),
    #[error("metronome error: {0}")]
    Metronome(#[from] MetronomeError),
    #[error("no score loaded")]
    NoScore,
    #[error("engine has been shut down")]
    ShutDown,
}

// The delay starts counting on the first tick after the request.
#[derive(Clone, Copy, Debug)]
struct PendingAdvance {
    position: PositionIndex,
    wait: Duration,
    armed_at: Option<Instant>,
}

/// The practice engine: owns the session and every input and output it
/// talks to.
///
/// The host calls `handle_command` for user actions and `tick` about 60 times
/// a second, then drains events. All state changes happen inside those calls,
/// on the host's thread.
pub struct PracticeEngine {
    trigger: Box<dyn AudioTrigger>,
    midi_port: Box<dyn MidiInputPort>,
    storage: Option<Box<dyn StoragePort>>,
    settings: SettingsDto,
    session: Option<PracticeSession>,
    hand_mode: HandMode,
    held: HeldNotes,
    keyboard: KeyboardInput,
    pending_advance: Option<PendingAdvance>,
    metronome: MetronomeClock,
    pulses: VecDeque<Click>,
    midi_stream: Option<Box<dyn MidiInputStream>>,
    midi_queue_rx: Option<Consumer<PlayerEvent>>,
    midi_device: Option<DeviceId>,
    midi_dropped: Arc<AtomicU64>,
    midi_dropped_total: u64,
    midi_auto_connect: bool,
    known_inputs: Option<Vec<MidiInputDevice>>,
    last_device_poll: Option<Instant>,
    events: VecDeque<Event>,
    shut_down: bool,
}

impl PracticeEngine {
    pub fn new(
        mut trigger: Box<dyn AudioTrigger>,
        midi_port: Box<dyn MidiInputPort>,
        storage: Option<Box<dyn StoragePort>>,
    ) -> Self {
        let settings = match storage.as_ref().map(|storage| storage.load_settings()) {
            Some(Ok(settings)) => settings,
            Some(Err(err)) => {
                log::warn!("settings unreadable, using defaults: {err}");
                SettingsDto::default()
            }
            None => SettingsDto::default(),
        };

        let metronome = MetronomeClock::new(settings.metronome_bpm);
        let keyboard = KeyboardInput::new(KeyboardMap::new(settings.keyboard_octave));
        trigger.set_muted(settings.muted);
        trigger.set_master_volume(settings.master_volume);
        trigger.set_bus_volume(Bus::UserMonitor, settings.bus_user_volume);
        trigger.set_bus_volume(Bus::MetronomeFx, settings.bus_metronome_volume);

        Self {
            trigger,
            midi_port,
            storage,
            settings,
            session: None,
            hand_mode: HandMode::Both,
            held: HeldNotes::new(),
            keyboard,
            pending_advance: None,
            metronome,
            pulses: VecDeque::new(),
            midi_stream: None,
            midi_queue_rx: None,
            midi_device: None,
            midi_dropped: Arc::new(AtomicU64::new(0)),
            midi_dropped_total: 0,
            midi_auto_connect: true,
            known_inputs: None,
            last_device_poll: None,
            events: VecDeque::new(),
            shut_down: false,
        }
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), EngineError> {
        if self.shut_down {
            return Err(EngineError::ShutDown);
        }
        match cmd {
            Command::LoadScore { source } => self.load_score(source)?,
            Command::Next => self.navigate(|session, held| session.next(held))?,
            Command::Previous => self.navigate(|session, held| session.previous(held))?,
            Command::Reset => self.navigate(|session, held| session.reset(held))?,
            Command::JumpToMeasure { measure } => {
                self.navigate(|session, held| session.jump_to_measure(measure, held))?
            }
            Command::SelectMeasure { measure } => {
                self.navigate(|session, held| session.select_measure(measure, held))?
            }
            Command::ClearLoop => self.navigate(|session, _| session.clear_loop())?,
            Command::SetHandMode { mode } => self.set_hand_mode(mode),
            Command::KeyDown { key, repeat } => {
                if let Some(pitch) = self.keyboard.key_down(key, repeat) {
                    self.press(pitch, KEYBOARD_VELOCITY, InputSource::Keyboard);
                }
            }
            Command::KeyUp { key } => {
                if let Some(pitch) = self.keyboard.key_up(key) {
                    self.release(pitch, &InputSource::Keyboard);
                }
            }
            Command::FocusLost => self.release_keyboard(),
            Command::OctaveUp => {
                if self.keyboard.map_mut().octave_up() {
                    self.octave_changed();
                }
            }
            Command::OctaveDown => {
                if self.keyboard.map_mut().octave_down() {
                    self.octave_changed();
                }
            }
            Command::ListMidiInputs => {
                let devices = self.midi_port.list_inputs()?;
                self.events.push_back(Event::MidiInputsUpdated { devices });
            }
            Command::SelectMidiInput { device_id } => {
                self.midi_auto_connect = true;
                self.connect_midi(device_id)?;
            }
            Command::DisconnectMidiInput => {
                self.midi_auto_connect = false;
                self.disconnect_midi(DisconnectReason::Requested);
            }
            Command::StartMetronome { bpm } => {
                self.start_metronome(bpm.unwrap_or(self.metronome.bpm()))?;
            }
            Command::StopMetronome => self.stop_metronome(),
            Command::SetMetronomeBpm { bpm } => self.set_metronome_bpm(bpm),
            Command::NudgeMetronomeBpm { delta } => {
                self.set_metronome_bpm(nudge(self.metronome.bpm(), delta))
            }
            Command::SetMuted { muted } => self.set_muted(muted),
            Command::SetDelayedAdvance { enabled } => {
                self.settings.delayed_advance = enabled;
                self.sync_advance_tempo();
                self.settings_changed();
            }
            Command::SetMasterVolume { volume } => {
                self.settings.master_volume = volume;
                self.trigger.set_master_volume(volume);
                self.settings_changed();
            }
            Command::SetBusVolume { bus, volume } => {
                match bus {
                    Bus::UserMonitor => self.settings.bus_user_volume = volume,
                    Bus::MetronomeFx => self.settings.bus_metronome_volume = volume,
                }
                self.trigger.set_bus_volume(bus, volume);
                self.settings_changed();
            }
            Command::LoadSoundFont { path } => {
                self.trigger.load_soundfont(&path)?;
                self.settings.default_sf2_path = Some(path);
                self.settings_changed();
            }
            Command::RequestSnapshot => {
                let snapshot = self.snapshot();
                self.events.push_back(snapshot);
            }
        }
        Ok(())
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// One pass of the cooperative loop, with `now` as the current time.
    pub fn tick_at(&mut self, now: Instant) {
        if self.shut_down {
            return;
        }
        self.poll_midi_devices(now);
        self.process_midi_inputs();
        self.run_pending_advance(now);
        self.run_metronome();
    }

    /// MIDI events lost to a full input queue since construction.
    pub fn midi_events_dropped(&self) -> u64 {
        self.midi_dropped_total
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Load positions from any source. A failure is reported once and leaves
    /// the current session, if any, untouched.
    pub fn load_positions(&mut self, source: &dyn PositionSource) -> Result<(), EngineError> {
        match source.load() {
            Ok(score) => {
                self.apply_score(score);
                Ok(())
            }
            Err(err) => {
                log::error!("score load failed: {err}");
                self.events.push_back(Event::ScoreLoadFailed {
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    pub fn session(&self) -> Option<&PracticeSession> {
        self.session.as_ref()
    }

    pub fn held_notes(&self) -> &HeldNotes {
        &self.held
    }

    pub fn connected_midi_input(&self) -> Option<&DeviceId> {
        self.midi_device.as_ref()
    }

    pub fn metronome(&self) -> &MetronomeClock {
        &self.metronome
    }

    pub fn has_pending_advance(&self) -> bool {
        self.pending_advance.is_some()
    }

    /// Key states for a piano strip.
    pub fn piano_keys(&self) -> Vec<PianoKey> {
        let due = self
            .session
            .as_ref()
            .map(|session| session.filtered_due())
            .unwrap_or_default();
        piano_keys(due, &self.held)
    }

    /// Release everything and stop all callbacks. Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if self.metronome.stop().is_some() {
            self.trigger.cancel_clicks();
        }
        self.pulses.clear();
        self.disconnect_midi(DisconnectReason::Shutdown);
        self.release_keyboard();
        self.held.release_all();
        self.pending_advance = None;
        self.trigger.stop_all();
        // queued events stay for the host's final drain
        self.shut_down = true;
        log::info!("practice engine shut down");
    }

    fn load_score(&mut self, source: ScoreSource) -> Result<(), EngineError> {
        match source {
            ScoreSource::Positions(positions) => self.load_positions(&positions),
            ScoreSource::JsonFile(path) => self.load_positions(&JsonPositionsFile::new(path)),
        }
    }

    fn apply_score(&mut self, score: ScorePositions) {
        log::info!(
            "score loaded: {} positions over {} measures",
            score.len(),
            score.total_measures()
        );
        self.events.push_back(Event::ScoreLoaded {
            positions: score.len(),
            total_measures: score.total_measures(),
        });
        self.pending_advance = None;

        let practice_events = match self.session.as_mut() {
            Some(session) => session.replace_score(score, &self.held),
            None => {
                let mut session = PracticeSession::new(score, self.hand_mode);
                session.set_advance_bpm(self.advance_bpm());
                let events = session.start(&self.held);
                self.session = Some(session);
                events
            }
        };
        self.apply_practice_events(practice_events);
    }

    fn navigate(
        &mut self,
        op: impl FnOnce(&mut PracticeSession, &HeldNotes) -> Vec<PracticeEvent>,
    ) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NoScore)?;
        let events = op(session, &self.held);
        self.apply_practice_events(events);
        Ok(())
    }

    fn set_hand_mode(&mut self, mode: HandMode) {
        self.hand_mode = mode;
        match self.session.as_mut() {
            Some(session) => {
                let events = session.set_hand_mode(mode, &self.held);
                self.apply_practice_events(events);
            }
            None => self.events.push_back(Event::HandModeChanged { mode }),
        }
    }

    fn apply_practice_events(&mut self, events: Vec<PracticeEvent>) {
        for event in events {
            match event {
                PracticeEvent::DueNotesChanged {
                    position,
                    due,
                    progress,
                    end_reached,
                } => {
                    // the cursor moved: whatever was pending is stale now
                    self.pending_advance = None;
                    self.events.push_back(Event::DueNotesChanged {
                        position,
                        due,
                        progress,
                        end_reached,
                    });
                }
                PracticeEvent::AutoSkipped { from, to, trigger } => {
                    log::debug!("auto-skipped {from} -> {to} ({trigger:?})");
                    self.events
                        .push_back(Event::AutoSkipped { from, to, trigger });
                }
                PracticeEvent::AdvanceRequested { position, wait_ms } => {
                    self.pending_advance = Some(PendingAdvance {
                        position,
                        wait: Duration::from_millis(wait_ms as u64),
                        armed_at: None,
                    });
                }
                PracticeEvent::LoopSelectionChanged { selection } => {
                    self.events
                        .push_back(Event::LoopSelectionChanged { selection });
                }
                PracticeEvent::HandModeChanged { mode } => {
                    self.events.push_back(Event::HandModeChanged { mode });
                }
                PracticeEvent::PieceCompleted => self.events.push_back(Event::PieceCompleted),
            }
        }
    }

    fn run_pending_advance(&mut self, now: Instant) {
        let Some(pending) = self.pending_advance.as_mut() else {
            return;
        };
        let armed_at = *pending.armed_at.get_or_insert(now);
        if now.duration_since(armed_at) < pending.wait {
            return;
        }
        let position = pending.position;
        self.pending_advance = None;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let events = session.complete_advance(position, &self.held);
        self.apply_practice_events(events);
    }

    fn press(&mut self, pitch: u8, velocity: u8, source: InputSource) {
        let outcome = self.held.press(pitch, source);
        self.trigger.play_note(pitch, velocity);
        if outcome == PressOutcome::NewlyHeld {
            self.held_notes_changed();
        }
    }

    fn release(&mut self, pitch: u8, source: &InputSource) {
        if self.held.release(pitch, source) {
            self.trigger.stop_note(pitch);
            self.held_notes_changed();
        }
    }

    fn release_source(&mut self, source: &InputSource) {
        let freed = self.held.release_source(source);
        if freed.is_empty() {
            return;
        }
        for pitch in &freed {
            self.trigger.stop_note(*pitch);
        }
        self.held_notes_changed();
    }

    fn release_keyboard(&mut self) {
        self.keyboard.release_all();
        self.release_source(&InputSource::Keyboard);
    }

    fn held_notes_changed(&mut self) {
        self.events.push_back(Event::HeldNotesChanged {
            pitches: self.held.pitches(),
        });
        if let Some(session) = self.session.as_mut() {
            let events = session.on_input(&self.held);
            self.apply_practice_events(events);
        }
    }

    fn octave_changed(&mut self) {
        let octave = self.keyboard.map().octave();
        self.settings.keyboard_octave = octave;
        self.save_settings();
        self.events.push_back(Event::KeyboardOctaveChanged { octave });
    }

    fn process_midi_inputs(&mut self) {
        let Some(device_id) = self.midi_device.clone() else {
            return;
        };
        let Some(mut consumer) = self.midi_queue_rx.take() else {
            return;
        };

        let mut pending = Vec::new();
        while let Ok(event) = consumer.pop() {
            pending.push(event);
        }
        self.midi_queue_rx = Some(consumer);

        let dropped = self.midi_dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("{dropped} midi events dropped from {device_id}, input queue full");
            self.midi_dropped_total += dropped;
        }

        let source = InputSource::Midi(device_id);
        for event in pending {
            match event.event {
                MidiLikeEvent::NoteOn { note, velocity } if velocity > 0 => {
                    self.press(note, velocity, source.clone());
                }
                MidiLikeEvent::NoteOn { note, .. } | MidiLikeEvent::NoteOff { note } => {
                    self.release(note, &source);
                }
                MidiLikeEvent::Cc64 { .. } => {}
            }
        }
    }

    fn poll_midi_devices(&mut self, now: Instant) {
        if let Some(last) = self.last_device_poll {
            if now.duration_since(last) < DEVICE_POLL_INTERVAL {
                return;
            }
        }
        self.last_device_poll = Some(now);

        let devices = match self.midi_port.list_inputs() {
            Ok(devices) => devices,
            Err(err) => {
                if self.known_inputs.is_some() {
                    log::warn!("midi device list unavailable: {err}");
                } else {
                    log::debug!("midi device list unavailable: {err}");
                }
                self.known_inputs = None;
                return;
            }
        };

        let changed = self.known_inputs.as_ref() != Some(&devices);
        if !changed {
            return;
        }
        self.events.push_back(Event::MidiInputsUpdated {
            devices: devices.clone(),
        });

        if let Some(active) = self.midi_device.clone() {
            let present = devices
                .iter()
                .any(|device| device.id == active && device.is_available);
            if !present {
                log::warn!("midi input {active} disappeared");
                self.disconnect_midi(DisconnectReason::DeviceLost);
            }
        }

        if self.midi_device.is_none() && self.midi_auto_connect {
            if let Some(device_id) = self.preferred_input(&devices) {
                if let Err(err) = self.connect_midi(device_id) {
                    log::warn!("auto-connect failed, keyboard input only: {err}");
                }
            }
        }
        self.known_inputs = Some(devices);
    }

    /// The saved device if it is plugged in, otherwise the first available.
    fn preferred_input(&self, devices: &[MidiInputDevice]) -> Option<DeviceId> {
        let available = || devices.iter().filter(|device| device.is_available);
        if let Some(saved) = self.settings.selected_midi_in.as_ref() {
            if let Some(device) = available().find(|device| &device.id == saved) {
                return Some(device.id.clone());
            }
        }
        available().next().map(|device| device.id.clone())
    }

    fn connect_midi(&mut self, device_id: DeviceId) -> Result<(), EngineError> {
        if self.midi_device.as_ref() == Some(&device_id) {
            return Ok(());
        }
        self.disconnect_midi(DisconnectReason::Requested);

        let (producer, consumer) = RingBuffer::new(MIDI_QUEUE_CAPACITY);
        let producer = Arc::new(Mutex::new(producer));
        let dropped = Arc::clone(&self.midi_dropped);
        let cb = Arc::new(move |event: PlayerEvent| {
            let pushed = producer
                .try_lock()
                .map_or(false, |mut guard| guard.push(event).is_ok());
            if !pushed {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        });

        let stream = match self.midi_port.open_input(&device_id, cb) {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("midi input {device_id} unavailable: {err}");
                self.events.push_back(Event::MidiInputError {
                    message: err.to_string(),
                });
                return Err(err.into());
            }
        };

        log::info!("midi input {device_id} connected");
        self.midi_stream = Some(stream);
        self.midi_queue_rx = Some(consumer);
        self.midi_device = Some(device_id.clone());
        self.events
            .push_back(Event::MidiInputConnected { device_id: device_id.clone() });
        if self.settings.selected_midi_in.as_ref() != Some(&device_id) {
            self.settings.selected_midi_in = Some(device_id);
            self.save_settings();
        }
        Ok(())
    }

    fn disconnect_midi(&mut self, reason: DisconnectReason) {
        let Some(device_id) = self.midi_device.take() else {
            return;
        };
        if let Some(stream) = self.midi_stream.take() {
            stream.close();
        }
        self.midi_queue_rx = None;
        log::info!("midi input {device_id} disconnected ({reason:?})");
        self.release_source(&InputSource::Midi(device_id.clone()));
        self.events
            .push_back(Event::MidiInputDisconnected { device_id, reason });
    }

    fn start_metronome(&mut self, bpm: u32) -> Result<ScheduleHandle, EngineError> {
        let bpm = clamp_bpm(bpm);
        if let Some(handle) = self.metronome.handle() {
            self.set_metronome_bpm(bpm);
            return Ok(handle);
        }

        if self.trigger.clock().is_none() {
            self.trigger
                .ensure_started()
                .map_err(MetronomeError::ClockStart)?;
        }
        let now = self.trigger.clock().ok_or(MetronomeError::ClockNotRunning)?;
        let handle = self.metronome.start(bpm, now);
        log::info!("metronome started at {bpm} bpm");
        self.metronome_changed();
        self.run_metronome();
        Ok(handle)
    }

    fn stop_metronome(&mut self) {
        if self.metronome.stop().is_none() {
            return;
        }
        self.trigger.cancel_clicks();
        self.pulses.clear();
        log::info!("metronome stopped");
        self.metronome_changed();
    }

    fn set_metronome_bpm(&mut self, bpm: u32) {
        let bpm = clamp_bpm(bpm);
        if bpm == self.metronome.bpm() {
            return;
        }
        self.metronome.set_bpm(bpm);
        if self.metronome.is_running() {
            log::info!("metronome retuned to {bpm} bpm");
        }
        self.metronome_changed();
        self.sync_advance_tempo();
    }

    fn metronome_changed(&mut self) {
        let bpm = self.metronome.bpm();
        if self.settings.metronome_bpm != bpm {
            self.settings.metronome_bpm = bpm;
            self.save_settings();
        }
        self.events.push_back(Event::MetronomeStateChanged {
            running: self.metronome.is_running(),
            bpm,
        });
    }

    fn run_metronome(&mut self) {
        if !self.metronome.is_running() {
            return;
        }
        let Some(now) = self.trigger.clock() else {
            return;
        };
        for click in self.metronome.poll(now) {
            self.trigger.schedule_click(click.sample_time, click.accent);
            self.pulses.push_back(click);
        }
        while let Some(click) = self.pulses.front().copied() {
            if click.sample_time > now.sample_time {
                break;
            }
            self.pulses.pop_front();
            self.events.push_back(click.into());
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.trigger.set_muted(muted);
        if self.settings.muted != muted {
            self.settings.muted = muted;
            self.save_settings();
        }
        self.events.push_back(Event::MutedChanged { muted });
    }

    fn advance_bpm(&self) -> Option<u32> {
        self.settings
            .delayed_advance
            .then(|| self.metronome.bpm())
    }

    fn sync_advance_tempo(&mut self) {
        let bpm = self.advance_bpm();
        if let Some(session) = self.session.as_mut() {
            session.set_advance_bpm(bpm);
        }
    }

    fn snapshot(&self) -> Event {
        let session = self.session.as_ref();
        Event::Snapshot {
            cursor: session.map(|session| session.cursor_state()),
            due: session
                .map(|session| session.filtered_due().to_vec())
                .unwrap_or_default(),
            hand_mode: self.hand_mode,
            loop_selection: session
                .map(|session| session.loop_selection())
                .unwrap_or_default(),
            held: self.held.pitches(),
            metronome_running: self.metronome.is_running(),
            settings: self.settings.clone(),
        }
    }

    fn settings_changed(&mut self) {
        self.save_settings();
        self.events.push_back(Event::SettingsUpdated {
            settings: self.settings.clone(),
        });
    }

    fn save_settings(&self) {
        if let Some(storage) = self.storage.as_ref() {
            if let Err(err) = storage.save_settings(&self.settings) {
                log::warn!("failed to save settings: {err}");
            }
        }
    }
}

impl Drop for PracticeEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
