//! Headless host: JSON commands in on stdin, one per line; JSON events out
//! on stdout, one per line. Logs go to stderr (`RUST_LOG=debug` for more).

use keyvana_core::{Command, Event, GraphAudioTrigger, PracticeEngine, ScoreSource};
use keyvana_infra_audio_cpal::CpalAudioOutputPort;
use keyvana_infra_midi_midir::MidirMidiInputPort;
use keyvana_infra_storage_fs::FsStorage;
use keyvana_infra_synth_sf2::SoundFontSynth;
use keyvana_ports::storage::{SettingsDto, StoragePort};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(16);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let storage = FsStorage::default();
    let settings = storage.load_settings().unwrap_or_else(|err| {
        log::debug!("no saved settings ({err}), starting from defaults");
        SettingsDto::default()
    });

    let synth = Arc::new(SoundFontSynth::default());
    let device_id = settings
        .selected_audio_out
        .clone()
        .unwrap_or_else(CpalAudioOutputPort::default_device_id);
    let trigger = GraphAudioTrigger::new(
        Box::new(CpalAudioOutputPort::new()),
        synth,
        device_id,
        &settings,
    );
    let midi_port = MidirMidiInputPort::new("Keyvana");
    let storage: Option<Box<dyn StoragePort>> = Some(Box::new(storage));

    let mut engine = PracticeEngine::new(Box::new(trigger), Box::new(midi_port), storage);

    let mut startup = Vec::new();
    if let Some(path) = settings.default_sf2_path.clone() {
        startup.push(Command::LoadSoundFont { path });
    }
    if let Some(path) = std::env::args().nth(1) {
        startup.push(Command::LoadScore {
            source: ScoreSource::JsonFile(path),
        });
    }
    startup.push(Command::ListMidiInputs);
    for cmd in startup {
        if let Err(err) = engine.handle_command(cmd) {
            log::warn!("startup command failed: {err}");
        }
    }

    let commands = spawn_stdin_reader();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    loop {
        let mut closed = false;
        loop {
            match commands.try_recv() {
                Ok(cmd) => {
                    if let Err(err) = engine.handle_command(cmd) {
                        log::warn!("command failed: {err}");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            engine.shutdown();
        } else {
            engine.tick();
        }

        if let Err(err) = write_events(&mut out, engine.drain_events()) {
            log::error!("stdout closed: {err}");
            engine.shutdown();
            return;
        }
        if closed {
            log::info!("stdin closed, exiting");
            return;
        }

        thread::sleep(TICK);
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::error!("stdin read failed: {err}");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(line) {
                Ok(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(err) => log::warn!("ignoring malformed command {line:?}: {err}"),
            }
        }
    });
    rx
}

fn write_events(out: &mut impl Write, events: Vec<Event>) -> io::Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    for event in events {
        serde_json::to_writer(&mut *out, &event)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
