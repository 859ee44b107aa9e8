use keyvana_ports::midi::{
    MidiError, MidiInputPort, MidiInputStream, MidiLikeEvent, PlayerEvent, PlayerEventCallback,
};
use keyvana_ports::types::{DeviceId, MidiInputDevice};
use midir::{ConnectErrorKind, Ignore, MidiInput, MidiInputPort as MidirPort};
use std::time::Instant;

/// Decode one raw MIDI message. Only notes and the sustain pedal matter here.
pub fn parse_message(message: &[u8]) -> Option<MidiLikeEvent> {
    if message.len() < 3 {
        return None;
    }
    let status = message[0] & 0xF0;
    match status {
        0x80 => Some(MidiLikeEvent::NoteOff { note: message[1] }),
        0x90 => {
            let note = message[1];
            let velocity = message[2];
            if velocity == 0 {
                Some(MidiLikeEvent::NoteOff { note })
            } else {
                Some(MidiLikeEvent::NoteOn { note, velocity })
            }
        }
        0xB0 if message[1] == 64 => Some(MidiLikeEvent::Cc64 { value: message[2] }),
        _ => None,
    }
}

/// Ids are built from port names so they survive other devices being
/// plugged in or out; repeated names get a `#n` suffix.
pub fn device_ids(names: &[String]) -> Vec<DeviceId> {
    let mut ids = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let seen = names[..index].iter().filter(|other| *other == name).count();
        let id = if seen == 0 {
            format!("midir:{name}")
        } else {
            format!("midir:{name}#{}", seen + 1)
        };
        ids.push(DeviceId(id));
    }
    ids
}

pub struct MidirMidiInputPort {
    client_name: String,
}

impl MidirMidiInputPort {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn create_midi_in(&self) -> Result<MidiInput, MidiError> {
        MidiInput::new(&self.client_name).map_err(|e| MidiError::DeviceUnavailable(e.to_string()))
    }

    fn named_ports(midi_in: &MidiInput) -> Vec<(DeviceId, String, MidirPort)> {
        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|port| {
                midi_in
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown Input".to_string())
            })
            .collect();
        device_ids(&names)
            .into_iter()
            .zip(names)
            .zip(ports)
            .map(|((id, name), port)| (id, name, port))
            .collect()
    }
}

impl Default for MidirMidiInputPort {
    fn default() -> Self {
        Self::new("Keyvana")
    }
}

pub struct MidirMidiInputStream {
    connection: Option<midir::MidiInputConnection<PlayerEventCallback>>,
}

impl MidiInputStream for MidirMidiInputStream {
    fn close(mut self: Box<Self>) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
    }
}

impl Drop for MidirMidiInputStream {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
    }
}

impl MidiInputPort for MidirMidiInputPort {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError> {
        let midi_in = self.create_midi_in()?;
        let devices = Self::named_ports(&midi_in)
            .into_iter()
            .map(|(id, name, _)| MidiInputDevice {
                id,
                name,
                is_available: true,
            })
            .collect();
        Ok(devices)
    }

    fn open_input(
        &self,
        device_id: &DeviceId,
        cb: PlayerEventCallback,
    ) -> Result<Box<dyn MidiInputStream>, MidiError> {
        let mut midi_in = self.create_midi_in()?;
        midi_in.ignore(Ignore::All);

        let port = Self::named_ports(&midi_in)
            .into_iter()
            .find(|(id, _, _)| id == device_id)
            .map(|(_, _, port)| port)
            .ok_or_else(|| MidiError::DeviceNotFound(device_id.to_string()))?;

        let connection = midi_in
            .connect(
                &port,
                "keyvana-midi-input",
                move |_stamp, message, callback| {
                    if let Some(event) = parse_message(message) {
                        (callback)(PlayerEvent {
                            at: Instant::now(),
                            event,
                        });
                    }
                },
                cb,
            )
            .map_err(|e| match e.kind() {
                ConnectErrorKind::InvalidPort => MidiError::DeviceNotFound(device_id.to_string()),
                ConnectErrorKind::Other(reason) if reason.contains("ermission") => {
                    MidiError::PermissionDenied(reason.to_string())
                }
                ConnectErrorKind::Other(reason) => MidiError::DeviceUnavailable(reason.to_string()),
            })?;

        log::debug!("midir connected to {device_id}");
        Ok(Box::new(MidirMidiInputStream {
            connection: Some(connection),
        }))
    }
}
