use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfigRange,
};
use keyvana_ports::audio::{AudioError, AudioOutputPort, AudioRenderCallback, AudioStreamHandle};
use keyvana_ports::types::{AudioConfig, AudioOutputDevice, DeviceId};
use std::sync::mpsc;
use std::thread;

/// Id that resolves to whatever the host reports as its default output.
pub const DEFAULT_OUTPUT_ID: &str = "default";

pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn default_device_id() -> DeviceId {
        DeviceId(DEFAULT_OUTPUT_ID.to_string())
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| "Unknown Output".to_string());
                (DeviceId(format!("cpal:{host_id}:{index}:{name}")), device)
            })
            .collect())
    }

    fn find_device(host: &cpal::Host, device_id: &DeviceId) -> Result<cpal::Device, AudioError> {
        if device_id.0 == DEFAULT_OUTPUT_ID {
            return host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()));
        }
        Self::list_devices_from_host(host)?
            .into_iter()
            .find(|(id, _)| id == device_id)
            .map(|(_, device)| device)
            .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CpalAudioStreamHandle {
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host)?;
        let mut results = Vec::new();

        for (id, device) in devices {
            let Ok(default_config) = device.default_output_config() else {
                continue;
            };
            results.push(AudioOutputDevice {
                id,
                name: device
                    .name()
                    .unwrap_or_else(|_| "Unknown Output".to_string()),
                default_config: AudioConfig {
                    sample_rate_hz: default_config.sample_rate().0,
                    channels: default_config.channels(),
                    buffer_size_frames: None,
                },
            });
        }

        Ok(results)
    }

    fn open_output(
        &self,
        device_id: &DeviceId,
        config: AudioConfig,
        cb: Box<dyn AudioRenderCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let device_id = device_id.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        // cpal::Stream is !Send on some hosts; it stays on this thread
        let join_handle = thread::spawn(move || {
            let host = cpal::default_host();
            let stream = Self::find_device(&host, &device_id)
                .and_then(|device| open_stream(&device, config, cb));
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Backend(err.to_string())));
                return;
            }

            log::info!("audio output running on {device_id}");
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
            log::debug!("audio output on {device_id} stopped");
        });

        ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;

        Ok(Box::new(CpalAudioStreamHandle {
            stop_tx,
            join_handle: Some(join_handle),
        }))
    }
}

fn open_stream(
    device: &cpal::Device,
    desired: AudioConfig,
    cb: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, AudioError> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::Backend(e.to_string()))?;
    let chosen = select_supported_config(&mut supported, desired)?;

    let sample_format = chosen.sample_format();
    let mut config = chosen.config();
    config.buffer_size = match desired.buffer_size_frames {
        Some(frames) => BufferSize::Fixed(frames),
        None => BufferSize::Default,
    };

    match sample_format {
        SampleFormat::F32 => build_stream::<f32>(device, &config, cb),
        SampleFormat::I16 => build_stream::<i16>(device, &config, cb),
        SampleFormat::U16 => build_stream::<u16>(device, &config, cb),
        other => Err(AudioError::UnsupportedConfig(format!(
            "sample format {other:?}"
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut cb: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let initial_frames = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => 8192,
    };
    let mut left = vec![0.0_f32; initial_frames];
    let mut right = vec![0.0_f32; initial_frames];
    let mut sample_time: u64 = 0;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                if frames > left.len() {
                    left.resize(frames, 0.0);
                    right.resize(frames, 0.0);
                }
                cb.render(sample_time, &mut left[..frames], &mut right[..frames]);
                write_interleaved(data, channels, &left[..frames], &right[..frames]);
                sample_time = sample_time.saturating_add(frames as u64);
            },
            |err| log::error!("cpal stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

fn select_supported_config(
    supported: &mut dyn Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let mut best: Option<(i32, cpal::SupportedStreamConfig)> = None;

    for range in supported {
        if range.channels() != desired.channels {
            continue;
        }
        let rate = desired.sample_rate_hz;
        if rate < range.min_sample_rate().0 || rate > range.max_sample_rate().0 {
            continue;
        }

        let score = match range.sample_format() {
            SampleFormat::F32 => 3,
            SampleFormat::I16 => 2,
            SampleFormat::U16 => 1,
            _ => 0,
        };
        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((score, range.with_sample_rate(SampleRate(rate))));
        }
    }

    best.map(|(_, config)| config)
        .ok_or_else(|| AudioError::UnsupportedConfig("no matching stream config".to_string()))
}

/// Writes planar stereo into an interleaved device buffer. Mono devices get
/// the average, extra channels get silence.
pub fn write_interleaved<T>(data: &mut [T], channels: usize, left: &[f32], right: &[f32])
where
    T: SizedSample + FromSample<f32>,
{
    if channels == 0 {
        return;
    }
    for (frame, out) in data.chunks_exact_mut(channels).enumerate() {
        let l = left.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        let r = right.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        if channels == 1 {
            out[0] = T::from_sample((l + r) * 0.5);
            continue;
        }
        out[0] = T::from_sample(l);
        out[1] = T::from_sample(r);
        for sample in &mut out[2..] {
            *sample = T::EQUILIBRIUM;
        }
    }
}
