use keyvana_ports::storage::SettingsDto;
use keyvana_ports::types::{Bus, Volume01};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Mixer state shared with the audio thread.
#[derive(Debug)]
pub struct AudioParams {
    master: AtomicU32,
    bus_user: AtomicU32,
    bus_metronome: AtomicU32,
    muted: AtomicBool,
    click_epoch: AtomicU32,
}

impl AudioParams {
    pub fn new(settings: &SettingsDto) -> Self {
        Self {
            master: AtomicU32::new(settings.master_volume.get().to_bits()),
            bus_user: AtomicU32::new(settings.bus_user_volume.get().to_bits()),
            bus_metronome: AtomicU32::new(settings.bus_metronome_volume.get().to_bits()),
            muted: AtomicBool::new(settings.muted),
            click_epoch: AtomicU32::new(0),
        }
    }

    pub fn set_master(&self, volume: Volume01) {
        self.master.store(volume.get().to_bits(), Ordering::Relaxed);
    }

    pub fn set_bus(&self, bus: Bus, volume: Volume01) {
        let target = match bus {
            Bus::UserMonitor => &self.bus_user,
            Bus::MetronomeFx => &self.bus_metronome,
        };
        target.store(volume.get().to_bits(), Ordering::Relaxed);
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Invalidate every click queued so far; returns the new epoch.
    pub fn bump_click_epoch(&self) -> u32 {
        self.click_epoch.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn master(&self) -> f32 {
        f32::from_bits(self.master.load(Ordering::Relaxed))
    }

    pub fn bus(&self, bus: Bus) -> f32 {
        let value = match bus {
            Bus::UserMonitor => &self.bus_user,
            Bus::MetronomeFx => &self.bus_metronome,
        };
        f32::from_bits(value.load(Ordering::Relaxed))
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn click_epoch(&self) -> u32 {
        self.click_epoch.load(Ordering::Acquire)
    }
}
