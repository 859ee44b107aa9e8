pub mod app;
pub mod audio_graph;
pub mod audio_params;
pub mod audio_trigger;
pub mod ipc;
pub mod metronome;

pub use app::*;
pub use audio_graph::*;
pub use audio_params::*;
pub use audio_trigger::*;
pub use ipc::*;
pub use metronome::*;
