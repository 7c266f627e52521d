pub mod probe;

pub use probe::playback_duration;
