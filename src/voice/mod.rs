pub mod coordinator;
pub mod manager;
pub mod reaper;
pub mod registry;
pub mod selector;

pub use coordinator::{CommandContext, Farewell, PlaybackCoordinator, SpeakReceipt};
pub use manager::VoiceManager;
pub use reaper::{InactivityReaper, ReaperSettings};
pub use registry::SessionRegistry;
pub use selector::select_channel;
