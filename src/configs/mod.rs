pub mod base;
pub mod bot;
pub mod logging;
pub mod loopback;
pub mod tts;
pub mod voice;

pub use base::*;
pub use bot::*;
pub use logging::*;
pub use loopback::*;
pub use tts::*;
pub use voice::*;
