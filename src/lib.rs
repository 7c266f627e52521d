pub mod audio;
pub mod commands;
pub mod common;
pub mod configs;
pub mod gateway;
pub mod tts;
pub mod voice;
