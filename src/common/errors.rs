use thiserror::Error;

/// Failures reported by the chat platform's voice primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Unknown guild")]
    UnknownGuild,

    #[error("Unknown voice channel")]
    UnknownChannel,

    #[error("Not connected to voice.")]
    NotConnected,

    #[error("Already playing audio.")]
    AlreadyPlaying,

    #[error("{0}")]
    Platform(String),
}

/// User-facing failures of the voice commands.
///
/// The `Display` text is sent back verbatim as the command reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("No voice channels available.")]
    NoChannelAvailable,

    #[error("Failed to connect to voice channel: {0}")]
    ConnectFailed(GatewayError),

    #[error("Failed to move to voice channel: {0}")]
    MoveFailed(GatewayError),

    #[error("Failed to generate audio.")]
    SynthesisFailed,

    #[error("Failed to play audio: {0}")]
    PlaybackFailed(GatewayError),

    #[error("I am not connected to any voice channel.")]
    NotConnected,
}

/// Malformed command invocations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: {prefix}say <text>")]
    MissingText { prefix: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_include_platform_error() {
        let err = VoiceError::ConnectFailed(GatewayError::Platform("timed out".into()));
        assert_eq!(
            err.to_string(),
            "Failed to connect to voice channel: timed out"
        );

        let err = VoiceError::PlaybackFailed(GatewayError::AlreadyPlaying);
        assert_eq!(err.to_string(), "Failed to play audio: Already playing audio.");
    }
}
