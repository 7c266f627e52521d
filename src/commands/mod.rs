//! Chat commands: `say <text>` and `saynomore`.

use tracing::debug;

use crate::{
    common::{CommandError, VoiceError},
    voice::{CommandContext, Farewell, VoiceManager},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Speak the text in the selected voice channel.
    Say(String),
    /// Say goodbye and leave voice.
    SayNoMore,
}

/// Parses a chat message.
///
/// Returns `None` for anything that is not one of our commands.
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command, CommandError>> {
    let body = content.trim_start().strip_prefix(prefix)?;
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "say" | "speak" => {
            if rest.is_empty() {
                Some(Err(CommandError::MissingText {
                    prefix: prefix.to_string(),
                }))
            } else {
                Some(Ok(Command::Say(rest.to_string())))
            }
        }
        "saynomore" | "leave" => Some(Ok(Command::SayNoMore)),
        _ => None,
    }
}

/// Runs `command` and returns the reply to post back.
pub async fn dispatch(manager: &VoiceManager, ctx: &CommandContext, command: Command) -> String {
    debug!("[{}] {:?} from {}", ctx.guild_id, command, ctx.author);
    match command {
        Command::Say(text) => match manager.speak(ctx, &text).await {
            Ok(receipt) => format!("Speaking in {}", receipt.channel.name),
            Err(e) => e.to_string(),
        },
        Command::SayNoMore => match manager.leave(ctx.guild_id).await {
            Ok(Farewell::Spoken) => "Goodbye!".to_string(),
            Ok(Farewell::Silent) => {
                format!("Failed to generate '{}' audio.", manager.farewell_text())
            }
            Ok(Farewell::PlaybackFailed(e)) => VoiceError::PlaybackFailed(e).to_string(),
            Ok(Farewell::AlreadyLeaving) => "Already leaving.".to_string(),
            Err(e) => e.to_string(),
        },
    }
}
