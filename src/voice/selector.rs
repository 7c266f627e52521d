use crate::gateway::{GuildSnapshot, Member, VoiceChannel};

/// Picks the voice channel a command should speak in.
///
/// 1. the invoking member's channel,
/// 2. otherwise the first listed channel with anyone in it,
/// 3. otherwise the guild's first voice channel.
///
/// Returns `None` only when the guild has no voice channels and the member is
/// not in one.
pub fn select_channel(member: Option<&Member>, guild: &GuildSnapshot) -> Option<VoiceChannel> {
    if let Some(channel) = member.and_then(|m| m.voice_channel.as_ref()) {
        return Some(channel.clone());
    }

    guild
        .voice_channels
        .iter()
        .find(|c| c.occupants > 0)
        .or_else(|| guild.voice_channels.first())
        .cloned()
}
