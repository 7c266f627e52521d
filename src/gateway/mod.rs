//! Seam between the voice lifecycle and the chat platform.
//!
//! Everything the session manager needs from the platform goes through
//! [`VoiceGateway`]: guild state lookups, the connect/move/play/disconnect
//! primitives and the readiness signal.

use async_trait::async_trait;
use bytes::Bytes;

use crate::common::{ChannelId, ConnectionId, GatewayError, GuildId, UserId};

pub mod loopback;

pub use loopback::LoopbackGateway;

/// A voice channel as listed by its guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub name: String,
    /// Members currently connected to the channel.
    pub occupants: usize,
}

/// Point-in-time view of a guild's voice channels, in listing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSnapshot {
    pub id: GuildId,
    pub name: String,
    pub voice_channels: Vec<VoiceChannel>,
}

/// A guild member and the voice channel they occupy, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub voice_channel: Option<VoiceChannel>,
}

/// One live audio link between the bot and a voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConnection {
    pub id: ConnectionId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Invoked once when playback ends, from the gateway's audio context.
///
/// Implementations of this callback must not touch shared session state
/// directly; they hand the result back to the owning event loop.
pub type PlaybackCallback = Box<dyn FnOnce(Result<(), GatewayError>) + Send + 'static>;

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Resolves once the platform connection is fully established.
    async fn wait_until_ready(&self);

    fn guild(&self, guild_id: GuildId) -> Option<GuildSnapshot>;

    fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<Member>;

    /// The bot's current connection in `guild_id`.
    fn connection(&self, guild_id: GuildId) -> Option<VoiceConnection>;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel: &VoiceChannel,
    ) -> Result<VoiceConnection, GatewayError>;

    /// Moves an existing connection. The returned connection keeps its id.
    async fn move_to(
        &self,
        connection: &VoiceConnection,
        channel: &VoiceChannel,
    ) -> Result<VoiceConnection, GatewayError>;

    /// Starts playback and returns immediately.
    ///
    /// `on_complete` is called exactly once if this returns `Ok`, and never
    /// if it returns `Err`.
    fn play(
        &self,
        connection: &VoiceConnection,
        audio: Bytes,
        on_complete: PlaybackCallback,
    ) -> Result<(), GatewayError>;

    fn is_playing(&self, connection: &VoiceConnection) -> bool;

    async fn disconnect(&self, connection: &VoiceConnection) -> Result<(), GatewayError>;
}
