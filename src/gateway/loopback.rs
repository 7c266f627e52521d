//! In-process gateway used for local runs and tests.
//!
//! Guild state comes from a fixture instead of a platform connection and
//! playback is simulated by holding the connection in the playing state for
//! the clip's duration.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{GuildSnapshot, Member, PlaybackCallback, VoiceChannel, VoiceConnection, VoiceGateway};
use crate::{
    audio::playback_duration,
    common::{ChannelId, ConnectionId, GatewayError, GuildId, UserId},
    configs::LoopbackConfig,
};

/// Primitive calls observed by the loopback gateway, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Connect(GuildId, ChannelId),
    Move(GuildId, ChannelId),
    Play(GuildId),
    Disconnect(GuildId),
}

struct ChannelState {
    id: ChannelId,
    name: String,
    members: Vec<UserId>,
}

struct GuildState {
    name: String,
    channels: Vec<ChannelState>,
}

struct Playback {
    generation: u64,
    stop: CancellationToken,
}

struct ConnectionState {
    connection: VoiceConnection,
    playback: Option<Playback>,
}

#[derive(Default)]
struct Faults {
    connect: Option<GatewayError>,
    move_to: Option<GatewayError>,
    play: Option<GatewayError>,
    playback: Option<GatewayError>,
    disconnect: Option<GatewayError>,
}

struct Inner {
    guilds: DashMap<GuildId, GuildState>,
    connections: DashMap<GuildId, ConnectionState>,
    ready: watch::Sender<bool>,
    faults: Mutex<Faults>,
    playback_duration: Mutex<Option<Duration>>,
    calls: Mutex<Vec<GatewayCall>>,
    generation: AtomicU64,
}

impl Inner {
    fn record(&self, call: GatewayCall) {
        self.calls.lock().push(call);
    }

    fn occupants(&self, guild_id: GuildId, channel: &ChannelState) -> usize {
        let bot_here = self
            .connections
            .get(&guild_id)
            .is_some_and(|c| c.connection.channel_id == channel.id);
        channel.members.len() + usize::from(bot_here)
    }

    fn channel_view(&self, guild_id: GuildId, channel: &ChannelState) -> VoiceChannel {
        VoiceChannel {
            id: channel.id,
            name: channel.name.clone(),
            occupants: self.occupants(guild_id, channel),
        }
    }

    /// Clears the playing state if `generation` is still the active playback.
    fn finish_playback(&self, guild_id: GuildId, id: ConnectionId, generation: u64) -> bool {
        match self.connections.get_mut(&guild_id) {
            Some(mut state) if state.connection.id == id => {
                let current = state.playback.as_ref().map(|p| p.generation);
                if current == Some(generation) {
                    state.playback = None;
                }
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct LoopbackGateway {
    inner: Arc<Inner>,
}

impl Default for LoopbackGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackGateway {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                guilds: DashMap::new(),
                connections: DashMap::new(),
                ready,
                faults: Mutex::new(Faults::default()),
                playback_duration: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &LoopbackConfig) -> Self {
        let gateway = Self::new();
        for guild in &config.guilds {
            let guild_id = GuildId(guild.id);
            gateway.add_guild(guild_id, &guild.name);
            for channel in &guild.channels {
                gateway.add_voice_channel(guild_id, ChannelId(channel.id), &channel.name);
                for member in &channel.members {
                    gateway.place_member(guild_id, UserId(*member), Some(ChannelId(channel.id)));
                }
            }
        }
        gateway
    }

    pub fn add_guild(&self, guild_id: GuildId, name: &str) {
        self.inner.guilds.insert(
            guild_id,
            GuildState {
                name: name.to_string(),
                channels: Vec::new(),
            },
        );
    }

    pub fn add_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId, name: &str) {
        if let Some(mut guild) = self.inner.guilds.get_mut(&guild_id) {
            guild.channels.push(ChannelState {
                id: channel_id,
                name: name.to_string(),
                members: Vec::new(),
            });
        }
    }

    /// Moves `user_id` into `channel_id`, or out of voice entirely with `None`.
    pub fn place_member(&self, guild_id: GuildId, user_id: UserId, channel_id: Option<ChannelId>) {
        if let Some(mut guild) = self.inner.guilds.get_mut(&guild_id) {
            for channel in guild.channels.iter_mut() {
                channel.members.retain(|m| *m != user_id);
                if Some(channel.id) == channel_id {
                    channel.members.push(user_id);
                }
            }
        }
    }

    pub fn mark_ready(&self) {
        self.inner.ready.send_replace(true);
    }

    /// Forces every clip to play for `duration` instead of its probed length.
    pub fn set_playback_duration(&self, duration: Option<Duration>) {
        *self.inner.playback_duration.lock() = duration;
    }

    pub fn fail_next_connect(&self, error: GatewayError) {
        self.inner.faults.lock().connect = Some(error);
    }

    pub fn fail_next_move(&self, error: GatewayError) {
        self.inner.faults.lock().move_to = Some(error);
    }

    pub fn fail_next_play(&self, error: GatewayError) {
        self.inner.faults.lock().play = Some(error);
    }

    /// Lets the next clip start, then reports `error` when it ends.
    pub fn fail_next_playback(&self, error: GatewayError) {
        self.inner.faults.lock().playback = Some(error);
    }

    pub fn fail_next_disconnect(&self, error: GatewayError) {
        self.inner.faults.lock().disconnect = Some(error);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.inner.calls.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }
}

#[async_trait]
impl VoiceGateway for LoopbackGateway {
    async fn wait_until_ready(&self) {
        let mut ready = self.inner.ready.subscribe();
        let _ = ready.wait_for(|is_ready| *is_ready).await;
    }

    fn guild(&self, guild_id: GuildId) -> Option<GuildSnapshot> {
        let guild = self.inner.guilds.get(&guild_id)?;
        Some(GuildSnapshot {
            id: guild_id,
            name: guild.name.clone(),
            voice_channels: guild
                .channels
                .iter()
                .map(|c| self.inner.channel_view(guild_id, c))
                .collect(),
        })
    }

    fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<Member> {
        let guild = self.inner.guilds.get(&guild_id)?;
        let voice_channel = guild
            .channels
            .iter()
            .find(|c| c.members.contains(&user_id))
            .map(|c| self.inner.channel_view(guild_id, c));
        Some(Member {
            id: user_id,
            voice_channel,
        })
    }

    fn connection(&self, guild_id: GuildId) -> Option<VoiceConnection> {
        self.inner
            .connections
            .get(&guild_id)
            .map(|state| state.connection.clone())
    }

    async fn connect(
        &self,
        guild_id: GuildId,
        channel: &VoiceChannel,
    ) -> Result<VoiceConnection, GatewayError> {
        self.inner.record(GatewayCall::Connect(guild_id, channel.id));

        if let Some(err) = self.inner.faults.lock().connect.take() {
            return Err(err);
        }
        {
            let guild = self
                .inner
                .guilds
                .get(&guild_id)
                .ok_or(GatewayError::UnknownGuild)?;
            if !guild.channels.iter().any(|c| c.id == channel.id) {
                return Err(GatewayError::UnknownChannel);
            }
        }
        if self.inner.connections.contains_key(&guild_id) {
            return Err(GatewayError::Platform(
                "Already connected to a voice channel.".to_string(),
            ));
        }

        let connection = VoiceConnection {
            id: ConnectionId::generate(),
            guild_id,
            channel_id: channel.id,
        };
        self.inner.connections.insert(
            guild_id,
            ConnectionState {
                connection: connection.clone(),
                playback: None,
            },
        );
        info!("[{}] Loopback connected to {} ({})", guild_id, channel.name, channel.id);
        Ok(connection)
    }

    async fn move_to(
        &self,
        connection: &VoiceConnection,
        channel: &VoiceChannel,
    ) -> Result<VoiceConnection, GatewayError> {
        let guild_id = connection.guild_id;
        self.inner.record(GatewayCall::Move(guild_id, channel.id));

        if let Some(err) = self.inner.faults.lock().move_to.take() {
            return Err(err);
        }
        {
            let guild = self
                .inner
                .guilds
                .get(&guild_id)
                .ok_or(GatewayError::UnknownGuild)?;
            if !guild.channels.iter().any(|c| c.id == channel.id) {
                return Err(GatewayError::UnknownChannel);
            }
        }

        let mut state = self
            .inner
            .connections
            .get_mut(&guild_id)
            .filter(|s| s.connection.id == connection.id)
            .ok_or(GatewayError::NotConnected)?;
        state.connection.channel_id = channel.id;
        info!("[{}] Loopback moved to {} ({})", guild_id, channel.name, channel.id);
        Ok(state.connection.clone())
    }

    fn play(
        &self,
        connection: &VoiceConnection,
        audio: Bytes,
        on_complete: PlaybackCallback,
    ) -> Result<(), GatewayError> {
        let guild_id = connection.guild_id;
        self.inner.record(GatewayCall::Play(guild_id));

        let (refused, broken) = {
            let mut faults = self.inner.faults.lock();
            (faults.play.take(), faults.playback.take())
        };
        if let Some(err) = refused {
            return Err(err);
        }

        let forced = *self.inner.playback_duration.lock();
        let duration = forced.unwrap_or_else(|| playback_duration(&audio));
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let stop = CancellationToken::new();

        {
            let mut state = self
                .inner
                .connections
                .get_mut(&guild_id)
                .filter(|s| s.connection.id == connection.id)
                .ok_or(GatewayError::NotConnected)?;
            if state.playback.is_some() {
                return Err(GatewayError::AlreadyPlaying);
            }
            state.playback = Some(Playback {
                generation,
                stop: stop.clone(),
            });
        }

        debug!("[{}] Loopback playing {} bytes for {:?}", guild_id, audio.len(), duration);

        let inner = self.inner.clone();
        let id = connection.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = stop.cancelled() => {}
            }
            let result = if !inner.finish_playback(guild_id, id, generation) {
                Err(GatewayError::NotConnected)
            } else if let Some(err) = broken {
                Err(err)
            } else {
                Ok(())
            };
            on_complete(result);
        });

        Ok(())
    }

    fn is_playing(&self, connection: &VoiceConnection) -> bool {
        self.inner
            .connections
            .get(&connection.guild_id)
            .is_some_and(|s| s.connection.id == connection.id && s.playback.is_some())
    }

    async fn disconnect(&self, connection: &VoiceConnection) -> Result<(), GatewayError> {
        let guild_id = connection.guild_id;
        self.inner.record(GatewayCall::Disconnect(guild_id));

        if let Some(err) = self.inner.faults.lock().disconnect.take() {
            return Err(err);
        }

        let removed = self
            .inner
            .connections
            .remove_if(&guild_id, |_, s| s.connection.id == connection.id);
        match removed {
            Some((_, state)) => {
                if let Some(playback) = state.playback {
                    playback.stop.cancel();
                }
                info!("[{}] Loopback disconnected", guild_id);
                Ok(())
            }
            None => Err(GatewayError::NotConnected),
        }
    }
}
