use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{registry::SessionRegistry, selector::select_channel};
use crate::{
    common::{GatewayError, GuildId, UserId, VoiceError},
    gateway::{PlaybackCallback, VoiceChannel, VoiceConnection, VoiceGateway},
    tts::SpeechSynthesizer,
};

/// Who asked for something, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub guild_id: GuildId,
    pub author: UserId,
}

/// Why a clip was played; decides what its completion does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackIntent {
    Speech,
    Farewell,
}

/// Playback completion, handed from the audio context to the event loop.
#[derive(Debug)]
pub struct PlaybackEvent {
    pub connection: VoiceConnection,
    pub intent: PlaybackIntent,
    pub result: Result<(), GatewayError>,
}

/// Returned once speech playback has been started.
#[derive(Debug, Clone)]
pub struct SpeakReceipt {
    pub channel: VoiceChannel,
    pub connection: VoiceConnection,
}

/// How a teardown began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Farewell {
    /// The farewell is playing; disconnect follows when it ends.
    Spoken,
    /// The farewell could not be synthesized; the connection was released
    /// right away.
    Silent,
    /// The farewell could not start playing; the connection was released
    /// right away.
    PlaybackFailed(GatewayError),
    /// Another teardown of this connection is already running.
    AlreadyLeaving,
}

/// Sequences the speak and farewell flows against the gateway.
///
/// Playback completions never mutate the registry from the gateway's audio
/// context: the callback only forwards a [`PlaybackEvent`] to
/// [`PlaybackCoordinator::run_event_loop`], which applies it.
pub struct PlaybackCoordinator {
    gateway: Arc<dyn VoiceGateway>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    registry: Arc<SessionRegistry>,
    events: flume::Sender<PlaybackEvent>,
    farewell_text: String,
}

impl PlaybackCoordinator {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        registry: Arc<SessionRegistry>,
        farewell_text: String,
    ) -> (Arc<Self>, flume::Receiver<PlaybackEvent>) {
        let (events, events_rx) = flume::unbounded();
        let coordinator = Arc::new(Self {
            gateway,
            synthesizer,
            registry,
            events,
            farewell_text,
        });
        (coordinator, events_rx)
    }

    pub fn gateway(&self) -> &Arc<dyn VoiceGateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn farewell_text(&self) -> &str {
        &self.farewell_text
    }

    /// Joins (or moves to) the selected channel and starts speaking `text`.
    pub async fn speak(&self, ctx: &CommandContext, text: &str) -> Result<SpeakReceipt, VoiceError> {
        let guild = self
            .gateway
            .guild(ctx.guild_id)
            .ok_or(VoiceError::NoChannelAvailable)?;
        let member = self.gateway.member(ctx.guild_id, ctx.author);
        let target =
            select_channel(member.as_ref(), &guild).ok_or(VoiceError::NoChannelAvailable)?;

        let connection = match self.gateway.connection(ctx.guild_id) {
            None => {
                let connection = self
                    .gateway
                    .connect(ctx.guild_id, &target)
                    .await
                    .map_err(|e| {
                        warn!("[{}] Failed to connect to {}: {}", ctx.guild_id, target.name, e);
                        VoiceError::ConnectFailed(e)
                    })?;
                info!("[{}] Joined voice channel {}", ctx.guild_id, target.name);
                connection
            }
            Some(existing) if existing.channel_id != target.id => {
                let connection = self
                    .gateway
                    .move_to(&existing, &target)
                    .await
                    .map_err(|e| {
                        warn!("[{}] Failed to move to {}: {}", ctx.guild_id, target.name, e);
                        VoiceError::MoveFailed(e)
                    })?;
                info!("[{}] Moved to voice channel {}", ctx.guild_id, target.name);
                connection
            }
            Some(existing) => existing,
        };

        self.registry.touch(&connection);

        let audio = self.synthesize(text).await.ok_or_else(|| {
            warn!("[{}] Speech synthesis failed", ctx.guild_id);
            VoiceError::SynthesisFailed
        })?;

        self.gateway
            .play(
                &connection,
                audio,
                self.completion(connection.clone(), PlaybackIntent::Speech),
            )
            .map_err(|e| {
                warn!("[{}] Failed to start playback: {}", ctx.guild_id, e);
                VoiceError::PlaybackFailed(e)
            })?;

        debug!("[{}] Speaking {} chars in {}", ctx.guild_id, text.len(), target.name);
        Ok(SpeakReceipt {
            channel: target,
            connection,
        })
    }

    /// Explicit leave: farewell and disconnect the guild's connection.
    pub async fn leave(&self, guild_id: GuildId) -> Result<Farewell, VoiceError> {
        let connection = self
            .gateway
            .connection(guild_id)
            .ok_or(VoiceError::NotConnected)?;
        Ok(self.farewell_and_disconnect(connection).await)
    }

    /// Says the farewell, then releases the connection.
    ///
    /// The connection is always disconnected and forgotten, whether or not
    /// the farewell could be synthesized or played.
    pub async fn farewell_and_disconnect(&self, connection: VoiceConnection) -> Farewell {
        if !self.registry.mark_leaving(connection.id) {
            debug!(
                "[{}] Teardown of {} already in progress",
                connection.guild_id, connection.id
            );
            return Farewell::AlreadyLeaving;
        }

        let audio = self.synthesize(&self.farewell_text).await;
        self.say_farewell(connection, audio).await
    }

    /// Farewell for a connection the reaper found idle.
    ///
    /// Speech may start while the farewell is being synthesized. If the
    /// connection is playing or no longer idle for longer than `timeout`
    /// afterwards, the eviction is dropped and `None` is returned.
    pub async fn evict_idle(
        &self,
        connection: VoiceConnection,
        timeout: Duration,
    ) -> Option<Farewell> {
        if !self.registry.mark_leaving(connection.id) {
            return Some(Farewell::AlreadyLeaving);
        }

        let audio = self.synthesize(&self.farewell_text).await;

        let still_idle = self
            .registry
            .idle_since(connection.id, Instant::now())
            .is_some_and(|idle| idle > timeout);
        if !still_idle || self.gateway.is_playing(&connection) {
            self.registry.clear_leaving(connection.id);
            info!(
                "[{}] Connection {} became active, keeping it",
                connection.guild_id, connection.id
            );
            return None;
        }

        Some(self.say_farewell(connection, audio).await)
    }

    async fn say_farewell(&self, connection: VoiceConnection, audio: Option<Bytes>) -> Farewell {
        let guild_id = connection.guild_id;
        let Some(audio) = audio else {
            error!("[{}] Failed to generate '{}' audio", guild_id, self.farewell_text);
            self.release(&connection).await;
            return Farewell::Silent;
        };

        let on_complete = self.completion(connection.clone(), PlaybackIntent::Farewell);
        match self.gateway.play(&connection, audio, on_complete) {
            Ok(()) => Farewell::Spoken,
            Err(e) => {
                error!("[{}] Failed to play '{}' audio: {}", guild_id, self.farewell_text, e);
                self.release(&connection).await;
                Farewell::PlaybackFailed(e)
            }
        }
    }

    /// Applies playback completions until `cancel` fires.
    pub async fn run_event_loop(
        self: Arc<Self>,
        events: flume::Receiver<PlaybackEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv_async() => match event {
                    Ok(event) => self.apply(event).await,
                    Err(_) => break,
                },
            }
        }
        debug!("Playback event loop stopped");
    }

    async fn apply(&self, event: PlaybackEvent) {
        let PlaybackEvent {
            connection,
            intent,
            result,
        } = event;

        match intent {
            PlaybackIntent::Speech => match result {
                Ok(()) => {
                    if !self.registry.refresh(connection.id) {
                        debug!(
                            "[{}] Speech finished on released connection {}",
                            connection.guild_id, connection.id
                        );
                    }
                }
                Err(e) => {
                    error!("[{}] Error in voice playback: {}", connection.guild_id, e);
                }
            },
            PlaybackIntent::Farewell => {
                if let Err(e) = result {
                    error!("[{}] Error in farewell playback: {}", connection.guild_id, e);
                }
                self.release(&connection).await;
            }
        }
    }

    async fn synthesize(&self, text: &str) -> Option<Bytes> {
        self.synthesizer
            .synthesize(text)
            .await
            .filter(|audio| !audio.is_empty())
    }

    fn completion(&self, connection: VoiceConnection, intent: PlaybackIntent) -> PlaybackCallback {
        let events = self.events.clone();
        Box::new(move |result| {
            let guild_id = connection.guild_id;
            let event = PlaybackEvent {
                connection,
                intent,
                result,
            };
            if events.send(event).is_err() {
                warn!("[{}] Playback finished after the event loop stopped", guild_id);
            }
        })
    }

    /// Disconnects (best effort) and forgets the connection.
    pub(crate) async fn release(&self, connection: &VoiceConnection) {
        if let Err(e) = self.gateway.disconnect(connection).await {
            warn!("[{}] Disconnect failed: {}", connection.guild_id, e);
        }
        self.registry.forget(connection.id);
        info!("[{}] Left voice channel {}", connection.guild_id, connection.channel_id);
    }
}
