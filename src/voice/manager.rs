use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    coordinator::{CommandContext, Farewell, PlaybackCoordinator, SpeakReceipt},
    reaper::{InactivityReaper, ReaperSettings},
    registry::SessionRegistry,
};
use crate::{
    common::{GuildId, VoiceError},
    configs::VoiceConfig,
    gateway::VoiceGateway,
    tts::SpeechSynthesizer,
};

/// Owns the voice session lifecycle: coordinator, event loop and reaper.
pub struct VoiceManager {
    coordinator: Arc<PlaybackCoordinator>,
    cancel: CancellationToken,
    reaper_cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl VoiceManager {
    pub fn start(
        gateway: Arc<dyn VoiceGateway>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: &VoiceConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let (coordinator, events) = PlaybackCoordinator::new(
            gateway,
            synthesizer,
            registry,
            config.farewell_text.clone(),
        );

        let cancel = CancellationToken::new();
        let reaper_cancel = cancel.child_token();

        let event_loop = tokio::spawn(coordinator.clone().run_event_loop(events, cancel.clone()));
        let reaper = InactivityReaper::new(coordinator.clone(), ReaperSettings::from(config))
            .spawn(reaper_cancel.clone());

        Self {
            coordinator,
            cancel,
            reaper_cancel,
            tasks: Mutex::new(vec![event_loop, reaper]),
        }
    }

    pub async fn speak(&self, ctx: &CommandContext, text: &str) -> Result<SpeakReceipt, VoiceError> {
        self.coordinator.speak(ctx, text).await
    }

    pub async fn leave(&self, guild_id: GuildId) -> Result<Farewell, VoiceError> {
        self.coordinator.leave(guild_id).await
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.coordinator.registry()
    }

    pub fn farewell_text(&self) -> &str {
        self.coordinator.farewell_text()
    }

    /// Stops the inactivity reaper. Existing connections stay up.
    pub fn unload(&self) {
        if !self.reaper_cancel.is_cancelled() {
            info!("Unloading inactivity reaper");
            self.reaper_cancel.cancel();
        }
    }

    /// Stops every task and disconnects all managed connections.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let connections: Vec<_> = self
            .registry()
            .entries()
            .into_iter()
            .map(|entry| entry.connection)
            .collect();
        if !connections.is_empty() {
            info!("Disconnecting {} voice connection(s)", connections.len());
        }
        join_all(
            connections
                .iter()
                .map(|connection| self.coordinator.release(connection)),
        )
        .await;

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Voice task ended abnormally: {}", e);
            }
        }
    }
}
