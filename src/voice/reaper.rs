use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{coordinator::PlaybackCoordinator, registry::SessionSnapshot};
use crate::{common::ConnectionId, configs::VoiceConfig};

/// `tokio::time::interval` panics on a zero period.
const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct ReaperSettings {
    pub inactivity_timeout: Duration,
    pub scan_interval: Duration,
}

impl From<&VoiceConfig> for ReaperSettings {
    fn from(config: &VoiceConfig) -> Self {
        let mut scan_interval = config.scan_interval();
        if scan_interval < MIN_SCAN_INTERVAL {
            warn!(
                "voice.scan_interval_secs must be at least 1, using {:?}",
                MIN_SCAN_INTERVAL
            );
            scan_interval = MIN_SCAN_INTERVAL;
        }
        Self {
            inactivity_timeout: config.inactivity_timeout(),
            scan_interval,
        }
    }
}

/// Periodically says goodbye to connections that have gone quiet.
pub struct InactivityReaper {
    coordinator: Arc<PlaybackCoordinator>,
    settings: ReaperSettings,
}

impl InactivityReaper {
    pub fn new(coordinator: Arc<PlaybackCoordinator>, settings: ReaperSettings) -> Self {
        Self {
            coordinator,
            settings,
        }
    }

    /// Starts the scan loop once the gateway reports ready.
    ///
    /// Cancelling `cancel` stops the loop before its next tick; farewells
    /// already started keep running.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.coordinator.gateway().wait_until_ready() => {}
            }

            info!(
                "Inactivity reaper started (timeout {:?}, every {:?})",
                self.settings.inactivity_timeout, self.settings.scan_interval
            );

            let period = self.settings.scan_interval.max(MIN_SCAN_INTERVAL);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep();
                    }
                }
            }

            info!("Inactivity reaper stopped");
        })
    }

    fn is_stale(&self, entry: &SessionSnapshot, now: Instant) -> bool {
        !entry.leaving
            && now.saturating_duration_since(entry.last_active) > self.settings.inactivity_timeout
            && !self.coordinator.gateway().is_playing(&entry.connection)
    }

    /// Runs one scan and starts a farewell for every idle connection.
    ///
    /// Returns the connections being evicted. Each farewell runs on its own
    /// task, so a failing eviction never stops the scan loop.
    pub fn sweep(&self) -> Vec<ConnectionId> {
        let now = Instant::now();
        let registry = self.coordinator.registry();

        let candidates: Vec<SessionSnapshot> = registry
            .entries()
            .into_iter()
            .filter(|entry| self.is_stale(entry, now))
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for entry in candidates {
            let connection = entry.connection;

            // The snapshot may be stale by now: speech could have started or
            // finished since it was taken.
            let still_idle = registry
                .idle_since(connection.id, Instant::now())
                .is_some_and(|idle| idle > self.settings.inactivity_timeout);
            if !still_idle
                || registry.is_leaving(connection.id)
                || self.coordinator.gateway().is_playing(&connection)
            {
                debug!("[{}] Connection {} became active, skipping", connection.guild_id, connection.id);
                continue;
            }

            info!(
                "[{}] Disconnecting idle connection {} from {}",
                connection.guild_id, connection.id, connection.channel_id
            );
            evicted.push(connection.id);

            let coordinator = self.coordinator.clone();
            let guild_id = connection.guild_id;
            let timeout = self.settings.inactivity_timeout;
            let task = tokio::spawn(async move {
                coordinator.evict_idle(connection, timeout).await;
            });
            tokio::spawn(async move {
                if let Err(e) = task.await {
                    error!("[{}] Idle eviction task failed: {}", guild_id, e);
                }
            });
        }

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{ChannelId, GatewayError, GuildId, UserId},
        gateway::{LoopbackGateway, VoiceGateway, loopback::GatewayCall},
        tts::testing::ScriptedSynthesizer,
        voice::{coordinator::CommandContext, registry::SessionRegistry},
    };

    const GUILD: GuildId = GuildId(1);

    fn settings() -> ReaperSettings {
        ReaperSettings {
            inactivity_timeout: Duration::from_secs(60),
            scan_interval: Duration::from_secs(30),
        }
    }

    fn setup() -> (LoopbackGateway, Arc<PlaybackCoordinator>, CancellationToken) {
        setup_with(ScriptedSynthesizer::default())
    }

    fn setup_with(
        synthesizer: ScriptedSynthesizer,
    ) -> (LoopbackGateway, Arc<PlaybackCoordinator>, CancellationToken) {
        let gateway = LoopbackGateway::new();
        gateway.add_guild(GUILD, "Guild");
        gateway.add_voice_channel(GUILD, ChannelId(10), "General");
        gateway.set_playback_duration(Some(Duration::from_secs(1)));

        let (coordinator, events) = PlaybackCoordinator::new(
            Arc::new(gateway.clone()),
            Arc::new(synthesizer),
            Arc::new(SessionRegistry::new()),
            "Bye".to_string(),
        );
        let cancel = CancellationToken::new();
        tokio::spawn(coordinator.clone().run_event_loop(events, cancel.clone()));
        (gateway, coordinator, cancel)
    }

    async fn speak(coordinator: &PlaybackCoordinator) -> ConnectionId {
        let ctx = CommandContext {
            guild_id: GUILD,
            author: UserId(100),
        };
        let receipt = coordinator.speak(&ctx, "hello").await.unwrap();
        // Let the clip finish so the completion refreshes the entry.
        tokio::time::sleep(Duration::from_secs(2)).await;
        receipt.connection.id
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_is_evicted() {
        let (gateway, coordinator, cancel) = setup();
        let id = speak(&coordinator).await;
        let reaper = InactivityReaper::new(coordinator.clone(), settings());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(reaper.sweep(), vec![id]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!coordinator.registry().contains(id));
        assert!(gateway.connection(GUILD).is_none());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_within_timeout_is_kept() {
        let (_gateway, coordinator, cancel) = setup();
        let id = speak(&coordinator).await;
        let reaper = InactivityReaper::new(coordinator.clone(), settings());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(reaper.sweep().is_empty());
        assert!(coordinator.registry().contains(id));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_connection_is_never_evicted() {
        let (gateway, coordinator, cancel) = setup();
        let id = speak(&coordinator).await;
        let reaper = InactivityReaper::new(coordinator.clone(), settings());

        // A long clip starts without refreshing the entry.
        gateway.set_playback_duration(Some(Duration::from_secs(600)));
        let conn = gateway.connection(GUILD).unwrap();
        gateway
            .play(&conn, bytes::Bytes::from_static(b"long"), Box::new(|_: Result<(), GatewayError>| {}))
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(reaper.sweep().is_empty());
        assert!(coordinator.registry().contains(id));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_during_farewell_synthesis_cancels_eviction() {
        let synthesizer = ScriptedSynthesizer::default();
        synthesizer.delay_on("Bye", Duration::from_secs(3));
        let (gateway, coordinator, cancel) = setup_with(synthesizer);
        let id = speak(&coordinator).await;
        let reaper = InactivityReaper::new(coordinator.clone(), settings());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(reaper.sweep(), vec![id]);

        // Someone speaks while "Bye" is still being synthesized.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let ctx = CommandContext {
            guild_id: GUILD,
            author: UserId(100),
        };
        let receipt = coordinator.speak(&ctx, "still here").await.unwrap();
        assert_eq!(receipt.connection.id, id);
        assert!(gateway.is_playing(&receipt.connection));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(gateway.connection(GUILD).is_some());
        assert!(coordinator.registry().contains(id));
        assert!(!coordinator.registry().is_leaving(id));
        assert!(!gateway.calls().contains(&GatewayCall::Disconnect(GUILD)));
        cancel.cancel();
    }

    #[test]
    fn test_zero_scan_interval_is_clamped() {
        let config = VoiceConfig {
            scan_interval_secs: 0,
            ..VoiceConfig::default()
        };
        let settings = ReaperSettings::from(&config);
        assert_eq!(settings.scan_interval, Duration::from_secs(1));
        assert_eq!(settings.inactivity_timeout, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_connection_is_skipped() {
        let (_gateway, coordinator, cancel) = setup();
        let id = speak(&coordinator).await;
        let reaper = InactivityReaper::new(coordinator.clone(), settings());

        assert!(coordinator.registry().mark_leaving(id));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(reaper.sweep().is_empty());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_waits_for_ready_and_stops_on_cancel() {
        let (gateway, coordinator, cancel) = setup();
        let id = speak(&coordinator).await;

        let reaper_cancel = CancellationToken::new();
        let handle = InactivityReaper::new(coordinator.clone(), settings()).spawn(reaper_cancel.clone());

        // Not ready yet: nothing is reaped however long we wait.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(coordinator.registry().contains(id));

        gateway.mark_ready();
        // First tick fires immediately, the next one 30s later sees 300s+ idle.
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(!coordinator.registry().contains(id));
        assert!(gateway.calls().contains(&GatewayCall::Disconnect(GUILD)));

        reaper_cancel.cancel();
        handle.await.unwrap();
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_ready() {
        let (_gateway, coordinator, cancel) = setup();
        let reaper_cancel = CancellationToken::new();
        let handle = InactivityReaper::new(coordinator, settings()).spawn(reaper_cancel.clone());

        reaper_cancel.cancel();
        handle.await.unwrap();
        cancel.cancel();
    }
}
