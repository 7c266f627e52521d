use std::sync::Arc;

use saybot::{
    commands,
    common::{AnyResult, GuildId, UserId, logger},
    configs::Config,
    gateway::LoopbackGateway,
    tts::GoogleTranslateTts,
    voice::{CommandContext, VoiceManager},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    let operator = config
        .loopback
        .guilds
        .first()
        .map(|guild| CommandContext {
            guild_id: GuildId(guild.id),
            author: UserId(guild.operator_id),
        })
        .ok_or("loopback.guilds must define at least one guild")?;

    let gateway = LoopbackGateway::from_config(&config.loopback);
    let synthesizer = GoogleTranslateTts::new(config.tts.clone())?;
    let manager = VoiceManager::start(
        Arc::new(gateway.clone()),
        Arc::new(synthesizer),
        &config.voice,
    );
    gateway.mark_ready();

    info!(
        "Ready. Reading commands for guild {} as user {} (prefix '{}')",
        operator.guild_id, operator.author, config.bot.command_prefix
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                let reply = match commands::parse(&config.bot.command_prefix, &line) {
                    Some(Ok(command)) => commands::dispatch(&manager, &operator, command).await,
                    Some(Err(e)) => e.to_string(),
                    None => continue,
                };
                println!("{}", reply);
            }
        }
    }

    manager.shutdown().await;
    info!("Bye");
    Ok(())
}
