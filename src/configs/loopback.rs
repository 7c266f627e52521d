use serde::{Deserialize, Serialize};

/// Guild fixture served by the in-process loopback gateway.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoopbackConfig {
    #[serde(default)]
    pub guilds: Vec<LoopbackGuild>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoopbackGuild {
    pub id: u64,
    pub name: String,
    /// Member whose stdin lines are treated as commands.
    pub operator_id: u64,
    #[serde(default)]
    pub channels: Vec<LoopbackChannel>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoopbackChannel {
    pub id: u64,
    pub name: String,
    /// Members already sitting in the channel at startup.
    #[serde(default)]
    pub members: Vec<u64>,
}
