//! Service configuration types for hostdesk.
//!
//! `ChatConfig` represents the `config.toml` that controls session idle
//! timeouts, typing staleness, and sweep cadence. All fields have
//! conservative defaults so the file is optional.

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Tunable timings for the chat service.
///
/// Loaded from `{data_dir}/config.toml`. All fields have defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// A session with no message or typing signal for this long is
    /// unilaterally ended by the idle sweeper.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Server-side ceiling on how long a `typing: true` signal may be
    /// displayed without a follow-up.
    #[serde(default = "default_typing_ceiling_secs")]
    pub typing_ceiling_secs: u64,

    /// A session whose participants have all disconnected is closed once
    /// idle for this long, rather than the full idle timeout.
    #[serde(default = "default_disconnect_grace_secs")]
    pub disconnect_grace_secs: u64,

    /// Cadence of the background sweeper (idle sessions, stale typing).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Capacity of the lifecycle event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_typing_ceiling_secs() -> u64 {
    5
}

fn default_disconnect_grace_secs() -> u64 {
    120
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            typing_ceiling_secs: default_typing_ceiling_secs(),
            disconnect_grace_secs: default_disconnect_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ChatConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn typing_ceiling(&self) -> Duration {
        Duration::from_secs(self.typing_ceiling_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
