//! Runtime configuration for the Guildhall server.
//!
//! Parsed once from the environment at startup and injected into the
//! engine; tests build their own `Settings` with short windows.

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Minimum roster size before a guild may declare or accept a war.
    pub war_min_members: usize,
    /// Seconds a war invitation stays answerable.
    pub war_invite_ttl_secs: u64,
    /// Minutes of the preparation window between acceptance and combat.
    pub war_prep_mins: u64,
    /// Minutes an ongoing war runs before it auto-finishes.
    pub war_duration_mins: u64,
    /// Seconds a guild-join invitation stays answerable.
    pub invite_ttl_secs: u64,
    /// Seconds between invite-expiry sweeps.
    pub invite_sweep_secs: u64,
    /// Seconds between activity sweeps.
    pub activity_sweep_secs: u64,
    /// Seconds between expired war-invitation purges.
    pub war_invite_purge_secs: u64,
    /// Member cap per guild; 0 = unlimited.
    pub guild_max_members: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            war_min_members: parsed("WAR_MIN_MEMBERS", 3),
            war_invite_ttl_secs: parsed("WAR_INVITE_TTL", 300),
            war_prep_mins: parsed("WAR_PREP_MINS", 10),
            war_duration_mins: parsed("WAR_DURATION_MINS", 60),
            invite_ttl_secs: parsed("INVITE_TTL", 60),
            invite_sweep_secs: parsed("INVITE_SWEEP_SECS", 30),
            activity_sweep_secs: parsed("ACTIVITY_SWEEP_SECS", 60),
            war_invite_purge_secs: parsed("WAR_INVITE_PURGE_SECS", 60),
            guild_max_members: parsed("GUILD_MAX_MEMBERS", 30),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            war_min_members: 3,
            war_invite_ttl_secs: 300,
            war_prep_mins: 10,
            war_duration_mins: 60,
            invite_ttl_secs: 60,
            invite_sweep_secs: 30,
            activity_sweep_secs: 60,
            war_invite_purge_secs: 60,
            guild_max_members: 30,
        }
    }
}

fn parsed<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
