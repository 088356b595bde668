//! Wire events fanned out to online players.
//!
//! Serialized as tagged JSON and published on `player:{id}:events`; the
//! gateway front-end turns them into localized chat lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Notice {
    // ---- membership ---------------------------------------------------
    GuildInvite {
        guild_id: Uuid,
        guild_name: String,
        inviter_id: Uuid,
    },
    GuildInviteExpired {
        guild_id: Uuid,
    },
    GuildInviteDeclined {
        guild_id: Uuid,
        player_id: Uuid,
    },
    MemberJoined {
        guild_id: Uuid,
        player_id: Uuid,
        display_name: String,
    },
    MemberLeft {
        guild_id: Uuid,
        player_id: Uuid,
    },
    RoleChanged {
        guild_id: Uuid,
        player_id: Uuid,
        role: String,
    },
    GuildDisbanded {
        guild_id: Uuid,
    },
    GuildLevelUp {
        guild_id: Uuid,
        level: i32,
    },

    // ---- alliances ----------------------------------------------------
    AllianceRequested {
        requester_id: Uuid,
        requester_name: String,
        target_id: Uuid,
    },
    AllianceFormed {
        a: Uuid,
        b: Uuid,
    },
    AllianceRejected {
        requester_id: Uuid,
        target_id: Uuid,
    },
    AllianceBroken {
        a: Uuid,
        b: Uuid,
    },

    // ---- wars ---------------------------------------------------------
    WarInvited {
        challenger_id: Uuid,
        challenger_name: String,
        target_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    WarPreparing {
        war_id: Uuid,
        attacker_id: Uuid,
        defender_id: Uuid,
        combat_at: DateTime<Utc>,
    },
    WarStarted {
        war_id: Uuid,
        attacker_id: Uuid,
        defender_id: Uuid,
    },
    WarEnded {
        war_id: Uuid,
        winner_id: Option<Uuid>,
    },
    CeasefireRequested {
        war_id: Uuid,
        requester_id: Uuid,
        target_id: Uuid,
    },
    CeasefireRejected {
        war_id: Uuid,
        requester_id: Uuid,
    },

    // ---- activities ---------------------------------------------------
    ActivityReminder {
        activity_id: Uuid,
        name: String,
        minutes_left: i64,
    },
    ActivityStarted {
        activity_id: Uuid,
        name: String,
    },
    ActivityEnded {
        activity_id: Uuid,
        name: String,
    },
    ActivityCancelled {
        activity_id: Uuid,
        name: String,
    },
}
