//! Entity records shared by the cache, the engines and the gateways.
//!
//! Statuses are stored as lowercase text in Postgres; every enum carries
//! `as_str`/`parse` for the gateway's row mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//////////////////////////////////////////////////
// Roles
//////////////////////////////////////////////////

/// Guild rank, strictly ordered. Exactly one `Owner` exists per guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuildRole {
    Member,
    Elder,
    Admin,
    Owner,
}

impl GuildRole {
    /// Centralized authorization predicate; all permission checks go
    /// through this instead of ad hoc `== Owner` comparisons.
    pub fn at_least(self, required: GuildRole) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GuildRole::Member => "member",
            GuildRole::Elder => "elder",
            GuildRole::Admin => "admin",
            GuildRole::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<GuildRole> {
        match s {
            "member" => Some(GuildRole::Member),
            "elder" => Some(GuildRole::Elder),
            "admin" => Some(GuildRole::Admin),
            "owner" => Some(GuildRole::Owner),
            _ => None,
        }
    }

    /// Next rank up, stopping below Owner (ownership moves only via
    /// transfer).
    pub fn promoted(self) -> Option<GuildRole> {
        match self {
            GuildRole::Member => Some(GuildRole::Elder),
            GuildRole::Elder => Some(GuildRole::Admin),
            GuildRole::Admin | GuildRole::Owner => None,
        }
    }

    pub fn demoted(self) -> Option<GuildRole> {
        match self {
            GuildRole::Admin => Some(GuildRole::Elder),
            GuildRole::Elder => Some(GuildRole::Member),
            GuildRole::Member | GuildRole::Owner => None,
        }
    }
}

//////////////////////////////////////////////////
// Guild & membership
//////////////////////////////////////////////////

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guild {
    pub id: Uuid,
    pub name: String,
    pub tag: String,
    pub description: String,
    pub announcement: String,
    pub owner_id: Uuid,
    pub level: i32,
    pub experience: i64,
    pub public_join: bool,
    pub created_at: DateTime<Utc>,
}

impl Guild {
    /// Experience needed to move past `level`.
    pub fn required_exp(level: i32) -> i64 {
        1500 * (i64::from(level) + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMember {
    pub id: Uuid,
    pub guild_id: Uuid,
    pub player_id: Uuid,
    pub display_name: String,
    pub role: GuildRole,
    pub joined_at: DateTime<Utc>,
}

//////////////////////////////////////////////////
// Diplomacy
//////////////////////////////////////////////////

/// Symmetric alliance edge; `a`/`b` are stored in sorted order so the
/// unordered pair has one canonical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alliance {
    pub a: Uuid,
    pub b: Uuid,
    pub formed_at: DateTime<Utc>,
}

impl Alliance {
    pub fn between(x: Uuid, y: Uuid, formed_at: DateTime<Utc>) -> Alliance {
        let (a, b) = ordered_pair(x, y);
        Alliance { a, b, formed_at }
    }
}

/// Canonical order for an unordered guild pair.
pub fn ordered_pair(x: Uuid, y: Uuid) -> (Uuid, Uuid) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<RequestStatus> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            "expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllianceRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub target_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarStatus {
    Pending,
    Preparing,
    Ongoing,
    Finished,
}

impl WarStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WarStatus::Pending => "pending",
            WarStatus::Preparing => "preparing",
            WarStatus::Ongoing => "ongoing",
            WarStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<WarStatus> {
        match s {
            "pending" => Some(WarStatus::Pending),
            "preparing" => Some(WarStatus::Preparing),
            "ongoing" => Some(WarStatus::Ongoing),
            "finished" => Some(WarStatus::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildWar {
    pub id: Uuid,
    pub attacker_id: Uuid,
    pub defender_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// `None` means draw or unresolved.
    pub winner_id: Option<Uuid>,
    pub status: WarStatus,
}

impl GuildWar {
    pub fn involves(&self, guild: Uuid) -> bool {
        self.attacker_id == guild || self.defender_id == guild
    }

    pub fn other_side(&self, guild: Uuid) -> Option<Uuid> {
        if self.attacker_id == guild {
            Some(self.defender_id)
        } else if self.defender_id == guild {
            Some(self.attacker_id)
        } else {
            None
        }
    }
}

/// Ceasefire request, scoped to one war.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeasefireRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub target_id: Uuid,
    pub war_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub status: RequestStatus,
}

//////////////////////////////////////////////////
// Activities
//////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Raid,
    Expedition,
    Training,
    Meeting,
    Social,
    Other,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Raid => "raid",
            ActivityKind::Expedition => "expedition",
            ActivityKind::Training => "training",
            ActivityKind::Meeting => "meeting",
            ActivityKind::Social => "social",
            ActivityKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<ActivityKind> {
        match s {
            "raid" => Some(ActivityKind::Raid),
            "expedition" => Some(ActivityKind::Expedition),
            "training" => Some(ActivityKind::Training),
            "meeting" => Some(ActivityKind::Meeting),
            "social" => Some(ActivityKind::Social),
            "other" => Some(ActivityKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Planned,
    Ongoing,
    Completed,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Planned => "planned",
            ActivityStatus::Ongoing => "ongoing",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<ActivityStatus> {
        match s {
            "planned" => Some(ActivityStatus::Planned),
            "ongoing" => Some(ActivityStatus::Ongoing),
            "completed" => Some(ActivityStatus::Completed),
            "cancelled" => Some(ActivityStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildActivity {
    pub id: Uuid,
    pub guild_id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: ActivityKind,
    pub creator_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub location: String,
    /// 0 = unlimited.
    pub max_participants: i32,
    pub created_at: DateTime<Utc>,
    pub status: ActivityStatus,
}

impl GuildActivity {
    /// Clock-derived status. Cancelled is sticky; everything else is a
    /// pure function of (persisted status, start, end, now). This is the
    /// single derivation point for "what is this activity right now".
    pub fn observed_status(&self, now: DateTime<Utc>) -> ActivityStatus {
        match self.status {
            ActivityStatus::Cancelled => ActivityStatus::Cancelled,
            _ if now < self.starts_at => ActivityStatus::Planned,
            _ if now < self.ends_at => ActivityStatus::Ongoing,
            _ => ActivityStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Registered,
    Confirmed,
    Attended,
    Absent,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantStatus::Registered => "registered",
            ParticipantStatus::Confirmed => "confirmed",
            ParticipantStatus::Attended => "attended",
            ParticipantStatus::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<ParticipantStatus> {
        match s {
            "registered" => Some(ParticipantStatus::Registered),
            "confirmed" => Some(ParticipantStatus::Confirmed),
            "attended" => Some(ParticipantStatus::Attended),
            "absent" => Some(ParticipantStatus::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityParticipant {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub player_id: Uuid,
    pub display_name: String,
    pub status: ParticipantStatus,
    pub registered_at: DateTime<Utc>,
}
