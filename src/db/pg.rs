//! Postgres gateway.
//!
//! Queries use sqlx's runtime API so the crate builds without a live
//! database. Statuses and roles travel as lowercase text columns.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::gateway::{GatewayError, GatewayResult, PersistenceGateway};
use crate::db::models::*;

pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        PgGateway { pool }
    }
}

fn db_err(e: sqlx::Error) -> GatewayError {
    GatewayError::Database(e.to_string())
}

fn bad_column(col: &str, value: &str) -> GatewayError {
    GatewayError::Database(format!("unrecognized {col} value: {value}"))
}

//////////////////////////////////////////////////
// Row mapping
//////////////////////////////////////////////////

fn guild_from_row(row: &PgRow) -> GatewayResult<Guild> {
    Ok(Guild {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        tag: row.try_get("tag").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        announcement: row.try_get("announcement").map_err(db_err)?,
        owner_id: row.try_get("owner_id").map_err(db_err)?,
        level: row.try_get("level").map_err(db_err)?,
        experience: row.try_get("experience").map_err(db_err)?,
        public_join: row.try_get("public_join").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn member_from_row(row: &PgRow) -> GatewayResult<GuildMember> {
    let role: String = row.try_get("role").map_err(db_err)?;
    Ok(GuildMember {
        id: row.try_get("id").map_err(db_err)?,
        guild_id: row.try_get("guild_id").map_err(db_err)?,
        player_id: row.try_get("player_id").map_err(db_err)?,
        display_name: row.try_get("display_name").map_err(db_err)?,
        role: GuildRole::parse(&role).ok_or_else(|| bad_column("role", &role))?,
        joined_at: row.try_get("joined_at").map_err(db_err)?,
    })
}

fn alliance_from_row(row: &PgRow) -> GatewayResult<Alliance> {
    Ok(Alliance {
        a: row.try_get("guild_a").map_err(db_err)?,
        b: row.try_get("guild_b").map_err(db_err)?,
        formed_at: row.try_get("formed_at").map_err(db_err)?,
    })
}

fn alliance_request_from_row(row: &PgRow) -> GatewayResult<AllianceRequest> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(AllianceRequest {
        id: row.try_get("id").map_err(db_err)?,
        requester_id: row.try_get("requester_id").map_err(db_err)?,
        target_id: row.try_get("target_id").map_err(db_err)?,
        requested_at: row.try_get("requested_at").map_err(db_err)?,
        status: RequestStatus::parse(&status).ok_or_else(|| bad_column("status", &status))?,
    })
}

fn war_from_row(row: &PgRow) -> GatewayResult<GuildWar> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(GuildWar {
        id: row.try_get("id").map_err(db_err)?,
        attacker_id: row.try_get("attacker_id").map_err(db_err)?,
        defender_id: row.try_get("defender_id").map_err(db_err)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        ended_at: row.try_get("ended_at").map_err(db_err)?,
        winner_id: row.try_get("winner_id").map_err(db_err)?,
        status: WarStatus::parse(&status).ok_or_else(|| bad_column("status", &status))?,
    })
}

fn ceasefire_from_row(row: &PgRow) -> GatewayResult<CeasefireRequest> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(CeasefireRequest {
        id: row.try_get("id").map_err(db_err)?,
        requester_id: row.try_get("requester_id").map_err(db_err)?,
        target_id: row.try_get("target_id").map_err(db_err)?,
        war_id: row.try_get("war_id").map_err(db_err)?,
        requested_at: row.try_get("requested_at").map_err(db_err)?,
        status: RequestStatus::parse(&status).ok_or_else(|| bad_column("status", &status))?,
    })
}

fn activity_from_row(row: &PgRow) -> GatewayResult<GuildActivity> {
    let kind: String = row.try_get("kind").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(GuildActivity {
        id: row.try_get("id").map_err(db_err)?,
        guild_id: row.try_get("guild_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        kind: ActivityKind::parse(&kind).ok_or_else(|| bad_column("kind", &kind))?,
        creator_id: row.try_get("creator_id").map_err(db_err)?,
        starts_at: row.try_get("starts_at").map_err(db_err)?,
        ends_at: row.try_get("ends_at").map_err(db_err)?,
        location: row.try_get("location").map_err(db_err)?,
        max_participants: row.try_get("max_participants").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        status: ActivityStatus::parse(&status).ok_or_else(|| bad_column("status", &status))?,
    })
}

fn participant_from_row(row: &PgRow) -> GatewayResult<ActivityParticipant> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(ActivityParticipant {
        id: row.try_get("id").map_err(db_err)?,
        activity_id: row.try_get("activity_id").map_err(db_err)?,
        player_id: row.try_get("player_id").map_err(db_err)?,
        display_name: row.try_get("display_name").map_err(db_err)?,
        status: ParticipantStatus::parse(&status).ok_or_else(|| bad_column("status", &status))?,
        registered_at: row.try_get("registered_at").map_err(db_err)?,
    })
}

//////////////////////////////////////////////////
// Gateway impl
//////////////////////////////////////////////////

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn create_guild(&self, guild: &Guild) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO guilds
                 (id, name, tag, description, announcement, owner_id,
                  level, experience, public_join, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(guild.id)
        .bind(&guild.name)
        .bind(&guild.tag)
        .bind(&guild.description)
        .bind(&guild.announcement)
        .bind(guild.owner_id)
        .bind(guild.level)
        .bind(guild.experience)
        .bind(guild.public_join)
        .bind(guild.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_guild(&self, guild: &Guild) -> GatewayResult<()> {
        sqlx::query(
            "UPDATE guilds
                SET name = $2, tag = $3, description = $4, announcement = $5,
                    owner_id = $6, level = $7, experience = $8, public_join = $9
              WHERE id = $1",
        )
        .bind(guild.id)
        .bind(&guild.name)
        .bind(&guild.tag)
        .bind(&guild.description)
        .bind(&guild.announcement)
        .bind(guild.owner_id)
        .bind(guild.level)
        .bind(guild.experience)
        .bind(guild.public_join)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_guild(&self, id: Uuid) -> GatewayResult<()> {
        sqlx::query("DELETE FROM guilds WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn guild_by_id(&self, id: Uuid) -> GatewayResult<Option<Guild>> {
        sqlx::query("SELECT * FROM guilds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(|r| guild_from_row(&r))
            .transpose()
    }

    async fn guild_by_name(&self, name: &str) -> GatewayResult<Option<Guild>> {
        sqlx::query("SELECT * FROM guilds WHERE LOWER(name) = LOWER($1)")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(|r| guild_from_row(&r))
            .transpose()
    }

    async fn guild_by_tag(&self, tag: &str) -> GatewayResult<Option<Guild>> {
        sqlx::query("SELECT * FROM guilds WHERE LOWER(tag) = LOWER($1)")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(|r| guild_from_row(&r))
            .transpose()
    }

    async fn all_guilds(&self) -> GatewayResult<Vec<Guild>> {
        sqlx::query("SELECT * FROM guilds ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(guild_from_row)
            .collect()
    }

    async fn create_member(&self, member: &GuildMember) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO guild_members
                 (id, guild_id, player_id, display_name, role, joined_at)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(member.id)
        .bind(member.guild_id)
        .bind(member.player_id)
        .bind(&member.display_name)
        .bind(member.role.as_str())
        .bind(member.joined_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_member(&self, member: &GuildMember) -> GatewayResult<()> {
        sqlx::query("UPDATE guild_members SET display_name = $2, role = $3 WHERE id = $1")
            .bind(member.id)
            .bind(&member.display_name)
            .bind(member.role.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_member(&self, id: Uuid) -> GatewayResult<()> {
        sqlx::query("DELETE FROM guild_members WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_members_of_guild(&self, guild_id: Uuid) -> GatewayResult<()> {
        sqlx::query("DELETE FROM guild_members WHERE guild_id = $1")
            .bind(guild_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn all_members(&self) -> GatewayResult<Vec<GuildMember>> {
        sqlx::query("SELECT * FROM guild_members ORDER BY joined_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(member_from_row)
            .collect()
    }

    async fn create_alliance(&self, alliance: &Alliance) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO alliances (guild_a, guild_b, formed_at) VALUES ($1,$2,$3)",
        )
        .bind(alliance.a)
        .bind(alliance.b)
        .bind(alliance.formed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_alliance(&self, a: Uuid, b: Uuid) -> GatewayResult<()> {
        let (a, b) = ordered_pair(a, b);
        sqlx::query("DELETE FROM alliances WHERE guild_a = $1 AND guild_b = $2")
            .bind(a)
            .bind(b)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn all_alliances(&self) -> GatewayResult<Vec<Alliance>> {
        sqlx::query("SELECT * FROM alliances")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(alliance_from_row)
            .collect()
    }

    async fn create_alliance_request(&self, req: &AllianceRequest) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO alliance_requests
                 (id, requester_id, target_id, requested_at, status)
             VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(req.id)
        .bind(req.requester_id)
        .bind(req.target_id)
        .bind(req.requested_at)
        .bind(req.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_alliance_request(&self, req: &AllianceRequest) -> GatewayResult<()> {
        sqlx::query("UPDATE alliance_requests SET status = $2 WHERE id = $1")
            .bind(req.id)
            .bind(req.status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_settled_requests_between(&self, a: Uuid, b: Uuid) -> GatewayResult<()> {
        sqlx::query(
            "DELETE FROM alliance_requests
              WHERE status <> 'pending'
                AND ((requester_id = $1 AND target_id = $2)
                  OR (requester_id = $2 AND target_id = $1))",
        )
        .bind(a)
        .bind(b)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_requests_with_guild(&self, guild_id: Uuid) -> GatewayResult<()> {
        sqlx::query(
            "DELETE FROM alliance_requests WHERE requester_id = $1 OR target_id = $1",
        )
        .bind(guild_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn pending_alliance_requests(&self) -> GatewayResult<Vec<AllianceRequest>> {
        sqlx::query("SELECT * FROM alliance_requests WHERE status = 'pending'")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(alliance_request_from_row)
            .collect()
    }

    async fn create_war(&self, war: &GuildWar) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO guild_wars
                 (id, attacker_id, defender_id, started_at, ended_at, winner_id, status)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(war.id)
        .bind(war.attacker_id)
        .bind(war.defender_id)
        .bind(war.started_at)
        .bind(war.ended_at)
        .bind(war.winner_id)
        .bind(war.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_war(&self, war: &GuildWar) -> GatewayResult<()> {
        sqlx::query(
            "UPDATE guild_wars
                SET ended_at = $2, winner_id = $3, status = $4
              WHERE id = $1",
        )
        .bind(war.id)
        .bind(war.ended_at)
        .bind(war.winner_id)
        .bind(war.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn unfinished_wars(&self) -> GatewayResult<Vec<GuildWar>> {
        sqlx::query("SELECT * FROM guild_wars WHERE status <> 'finished'")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(war_from_row)
            .collect()
    }

    async fn create_ceasefire(&self, req: &CeasefireRequest) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO ceasefire_requests
                 (id, requester_id, target_id, war_id, requested_at, status)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(req.id)
        .bind(req.requester_id)
        .bind(req.target_id)
        .bind(req.war_id)
        .bind(req.requested_at)
        .bind(req.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_ceasefire(&self, req: &CeasefireRequest) -> GatewayResult<()> {
        sqlx::query("UPDATE ceasefire_requests SET status = $2 WHERE id = $1")
            .bind(req.id)
            .bind(req.status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn pending_ceasefires(&self) -> GatewayResult<Vec<CeasefireRequest>> {
        sqlx::query("SELECT * FROM ceasefire_requests WHERE status = 'pending'")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(ceasefire_from_row)
            .collect()
    }

    async fn create_activity(&self, activity: &GuildActivity) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO guild_activities
                 (id, guild_id, name, description, kind, creator_id,
                  starts_at, ends_at, location, max_participants, created_at, status)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(activity.id)
        .bind(activity.guild_id)
        .bind(&activity.name)
        .bind(&activity.description)
        .bind(activity.kind.as_str())
        .bind(activity.creator_id)
        .bind(activity.starts_at)
        .bind(activity.ends_at)
        .bind(&activity.location)
        .bind(activity.max_participants)
        .bind(activity.created_at)
        .bind(activity.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_activity(&self, activity: &GuildActivity) -> GatewayResult<()> {
        sqlx::query("UPDATE guild_activities SET status = $2 WHERE id = $1")
            .bind(activity.id)
            .bind(activity.status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_activities_of_guild(&self, guild_id: Uuid) -> GatewayResult<()> {
        sqlx::query(
            "DELETE FROM activity_participants
              WHERE activity_id IN (SELECT id FROM guild_activities WHERE guild_id = $1)",
        )
        .bind(guild_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query("DELETE FROM guild_activities WHERE guild_id = $1")
            .bind(guild_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn all_activities(&self) -> GatewayResult<Vec<GuildActivity>> {
        sqlx::query("SELECT * FROM guild_activities ORDER BY starts_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(activity_from_row)
            .collect()
    }

    async fn create_participant(&self, participant: &ActivityParticipant) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO activity_participants
                 (id, activity_id, player_id, display_name, status, registered_at)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(participant.id)
        .bind(participant.activity_id)
        .bind(participant.player_id)
        .bind(&participant.display_name)
        .bind(participant.status.as_str())
        .bind(participant.registered_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_participant(&self, id: Uuid) -> GatewayResult<()> {
        sqlx::query("DELETE FROM activity_participants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn all_participants(&self) -> GatewayResult<Vec<ActivityParticipant>> {
        sqlx::query("SELECT * FROM activity_participants")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(participant_from_row)
            .collect()
    }
}
