//! Team business logic.

use crate::{
    core::{
        agent::{check_name, default_cycle, default_reset_day},
        cycle::{CycleConfig, compute_current_period},
        entity::EntityRef,
        targets::{
            TargetUpdate, check_non_negative, close_elapsed_before_edit, write_category_targets,
        },
    },
    entities::{Agent, Team, agent, team},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use tracing::{info, instrument};

/// Input for [`create_team`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTeam {
    /// Display name
    pub name: String,
    /// Volume target in minor currency units
    #[serde(default)]
    pub target_volume_cents: i64,
    /// Unit target
    #[serde(default)]
    pub target_units: i64,
    /// `"monthly"` or `"yearly"`
    #[serde(default = "default_cycle")]
    pub target_cycle: String,
    /// Day of month the period starts on
    #[serde(default = "default_reset_day")]
    pub reset_day: i32,
    /// Month of the reset, yearly cycles only
    #[serde(default)]
    pub reset_month: Option<i32>,
}

/// Creates a team and positions it on the period containing `now`.
#[instrument(skip(db, new), fields(name = %new.name))]
pub async fn create_team(
    db: &DatabaseConnection,
    new: NewTeam,
    now: DateTime<Utc>,
) -> Result<team::Model> {
    let name = check_name(&new.name)?;
    check_non_negative(new.target_volume_cents)?;
    check_non_negative(new.target_units)?;
    let config = CycleConfig::from_columns(&new.target_cycle, new.reset_day, new.reset_month)?;

    let period = compute_current_period(&config, now);
    let team = team::ActiveModel {
        name: Set(name),
        target_volume_cents: Set(new.target_volume_cents),
        target_units: Set(new.target_units),
        target_cycle: Set(config.cycle_type().as_str().to_string()),
        reset_day: Set(new.reset_day),
        reset_month: Set(config.reset_month().and(new.reset_month)),
        period_start: Set(Some(period.start)),
        next_reset: Set(Some(period.end)),
        is_active: Set(true),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created team {} ({})", team.name, team.id);
    Ok(team)
}

/// Gets a team by ID, active or not.
pub async fn get_team_by_id<C>(db: &C, id: i64) -> Result<Option<team::Model>>
where
    C: ConnectionTrait,
{
    Ok(Team::find_by_id(id).one(db).await?)
}

/// Gets an active team by exact name.
pub async fn get_team_by_name<C>(db: &C, name: &str) -> Result<Option<team::Model>>
where
    C: ConnectionTrait,
{
    Ok(Team::find()
        .filter(team::Column::Name.eq(name))
        .filter(team::Column::IsActive.eq(true))
        .one(db)
        .await?)
}

async fn require_active_team<C>(db: &C, id: i64) -> Result<team::Model>
where
    C: ConnectionTrait,
{
    match get_team_by_id(db, id).await? {
        Some(team) if team.is_active => Ok(team),
        _ => Err(Error::TeamNotFound { id }),
    }
}

/// Lists active teams ordered by name.
pub async fn list_active_teams<C>(db: &C) -> Result<Vec<team::Model>>
where
    C: ConnectionTrait,
{
    Ok(Team::find()
        .filter(team::Column::IsActive.eq(true))
        .order_by_asc(team::Column::Name)
        .all(db)
        .await?)
}

/// Active members of a team.
pub async fn list_team_members<C>(db: &C, team_id: i64) -> Result<Vec<agent::Model>>
where
    C: ConnectionTrait,
{
    Ok(Agent::find()
        .filter(agent::Column::TeamId.eq(team_id))
        .filter(agent::Column::IsActive.eq(true))
        .order_by_asc(agent::Column::Name)
        .all(db)
        .await?)
}

/// Soft-deletes a team. Members keep their `team_id`.
#[instrument(skip(db))]
pub async fn deactivate_team(db: &DatabaseConnection, id: i64) -> Result<team::Model> {
    let team = require_active_team(db, id).await?;

    let mut active_model: team::ActiveModel = team.into();
    active_model.is_active = Set(false);
    let team = active_model.update(db).await?;

    info!("Deactivated team {} ({})", team.name, team.id);
    Ok(team)
}

/// Updates a team's targets and cycle settings; see
/// [`crate::core::agent::update_agent_targets`] for the repositioning rule.
#[instrument(skip(db, update))]
pub async fn update_team_targets(
    db: &DatabaseConnection,
    id: i64,
    update: &TargetUpdate,
    now: DateTime<Utc>,
) -> Result<team::Model> {
    let config = update.validate()?;

    let txn = db.begin().await?;
    let team = require_active_team(&txn, id).await?;
    let settled = close_elapsed_before_edit(&txn, &team, now).await?;
    let team = if settled > 0 {
        require_active_team(&txn, id).await?
    } else {
        team
    };
    let old_config =
        CycleConfig::from_columns(&team.target_cycle, team.reset_day, team.reset_month).ok();
    let reposition =
        old_config != Some(config) || team.period_start.is_none() || team.next_reset.is_none();

    let mut active_model: team::ActiveModel = team.into();
    active_model.target_volume_cents = Set(update.target_volume_cents);
    active_model.target_units = Set(update.target_units);
    active_model.target_cycle = Set(config.cycle_type().as_str().to_string());
    active_model.reset_day = Set(update.reset_day);
    active_model.reset_month = Set(config.reset_month().and(update.reset_month));
    if reposition {
        let period = compute_current_period(&config, now);
        active_model.period_start = Set(Some(period.start));
        active_model.next_reset = Set(Some(period.end));
    }
    let team = active_model.update(&txn).await?;

    if let Some(goals) = &update.categories {
        write_category_targets(&txn, EntityRef::team(id), goals).await?;
    }
    txn.commit().await?;

    info!(
        "Updated targets for team {} (closed: {}, repositioned: {})",
        team.id, settled, reposition
    );
    Ok(team)
}
