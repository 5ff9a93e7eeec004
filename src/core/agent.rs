//! Agent business logic.
//!
//! Agents are created with their cycle already positioned on the period
//! containing the creation time, and are only ever soft-deleted so that their
//! sales and history stay attributable.

use crate::{
    core::{
        cycle::{CycleConfig, compute_current_period},
        entity::EntityRef,
        targets::{
            TargetUpdate, check_non_negative, close_elapsed_before_edit, write_category_targets,
        },
    },
    entities::{Agent, Team, agent},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use tracing::{info, instrument};

/// Input for [`create_agent`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewAgent {
    /// Display name
    pub name: String,
    /// Team the agent sells for
    #[serde(default)]
    pub team_id: Option<i64>,
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

pub(crate) fn default_cycle() -> String {
    "monthly".to_string()
}

pub(crate) const fn default_reset_day() -> i32 {
    1
}

pub(crate) fn check_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation {
            message: "Name cannot be empty".to_string(),
        });
    }
    Ok(name.to_string())
}

async fn ensure_team_active<C>(db: &C, team_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    match Team::find_by_id(team_id).one(db).await? {
        Some(team) if team.is_active => Ok(()),
        _ => Err(Error::TeamNotFound { id: team_id }),
    }
}

/// Creates an agent and positions it on the period containing `now`.
#[instrument(skip(db, new), fields(name = %new.name))]
pub async fn create_agent(
    db: &DatabaseConnection,
    new: NewAgent,
    now: DateTime<Utc>,
) -> Result<agent::Model> {
    let name = check_name(&new.name)?;
    check_non_negative(new.target_volume_cents)?;
    check_non_negative(new.target_units)?;
    let config = CycleConfig::from_columns(&new.target_cycle, new.reset_day, new.reset_month)?;
    if let Some(team_id) = new.team_id {
        ensure_team_active(db, team_id).await?;
    }

    let period = compute_current_period(&config, now);
    let agent = agent::ActiveModel {
        name: Set(name),
        team_id: Set(new.team_id),
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
    };

    let agent = agent.insert(db).await?;
    info!("Created agent {} ({})", agent.name, agent.id);
    Ok(agent)
}

/// Gets an agent by ID, active or not.
pub async fn get_agent_by_id<C>(db: &C, id: i64) -> Result<Option<agent::Model>>
where
    C: ConnectionTrait,
{
    Ok(Agent::find_by_id(id).one(db).await?)
}

/// Gets an active agent by exact name.
pub async fn get_agent_by_name<C>(db: &C, name: &str) -> Result<Option<agent::Model>>
where
    C: ConnectionTrait,
{
    Ok(Agent::find()
        .filter(agent::Column::Name.eq(name))
        .filter(agent::Column::IsActive.eq(true))
        .one(db)
        .await?)
}

/// Gets an agent that exists and is active, or `AgentNotFound`.
pub async fn require_active_agent<C>(db: &C, id: i64) -> Result<agent::Model>
where
    C: ConnectionTrait,
{
    match get_agent_by_id(db, id).await? {
        Some(agent) if agent.is_active => Ok(agent),
        _ => Err(Error::AgentNotFound { id }),
    }
}

/// Lists active agents ordered by name.
pub async fn list_active_agents<C>(db: &C) -> Result<Vec<agent::Model>>
where
    C: ConnectionTrait,
{
    Ok(Agent::find()
        .filter(agent::Column::IsActive.eq(true))
        .order_by_asc(agent::Column::Name)
        .all(db)
        .await?)
}

/// Soft-deletes an agent. Sales and history are kept.
#[instrument(skip(db))]
pub async fn deactivate_agent(db: &DatabaseConnection, id: i64) -> Result<agent::Model> {
    let agent = require_active_agent(db, id).await?;

    let mut active_model: agent::ActiveModel = agent.into();
    active_model.is_active = Set(false);
    let agent = active_model.update(db).await?;

    info!("Deactivated agent {} ({})", agent.name, agent.id);
    Ok(agent)
}

/// Updates an agent's targets and cycle settings.
///
/// Periods that already ended are closed first, under the old targets and in
/// the same transaction. When the cycle settings change the agent is then
/// moved to the period containing `now`; the abandoned part of the running
/// period gets no history record. Category targets are replaced in the same
/// transaction when `update.categories` is present.
#[instrument(skip(db, update))]
pub async fn update_agent_targets(
    db: &DatabaseConnection,
    id: i64,
    update: &TargetUpdate,
    now: DateTime<Utc>,
) -> Result<agent::Model> {
    let config = update.validate()?;

    let txn = db.begin().await?;
    let agent = require_active_agent(&txn, id).await?;
    let settled = close_elapsed_before_edit(&txn, &agent, now).await?;
    let agent = if settled > 0 {
        require_active_agent(&txn, id).await?
    } else {
        agent
    };
    let old_config =
        CycleConfig::from_columns(&agent.target_cycle, agent.reset_day, agent.reset_month).ok();
    let reposition =
        old_config != Some(config) || agent.period_start.is_none() || agent.next_reset.is_none();

    let mut active_model: agent::ActiveModel = agent.into();
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
    let agent = active_model.update(&txn).await?;

    if let Some(goals) = &update.categories {
        write_category_targets(&txn, EntityRef::agent(id), goals).await?;
    }
    txn.commit().await?;

    info!(
        "Updated targets for agent {} (closed: {}, repositioned: {})",
        agent.id, settled, reposition
    );
    Ok(agent)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::aggregate::CategoryGoal;
    use crate::core::history::list_history;
    use crate::core::reset::CycleResetEngine;
    use crate::core::store::CycleStore;
    use crate::core::targets::get_category_targets;
    use crate::realtime::Broadcaster;
    use crate::test_utils::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn new_agent(name: &str) -> NewAgent {
        NewAgent {
            name: name.to_string(),
            team_id: None,
            target_volume_cents: 100_000,
            target_units: 10,
            target_cycle: "monthly".to_string(),
            reset_day: 15,
            reset_month: None,
        }
    }

    fn monthly_update(reset_day: i32) -> TargetUpdate {
        TargetUpdate {
            target_volume_cents: 250_000,
            target_units: 20,
            target_cycle: "monthly".to_string(),
            reset_day,
            reset_month: None,
            categories: None,
        }
    }

    #[tokio::test]
    async fn test_create_agent_positions_cycle() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap();
        let agent = create_agent(&db, new_agent("  Ava "), now).await?;

        assert_eq!(agent.name, "Ava");
        assert!(agent.is_active);
        assert_eq!(agent.period_start, Some(Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap()));
        assert_eq!(agent.next_reset, Some(Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_agent_rejects_bad_input() -> Result<()> {
        let db = setup_test_db().await?;
        let now = Utc::now();

        let mut bad_cycle = new_agent("Ava");
        bad_cycle.reset_day = 32;
        assert!(matches!(
            create_agent(&db, bad_cycle, now).await,
            Err(Error::InvalidCycle { .. })
        ));

        let mut negative = new_agent("Ava");
        negative.target_volume_cents = -5;
        assert!(matches!(
            create_agent(&db, negative, now).await,
            Err(Error::InvalidAmount { amount: -5 })
        ));

        let mut unknown_team = new_agent("Ava");
        unknown_team.team_id = Some(99);
        assert!(matches!(
            create_agent(&db, unknown_team, now).await,
            Err(Error::TeamNotFound { id: 99 })
        ));

        assert!(matches!(
            create_agent(&db, new_agent("   "), now).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivate_agent() -> Result<()> {
        let db = setup_test_db().await?;
        let agent = create_test_agent(&db, "Ava", None).await?;

        let gone = deactivate_agent(&db, agent.id).await?;
        assert!(!gone.is_active);
        assert!(list_active_agents(&db).await?.is_empty());
        assert!(get_agent_by_id(&db, agent.id).await?.is_some());
        assert!(matches!(
            deactivate_agent(&db, agent.id).await,
            Err(Error::AgentNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_targets_keeps_period_when_cycle_unchanged() -> Result<()> {
        let db = setup_test_db().await?;
        let agent = create_test_agent(&db, "Ava", None).await?;

        let later = agent.period_start.unwrap() + chrono::Duration::days(3);
        let updated = update_agent_targets(&db, agent.id, &monthly_update(1), later).await?;
        assert_eq!(updated.target_volume_cents, 250_000);
        assert_eq!(updated.period_start, agent.period_start);
        assert_eq!(updated.next_reset, agent.next_reset);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_targets_repositions_on_cycle_change() -> Result<()> {
        let db = setup_test_db().await?;
        let agent = create_test_agent(&db, "Ava", None).await?;
        let now = Utc.with_ymd_and_hms(2024, 8, 20, 0, 0, 0).unwrap();

        let mut update = monthly_update(10);
        update.categories = Some(vec![CategoryGoal {
            category: "solar".to_string(),
            target_volume_cents: 5_000,
            target_units: 1,
        }]);
        let updated = update_agent_targets(&db, agent.id, &update, now).await?;

        assert_eq!(updated.reset_day, 10);
        assert_eq!(updated.period_start, Some(Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap()));
        assert_eq!(updated.next_reset, Some(Utc.with_ymd_and_hms(2024, 9, 10, 0, 0, 0).unwrap()));
        assert_eq!(get_category_targets(&db, EntityRef::agent(agent.id)).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_targets_rejects_invalid_cycle_without_writing() -> Result<()> {
        let db = setup_test_db().await?;
        let agent = create_test_agent(&db, "Ava", None).await?;

        let mut update = monthly_update(1);
        update.target_cycle = "yearly".to_string();
        let result = update_agent_targets(&db, agent.id, &update, Utc::now()).await;
        assert!(matches!(result, Err(Error::InvalidCycle { .. })));

        let stored = get_agent_by_id(&db, agent.id).await?.unwrap();
        assert_eq!(stored, agent);
        Ok(())
    }

    #[tokio::test]
    async fn test_cycle_change_closes_elapsed_periods_first() -> Result<()> {
        let store = setup_test_store().await?;
        let db = store.connection();
        let mut new = new_agent("Ava");
        new.reset_day = 1;
        let agent = create_agent(db, new, utc(2024, 1, 15)).await?;
        create_sale_at(db, agent.id, 50_000, 1, utc(2024, 1, 20)).await?;

        let now = Utc.with_ymd_and_hms(2024, 4, 10, 9, 0, 0).unwrap();
        let updated = update_agent_targets(db, agent.id, &monthly_update(15), now).await?;
        assert_eq!(updated.period_start, Some(utc(2024, 3, 15)));
        assert_eq!(updated.next_reset, Some(utc(2024, 4, 15)));
        assert_eq!(updated.target_volume_cents, 250_000);

        // January to March were closed under the targets in force at the time
        let history = list_history(db, EntityRef::agent(agent.id)).await?;
        let starts: Vec<DateTime<Utc>> = history.iter().rev().map(|h| h.period_start).collect();
        assert_eq!(starts, vec![utc(2024, 1, 1), utc(2024, 2, 1), utc(2024, 3, 1)]);
        assert_eq!(history[2].achieved_volume_cents, 50_000);
        assert!(history.iter().all(|h| h.target_volume_cents == 100_000));

        // Nothing is left for the next pass to close
        let engine = CycleResetEngine::new(
            Arc::new(store.clone()) as Arc<dyn CycleStore>,
            Arc::new(Broadcaster::new()),
        );
        let report = engine.run_pass(now).await?;
        assert_eq!(report.periods_closed, 0);
        assert_eq!(list_history(db, EntityRef::agent(agent.id)).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_edit_closes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let mut new = new_agent("Ava");
        new.reset_day = 1;
        let agent = create_agent(&db, new, utc(2024, 1, 15)).await?;

        let mut update = monthly_update(1);
        update.categories = Some(vec![
            CategoryGoal {
                category: "solar".to_string(),
                target_volume_cents: 1,
                target_units: 1,
            },
            CategoryGoal {
                category: " solar".to_string(),
                target_volume_cents: 2,
                target_units: 1,
            },
        ]);
        let result = update_agent_targets(&db, agent.id, &update, utc(2024, 3, 5)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        assert!(list_history(&db, EntityRef::agent(agent.id)).await?.is_empty());
        let stored = get_agent_by_id(&db, agent.id).await?.unwrap();
        assert_eq!(stored.period_start, Some(utc(2024, 1, 1)));
        Ok(())
    }
}
