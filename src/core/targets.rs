//! Target configuration shared by agents and teams.
//!
//! Category targets are replaced wholesale: the old set is deleted and the
//! new one inserted inside one transaction, so readers never observe a mix.

use crate::{
    core::{
        aggregate::CategoryGoal,
        cycle::{CycleConfig, CycleType},
        entity::{CycleBearer, EntityRef},
        reset::close_elapsed_periods,
        store::{PeriodClose, TransactionStore},
    },
    entities::{CategoryTarget, category_target},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// New targets and cycle settings for an agent or team.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetUpdate {
    /// Volume target in minor currency units
    pub target_volume_cents: i64,
    /// Unit target
    pub target_units: i64,
    /// `"monthly"` or `"yearly"`
    pub target_cycle: String,
    /// Day of month the period starts on (1-31)
    pub reset_day: i32,
    /// Month of the reset, yearly cycles only
    #[serde(default)]
    pub reset_month: Option<i32>,
    /// Replacement category targets; `None` leaves them unchanged
    #[serde(default)]
    pub categories: Option<Vec<CategoryGoal>>,
}

impl TargetUpdate {
    /// Checks amounts, the cycle and category labels, returning the parsed cycle.
    pub fn validate(&self) -> Result<CycleConfig> {
        check_non_negative(self.target_volume_cents)?;
        check_non_negative(self.target_units)?;
        if let Some(goals) = &self.categories {
            validate_goals(goals)?;
        }
        let cycle_type: CycleType = self.target_cycle.parse()?;
        CycleConfig::new(cycle_type, self.reset_day, self.reset_month)
    }
}

/// Rejects negative money or unit values.
pub const fn check_non_negative(amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Rejects blank labels, negative targets and duplicate categories.
pub fn validate_goals(goals: &[CategoryGoal]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for goal in goals {
        let label = goal.category.trim();
        if label.is_empty() {
            return Err(Error::Validation {
                message: "Category label cannot be empty".to_string(),
            });
        }
        check_non_negative(goal.target_volume_cents)?;
        check_non_negative(goal.target_units)?;
        if !seen.insert(label.to_string()) {
            return Err(Error::Validation {
                message: format!("Duplicate category target '{label}'"),
            });
        }
    }
    Ok(())
}

/// Category targets currently configured for an entity, ordered by label.
pub async fn get_category_targets<C>(
    db: &C,
    entity: EntityRef,
) -> Result<Vec<category_target::Model>>
where
    C: ConnectionTrait,
{
    Ok(CategoryTarget::find()
        .filter(category_target::Column::EntityType.eq(entity.kind.as_str()))
        .filter(category_target::Column::EntityId.eq(entity.id))
        .order_by_asc(category_target::Column::Category)
        .all(db)
        .await?)
}

/// Closes the periods `entity` has already finished, inside `txn`, so an edit
/// never swallows them. History records use the targets in force before the
/// edit. Returns the number of periods closed.
///
/// An entity whose stored cycle columns no longer parse has nothing to settle
/// against; it is left for the edit to reposition.
pub(crate) async fn close_elapsed_before_edit(
    txn: &DatabaseTransaction,
    entity: &dyn CycleBearer,
    now: DateTime<Utc>,
) -> Result<usize> {
    if let Err(e) = entity.cycle_config() {
        warn!("Not settling {} before edit: {}", entity.entity_ref(), e);
        return Ok(0);
    }

    let store = TransactionStore::new(txn);
    let mut closed = 0;
    close_elapsed_periods(&store, entity, now, &mut |_: &PeriodClose| closed += 1).await?;
    if closed > 0 {
        info!("Closed {} elapsed period(s) of {} before edit", closed, entity.entity_ref());
    }
    Ok(closed)
}

/// Deletes and re-inserts an entity's category targets on an open connection
/// or transaction. Callers are expected to have validated `goals`.
pub(crate) async fn write_category_targets<C>(
    db: &C,
    entity: EntityRef,
    goals: &[CategoryGoal],
) -> Result<Vec<category_target::Model>>
where
    C: ConnectionTrait,
{
    CategoryTarget::delete_many()
        .filter(category_target::Column::EntityType.eq(entity.kind.as_str()))
        .filter(category_target::Column::EntityId.eq(entity.id))
        .exec(db)
        .await?;

    let mut stored = Vec::with_capacity(goals.len());
    for goal in goals {
        let row = category_target::ActiveModel {
            entity_type: Set(entity.kind.as_str().to_string()),
            entity_id: Set(entity.id),
            category: Set(goal.category.trim().to_string()),
            target_volume_cents: Set(goal.target_volume_cents),
            target_units: Set(goal.target_units),
            ..Default::default()
        };
        stored.push(row.insert(db).await?);
    }
    Ok(stored)
}

/// Replaces all category targets of an entity in one transaction.
#[instrument(skip(db, goals))]
pub async fn replace_category_targets(
    db: &DatabaseConnection,
    entity: EntityRef,
    goals: &[CategoryGoal],
) -> Result<Vec<category_target::Model>> {
    validate_goals(goals)?;

    let txn = db.begin().await?;
    let stored = write_category_targets(&txn, entity, goals).await?;
    txn.commit().await?;

    debug!("Stored {} category target(s) for {}", stored.len(), entity);
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn goal(category: &str, volume: i64) -> CategoryGoal {
        CategoryGoal {
            category: category.to_string(),
            target_volume_cents: volume,
            target_units: 1,
        }
    }

    #[tokio::test]
    async fn test_replace_category_targets_is_wholesale() -> Result<()> {
        let db = setup_test_db().await?;
        let agent = create_test_agent(&db, "Ava", None).await?;
        let entity = EntityRef::agent(agent.id);

        replace_category_targets(&db, entity, &[goal("solar", 100), goal("battery", 50)]).await?;
        replace_category_targets(&db, entity, &[goal("heat pump", 70)]).await?;

        let stored = get_category_targets(&db, entity).await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, "heat pump");
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_categories_are_rejected_without_writing() -> Result<()> {
        let db = setup_test_db().await?;
        let agent = create_test_agent(&db, "Ava", None).await?;
        let entity = EntityRef::agent(agent.id);
        replace_category_targets(&db, entity, &[goal("solar", 100)]).await?;

        let result =
            replace_category_targets(&db, entity, &[goal("battery", 1), goal(" battery", 2)]).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let stored = get_category_targets(&db, entity).await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, "solar");
        Ok(())
    }

    #[tokio::test]
    async fn test_targets_are_scoped_per_entity_kind() -> Result<()> {
        let db = setup_test_db().await?;
        replace_category_targets(&db, EntityRef::agent(1), &[goal("solar", 1)]).await?;
        replace_category_targets(&db, EntityRef::team(1), &[goal("wind", 2)]).await?;

        assert_eq!(get_category_targets(&db, EntityRef::agent(1)).await?[0].category, "solar");
        assert_eq!(get_category_targets(&db, EntityRef::team(1)).await?[0].category, "wind");
        Ok(())
    }

    #[test]
    fn test_target_update_validation() {
        let mut update = TargetUpdate {
            target_volume_cents: 1_000,
            target_units: 3,
            target_cycle: "yearly".to_string(),
            reset_day: 1,
            reset_month: Some(4),
            categories: None,
        };
        assert!(update.validate().is_ok());

        update.reset_month = None;
        assert!(matches!(update.validate(), Err(Error::InvalidCycle { .. })));

        update.reset_month = Some(4);
        update.target_units = -1;
        assert!(matches!(update.validate(), Err(Error::InvalidAmount { amount: -1 })));

        update.target_units = 0;
        update.categories = Some(vec![goal("", 1)]);
        assert!(matches!(update.validate(), Err(Error::Validation { .. })));
    }
}
