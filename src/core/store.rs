//! Storage seam of the cycle reset engine.
//!
//! The engine talks to persistence only through [`CycleStore`], which keeps it
//! independent of SeaORM and lets tests substitute failing or instrumented
//! stores. [`SeaOrmStore`] is the production implementation.

use crate::{
    core::{
        aggregate::{Achievement, CategoryGoal, SaleRecord},
        cycle::Period,
        entity::{CycleBearer, EntityKind, EntityRef, TargetSnapshot},
        settings::set_last_pass_at,
    },
    entities::{
        Agent, CategoryTarget, Sale, Team, agent, category_target, sale, target_history, team,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    Condition, DatabaseTransaction, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Everything needed to close one period atomically.
#[derive(Debug, Clone)]
pub struct PeriodClose {
    /// Entity whose period closes
    pub entity: EntityRef,
    /// The period being closed
    pub closed: Period,
    /// The period the entity moves to
    pub next: Period,
    /// Targets in force at close time
    pub targets: TargetSnapshot,
    /// Achieved figures for `closed`
    pub achievement: Achievement,
    /// Wall-clock time of the close
    pub recorded_at: DateTime<Utc>,
}

/// Persistence operations used by the reset engine and the dashboard.
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// All active agents followed by all active teams.
    async fn cycle_entities(&self) -> Result<Vec<Box<dyn CycleBearer>>>;

    /// Sales credited to `entity` with `period.start <= created_at < period.end`.
    async fn sales_in_window(&self, entity: EntityRef, period: &Period) -> Result<Vec<SaleRecord>>;

    /// Category targets configured for `entity`.
    async fn category_goals(&self, entity: EntityRef) -> Result<Vec<CategoryGoal>>;

    /// Stores the first period of an entity that has none yet.
    ///
    /// Returns `false` when the entity already had cycle state, in which case
    /// nothing is written.
    async fn initialize_cycle(&self, entity: EntityRef, period: &Period) -> Result<bool>;

    /// Writes the history record for `close.closed` and advances the entity
    /// to `close.next` in one transaction.
    async fn close_period(&self, close: &PeriodClose) -> Result<()>;

    /// Remembers when the last full pass finished.
    async fn record_pass(&self, at: DateTime<Utc>) -> Result<()>;
}

/// [`CycleStore`] backed by the application database.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    /// Wraps a shared connection.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Underlying connection, for callers that also need plain queries.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl CycleStore for SeaOrmStore {
    async fn cycle_entities(&self) -> Result<Vec<Box<dyn CycleBearer>>> {
        load_cycle_entities(self.connection()).await
    }

    #[instrument(skip(self))]
    async fn sales_in_window(&self, entity: EntityRef, period: &Period) -> Result<Vec<SaleRecord>> {
        load_sales_in_window(self.connection(), entity, period).await
    }

    async fn category_goals(&self, entity: EntityRef) -> Result<Vec<CategoryGoal>> {
        load_category_goals(self.connection(), entity).await
    }

    #[instrument(skip(self))]
    async fn initialize_cycle(&self, entity: EntityRef, period: &Period) -> Result<bool> {
        write_initial_cycle(self.connection(), entity, period).await
    }

    #[instrument(skip(self, close), fields(entity = %close.entity))]
    async fn close_period(&self, close: &PeriodClose) -> Result<()> {
        // History insert and cycle advance commit together or not at all
        let txn = self.db.begin().await?;
        match write_period_close(&txn, close).await {
            Ok(()) => {
                txn.commit().await?;
                Ok(())
            }
            Err(e) => {
                txn.rollback().await?;
                Err(e)
            }
        }
    }

    async fn record_pass(&self, at: DateTime<Utc>) -> Result<()> {
        set_last_pass_at(self.connection(), at).await
    }
}

/// [`CycleStore`] over a transaction the caller already holds.
///
/// Closes are written straight into the transaction, so they land or vanish
/// with the caller's commit. Admin target edits use this to settle elapsed
/// periods before changing the cycle.
#[derive(Debug, Clone, Copy)]
pub struct TransactionStore<'a> {
    txn: &'a DatabaseTransaction,
}

impl<'a> TransactionStore<'a> {
    /// Borrows an open transaction.
    #[must_use]
    pub const fn new(txn: &'a DatabaseTransaction) -> Self {
        Self { txn }
    }
}

#[async_trait]
impl CycleStore for TransactionStore<'_> {
    async fn cycle_entities(&self) -> Result<Vec<Box<dyn CycleBearer>>> {
        load_cycle_entities(self.txn).await
    }

    async fn sales_in_window(&self, entity: EntityRef, period: &Period) -> Result<Vec<SaleRecord>> {
        load_sales_in_window(self.txn, entity, period).await
    }

    async fn category_goals(&self, entity: EntityRef) -> Result<Vec<CategoryGoal>> {
        load_category_goals(self.txn, entity).await
    }

    async fn initialize_cycle(&self, entity: EntityRef, period: &Period) -> Result<bool> {
        write_initial_cycle(self.txn, entity, period).await
    }

    async fn close_period(&self, close: &PeriodClose) -> Result<()> {
        write_period_close(self.txn, close).await
    }

    async fn record_pass(&self, at: DateTime<Utc>) -> Result<()> {
        set_last_pass_at(self.txn, at).await
    }
}

async fn load_cycle_entities<C>(db: &C) -> Result<Vec<Box<dyn CycleBearer>>>
where
    C: ConnectionTrait,
{
    let agents = Agent::find()
        .filter(agent::Column::IsActive.eq(true))
        .order_by_asc(agent::Column::Id)
        .all(db)
        .await?;
    let teams = Team::find()
        .filter(team::Column::IsActive.eq(true))
        .order_by_asc(team::Column::Id)
        .all(db)
        .await?;

    let mut entities: Vec<Box<dyn CycleBearer>> = Vec::with_capacity(agents.len() + teams.len());
    entities.extend(agents.into_iter().map(|a| Box::new(a) as Box<dyn CycleBearer>));
    entities.extend(teams.into_iter().map(|t| Box::new(t) as Box<dyn CycleBearer>));
    Ok(entities)
}

async fn load_sales_in_window<C>(
    db: &C,
    entity: EntityRef,
    period: &Period,
) -> Result<Vec<SaleRecord>>
where
    C: ConnectionTrait,
{
    let window = Condition::all()
        .add(sale::Column::CreatedAt.gte(period.start))
        .add(sale::Column::CreatedAt.lt(period.end));

    let records = match entity.kind {
        EntityKind::Agent => {
            let owner = Agent::find_by_id(entity.id)
                .one(db)
                .await?
                .ok_or(Error::AgentNotFound { id: entity.id })?;
            Sale::find()
                .filter(sale::Column::AgentId.eq(entity.id))
                .filter(window)
                .all(db)
                .await?
                .iter()
                .map(|s| SaleRecord::from_model(s, owner.team_id))
                .collect::<Vec<_>>()
        }
        EntityKind::Team => {
            // Inactive members still count toward the team's period
            let member_ids: Vec<i64> = Agent::find()
                .filter(agent::Column::TeamId.eq(entity.id))
                .all(db)
                .await?
                .into_iter()
                .map(|a| a.id)
                .collect();
            if member_ids.is_empty() {
                return Ok(Vec::new());
            }
            Sale::find()
                .filter(sale::Column::AgentId.is_in(member_ids))
                .filter(window)
                .all(db)
                .await?
                .iter()
                .map(|s| SaleRecord::from_model(s, Some(entity.id)))
                .collect::<Vec<_>>()
        }
    };

    debug!("Loaded {} sale(s) for {} in window", records.len(), entity);
    Ok(records)
}

async fn load_category_goals<C>(db: &C, entity: EntityRef) -> Result<Vec<CategoryGoal>>
where
    C: ConnectionTrait,
{
    let rows = CategoryTarget::find()
        .filter(category_target::Column::EntityType.eq(entity.kind.as_str()))
        .filter(category_target::Column::EntityId.eq(entity.id))
        .order_by_asc(category_target::Column::Category)
        .all(db)
        .await?;
    Ok(rows.iter().map(CategoryGoal::from).collect())
}

async fn write_initial_cycle<C>(db: &C, entity: EntityRef, period: &Period) -> Result<bool>
where
    C: ConnectionTrait,
{
    let rows = match entity.kind {
        EntityKind::Agent => {
            Agent::update_many()
                .col_expr(agent::Column::PeriodStart, Expr::value(period.start))
                .col_expr(agent::Column::NextReset, Expr::value(period.end))
                .filter(agent::Column::Id.eq(entity.id))
                .filter(
                    Condition::any()
                        .add(agent::Column::PeriodStart.is_null())
                        .add(agent::Column::NextReset.is_null())
                        .add(
                            Expr::col(agent::Column::NextReset)
                                .lte(Expr::col(agent::Column::PeriodStart)),
                        ),
                )
                .exec(db)
                .await?
                .rows_affected
        }
        EntityKind::Team => {
            Team::update_many()
                .col_expr(team::Column::PeriodStart, Expr::value(period.start))
                .col_expr(team::Column::NextReset, Expr::value(period.end))
                .filter(team::Column::Id.eq(entity.id))
                .filter(
                    Condition::any()
                        .add(team::Column::PeriodStart.is_null())
                        .add(team::Column::NextReset.is_null())
                        .add(
                            Expr::col(team::Column::NextReset)
                                .lte(Expr::col(team::Column::PeriodStart)),
                        ),
                )
                .exec(db)
                .await?
                .rows_affected
        }
    };
    Ok(rows > 0)
}

/// Inserts the history row and advances the entity on `db`, which callers
/// run inside a transaction. Fails with `CycleConflict` when the entity no
/// longer sits on `close.closed`.
async fn write_period_close<C>(db: &C, close: &PeriodClose) -> Result<()>
where
    C: ConnectionTrait,
{
    let breakdown = close
        .achievement
        .by_category
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let history = target_history::ActiveModel {
        entity_type: Set(close.entity.kind.as_str().to_string()),
        entity_id: Set(close.entity.id),
        period_start: Set(close.closed.start),
        period_end: Set(close.closed.end),
        target_volume_cents: Set(close.targets.volume_cents),
        target_units: Set(close.targets.units),
        achieved_volume_cents: Set(close.achievement.volume_cents),
        achieved_units: Set(close.achievement.units),
        category_breakdown: Set(breakdown),
        recorded_at: Set(close.recorded_at),
        ..Default::default()
    };
    history.insert(db).await?;

    // Guarded on the old boundary so a concurrent edit or pass cannot be overwritten
    let advanced = match close.entity.kind {
        EntityKind::Agent => {
            Agent::update_many()
                .col_expr(agent::Column::PeriodStart, Expr::value(close.next.start))
                .col_expr(agent::Column::NextReset, Expr::value(close.next.end))
                .filter(agent::Column::Id.eq(close.entity.id))
                .filter(agent::Column::NextReset.eq(close.closed.end))
                .exec(db)
                .await?
                .rows_affected
        }
        EntityKind::Team => {
            Team::update_many()
                .col_expr(team::Column::PeriodStart, Expr::value(close.next.start))
                .col_expr(team::Column::NextReset, Expr::value(close.next.end))
                .filter(team::Column::Id.eq(close.entity.id))
                .filter(team::Column::NextReset.eq(close.closed.end))
                .exec(db)
                .await?
                .rows_affected
        }
    };

    if advanced == 0 {
        return Err(Error::CycleConflict {
            entity: close.entity.to_string(),
        });
    }
    Ok(())
}
