//! Target history entity - Immutable snapshot of one completed period.
//!
//! Written only by the cycle reset engine, in the same database transaction
//! that advances the owning entity to its next period.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Target history database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "target_history")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// `"agent"` or `"team"`
    pub entity_type: String,
    /// ID of the agent or team this period belonged to
    pub entity_id: i64,
    /// Inclusive start of the closed period
    pub period_start: DateTimeUtc,
    /// Exclusive end of the closed period
    pub period_end: DateTimeUtc,
    /// Volume target in force when the period closed
    pub target_volume_cents: i64,
    /// Unit target in force when the period closed
    pub target_units: i64,
    /// Volume achieved within the period
    pub achieved_volume_cents: i64,
    /// Units achieved within the period
    pub achieved_units: i64,
    /// JSON-encoded per-category breakdown, present when category targets existed
    pub category_breakdown: Option<String>,
    /// When the snapshot was written
    pub recorded_at: DateTimeUtc,
}

/// History rows reference their owner polymorphically
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
