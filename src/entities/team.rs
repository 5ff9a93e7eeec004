//! Team entity - A group of agents competing against a shared target.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Team database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "teams")]
pub struct Model {
    /// Unique identifier for the team
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Name shown on the TV display
    pub name: String,
    /// Volume target per period, in minor currency units
    pub target_volume_cents: i64,
    /// Unit target per period
    pub target_units: i64,
    /// `"monthly"` or `"yearly"`
    pub target_cycle: String,
    /// Day of month on which a new period begins (1-31)
    pub reset_day: i32,
    /// Month in which a yearly period begins (1-12)
    pub reset_month: Option<i32>,
    /// Start of the period the team is currently positioned in
    pub period_start: Option<DateTimeUtc>,
    /// Exclusive end of the current period, i.e. the next reset instant
    pub next_reset: Option<DateTimeUtc>,
    /// Soft delete flag
    pub is_active: bool,
    /// When the team was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Team and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One team has many agents
    #[sea_orm(has_many = "super::agent::Entity")]
    Agents,
}

impl Related<super::agent::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
