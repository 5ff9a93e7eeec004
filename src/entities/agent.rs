//! Agent entity - An individual seller tracked on the leaderboard.
//!
//! Agents carry their own target configuration and cycle state. The current
//! period's achieved volume is never stored here; it is derived from `sales`
//! whenever it is needed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Agent database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agents")]
pub struct Model {
    /// Unique identifier for the agent
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Name shown on the TV display
    pub name: String,
    /// Team this agent sells for, if any
    pub team_id: Option<i64>,
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
    /// Start of the period the agent is currently positioned in
    pub period_start: Option<DateTimeUtc>,
    /// Exclusive end of the current period, i.e. the next reset instant
    pub next_reset: Option<DateTimeUtc>,
    /// Soft delete flag - inactive agents keep their sales and history
    pub is_active: bool,
    /// When the agent was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Agent and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each agent optionally belongs to one team
    #[sea_orm(
        belongs_to = "super::team::Entity",
        from = "Column::TeamId",
        to = "super::team::Column::Id"
    )]
    Team,
    /// One agent has many sales
    #[sea_orm(has_many = "super::sale::Entity")]
    Sales,
}

impl Related<super::team::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Team.def()
    }
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sales.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
