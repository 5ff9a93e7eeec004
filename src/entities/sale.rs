//! Sale entity - One recorded transaction attributed to an agent.
//!
//! Amounts are stored in minor currency units so that period totals can be
//! summed exactly. A sale counts toward whichever period contains its
//! `created_at` timestamp.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sale database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
    /// Unique identifier for the sale
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the agent credited with this sale
    pub agent_id: i64,
    /// Sale value in minor currency units (never negative)
    pub amount_cents: i64,
    /// Number of units sold (never negative)
    pub units: i64,
    /// Category label used for per-category targets
    pub category: String,
    /// Name of the client the sale was made to
    pub client_name: String,
    /// Origin of the record: `"admin"` or `"self_report"`
    pub source: String,
    /// When the sale happened
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Sale and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each sale belongs to one agent
    #[sea_orm(
        belongs_to = "super::agent::Entity",
        from = "Column::AgentId",
        to = "super::agent::Column::Id"
    )]
    Agent,
}

impl Related<super::agent::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
