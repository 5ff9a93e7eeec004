//! Category target entity - Optional per-category sub-target of an agent or team.
//!
//! Rows are owned polymorphically through (`entity_type`, `entity_id`) and are
//! always replaced as a whole set when an entity's targets are edited.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category target database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "category_targets")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// `"agent"` or `"team"`
    pub entity_type: String,
    /// ID of the owning agent or team
    pub entity_id: i64,
    /// Category label matched against `sales.category`
    pub category: String,
    /// Volume target for this category, in minor currency units
    pub target_volume_cents: i64,
    /// Unit target for this category
    pub target_units: i64,
}

/// Category targets reference their owner polymorphically, so no relations are declared
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
