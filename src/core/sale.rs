//! Sale business logic.
//!
//! Sales are the only input to target progress. They can be corrected or
//! removed after the fact; a change to a sale in an already closed period does
//! not rewrite that period's history record.

use crate::{
    core::{agent::require_active_agent, targets::check_non_negative},
    entities::{Sale, sale},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument};

/// Where a sale was recorded from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleSource {
    /// Entered by an administrator
    #[default]
    Admin,
    /// Reported by the agent
    SelfReport,
}

impl SaleSource {
    /// Value stored in the `source` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SelfReport => "self_report",
        }
    }
}

impl fmt::Display for SaleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for [`create_sale`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSale {
    /// Agent credited with the sale
    pub agent_id: i64,
    /// Value in minor currency units
    pub amount_cents: i64,
    /// Units sold
    #[serde(default = "default_units")]
    pub units: i64,
    /// Category label
    #[serde(default = "default_category")]
    pub category: String,
    /// Client name
    #[serde(default)]
    pub client_name: String,
    /// Origin of the record
    #[serde(default)]
    pub source: SaleSource,
    /// When the sale happened; defaults to the time of recording
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_units() -> i64 {
    1
}

fn default_category() -> String {
    "general".to_string()
}

/// Correction to an existing sale. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SaleUpdate {
    /// New value in minor currency units
    pub amount_cents: Option<i64>,
    /// New unit count
    pub units: Option<i64>,
    /// New category label
    pub category: Option<String>,
    /// New client name
    pub client_name: Option<String>,
}

fn check_category(category: &str) -> Result<String> {
    let category = category.trim();
    if category.is_empty() {
        return Err(Error::Validation {
            message: "Sale category cannot be empty".to_string(),
        });
    }
    Ok(category.to_string())
}

/// Records a sale for an active agent.
#[instrument(skip(db, new), fields(agent_id = new.agent_id))]
pub async fn create_sale(
    db: &DatabaseConnection,
    new: NewSale,
    now: DateTime<Utc>,
) -> Result<sale::Model> {
    check_non_negative(new.amount_cents)?;
    check_non_negative(new.units)?;
    let category = check_category(&new.category)?;
    require_active_agent(db, new.agent_id).await?;

    let sale = sale::ActiveModel {
        agent_id: Set(new.agent_id),
        amount_cents: Set(new.amount_cents),
        units: Set(new.units),
        category: Set(category),
        client_name: Set(new.client_name.trim().to_string()),
        source: Set(new.source.as_str().to_string()),
        created_at: Set(new.created_at.unwrap_or(now)),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(
        "Recorded sale {} for agent {}: {} cents, {} unit(s)",
        sale.id, sale.agent_id, sale.amount_cents, sale.units
    );
    Ok(sale)
}

/// Gets a sale by ID.
pub async fn get_sale_by_id<C>(db: &C, id: i64) -> Result<Option<sale::Model>>
where
    C: ConnectionTrait,
{
    Ok(Sale::find_by_id(id).one(db).await?)
}

/// Sales of one agent, newest first.
pub async fn list_sales_for_agent<C>(db: &C, agent_id: i64) -> Result<Vec<sale::Model>>
where
    C: ConnectionTrait,
{
    Ok(Sale::find()
        .filter(sale::Column::AgentId.eq(agent_id))
        .order_by_desc(sale::Column::CreatedAt)
        .all(db)
        .await?)
}

/// Applies a correction to a sale.
#[instrument(skip(db, update))]
pub async fn update_sale(
    db: &DatabaseConnection,
    id: i64,
    update: &SaleUpdate,
) -> Result<sale::Model> {
    if let Some(amount) = update.amount_cents {
        check_non_negative(amount)?;
    }
    if let Some(units) = update.units {
        check_non_negative(units)?;
    }
    let category = update.category.as_deref().map(check_category).transpose()?;

    let sale = get_sale_by_id(db, id)
        .await?
        .ok_or(Error::SaleNotFound { id })?;

    let mut active_model: sale::ActiveModel = sale.into();
    if let Some(amount) = update.amount_cents {
        active_model.amount_cents = Set(amount);
    }
    if let Some(units) = update.units {
        active_model.units = Set(units);
    }
    if let Some(category) = category {
        active_model.category = Set(category);
    }
    if let Some(client_name) = &update.client_name {
        active_model.client_name = Set(client_name.trim().to_string());
    }

    let sale = active_model.update(db).await?;
    info!("Updated sale {}", sale.id);
    Ok(sale)
}

/// Deletes a sale and returns what was removed.
#[instrument(skip(db))]
pub async fn delete_sale(db: &DatabaseConnection, id: i64) -> Result<sale::Model> {
    let sale = get_sale_by_id(db, id)
        .await?
        .ok_or(Error::SaleNotFound { id })?;

    Sale::delete_by_id(id).exec(db).await?;
    info!("Deleted sale {} of agent {}", sale.id, sale.agent_id);
    Ok(sale)
}
