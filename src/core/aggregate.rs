//! Target aggregation.
//!
//! Computes what an agent or team achieved within one period. Everything here
//! is a pure function of its inputs: money is summed as integer minor units,
//! and per-category results are kept in a `BTreeMap` so identical inputs
//! always produce identical (and identically serialized) output.

use crate::{
    core::{
        cycle::Period,
        entity::{EntityKind, EntityRef},
    },
    entities::{category_target, sale},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sale as seen by the aggregator, with the selling agent's team resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleRecord {
    /// Agent credited with the sale
    pub agent_id: i64,
    /// Team of that agent, if any
    pub team_id: Option<i64>,
    /// Value in minor currency units
    pub amount_cents: i64,
    /// Units sold
    pub units: i64,
    /// Category label
    pub category: String,
    /// When the sale happened
    pub created_at: DateTime<Utc>,
}

impl SaleRecord {
    /// Builds a record from a stored sale and its agent's team.
    #[must_use]
    pub fn from_model(sale: &sale::Model, team_id: Option<i64>) -> Self {
        Self {
            agent_id: sale.agent_id,
            team_id,
            amount_cents: sale.amount_cents,
            units: sale.units,
            category: sale.category.clone(),
            created_at: sale.created_at,
        }
    }

    fn belongs_to(&self, entity: EntityRef) -> bool {
        match entity.kind {
            EntityKind::Agent => self.agent_id == entity.id,
            EntityKind::Team => self.team_id == Some(entity.id),
        }
    }
}

/// Per-category target of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGoal {
    /// Category label
    pub category: String,
    /// Volume target in minor currency units
    pub target_volume_cents: i64,
    /// Unit target
    pub target_units: i64,
}

impl From<&category_target::Model> for CategoryGoal {
    fn from(model: &category_target::Model) -> Self {
        Self {
            category: model.category.clone(),
            target_volume_cents: model.target_volume_cents,
            target_units: model.target_units,
        }
    }
}

/// Target versus achieved figures for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAchievement {
    /// Volume target for the category
    pub target_volume_cents: i64,
    /// Unit target for the category
    pub target_units: i64,
    /// Volume achieved in the category
    pub achieved_volume_cents: i64,
    /// Units achieved in the category
    pub achieved_units: i64,
}

/// Result of aggregating an entity's sales over a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    /// Sum of sale amounts in minor currency units
    pub volume_cents: i64,
    /// Sum of units
    pub units: i64,
    /// Present only when the entity has category targets
    pub by_category: Option<BTreeMap<String, CategoryAchievement>>,
}

/// Sums the entity's sales with `period.start <= created_at < period.end`.
///
/// Sales of other entities and sales outside the window are ignored. When
/// `goals` is non-empty the result also carries a per-category breakdown that
/// lists every targeted category, including ones without sales.
#[must_use]
pub fn aggregate(
    entity: EntityRef,
    period: &Period,
    sales: &[SaleRecord],
    goals: &[CategoryGoal],
) -> Achievement {
    let mut by_category: Option<BTreeMap<String, CategoryAchievement>> = if goals.is_empty() {
        None
    } else {
        Some(
            goals
                .iter()
                .map(|goal| {
                    (
                        goal.category.clone(),
                        CategoryAchievement {
                            target_volume_cents: goal.target_volume_cents,
                            target_units: goal.target_units,
                            ..CategoryAchievement::default()
                        },
                    )
                })
                .collect(),
        )
    };

    let mut achievement = Achievement::default();
    for record in sales
        .iter()
        .filter(|record| record.belongs_to(entity) && period.contains(record.created_at))
    {
        achievement.volume_cents = achievement.volume_cents.saturating_add(record.amount_cents);
        achievement.units = achievement.units.saturating_add(record.units);

        if let Some(categories) = by_category.as_mut() {
            let slot = categories.entry(record.category.clone()).or_default();
            slot.achieved_volume_cents =
                slot.achieved_volume_cents.saturating_add(record.amount_cents);
            slot.achieved_units = slot.achieved_units.saturating_add(record.units);
        }
    }

    achievement.by_category = by_category;
    achievement
}

/// Calculates progress toward a target as a percentage.
///
/// - 0% = nothing achieved yet
/// - 100% = target met
/// - above 100% = target exceeded
///
/// A zero target yields 0% so that unconfigured entities do not top the board.
#[must_use]
pub fn calculate_progress(achieved: i64, target: i64) -> f64 {
    if target <= 0 {
        return 0.0;
    }

    // Precision loss is irrelevant for a display percentage
    #[allow(clippy::cast_precision_loss)]
    let percent = (achieved as f64 / target as f64) * 100.0;
    percent
}

/// Formats minor units as a decimal amount with a currency code, e.g. `USD 1,234.50`.
#[must_use]
pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = abs / 100;
    let fraction = abs % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{currency} {sign}{grouped}.{fraction:02}")
}
