//! Shared test utilities for `SalesBoard`.
//!
//! Helpers for setting up an in-memory database and creating agents, teams
//! and sales with sensible defaults.

use crate::{
    core::{
        agent::{self, NewAgent},
        reset::Clock,
        store::SeaOrmStore,
        team::{self, NewTeam},
    },
    entities::{self, sale},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::{Arc, Mutex};

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a store over a fresh in-memory database.
///
/// Tests reach the connection through [`SeaOrmStore::connection`].
pub async fn setup_test_store() -> Result<SeaOrmStore> {
    Ok(SeaOrmStore::new(Arc::new(setup_test_db().await?)))
}

/// Creates a team on a monthly cycle resetting on the 1st, positioned at now.
pub async fn create_test_team(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::team::Model> {
    team::create_team(
        db,
        NewTeam {
            name: name.to_string(),
            target_volume_cents: 1_000_000,
            target_units: 100,
            target_cycle: "monthly".to_string(),
            reset_day: 1,
            reset_month: None,
        },
        Utc::now(),
    )
    .await
}

/// Creates an agent on a monthly cycle resetting on the 1st, positioned at now.
pub async fn create_test_agent(
    db: &DatabaseConnection,
    name: &str,
    team_id: Option<i64>,
) -> Result<entities::agent::Model> {
    agent::create_agent(
        db,
        NewAgent {
            name: name.to_string(),
            team_id,
            target_volume_cents: 100_000,
            target_units: 10,
            target_cycle: "monthly".to_string(),
            reset_day: 1,
            reset_month: None,
        },
        Utc::now(),
    )
    .await
}

/// Inserts a monthly agent with no cycle state, as if it predates cycle tracking.
pub async fn insert_uninitialized_agent(
    db: &DatabaseConnection,
    name: &str,
    reset_day: i32,
) -> Result<entities::agent::Model> {
    let agent = entities::agent::ActiveModel {
        name: Set(name.to_string()),
        team_id: Set(None),
        target_volume_cents: Set(100_000),
        target_units: Set(10),
        target_cycle: Set("monthly".to_string()),
        reset_day: Set(reset_day),
        reset_month: Set(None),
        period_start: Set(None),
        next_reset: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(agent.insert(db).await?)
}

/// Inserts a monthly team with no cycle state.
pub async fn insert_uninitialized_team(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::team::Model> {
    let team = entities::team::ActiveModel {
        name: Set(name.to_string()),
        target_volume_cents: Set(1_000_000),
        target_units: Set(100),
        target_cycle: Set("monthly".to_string()),
        reset_day: Set(1),
        reset_month: Set(None),
        period_start: Set(None),
        next_reset: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(team.insert(db).await?)
}

/// Inserts a sale with an explicit timestamp, bypassing validation.
pub async fn create_sale_at(
    db: &DatabaseConnection,
    agent_id: i64,
    amount_cents: i64,
    units: i64,
    created_at: DateTime<Utc>,
) -> Result<sale::Model> {
    let sale = sale::ActiveModel {
        agent_id: Set(agent_id),
        amount_cents: Set(amount_cents),
        units: Set(units),
        category: Set("general".to_string()),
        client_name: Set("Test Client".to_string()),
        source: Set("admin".to_string()),
        created_at: Set(created_at),
        ..Default::default()
    };
    Ok(sale.insert(db).await?)
}

/// Unsaved monthly team model for pure tests.
#[must_use]
pub fn sample_team_model() -> entities::team::Model {
    entities::team::Model {
        id: 1,
        name: "Sample".to_string(),
        target_volume_cents: 1_000,
        target_units: 1,
        target_cycle: "monthly".to_string(),
        reset_day: 1,
        reset_month: None,
        period_start: None,
        next_reset: None,
        is_active: true,
        created_at: Utc::now(),
    }
}

/// Clock that returns a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock stopped at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Moves the clock.
    #[allow(clippy::unwrap_used)]
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
