//! Roster loading from config.toml.
//!
//! The roster lists the teams and agents the board should start with. It is
//! applied at every boot; entries whose name already exists among active
//! teams or agents are skipped, so editing targets through the admin API is
//! never undone by a restart.

use crate::{
    core::{
        agent::{self, NewAgent},
        team::{self, NewTeam},
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Structure of the roster file.
#[derive(Debug, Default, Deserialize)]
pub struct Roster {
    /// Teams to create
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
    /// Agents to create
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// One `[[teams]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct TeamConfig {
    /// Team name
    pub name: String,
    /// Volume target in minor currency units
    #[serde(default)]
    pub target_volume_cents: i64,
    /// Unit target
    #[serde(default)]
    pub target_units: i64,
    /// `"monthly"` or `"yearly"`
    #[serde(default = "default_cycle")]
    pub target_cycle: String,
    /// Day of month the period starts on
    #[serde(default = "default_reset_day")]
    pub reset_day: i32,
    /// Month of the reset, yearly cycles only
    pub reset_month: Option<i32>,
}

/// One `[[agents]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Agent name
    pub name: String,
    /// Name of the team the agent belongs to
    pub team: Option<String>,
    /// Volume target in minor currency units
    #[serde(default)]
    pub target_volume_cents: i64,
    /// Unit target
    #[serde(default)]
    pub target_units: i64,
    /// `"monthly"` or `"yearly"`
    #[serde(default = "default_cycle")]
    pub target_cycle: String,
    /// Day of month the period starts on
    #[serde(default = "default_reset_day")]
    pub reset_day: i32,
    /// Month of the reset, yearly cycles only
    pub reset_month: Option<i32>,
}

fn default_cycle() -> String {
    "monthly".to_string()
}

const fn default_reset_day() -> i32 {
    1
}

/// Counts of what [`seed_roster`] created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    /// Teams inserted
    pub teams_created: usize,
    /// Agents inserted
    pub agents_created: usize,
}

/// Parses roster TOML.
pub fn parse_roster(contents: &str) -> Result<Roster> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse roster: {e}"),
    })
}

/// Loads a roster file. A missing file yields an empty roster.
pub fn load_roster<P: AsRef<Path>>(path: P) -> Result<Roster> {
    let path = path.as_ref();
    if !path.exists() {
        info!("No roster file at {}, starting empty", path.display());
        return Ok(Roster::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read roster file {}: {e}", path.display()),
    })?;
    parse_roster(&contents)
}

/// Creates roster teams and agents that do not exist yet.
pub async fn seed_roster(
    db: &DatabaseConnection,
    roster: &Roster,
    now: DateTime<Utc>,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for entry in &roster.teams {
        if team::get_team_by_name(db, &entry.name).await?.is_some() {
            debug!("Team '{}' already exists, skipping", entry.name);
            continue;
        }
        let new = NewTeam {
            name: entry.name.clone(),
            target_volume_cents: entry.target_volume_cents,
            target_units: entry.target_units,
            target_cycle: entry.target_cycle.clone(),
            reset_day: entry.reset_day,
            reset_month: entry.reset_month,
        };
        team::create_team(db, new, now).await?;
        summary.teams_created += 1;
    }

    for entry in &roster.agents {
        if agent::get_agent_by_name(db, &entry.name).await?.is_some() {
            debug!("Agent '{}' already exists, skipping", entry.name);
            continue;
        }
        let team_id = match &entry.team {
            Some(team_name) => Some(
                team::get_team_by_name(db, team_name)
                    .await?
                    .ok_or_else(|| Error::Config {
                        message: format!(
                            "Agent '{}' references unknown team '{team_name}'",
                            entry.name
                        ),
                    })?
                    .id,
            ),
            None => None,
        };
        let new = NewAgent {
            name: entry.name.clone(),
            team_id,
            target_volume_cents: entry.target_volume_cents,
            target_units: entry.target_units,
            target_cycle: entry.target_cycle.clone(),
            reset_day: entry.reset_day,
            reset_month: entry.reset_month,
        };
        agent::create_agent(db, new, now).await?;
        summary.agents_created += 1;
    }

    info!(
        "Roster seeded: {} team(s), {} agent(s) created",
        summary.teams_created, summary.agents_created
    );
    Ok(summary)
}
