//! Cycle-bearing entities.
//!
//! Agents and teams follow exactly the same target-cycle rules. The
//! [`CycleBearer`] trait exposes what the reset engine and the dashboard need
//! from either one, so both are handled by a single code path.

use crate::{
    core::cycle::{CycleConfig, Period},
    entities::{agent, team},
    errors::Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which table an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Row in `agents`
    Agent,
    /// Row in `teams`
    Team,
}

impl EntityKind {
    /// Value stored in polymorphic `entity_type` columns.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Team => "team",
        }
    }

    /// Parses an `entity_type` column or URL segment.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "agent" | "agents" => Some(Self::Agent),
            "team" | "teams" => Some(Self::Team),
            _ => None,
        }
    }
}

/// Identity of an agent or team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    /// Agent or team
    pub kind: EntityKind,
    /// Primary key within its table
    pub id: i64,
}

impl EntityRef {
    #[must_use]
    pub const fn agent(id: i64) -> Self {
        Self {
            kind: EntityKind::Agent,
            id,
        }
    }

    #[must_use]
    pub const fn team(id: i64) -> Self {
        Self {
            kind: EntityKind::Team,
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.as_str(), self.id)
    }
}

/// Scalar targets of an entity for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Volume target in minor currency units
    pub volume_cents: i64,
    /// Unit target
    pub units: i64,
}

/// Stored position of an entity within its cycle.
pub type CycleState = Period;

/// Common view of anything that carries a target cycle.
pub trait CycleBearer: fmt::Debug + Send + Sync {
    /// Identity used for history rows and events.
    fn entity_ref(&self) -> EntityRef;

    /// Name shown on the dashboard.
    fn display_name(&self) -> &str;

    /// Owning group, for agents the team they sell for.
    fn group_id(&self) -> Option<i64> {
        None
    }

    /// Parsed cycle configuration; fails if the stored columns are corrupt.
    fn cycle_config(&self) -> Result<CycleConfig>;

    /// Current stored period, `None` until the entity has been initialized.
    fn cycle_state(&self) -> Option<CycleState>;

    /// Scalar targets currently configured.
    fn targets(&self) -> TargetSnapshot;
}

fn stored_state(
    period_start: Option<DateTime<Utc>>,
    next_reset: Option<DateTime<Utc>>,
) -> Option<CycleState> {
    match (period_start, next_reset) {
        // A half-written or inverted pair is treated as uninitialized
        (Some(start), Some(end)) if end > start => Some(Period { start, end }),
        _ => None,
    }
}

impl CycleBearer for agent::Model {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::agent(self.id)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn group_id(&self) -> Option<i64> {
        self.team_id
    }

    fn cycle_config(&self) -> Result<CycleConfig> {
        CycleConfig::from_columns(&self.target_cycle, self.reset_day, self.reset_month)
    }

    fn cycle_state(&self) -> Option<CycleState> {
        stored_state(self.period_start, self.next_reset)
    }

    fn targets(&self) -> TargetSnapshot {
        TargetSnapshot {
            volume_cents: self.target_volume_cents,
            units: self.target_units,
        }
    }
}

impl CycleBearer for team::Model {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::team(self.id)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn cycle_config(&self) -> Result<CycleConfig> {
        CycleConfig::from_columns(&self.target_cycle, self.reset_day, self.reset_month)
    }

    fn cycle_state(&self) -> Option<CycleState> {
        stored_state(self.period_start, self.next_reset)
    }

    fn targets(&self) -> TargetSnapshot {
        TargetSnapshot {
            volume_cents: self.target_volume_cents,
            units: self.target_units,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::TimeZone;

    fn sample_agent() -> agent::Model {
        agent::Model {
            id: 7,
            name: "Dana".to_string(),
            team_id: Some(2),
            target_volume_cents: 500_000,
            target_units: 12,
            target_cycle: "monthly".to_string(),
            reset_day: 1,
            reset_month: None,
            period_start: None,
            next_reset: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(EntityRef::agent(3).to_string(), "agent#3");
        assert_eq!(EntityRef::team(9).to_string(), "team#9");
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!(EntityKind::parse("agents"), Some(EntityKind::Agent));
        assert_eq!(EntityKind::parse("team"), Some(EntityKind::Team));
        assert_eq!(EntityKind::parse("office"), None);
    }

    #[test]
    fn test_agent_as_cycle_bearer() {
        let agent = sample_agent();
        assert_eq!(agent.entity_ref(), EntityRef::agent(7));
        assert_eq!(agent.group_id(), Some(2));
        assert_eq!(agent.targets().volume_cents, 500_000);
        assert!(agent.cycle_config().is_ok());
        assert!(agent.cycle_state().is_none());
    }

    #[test]
    fn test_partial_cycle_state_is_uninitialized() {
        let mut agent = sample_agent();
        agent.period_start = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(agent.cycle_state().is_none());

        agent.next_reset = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        let state = agent.cycle_state().unwrap();
        assert_eq!(state.end, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_corrupt_cycle_column_is_reported() {
        let mut agent = sample_agent();
        agent.target_cycle = "fortnightly".to_string();
        assert!(agent.cycle_config().is_err());
    }
}
