//! Real-time event types pushed to connected displays.
//!
//! Every event is sent as one JSON text frame shaped
//! `{ "type": "<event_name>", "data": <payload> }`. Displays treat events as
//! hints and re-fetch the dashboard, so payloads carry identifiers and the
//! figures needed for pop-ups, not full state.

use crate::{
    core::{cycle::Period, entity::EntityKind},
    entities::sale,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event envelope sent to displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BoardEvent {
    /// A sale was recorded
    SaleCreated(sale::Model),
    /// A sale was corrected
    SaleUpdated(sale::Model),
    /// A sale was removed
    SaleDeleted(SaleDeleted),
    /// An entity's period closed and a new one began
    CycleReset(CycleReset),
    /// Entities without cycle state were positioned on their current period
    CyclesInitialized(CyclesInitialized),
    /// Scalar or category targets of an entity changed
    TargetsUpdated(EntityChanged),
    /// An agent was created or deactivated
    AgentChanged(EntityChanged),
    /// A team was created or deactivated
    TeamChanged(EntityChanged),
    /// The display currency changed
    CurrencyChanged(CurrencyChanged),
}

impl BoardEvent {
    /// Wire name of the event, as it appears in the `type` field.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::SaleCreated(_) => "sale_created",
            Self::SaleUpdated(_) => "sale_updated",
            Self::SaleDeleted(_) => "sale_deleted",
            Self::CycleReset(_) => "cycle_reset",
            Self::CyclesInitialized(_) => "cycles_initialized",
            Self::TargetsUpdated(_) => "targets_updated",
            Self::AgentChanged(_) => "agent_changed",
            Self::TeamChanged(_) => "team_changed",
            Self::CurrencyChanged(_) => "currency_changed",
        }
    }
}

/// Payload of `sale_deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDeleted {
    /// ID of the removed sale
    pub id: i64,
    /// Agent the sale was credited to
    pub agent_id: i64,
}

/// Payload of `cycle_reset`, one per closed period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReset {
    /// Agent or team
    pub entity_type: EntityKind,
    /// ID within its table
    pub entity_id: i64,
    /// The period that just closed
    pub closed: Period,
    /// Start of the new current period
    pub period_start: DateTime<Utc>,
    /// When the new period ends
    pub next_reset: DateTime<Utc>,
    /// Volume achieved in the closed period
    pub achieved_volume_cents: i64,
    /// Units achieved in the closed period
    pub achieved_units: i64,
}

/// Payload of `cycles_initialized`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclesInitialized {
    /// Number of entities that received their first period
    pub initialized: usize,
}

/// Payload identifying an agent or team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChanged {
    /// Agent or team
    pub entity_type: EntityKind,
    /// ID within its table
    pub entity_id: i64,
}

/// Payload of `currency_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyChanged {
    /// New ISO currency code
    pub currency: String,
}

/// Envelope for events built from an arbitrary type name and payload.
#[derive(Debug, Serialize)]
pub struct RawEnvelope<'a> {
    /// Event name
    #[serde(rename = "type")]
    pub event_type: &'a str,
    /// Event-specific payload
    pub data: &'a serde_json::Value,
}
