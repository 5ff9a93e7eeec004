//! Core business logic, independent of the HTTP layer.

/// Agent management
pub mod agent;
/// Sale aggregation against targets
pub mod aggregate;
/// Target cycle calculation
pub mod cycle;
/// Common view of agents and teams
pub mod entity;
/// Closed-period history reads
pub mod history;
/// Ranked dashboard standings
pub mod leaderboard;
/// Cycle reset engine and its timer service
pub mod reset;
/// Sale recording and corrections
pub mod sale;
/// Board-wide key/value settings
pub mod settings;
/// Persistence seam of the reset engine
pub mod store;
/// Team management
pub mod team;
/// Scalar and category target configuration
pub mod targets;
