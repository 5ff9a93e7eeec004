//! Unified error types and result handling for `SalesBoard`.

use thiserror::Error;

/// Every failure the board can report, from storage to configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure (config files, sockets)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required environment variable missing or malformed
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Reset day / month combination is not valid for the cycle type
    #[error("Invalid target cycle: {message}")]
    InvalidCycle {
        /// Which part of the cycle configuration was rejected
        message: String,
    },

    /// Monetary amount or unit count is negative
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected value
        amount: i64,
    },

    /// Input failed validation for a reason other than amounts or cycles
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the rejected input
        message: String,
    },

    /// Agent does not exist or is inactive
    #[error("Agent not found: {id}")]
    AgentNotFound {
        /// Agent id that was looked up
        id: i64,
    },

    /// Team does not exist or is inactive
    #[error("Team not found: {id}")]
    TeamNotFound {
        /// Team id that was looked up
        id: i64,
    },

    /// Sale does not exist
    #[error("Sale not found: {id}")]
    SaleNotFound {
        /// Sale id that was looked up
        id: i64,
    },

    /// The entity's stored cycle moved while a period was being closed
    #[error("Cycle state of {entity} changed during reset")]
    CycleConflict {
        /// Entity label, e.g. `agent#3`
        entity: String,
    },

    /// A reset pass is already running
    #[error("A cycle reset pass is already in progress")]
    PassInProgress,

    /// A manual pass finished but some entities could not be processed
    #[error("Cycle pass incomplete: {failed} of {total} entities failed")]
    PassIncomplete {
        /// Number of entities that failed
        failed: usize,
        /// Number of entities visited
        total: usize,
    },

    /// A real-time message could not be handed to a display connection
    #[error("Delivery failed: {message}")]
    Delivery {
        /// Why the connection refused the message
        message: String,
    },

    /// Caller is not allowed to perform an admin operation
    #[error("Unauthorized")]
    Unauthorized,
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
