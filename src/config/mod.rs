/// Database configuration and connection management
pub mod database;

/// Team and agent roster loading from config.toml
pub mod roster;

/// Process settings from environment variables
pub mod settings;
