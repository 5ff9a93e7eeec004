//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod agent;
pub mod category_target;
pub mod sale;
pub mod system_state;
pub mod target_history;
pub mod team;

// Re-export specific types to avoid conflicts
pub use agent::{Column as AgentColumn, Entity as Agent, Model as AgentModel};
pub use category_target::{
    Column as CategoryTargetColumn, Entity as CategoryTarget, Model as CategoryTargetModel,
};
pub use sale::{Column as SaleColumn, Entity as Sale, Model as SaleModel};
pub use system_state::{
    Column as SystemStateColumn, Entity as SystemState, Model as SystemStateModel,
};
pub use target_history::{
    Column as TargetHistoryColumn, Entity as TargetHistory, Model as TargetHistoryModel,
};
pub use team::{Column as TeamColumn, Entity as Team, Model as TeamModel};
