pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{seed_demo_dataset, SeedSummary};
pub use service::{
    ActionSuccess, NewAsset, NewCorrectiveAction, NewDeviation, NewFailureReport,
    NewOvertimeOrder, WorkflowService,
};
