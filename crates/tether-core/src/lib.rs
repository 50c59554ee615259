pub mod database;
pub mod models;
pub mod queries;
pub mod registry;
pub mod scope;
pub mod task_context;
