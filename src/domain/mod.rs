pub mod actor;
pub mod change_log;
pub mod entity;
pub mod error;
pub mod id;
pub mod inventory;
pub mod polymorphic;
pub mod snapshot;
pub mod store;
