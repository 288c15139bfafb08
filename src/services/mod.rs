pub mod entity_rows;
pub mod polymorphic_store;
pub mod recorder;
pub mod registry;
