pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    domain::inventory::Socket,
    infra::postgres::PgStore,
    services::{polymorphic_store::PolymorphicStore, recorder::ChangeRecorder},
    std::sync::Arc,
};

pub struct AppState<S = PgStore> {
    pub recorder: Arc<ChangeRecorder<S>>,
    pub sockets: Arc<PolymorphicStore<S, Socket>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            recorder: Arc::clone(&self.recorder),
            sockets: Arc::clone(&self.sockets),
        }
    }
}
