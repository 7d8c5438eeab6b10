//! Confab server - meeting membership and role coordination

pub mod admission;
pub mod api;
pub mod delegation;
pub mod error;
pub mod media;
pub mod models;
pub mod permissions;
pub mod store;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::admission::AdmissionStateMachine;
use crate::delegation::RoleDelegationProtocol;
use crate::media::MediaClient;
use crate::store::Store;

/// Application state shared across handlers
pub struct AppState {
    pub store: store::Store,
    pub admission: AdmissionStateMachine,
    pub delegation: RoleDelegationProtocol,
    pub media: MediaClient,
}

impl AppState {
    pub fn new(pool: SqlitePool, media: MediaClient) -> Arc<Self> {
        let store = Store::new(pool);
        Arc::new(Self {
            admission: AdmissionStateMachine::new(store.clone()),
            delegation: RoleDelegationProtocol::new(store.clone()),
            store,
            media,
        })
    }
}
