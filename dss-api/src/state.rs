//! Shared application state

use std::sync::Arc;

use dss_db::Store;

use crate::auth::Authorizer;
use crate::services::{AuxService, RidService, ScdService};

/// State shared by every handler: the store, the authorizer, and one
/// service per API surface.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub authorizer: Arc<Authorizer>,
    pub rid: Arc<RidService>,
    pub scd: Arc<ScdService>,
    pub aux: Arc<AuxService>,
}

impl AppState {
    /// Wires the services over a connected store.
    ///
    /// `writer` identifies this process on records it creates, keying
    /// expired-record cleanup across replicas.
    pub fn new(store: Arc<Store>, authorizer: Arc<Authorizer>, writer: String) -> AppState {
        AppState {
            rid: Arc::new(RidService::new(store.clone(), writer)),
            scd: Arc::new(ScdService::new(store.clone())),
            aux: Arc::new(AuxService::new()),
            store,
            authorizer,
        }
    }
}
