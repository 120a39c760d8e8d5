//! Shared helpers for the cross-crate test suites

#![allow(dead_code)]

use std::sync::{Arc, Once};

use verso::testing::FaultyStore;
use verso::{FieldDef, InMemoryStore, Model, Repository, VersoConfig};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// The model every scenario runs against
pub fn item_model() -> Arc<Model> {
    Model::builder("item")
        .field(FieldDef::keyword("value"))
        .field(FieldDef::long("count"))
        .versioned()
        .soft_delete()
        .build()
        .unwrap()
}

/// Repository over a store that publishes writes immediately
pub fn repo() -> Repository {
    init_tracing();
    let store = Arc::new(InMemoryStore::with_auto_refresh());
    let repo = Repository::new(store, item_model(), VersoConfig::default()).unwrap();
    repo.ensure_indices().unwrap();
    repo
}

/// Repository over a recording, fault-injecting store
pub fn faulty_repo() -> (Arc<FaultyStore<InMemoryStore>>, Repository) {
    init_tracing();
    let store = Arc::new(FaultyStore::new(InMemoryStore::with_auto_refresh()));
    let repo = Repository::new(store.clone(), item_model(), VersoConfig::default()).unwrap();
    repo.ensure_indices().unwrap();
    store.clear_ops();
    (store, repo)
}
