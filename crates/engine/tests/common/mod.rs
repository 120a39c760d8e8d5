//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};

use verso_core::FieldDef;
use verso_engine::{Model, Repository, VersoConfig};
use verso_store::testing::FaultyStore;
use verso_store::InMemoryStore;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (shown with `--nocapture`)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub type TestStore = Arc<FaultyStore<InMemoryStore>>;

/// Versioned, soft-deletable model with one keyword field
pub fn item_model() -> Arc<Model> {
    Model::builder("item")
        .field(FieldDef::keyword("value"))
        .field(FieldDef::long("count"))
        .versioned()
        .soft_delete()
        .build()
        .unwrap()
}

/// Repository over a recording store that publishes writes immediately
pub fn repo_with(model: Arc<Model>) -> (TestStore, Repository) {
    init_tracing();
    let store = Arc::new(FaultyStore::new(InMemoryStore::with_auto_refresh()));
    let repo = Repository::new(store.clone(), model, VersoConfig::with_prefix("it_")).unwrap();
    repo.ensure_indices().unwrap();
    store.clear_ops();
    (store, repo)
}

pub fn item_repo() -> (TestStore, Repository) {
    repo_with(item_model())
}
