//! Registry persistence against the file store.

use camino::Utf8PathBuf;
use eyre::{WrapErr, eyre};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchyard::tool_registry::{
    adapters::FileRegistryStore, domain::RegistryRecord, ports::RegistrySnapshotStore,
    services::RegistryPersistence,
};
use tempfile::TempDir;

fn record(name: &str, last_seen_ms: i64) -> RegistryRecord {
    RegistryRecord {
        name: name.to_owned(),
        version: None,
        transport: "http_sse".to_owned(),
        last_seen_ms,
        metadata: json!({"enabled": true}),
    }
}

fn registry_path(dir: &TempDir) -> eyre::Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(dir.path().join("servers.json"))
        .map_err(|path| eyre!("temp path is not UTF-8: {}", path.display()))
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_commit_leaves_previous_snapshot_intact() -> eyre::Result<()> {
    let dir = TempDir::new()?;
    let path = registry_path(&dir)?;
    let store = FileRegistryStore::new(&path)?;
    store.commit(vec![record("a", 1)]).await?;
    let before = std::fs::read(&path)?;

    let staged = store.stage(&[record("a", 2), record("b", 2)])?;
    drop(staged);

    assert_eq!(std::fs::read(&path)?, before);
    let reloaded = FileRegistryStore::new(&path)?.read_snapshot()?;
    assert_eq!(reloaded, vec![record("a", 1)]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn closing_persistence_flushes_to_disk() -> eyre::Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(FileRegistryStore::new(registry_path(&dir)?)?);
    let persistence = RegistryPersistence::open(Arc::clone(&store), Duration::from_secs(3600))
        .await
        .wrap_err("persistence should open")?;

    persistence.upsert(record("a", 1)).await?;
    persistence.upsert(record("b", 1)).await?;
    assert!(persistence.remove("b").await?);
    persistence.close().await?;

    let reopened = RegistryPersistence::open(store, Duration::from_secs(3600)).await?;
    assert_eq!(reopened.read_all().await?, vec![record("a", 1)]);
    reopened.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_snapshot_starts_empty_without_rewriting() -> eyre::Result<()> {
    let dir = TempDir::new()?;
    let path = registry_path(&dir)?;
    std::fs::write(&path, "{ not json")?;
    let store = Arc::new(FileRegistryStore::new(&path)?);

    let persistence = RegistryPersistence::open(store, Duration::from_secs(3600)).await?;

    assert!(persistence.read_all().await?.is_empty());
    assert!(!persistence.is_dirty().await?);
    persistence.close().await?;
    assert_eq!(std::fs::read_to_string(&path)?, "{ not json");
    Ok(())
}
