//! Sync pass behaviour against in-memory adapters.

use super::helpers::{SyncHarness, connector_id};
use rstest::rstest;
use serde_json::json;
use std::time::Duration;
use switchyard::manifest::domain::LoadError;
use switchyard::sync::{ManifestStatus, SyncSettings};
use switchyard::tool_registry::domain::ConnectionState;

fn names(harness: &SyncHarness) -> Vec<String> {
    harness
        .coordinator
        .registry()
        .list()
        .iter()
        .map(|entry| entry.name().as_str().to_owned())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn enabled_connector_is_synced_and_disabled_one_is_only_recorded() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true), ("b", false)])?;
    harness.catalog("a", &["Search"])?;
    harness.catalog("b", &["ignored"])?;

    let summary = harness.coordinator.run().await;

    assert_eq!(summary.manifest, ManifestStatus::Refreshed);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.is_clean());
    assert_eq!(names(&harness), vec!["search".to_owned()]);
    assert_eq!(harness.host.connect_count(&connector_id("b")?), 0);

    let records = harness.persistence.read_all().await?;
    assert_eq!(records.len(), 2);
    let by_name = |name: &str| records.iter().find(|record| record.name == name).cloned();
    let a = by_name("a").ok_or_else(|| eyre::eyre!("record a missing"))?;
    let b = by_name("b").ok_or_else(|| eyre::eyre!("record b missing"))?;
    assert_eq!(a.metadata["state"], json!("connected"));
    assert_eq!(a.metadata["toolCount"], json!(1));
    assert_eq!(b.metadata["state"], json!("disabled"));
    assert_eq!(b.metadata["enabled"], json!(false));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn one_failing_connector_does_not_block_the_others() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true), ("b", true), ("c", true)])?;
    harness.catalog("a", &["alpha"])?;
    harness.catalog("c", &["gamma"])?;
    harness
        .host
        .set_failing(connector_id("b")?, "connection refused")?;

    let summary = harness.coordinator.run().await;

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    let failure = summary
        .failed
        .first()
        .ok_or_else(|| eyre::eyre!("expected one failure"))?;
    assert_eq!(failure.id.as_str(), "b");
    assert!(failure.error.contains("connection refused"));
    assert_eq!(failure.consecutive_failures, 1);
    assert_eq!(names(&harness), vec!["alpha".to_owned(), "gamma".to_owned()]);

    let states = harness.coordinator.proxy_states().await;
    let b_state = states
        .iter()
        .find(|state| state.id.as_str() == "b")
        .ok_or_else(|| eyre::eyre!("proxy b missing"))?;
    assert_eq!(b_state.state, ConnectionState::Degraded);
    Ok(())
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
#[tokio::test(flavor = "multi_thread")]
async fn connector_setup_never_exceeds_the_concurrency_limit(
    #[case] concurrency: usize,
) -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings {
        concurrency,
        ..SyncSettings::default()
    })
    .await?;
    let ids: Vec<String> = (0..10).map(|index| format!("c{index}")).collect();
    let connectors: Vec<(&str, bool)> = ids.iter().map(|id| (id.as_str(), true)).collect();
    harness.serve(&connectors)?;
    harness.host.set_connect_delay(Duration::from_millis(20))?;

    let summary = harness.coordinator.run().await;

    assert_eq!(summary.succeeded, 10);
    let peak = harness.host.peak_concurrent_connects();
    assert!(peak >= 1, "at least one connect should have run");
    assert!(
        peak <= concurrency,
        "peak {peak} exceeded limit {concurrency}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn resyncing_an_unchanged_manifest_changes_nothing() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true), ("b", false)])?;
    harness.catalog("a", &["search", "fetch"])?;

    let first = harness.coordinator.run().await;
    assert!(harness.persistence.flush_if_dirty().await?);
    let commits = harness.store.commit_count();
    let tools_after_first = names(&harness);

    harness.clock.advance_millis(61_000);
    let second = harness.coordinator.run().await;

    assert_eq!(first.manifest, ManifestStatus::Refreshed);
    assert_eq!(second.manifest, ManifestStatus::Refreshed);
    assert_eq!(second.succeeded, 1);
    assert_eq!(names(&harness), tools_after_first);
    assert_eq!(harness.host.connect_count(&connector_id("a")?), 1);
    assert!(!harness.persistence.is_dirty().await?);
    assert!(!harness.persistence.flush_if_dirty().await?);
    assert_eq!(harness.store.commit_count(), commits);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_manifest_is_reused_without_fetching() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true)])?;

    let _first = harness.coordinator.run().await;
    harness.clock.advance_millis(30_000);
    let second = harness.coordinator.run().await;

    assert_eq!(second.manifest, ManifestStatus::Reused);
    assert_eq!(harness.source.load_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_refresh_serves_the_stale_manifest() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true)])?;
    harness.catalog("a", &["search"])?;
    let _first = harness.coordinator.run().await;

    harness.clock.advance_millis(120_000);
    harness
        .source
        .set_fallback(Err(LoadError::Status { status: 503 }));
    let second = harness.coordinator.run().await;

    assert_eq!(second.manifest, ManifestStatus::Stale);
    assert_eq!(second.succeeded, 1);
    assert_eq!(names(&harness), vec!["search".to_owned()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn first_pass_without_any_manifest_is_unavailable() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;

    let summary = harness.coordinator.run().await;

    assert_eq!(summary.manifest, ManifestStatus::Unavailable);
    assert_eq!(summary.attempted, 0);
    assert!(harness.coordinator.registry().is_empty());
    assert!(harness.persistence.read_all().await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn removed_connector_is_closed_but_its_record_is_kept() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true), ("b", true)])?;
    harness.catalog("a", &["alpha"])?;
    harness.catalog("b", &["beta"])?;
    let _first = harness.coordinator.run().await;
    assert!(harness.host.is_connected(&connector_id("b")?));

    harness.clock.advance_millis(61_000);
    harness.serve(&[("a", true)])?;
    let second = harness.coordinator.run().await;

    assert_eq!(second.attempted, 1);
    assert!(!harness.host.is_connected(&connector_id("b")?));
    assert_eq!(names(&harness), vec!["alpha".to_owned()]);
    let live: Vec<String> = harness
        .coordinator
        .proxy_states()
        .await
        .into_iter()
        .map(|state| state.id.as_str().to_owned())
        .collect();
    assert_eq!(live, vec!["a".to_owned()]);
    let records = harness.persistence.read_all().await?;
    assert!(records.iter().any(|record| record.name == "b"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn registered_tools_forward_calls_to_their_connector() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true)])?;
    harness.catalog("a", &["search"])?;
    let _summary = harness.coordinator.run().await;

    let response = harness
        .coordinator
        .registry()
        .call("Search", json!({"query": "rust"}))
        .await?;

    assert_eq!(response["connector"], json!("a"));
    assert_eq!(response["tool"], json!("search"));
    assert_eq!(response["arguments"], json!({"query": "rust"}));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_every_proxy_and_withdraws_tools() -> eyre::Result<()> {
    let harness = SyncHarness::new(SyncSettings::default()).await?;
    harness.serve(&[("a", true), ("b", true)])?;
    harness.catalog("a", &["alpha"])?;
    harness.catalog("b", &["beta"])?;
    let _summary = harness.coordinator.run().await;

    harness.coordinator.shutdown().await;
    harness.persistence.close().await?;

    assert!(harness.coordinator.registry().is_empty());
    assert!(harness.coordinator.proxy_states().await.is_empty());
    assert!(!harness.host.is_connected(&connector_id("a")?));
    assert_eq!(harness.store.latest().len(), 2);
    Ok(())
}
