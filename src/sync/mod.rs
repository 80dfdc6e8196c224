//! Schema synchronization
//!
//! A background task re-reads the catalog on a timer (or on request), and
//! when the structure changed compiles a fresh operation set and publishes it
//! with the snapshot as one `ApiState`. Readers take the current state once
//! per request and keep it for the whole request.

pub mod refresher;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogReader, SchemaSnapshot};
use crate::config::SupportedOperations;
use crate::error::{Result, SyncError};
use crate::generator::{ApiGenerator, GeneratedOperationSet};

pub use refresher::SchemaRefresher;

/// One published snapshot with the operations compiled from it
pub struct ApiState {
    pub snapshot: Arc<SchemaSnapshot>,
    pub operations: GeneratedOperationSet,
}

/// Read side of the published state
#[derive(Clone)]
pub struct SchemaHandle(Arc<ArcSwap<ApiState>>);

impl SchemaHandle {
    pub fn new(state: ApiState) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(state)))
    }

    pub fn current(&self) -> Arc<ApiState> {
        self.0.load_full()
    }

    fn publish(&self, state: ApiState) {
        self.0.store(Arc::new(state));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Unchanged,
    Published(u64),
    Failed(SyncError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncPhase {
    Idle = 0,
    Reading = 1,
    Diffing = 2,
    Publishing = 3,
}

impl SyncPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncPhase::Reading,
            2 => SyncPhase::Diffing,
            3 => SyncPhase::Publishing,
            _ => SyncPhase::Idle,
        }
    }
}

pub struct SchemaSynchronizer {
    reader: CatalogReader,
    generator: ApiGenerator,
    operations: SupportedOperations,
    interval: Duration,
    refresher: SchemaRefresher,
    handle: SchemaHandle,
    phase: AtomicU8,
}

impl SchemaSynchronizer {
    /// First read and publish; failure here is fatal to startup
    pub async fn bootstrap(
        reader: CatalogReader,
        generator: ApiGenerator,
        operations: SupportedOperations,
        interval: Duration,
        refresher: SchemaRefresher,
    ) -> Result<Self> {
        let snapshot = reader.read().await?.with_version(1);
        log_warnings(&snapshot);
        let state = build_state(&generator, snapshot, &operations)?;
        tracing::info!(
            "Published schema version 1 ({} keyspace(s))",
            state.operations.keyspaces.len()
        );

        Ok(Self {
            reader,
            generator,
            operations,
            interval,
            refresher,
            handle: SchemaHandle::new(state),
            phase: AtomicU8::new(SyncPhase::Idle as u8),
        })
    }

    pub fn handle(&self) -> SchemaHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// One refresh cycle. The published state is untouched unless it changed.
    pub async fn sync_once(&self) -> SyncOutcome {
        self.set_phase(SyncPhase::Reading);
        let outcome = self.cycle().await;
        self.set_phase(SyncPhase::Idle);
        outcome
    }

    async fn cycle(&self) -> SyncOutcome {
        let snapshot = match self.reader.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Schema refresh failed, keeping current schema: {}", e);
                return SyncOutcome::Failed(e);
            }
        };

        self.set_phase(SyncPhase::Diffing);
        let current = self.handle.current();
        if current.snapshot.structurally_eq(&snapshot) {
            tracing::debug!("Schema unchanged at version {}", current.snapshot.version);
            return SyncOutcome::Unchanged;
        }

        self.set_phase(SyncPhase::Publishing);
        let version = current.snapshot.version + 1;
        let snapshot = snapshot.with_version(version);
        log_warnings(&snapshot);
        match build_state(&self.generator, snapshot, &self.operations) {
            Ok(state) => {
                self.handle.publish(state);
                tracing::info!("Published schema version {}", version);
                SyncOutcome::Published(version)
            }
            Err(e) => {
                tracing::warn!("Failed to generate schema version {}: {}", version, e);
                SyncOutcome::Failed(SyncError::Generation(e.to_string()))
            }
        }
    }

    /// Refresh until `shutdown` fires, abandoning any read in progress
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately and bootstrap already read.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.refresher.requested() => {
                    tracing::debug!("Schema refresh requested");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown during schema refresh, abandoning read");
                    break;
                }
                _ = self.sync_once() => {}
            }
            interval.reset();
        }

        self.set_phase(SyncPhase::Idle);
        tracing::info!("Schema synchronizer stopped");
    }
}

fn build_state(
    generator: &ApiGenerator,
    snapshot: SchemaSnapshot,
    operations: &SupportedOperations,
) -> Result<ApiState> {
    let snapshot = Arc::new(snapshot);
    let operations = generator.generate(&snapshot, operations)?;
    Ok(ApiState { snapshot, operations })
}

fn log_warnings(snapshot: &SchemaSnapshot) {
    for warning in &snapshot.warnings {
        tracing::warn!("{}", warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::ExecutionGateway;
    use crate::query::QueryBuilder;
    use crate::testing::{store_session, FakeSession};

    async fn synchronizer(session: Arc<FakeSession>) -> SchemaSynchronizer {
        let config = Config::default();
        let refresher = SchemaRefresher::new();
        let gateway = ExecutionGateway::new(session.clone(), false, Duration::from_secs(5));
        SchemaSynchronizer::bootstrap(
            CatalogReader::new(session, &config),
            ApiGenerator::new(QueryBuilder::default(), gateway, refresher.clone()),
            SupportedOperations::default(),
            Duration::from_secs(3600),
            refresher,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_publishes_first_version() {
        let sync = synchronizer(store_session()).await;
        let state = sync.handle().current();
        assert_eq!(state.snapshot.version, 1);
        assert!(state.operations.table_operations("store", "books").is_some());
        assert_eq!(sync.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_unchanged_schema_keeps_state() {
        let sync = synchronizer(store_session()).await;
        let before = sync.handle().current();

        assert_eq!(sync.sync_once().await, SyncOutcome::Unchanged);
        assert!(Arc::ptr_eq(&before, &sync.handle().current()));
    }

    #[tokio::test]
    async fn test_changed_schema_is_published() {
        let session = store_session();
        let sync = synchronizer(session.clone()).await;
        let held = sync.handle().current();

        session.set_catalog(session.catalog().drop_table("store", "reviews"));
        assert_eq!(sync.sync_once().await, SyncOutcome::Published(2));

        let current = sync.handle().current();
        assert!(current.operations.table_operations("store", "reviews").is_none());
        // A request holding the old state still sees the old surface
        assert!(held.operations.table_operations("store", "reviews").is_some());
    }

    #[tokio::test]
    async fn test_failed_read_retains_last_state() {
        let session = store_session();
        let sync = synchronizer(session.clone()).await;

        session.fail_metadata(true);
        assert!(matches!(sync.sync_once().await, SyncOutcome::Failed(SyncError::Metadata(_))));
        assert_eq!(sync.handle().current().snapshot.version, 1);
        assert_eq!(sync.phase(), SyncPhase::Idle);

        session.fail_metadata(false);
        session.set_catalog(session.catalog().drop_table("store", "reviews"));
        assert_eq!(sync.sync_once().await, SyncOutcome::Published(2));
    }

    #[tokio::test]
    async fn test_bootstrap_fails_without_catalog() {
        let session = store_session();
        session.fail_metadata(true);
        let config = Config::default();
        let refresher = SchemaRefresher::new();
        let gateway = ExecutionGateway::new(session.clone(), false, Duration::from_secs(5));

        let result = SchemaSynchronizer::bootstrap(
            CatalogReader::new(session, &config),
            ApiGenerator::new(QueryBuilder::default(), gateway, refresher.clone()),
            SupportedOperations::default(),
            Duration::from_secs(3600),
            refresher,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_refreshes_on_request_and_stops_on_shutdown() {
        let session = store_session();
        let sync = Arc::new(synchronizer(session.clone()).await);
        let refresher = sync.refresher.clone();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let sync = Arc::clone(&sync);
            let shutdown = shutdown.clone();
            async move { sync.run(shutdown).await }
        });

        session.set_catalog(session.catalog().drop_table("store", "reviews"));
        refresher.request();
        let handle = sync.handle();
        tokio::time::timeout(Duration::from_secs(2), async {
            while handle.current().snapshot.version < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
