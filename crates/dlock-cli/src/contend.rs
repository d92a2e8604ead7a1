//! Contention run
//!
//! Starts an in-memory coordination service and has every worker, each on
//! its own session, take the lock `rounds` times. The report records how
//! many holders were ever active at once; anything above one is a violation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dlock_coordination::{MemoryCoordinationService, MemoryServiceConfig};
use dlock_core::{LockConfig, ScopedLockHandle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Settings;

#[derive(Debug, Default)]
struct Tally {
    active: AtomicU64,
    max_active: AtomicU64,
    acquired: AtomicU64,
    failed: AtomicU64,
    release_errors: AtomicU64,
}

/// Outcome of a contention run
#[derive(Debug, Clone, Serialize)]
pub struct ContentionReport {
    pub lock_path: String,
    pub workers: u64,
    pub rounds: u64,
    pub acquired: u64,
    pub failed: u64,
    pub release_errors: u64,
    pub max_concurrent_holders: u64,
    pub elapsed_ms: u128,
}

impl ContentionReport {
    pub fn mutual_exclusion_held(&self) -> bool {
        self.max_concurrent_holders <= 1
    }
}

pub async fn run(settings: &Settings) -> anyhow::Result<ContentionReport> {
    let service_config = if settings.unpadded {
        MemoryServiceConfig::unpadded()
    } else {
        MemoryServiceConfig::default()
    };
    let service = MemoryCoordinationService::new(service_config)?;
    service.ensure_path(&settings.lock_path)?;

    info!(
        lock_path = %settings.lock_path,
        workers = settings.workers,
        rounds = settings.rounds,
        hold_ms = settings.hold_ms,
        "Starting contention run"
    );

    let tally = Arc::new(Tally::default());
    let started = Instant::now();
    let mut handles = Vec::new();
    for worker in 0..settings.workers {
        let service = service.clone();
        let tally = tally.clone();
        let lock_path = settings.lock_path.clone();
        let lock_config = settings.lock.clone();
        let hold = Duration::from_millis(settings.hold_ms);
        let rounds = settings.rounds;

        handles.push(tokio::spawn(async move {
            run_worker(service, worker, &lock_path, lock_config, hold, rounds, &tally).await;
        }));
    }

    for handle in handles {
        handle.await?;
    }

    let report = ContentionReport {
        lock_path: settings.lock_path.clone(),
        workers: settings.workers,
        rounds: settings.rounds,
        acquired: tally.acquired.load(Ordering::SeqCst),
        failed: tally.failed.load(Ordering::SeqCst),
        release_errors: tally.release_errors.load(Ordering::SeqCst),
        max_concurrent_holders: tally.max_active.load(Ordering::SeqCst),
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(
        acquired = report.acquired,
        failed = report.failed,
        max_concurrent_holders = report.max_concurrent_holders,
        elapsed_ms = report.elapsed_ms,
        "Contention run finished"
    );
    Ok(report)
}

async fn run_worker(
    service: MemoryCoordinationService,
    worker: u64,
    lock_path: &str,
    lock_config: LockConfig,
    hold: Duration,
    rounds: u64,
    tally: &Tally,
) {
    let session = Arc::new(service.connect());
    let identity = format!("worker-{worker}");

    for round in 0..rounds {
        let handle = match ScopedLockHandle::acquire_with_config(
            session.clone(),
            lock_path,
            &identity,
            lock_config.clone(),
        )
        .await
        {
            Ok(handle) => handle,
            Err(err) => {
                warn!(worker = %identity, round, error = %err, "Acquire failed");
                tally.failed.fetch_add(1, Ordering::SeqCst);
                continue;
            }
        };

        let now = tally.active.fetch_add(1, Ordering::SeqCst) + 1;
        tally.max_active.fetch_max(now, Ordering::SeqCst);
        tally.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(worker = %identity, round, claim = ?handle.claim_node().map(|node| node.name), "Holding lock");

        tokio::time::sleep(hold).await;
        tally.active.fetch_sub(1, Ordering::SeqCst);

        if let Err(err) = handle.release().await {
            warn!(worker = %identity, round, error = %err, "Release failed");
            tally.release_errors.fetch_add(1, Ordering::SeqCst);
        }
    }
}
