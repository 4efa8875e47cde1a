use core::time::Duration;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    config::Credentials,
    portal::{Launcher, Orchestrator},
    snapshot::Snapshot,
};

/// One scrape-and-commit pass. Runs on the blocking pool.
pub trait Cycle: Send + Sync + 'static {
    fn run_cycle(&self) -> anyhow::Result<Snapshot>;
}

impl<L: Launcher + 'static> Cycle for Orchestrator<L> {
    fn run_cycle(&self) -> anyhow::Result<Snapshot> {
        Self::run_cycle(self)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PollStats {
    pub cycles: u64,
    pub failures: u64,
    pub last_seq: Option<u64>,
    pub last_error: Option<String>,
    pub running: bool,
}

pub struct Poller<C> {
    cycle: Arc<C>,
    interval: Duration,
}

/// Owner of the background loop. Dropping it leaves the loop running; only
/// [`PollerHandle::shutdown`] stops it.
pub struct PollerHandle {
    stats: Arc<Mutex<PollStats>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<C: Cycle> Poller<C> {
    pub fn new(cycle: C, interval: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            interval,
        }
    }

    /// Starts the loop on the current runtime. Consumes the poller, so one
    /// poller can never run twice.
    pub fn spawn(self) -> PollerHandle {
        let stats = Arc::new(Mutex::new(PollStats {
            running: true,
            ..PollStats::default()
        }));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run(self.cycle, self.interval, Arc::clone(&stats), rx));

        PollerHandle {
            stats,
            shutdown: tx,
            task,
        }
    }
}

impl PollerHandle {
    pub fn stats(&self) -> PollStats {
        self.stats.lock().clone()
    }

    pub fn shared_stats(&self) -> Arc<Mutex<PollStats>> {
        Arc::clone(&self.stats)
    }

    /// Stops after the cycle in flight, if any, finishes.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(target: "poller", "poller task ended abnormally: {e}");
        }
    }
}

async fn run<C: Cycle>(
    cycle: Arc<C>,
    interval: Duration,
    stats: Arc<Mutex<PollStats>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(target: "poller", "\x1b[32mstarted\x1b[0m, one cycle every {}s", interval.as_secs());

    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = Arc::clone(&cycle);
        let result = tokio::task::spawn_blocking(move || job.run_cycle()).await;

        {
            let mut stats = stats.lock();
            stats.cycles += 1;
            match result {
                Ok(Ok(snapshot)) => {
                    tracing::info!(target: "poller", "\x1b[36mcycle #{} finished\x1b[0m, snapshot #{}", stats.cycles, snapshot.seq);
                    stats.last_seq = Some(snapshot.seq);
                    stats.last_error = None;
                }
                Ok(Err(e)) => {
                    tracing::error!(target: "poller", "\x1b[31mcycle #{} failed\x1b[0m: {e:?}", stats.cycles);
                    stats.failures += 1;
                    stats.last_error = Some(e.to_string());
                }
                Err(e) => {
                    tracing::error!(target: "poller", "\x1b[31mcycle #{} aborted\x1b[0m: {e}", stats.cycles);
                    stats.failures += 1;
                    stats.last_error = Some(e.to_string());
                }
            }
        }

        tracing::info!(target: "poller", "resting {}s before the next cycle ...", interval.as_secs());
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            Ok(()) = shutdown.changed() => break,
        }
    }

    stats.lock().running = false;
    tracing::info!(target: "poller", "stopped");
}

/// Starts polling only when credentials are configured. Without them the
/// loop never starts, which leaves the rest of the process untouched.
pub fn start_if_configured<C, F>(
    credentials: Option<Credentials>,
    interval: Duration,
    make_cycle: F,
) -> Option<PollerHandle>
where
    C: Cycle,
    F: FnOnce(Credentials) -> C,
{
    let Some(credentials) = credentials else {
        tracing::error!(target: "poller", "\x1b[1;31maccount or password missing\x1b[0m, scraping disabled");
        return None;
    };
    Some(Poller::new(make_cycle(credentials), interval).spawn())
}
