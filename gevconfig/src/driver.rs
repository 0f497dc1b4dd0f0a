//! The fixed configuration pipeline.
//!
//! 1. scan for cameras
//! 2. list every camera
//! 3. ask every camera to renegotiate its address automatically
//! 4. wait for the network to settle, and rescan
//! 5. store each camera's address as its persistent configuration
//! 6. list every camera again
//!
//! Each phase runs regardless of whether the previous one failed. Failures are
//! logged, and written to the console output; nothing is fatal.
use crate::{
    assigner::{store_all, AssignmentOutcome},
    bus::CameraBus,
    error::ResultExt,
    report::{print_all_camera_info, Listing},
    Error, Result,
};
use std::{fmt::Display, io::Write, time::Duration};
use tokio::time::{sleep, Instant};

/// How to wait for cameras to finish renegotiating their addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Sleep for a fixed time, then rescan once.
    Fixed(Duration),

    /// Rescan every `interval`, until two scans in a row find the same number
    /// of cameras, or `timeout` elapses.
    UntilStable { interval: Duration, timeout: Duration },
}

impl Default for SettleStrategy {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    ListBefore,
    ForceIp,
    Settle,
    Store,
    ListAfter,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Scan => "scanning for cameras",
            Self::ListBefore | Self::ListAfter => "checking the active cameras",
            Self::ForceIp => "forcing IPs",
            Self::Settle => "waiting for cameras",
            Self::Store => "saving IPs",
        })
    }
}

/// Result of a [`Driver::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Phases which stopped with an error.
    pub failed_phases: Vec<Phase>,
    /// Cameras configured by the store phase.
    pub assignments: Vec<AssignmentOutcome>,
    /// Cameras which couldn't be queried while listing.
    pub camera_errors: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed_phases.is_empty() && self.camera_errors == 0
    }

    fn listed(&mut self, phase: Phase, r: Result<Listing>, out: &mut impl Write) {
        if let Some(listing) = self.check(phase, r, out) {
            self.camera_errors += listing.failed;
        }
    }

    fn check<T>(&mut self, phase: Phase, r: Result<T>, out: &mut impl Write) -> Option<T> {
        match r {
            Ok(v) => Some(v),
            Err(e) => {
                self.fail(phase, &e, out);
                None
            }
        }
    }

    fn fail(&mut self, phase: Phase, e: &Error, out: &mut impl Write) {
        error!("Error {phase}: {e}");
        if let Err(e) = writeln!(out, "There was an error {phase}: {e}") {
            warn!("could not write to console: {e}");
        }
        self.failed_phases.push(phase);
    }
}

/// Runs the configuration pipeline against a [`CameraBus`].
#[derive(Debug, Default, Clone)]
pub struct Driver {
    settle: SettleStrategy,
}

impl Driver {
    pub fn new(settle: SettleStrategy) -> Self {
        Self { settle }
    }

    /// Runs every phase, writing progress to `out`.
    pub async fn run<B: CameraBus>(&self, bus: &mut B, out: &mut impl Write) -> RunSummary {
        let mut summary = RunSummary::default();

        let r = bus.rescan().await.context("Failed to scan for cameras");
        summary.check(Phase::Scan, r, out);

        let r = print_all_camera_info(bus, out).await;
        summary.listed(Phase::ListBefore, r, out);

        let r = self.force_ip(bus, out).await;
        summary.check(Phase::ForceIp, r, out);

        let r = self.settle(bus).await;
        summary.check(Phase::Settle, r, out);

        let r = store_all(bus, out).await;
        if let Some(assignments) = summary.check(Phase::Store, r, out) {
            summary.assignments = assignments;
        }

        let r = print_all_camera_info(bus, out).await;
        summary.listed(Phase::ListAfter, r, out);

        if summary.is_success() {
            info!("Configured {} camera(s)", summary.assignments.len());
        } else {
            warn!(
                "Configured {} camera(s), with errors in {:?} and {} camera(s) not listed",
                summary.assignments.len(),
                summary.failed_phases,
                summary.camera_errors
            );
        }
        summary
    }

    async fn force_ip<B: CameraBus>(&self, bus: &mut B, out: &mut impl Write) -> Result {
        writeln!(out, "Forcing IPs...")?;
        bus.force_all_ip_addresses_automatically()
            .await
            .context("Failed to force IPs")
    }

    async fn settle<B: CameraBus>(&self, bus: &mut B) -> Result {
        match self.settle {
            SettleStrategy::Fixed(delay) => {
                info!("Waiting {delay:?} for cameras to renegotiate");
                sleep(delay).await;
                bus.rescan().await.context("Failed to rescan the bus")
            }

            SettleStrategy::UntilStable { interval, timeout } => {
                info!("Waiting up to {timeout:?} for cameras to renegotiate");
                let deadline = Instant::now() + timeout;
                let mut last = None;
                loop {
                    sleep(interval).await;
                    bus.rescan().await.context("Failed to rescan the bus")?;
                    let count = bus
                        .enumerate()
                        .await
                        .context("Failed to get number of cameras")?
                        .len();

                    if last == Some(count) {
                        debug!("Camera count settled at {count}");
                        return Ok(());
                    }

                    if Instant::now() >= deadline {
                        warn!("Camera count still changing after {timeout:?}, continuing with {count}");
                        return Ok(());
                    }

                    debug!("Found {count} camera(s), waiting for another scan");
                    last = Some(count);
                }
            }
        }
    }
}
