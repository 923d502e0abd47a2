//! Recurring scheduler owning a single execution timeline.
//!
//! The scheduler holds at most one pending run. Arming it spawns a timeline
//! task that waits for the cadence to elapse, runs the batch to completion,
//! and, for periodic runs, loops back to waiting. `stop_all` cancels the
//! pending wait and hands out a fresh slot; a batch that is already running
//! finishes but is not rescheduled.

use crate::application::cadence::{self, CadenceUnit};
use crate::application::coordinator::{BatchReport, BatchRunner};
use crate::domain::invoice::InvoiceStatus;
use crate::error::{BillingError, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Parameters of one armed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRun {
    pub unit: CadenceUnit,
    pub quantity: u32,
    pub periodic: bool,
    pub target: InvoiceStatus,
}

impl ScheduledRun {
    /// A periodic run over `PENDING` invoices.
    pub fn every(quantity: u32, unit: CadenceUnit) -> Self {
        Self {
            unit,
            quantity,
            periodic: true,
            target: InvoiceStatus::Pending,
        }
    }

    /// A single run, fired as soon as possible.
    pub fn immediate(target: InvoiceStatus) -> Self {
        Self {
            unit: CadenceUnit::Seconds,
            quantity: 0,
            periodic: false,
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Running,
}

/// Receives the result of every batch fired by one armed run.
///
/// `next_report` returns `None` once the run is over, either because a
/// one-shot batch completed or because the scheduler was stopped.
pub struct RunHandle {
    run: ScheduledRun,
    reports: mpsc::UnboundedReceiver<Result<BatchReport>>,
}

impl RunHandle {
    pub fn run(&self) -> ScheduledRun {
        self.run
    }

    pub async fn next_report(&mut self) -> Option<Result<BatchReport>> {
        self.reports.recv().await
    }
}

struct Slot {
    generation: u64,
    state: SchedulerState,
    cancel: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Slot {
    fn fresh(generation: u64) -> Self {
        Self {
            generation,
            state: SchedulerState::Idle,
            cancel: None,
            task: None,
        }
    }
}

pub struct RecurringScheduler {
    runner: Arc<dyn BatchRunner>,
    slot: Arc<Mutex<Slot>>,
}

impl RecurringScheduler {
    pub fn new(runner: Arc<dyn BatchRunner>) -> Self {
        Self {
            runner,
            slot: Arc::new(Mutex::new(Slot::fresh(0))),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        self.slot.lock().await.state
    }

    /// Arms the slot with `run`.
    ///
    /// Fails without touching the slot if the cadence unit is unsupported, or
    /// with `BillingError::SlotOccupied` if a run is already armed or running.
    pub async fn schedule_batch(&self, run: ScheduledRun) -> Result<RunHandle> {
        let first_delay = cadence::delay_to_next(run.unit, run.quantity)?;

        let mut slot = self.slot.lock().await;
        if slot.state != SchedulerState::Idle {
            return Err(BillingError::SlotOccupied);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let timeline = Timeline {
            run,
            generation: slot.generation,
            runner: self.runner.clone(),
            slot: self.slot.clone(),
            cancel: cancel_rx,
            reports: report_tx,
        };

        info!(
            unit = %run.unit,
            quantity = run.quantity,
            periodic = run.periodic,
            target = %run.target,
            delay_ms = first_delay.as_millis() as u64,
            "payment batch armed"
        );

        slot.state = SchedulerState::Armed;
        slot.cancel = Some(cancel_tx);
        slot.task = Some(tokio::spawn(timeline.drive(first_delay)));

        Ok(RunHandle {
            run,
            reports: report_rx,
        })
    }

    /// Cancels the pending run and resets to a fresh idle slot.
    ///
    /// A batch that is already running completes, but is not rescheduled.
    pub async fn stop_all(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(cancel) = slot.cancel.take() {
            let _ = cancel.send(true);
        }
        if slot.state != SchedulerState::Idle {
            info!(state = ?slot.state, "scheduler stopped");
        }
        // The old timeline keeps its task until it notices the cancellation.
        drop(slot.task.take());
        let generation = slot.generation + 1;
        *slot = Slot::fresh(generation);
    }
}

struct Timeline {
    run: ScheduledRun,
    generation: u64,
    runner: Arc<dyn BatchRunner>,
    slot: Arc<Mutex<Slot>>,
    cancel: watch::Receiver<bool>,
    reports: mpsc::UnboundedSender<Result<BatchReport>>,
}

impl Timeline {
    async fn drive(mut self, first_delay: std::time::Duration) {
        let mut delay = first_delay;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.wait_for(|cancelled| *cancelled) => {
                    debug!(target = %self.run.target, "armed run cancelled");
                    break;
                }
            }

            if !self.transition(SchedulerState::Running).await {
                break;
            }

            let result = self.runner.run_batch(self.run.target).await;
            match &result {
                Ok(report) => info!(
                    target = %report.target,
                    outcomes = report.outcomes.len(),
                    failures = report.failures.len(),
                    "scheduled batch completed"
                ),
                Err(err) => error!(target = %self.run.target, error = %err, "scheduled batch failed"),
            }
            let _ = self.reports.send(result);

            if !self.run.periodic || *self.cancel.borrow() {
                break;
            }

            delay = match cadence::delay_to_next(self.run.unit, self.run.quantity) {
                Ok(delay) => delay,
                Err(err) => {
                    warn!(error = %err, "could not compute next firing");
                    break;
                }
            };

            if !self.transition(SchedulerState::Armed).await {
                break;
            }
        }

        self.transition(SchedulerState::Idle).await;
    }

    // Only the timeline owning the current generation may touch the slot.
    async fn transition(&self, state: SchedulerState) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.generation != self.generation {
            return false;
        }
        slot.state = state;
        if state == SchedulerState::Idle {
            slot.cancel = None;
            slot.task = None;
        }
        true
    }
}
