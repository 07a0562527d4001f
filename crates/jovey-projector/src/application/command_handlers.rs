//! Command handlers for the Database Manager context.
//!
//! Each event is applied in its own unit of work: claim, dispatch, run the
//! handler against the current-state tables, mark processed, commit. A
//! handler failure rolls the unit back and records the error on the event;
//! a storage failure stops the batch.

use std::str::FromStr;
use std::time::{Duration, Instant};

use jovey_core::clock::Clock;
use jovey_core::error::DomainError;
use jovey_core::event::Event;
use jovey_core::projection::{Claim, ProjectionStore, ProjectionUnit};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::commands::{ProcessBatch, ProcessSpecific};
use crate::domain::dispatch::EventKind;
use crate::domain::handlers;
use crate::error::ProjectionError;

/// Default number of attempts before an event is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Default per-handler time limit.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Tunables of the Database Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectorSettings {
    /// Attempts after which an event is only retried on request.
    pub max_attempts: i32,
    /// Time a single handler may take.
    pub handler_timeout: Duration,
}

impl Default for ProjectorSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Applied and marked processed.
    Processed,
    /// Not applied; the error was recorded on the event.
    Failed,
    /// Not attempted (processed already, locked elsewhere or dead-lettered).
    Skipped,
}

/// Per-event entry of a processing report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventProcessingResult {
    /// Event id.
    pub event_id: Uuid,
    /// Event type, when the event was found.
    pub event_type: Option<String>,
    /// Sequence number, when the event was found.
    pub sequence_number: Option<i64>,
    /// Outcome.
    pub outcome: Outcome,
    /// Failure or skip reason.
    pub error: Option<String>,
    /// Operations the handler performed.
    pub operations: Vec<String>,
    /// Wall time spent on the event.
    pub processing_time_ms: u64,
}

/// Summary of one `process_batch` or `process_specific` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    /// Events looked at.
    pub total: usize,
    /// Events applied.
    pub successful: usize,
    /// Events that failed.
    pub failed: usize,
    /// Events skipped.
    pub skipped: usize,
    /// Wall time of the whole call.
    pub processing_time_ms: u64,
    /// `true` if a storage failure stopped the call early.
    pub aborted: bool,
    /// One entry per event looked at, in processing order.
    pub results: Vec<EventProcessingResult>,
}

impl ProcessingReport {
    fn from_results(results: Vec<EventProcessingResult>, aborted: bool, started: Instant) -> Self {
        let count = |outcome| results.iter().filter(|r| r.outcome == outcome).count();
        Self {
            total: results.len(),
            successful: count(Outcome::Processed),
            failed: count(Outcome::Failed),
            skipped: count(Outcome::Skipped),
            processing_time_ms: elapsed_ms(started),
            aborted,
            results,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Result of attempting one event.
enum Step {
    /// Continue with the next event.
    Done(EventProcessingResult),
    /// Stop the batch after this event.
    Abort(EventProcessingResult),
}

struct Attempt {
    event_id: Uuid,
    started: Instant,
}

impl Attempt {
    fn new(event_id: Uuid) -> Self {
        Self {
            event_id,
            started: Instant::now(),
        }
    }

    fn result(
        &self,
        event: Option<&Event>,
        outcome: Outcome,
        error: Option<String>,
        operations: Vec<String>,
    ) -> EventProcessingResult {
        EventProcessingResult {
            event_id: self.event_id,
            event_type: event.map(|e| e.event_type.clone()),
            sequence_number: event.map(|e| e.sequence_number),
            outcome,
            error,
            operations,
            processing_time_ms: elapsed_ms(self.started),
        }
    }

    fn skipped(&self, event: Option<&Event>, reason: &str) -> Step {
        Step::Done(self.result(event, Outcome::Skipped, Some(reason.to_owned()), Vec::new()))
    }

    fn aborted(&self, event: Option<&Event>, err: &dyn std::fmt::Display) -> Step {
        warn!(event_id = %self.event_id, error = %err, "storage failure, stopping batch");
        Step::Abort(self.result(event, Outcome::Failed, Some(err.to_string()), Vec::new()))
    }
}

async fn run_handler(
    event: &Event,
    unit: &mut dyn ProjectionUnit,
    timeout: Duration,
) -> Result<Vec<String>, ProjectionError> {
    let kind = EventKind::from_str(&event.event_type)?;
    match tokio::time::timeout(timeout, handlers::apply(kind, event, unit.state())).await {
        Ok(result) => result,
        Err(_) => Err(ProjectionError::Timeout(timeout.as_millis())),
    }
}

/// Applies one event in its own unit of work.
async fn process_one(
    event_id: Uuid,
    force_retry: bool,
    settings: &ProjectorSettings,
    clock: &dyn Clock,
    store: &dyn ProjectionStore,
) -> Step {
    let attempt = Attempt::new(event_id);

    let mut unit = match store.begin().await {
        Ok(unit) => unit,
        Err(err) => return attempt.aborted(None, &err),
    };
    let claim = match unit.claim(event_id).await {
        Ok(claim) => claim,
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                warn!(event_id = %event_id, error = %rollback_err, "rollback after failed claim failed");
            }
            return attempt.aborted(None, &err);
        }
    };
    let claimed = match claim {
        Claim::Claimed(event) => Ok(*event),
        Claim::NotFound => Err(Step::Done(attempt.result(
            None,
            Outcome::Failed,
            Some("event not found".to_owned()),
            Vec::new(),
        ))),
        Claim::AlreadyProcessed => Err(attempt.skipped(None, "already processed")),
        Claim::Locked => Err(attempt.skipped(None, "claimed by another projector")),
    };
    let event = match claimed {
        Ok(event) => event,
        Err(step) => {
            if let Err(err) = unit.rollback().await {
                return attempt.aborted(None, &err);
            }
            return step;
        }
    };

    if !force_retry && event.processing_attempts >= settings.max_attempts {
        if let Err(err) = unit.rollback().await {
            return attempt.aborted(Some(&event), &err);
        }
        return attempt.skipped(
            Some(&event),
            &format!(
                "dead-lettered after {} attempts",
                event.processing_attempts
            ),
        );
    }

    match run_handler(&event, unit.as_mut(), settings.handler_timeout).await {
        Ok(operations) => {
            let committed = async {
                unit.mark_processed(event.id, clock.now()).await?;
                unit.commit().await
            }
            .await;
            if let Err(err) = committed {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(event_id = %event.id, error = %rollback_err, "rollback after failed commit failed");
                }
                return attempt.aborted(Some(&event), &err);
            }
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                sequence_number = event.sequence_number,
                operations = operations.len(),
                "event processed"
            );
            Step::Done(attempt.result(Some(&event), Outcome::Processed, None, operations))
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                return attempt.aborted(Some(&event), &rollback_err);
            }
            if err.aborts_batch() {
                return attempt.aborted(Some(&event), &err);
            }
            let message = err.to_string();
            warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                sequence_number = event.sequence_number,
                attempt = event.processing_attempts + 1,
                error = %message,
                "event processing failed"
            );
            if let Err(storage_err) = store.record_failure(event.id, &message).await {
                return attempt.aborted(Some(&event), &storage_err);
            }
            Step::Done(attempt.result(Some(&event), Outcome::Failed, Some(message), Vec::new()))
        }
    }
}

async fn process_ids(
    event_ids: impl IntoIterator<Item = Uuid>,
    force_retry: bool,
    settings: &ProjectorSettings,
    clock: &dyn Clock,
    store: &dyn ProjectionStore,
    started: Instant,
) -> ProcessingReport {
    let mut results = Vec::new();
    for event_id in event_ids {
        match process_one(event_id, force_retry, settings, clock, store).await {
            Step::Done(result) => results.push(result),
            Step::Abort(result) => {
                results.push(result);
                return ProcessingReport::from_results(results, true, started);
            }
        }
    }
    ProcessingReport::from_results(results, false, started)
}

/// Handles the `ProcessBatch` command: applies up to `limit` of the oldest
/// unprocessed events that are below the attempt cap, in sequence order.
///
/// Per-event failures are recorded on the event and reported; they do not
/// fail the call. A storage failure mid-batch returns the partial report
/// with `aborted` set.
///
/// # Errors
///
/// Returns `DomainError::Validation` for an out-of-range limit and
/// `DomainError::Infrastructure` if the pending events cannot be read.
#[instrument(skip_all, fields(limit = command.limit))]
pub async fn handle_process_batch(
    command: ProcessBatch,
    settings: &ProjectorSettings,
    clock: &dyn Clock,
    store: &dyn ProjectionStore,
) -> Result<ProcessingReport, DomainError> {
    command.validate()?;
    let started = Instant::now();
    let pending = store
        .pending_events(command.limit, settings.max_attempts)
        .await?;

    let report = process_ids(
        pending.into_iter().map(|e| e.id),
        false,
        settings,
        clock,
        store,
        started,
    )
    .await;
    info!(
        total = report.total,
        successful = report.successful,
        failed = report.failed,
        skipped = report.skipped,
        aborted = report.aborted,
        "batch finished"
    );
    Ok(report)
}

/// Handles the `ProcessSpecific` command: applies exactly the listed events,
/// in the given order.
///
/// Processed events are skipped. Dead-lettered events are skipped unless
/// `force_retry` is set.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the id list is empty or too long.
#[instrument(skip_all, fields(count = command.event_ids.len(), force_retry = command.force_retry))]
pub async fn handle_process_specific(
    command: ProcessSpecific,
    settings: &ProjectorSettings,
    clock: &dyn Clock,
    store: &dyn ProjectionStore,
) -> Result<ProcessingReport, DomainError> {
    command.validate()?;
    let started = Instant::now();
    let report = process_ids(
        command.event_ids,
        command.force_retry,
        settings,
        clock,
        store,
        started,
    )
    .await;
    info!(
        total = report.total,
        successful = report.successful,
        failed = report.failed,
        skipped = report.skipped,
        aborted = report.aborted,
        "specific processing finished"
    );
    Ok(report)
}
