use super::{
    actions::{
        PublishTransitionEventAction, ReleaseLockAction, RemoveFromRingAction, ResetLedgerAction,
        StateAction, TransitionContext,
    },
    errors::{StateMachineError, StateMachineResult},
    events::DecommissionEvent,
    guards::{AllTransfersCompleteGuard, AttemptHandle, AttemptOutcome, ConcurrencyGuard, StateGuard},
    persistence::TransitionPersistence,
    states::DecommissionState,
};
use crate::error::{DecommissionError, Result};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::ledger::TransferLedger;
use crate::logging::{log_error, log_transfer_operation};
use crate::membership::ClusterMembership;
use crate::models::{AttemptId, NodeId, StreamPlan, StreamTask, TransferRecord, TransferStatus};
use crate::orchestration::range_planner::RangeOwnershipPlanner;
use crate::streaming::{StreamTransferEngine, TransferSummary};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Collaborators shared by every decommission attempt of a process
pub struct DecommissionContext {
    pub membership: Arc<dyn ClusterMembership>,
    pub guard: Arc<ConcurrencyGuard>,
    pub planner: RangeOwnershipPlanner,
    pub engine: Arc<StreamTransferEngine>,
    pub ledger: Arc<dyn TransferLedger>,
    pub persistence: Arc<dyn TransitionPersistence>,
    pub publisher: EventPublisher,
}

/// Summary of a successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecommissionReport {
    pub node_id: NodeId,
    pub attempt_id: AttemptId,
    /// Tasks in this attempt's plan
    pub planned: usize,
    /// Tasks completed by an earlier attempt
    pub skipped: usize,
    /// Tasks streamed by this attempt
    pub transferred: usize,
    pub rows: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Drives one node through `NotStarted|Failed -> Decommissioning -> Decommissioned|Failed`
pub struct DecommissionStateMachine {
    node_id: NodeId,
    context: Arc<DecommissionContext>,
    attempt: Option<AttemptHandle>,
    plan: Option<StreamPlan>,
}

impl DecommissionStateMachine {
    /// Create a new decommission state machine instance
    pub fn new(node_id: NodeId, context: Arc<DecommissionContext>) -> Self {
        Self {
            node_id,
            context,
            attempt: None,
            plan: None,
        }
    }

    /// Get the current state of the node's decommission
    pub async fn current_state(&self) -> StateMachineResult<DecommissionState> {
        Ok(self
            .context
            .persistence
            .resolve_current_state(&self.node_id)
            .await?
            .unwrap_or_default())
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Run one attempt to completion.
    ///
    /// `handle` proves the caller holds the node's leaving marker. The marker
    /// is released before this returns: as `Left` on success, back to `Joined`
    /// on failure.
    pub async fn run(&mut self, handle: AttemptHandle) -> Result<DecommissionReport> {
        let attempt_id = handle.attempt_id();
        self.attempt = Some(handle);
        self.plan = None;

        let outcome = self.drive(attempt_id).await;
        if let Err(error) = &outcome {
            self.abandon(attempt_id, error).await;
        }

        self.attempt = None;
        outcome
    }

    async fn drive(&mut self, attempt_id: AttemptId) -> Result<DecommissionReport> {
        let started = Instant::now();
        self.transition(DecommissionEvent::Start).await?;

        let plan = self.context.planner.plan(&self.node_id).await?;
        let mut report = self.stream_plan(attempt_id, &plan).await?;
        self.plan = Some(plan);

        self.transition(DecommissionEvent::Complete).await?;

        report.elapsed = started.elapsed();
        info!(
            node_id = %self.node_id,
            attempt_id = %attempt_id,
            planned = report.planned,
            skipped = report.skipped,
            transferred = report.transferred,
            bytes = report.bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Decommission attempt finished"
        );
        Ok(report)
    }

    /// Settle a failed attempt so the node is free for the next one
    async fn abandon(&mut self, attempt_id: AttemptId, error: &DecommissionError) {
        let state = match self.current_state().await {
            Ok(state) => state,
            Err(e) => {
                log_error("state_machine", "resolve_state", &e.to_string(), Some(self.node_id.as_str()));
                return;
            }
        };

        match state {
            DecommissionState::Decommissioning => {
                if let Err(e) = self
                    .transition(DecommissionEvent::fail_with_error(error.to_string()))
                    .await
                {
                    log_error("state_machine", "fail_transition", &e.to_string(), Some(self.node_id.as_str()));
                }
            }
            // The node left the ring; only follow-up bookkeeping failed
            DecommissionState::Decommissioned => {}
            // Rejected before streaming began; hand the marker straight back
            DecommissionState::NotStarted | DecommissionState::Failed => {
                if let Err(e) = self
                    .context
                    .guard
                    .release(&self.node_id, attempt_id, AttemptOutcome::Failed)
                    .await
                {
                    log_error("state_machine", "release_lock", &e.to_string(), Some(self.node_id.as_str()));
                }
            }
        }
    }

    /// Attempt to transition the decommission state
    pub async fn transition(&mut self, event: DecommissionEvent) -> StateMachineResult<DecommissionState> {
        let attempt_id = self
            .attempt
            .as_ref()
            .map(AttemptHandle::attempt_id)
            .ok_or(StateMachineError::NoActiveAttempt)?;

        let current_state = self.current_state().await?;
        let target_state = Self::determine_target_state(current_state, &event)?;

        // Check guards
        self.check_guards(current_state, target_state, &event).await?;

        // Persist the transition
        self.context
            .persistence
            .persist_transition(
                &self.node_id,
                attempt_id,
                current_state,
                target_state,
                event.event_type(),
            )
            .await?;

        // Execute actions
        let transition = TransitionContext {
            node_id: &self.node_id,
            attempt_id,
            from_state: current_state,
            to_state: target_state,
            event: &event,
        };
        self.execute_actions(&transition).await?;

        Ok(target_state)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: DecommissionState,
        event: &DecommissionEvent,
    ) -> StateMachineResult<DecommissionState> {
        let target = match (current_state, event) {
            (DecommissionState::NotStarted, DecommissionEvent::Start) => {
                DecommissionState::Decommissioning
            }
            (DecommissionState::Failed, DecommissionEvent::Start) => {
                DecommissionState::Decommissioning
            }
            (DecommissionState::Decommissioning, DecommissionEvent::Complete) => {
                DecommissionState::Decommissioned
            }
            (DecommissionState::Decommissioning, DecommissionEvent::Fail(_)) => {
                DecommissionState::Failed
            }
            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Check guard conditions for the transition
    async fn check_guards(
        &self,
        current_state: DecommissionState,
        target_state: DecommissionState,
        event: &DecommissionEvent,
    ) -> StateMachineResult<()> {
        if let (
            DecommissionState::Decommissioning,
            DecommissionState::Decommissioned,
            DecommissionEvent::Complete,
        ) = (current_state, target_state, event)
        {
            let plan = self.plan.as_ref().ok_or_else(|| StateMachineError::GuardFailed {
                reason: "no stream plan was executed".to_string(),
            })?;
            let guard =
                AllTransfersCompleteGuard::new(self.node_id.clone(), self.context.ledger.clone());
            guard.check(plan).await?;
        }

        Ok(())
    }

    /// Execute actions after successful transition.
    ///
    /// The lock is released before the ring is touched, and the lifecycle
    /// event goes out last so subscribers observe the settled membership.
    /// Best-effort actions that fail do not stop the ones after them.
    async fn execute_actions(&self, transition: &TransitionContext<'_>) -> StateMachineResult<()> {
        let actions: Vec<Box<dyn StateAction>> = vec![
            Box::new(ReleaseLockAction::new(self.context.guard.clone())),
            Box::new(RemoveFromRingAction::new(self.context.membership.clone())),
            Box::new(ResetLedgerAction::new(self.context.ledger.clone())),
            Box::new(PublishTransitionEventAction::new(
                self.context.publisher.clone(),
            )),
        ];

        for action in actions {
            if let Err(e) = action.execute(transition).await {
                warn!(
                    node_id = %transition.node_id,
                    action = action.description(),
                    best_effort = action.is_best_effort(),
                    error = %e,
                    "Transition action failed"
                );
                if !action.is_best_effort() {
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Stream every task of `plan` not already completed by an earlier attempt.
    ///
    /// Up to `max_concurrent_transfers` tasks run at once. After the first
    /// failure nothing new is dispatched; transfers already running finish and
    /// are recorded, and the first error is returned.
    async fn stream_plan(&self, attempt_id: AttemptId, plan: &StreamPlan) -> Result<DecommissionReport> {
        let completed = self.context.ledger.completed_ranges(&self.node_id).await?;
        let (skipped, pending): (Vec<StreamTask>, Vec<StreamTask>) =
            plan.iter().cloned().partition(|task| completed.contains(task));

        for task in &skipped {
            self.context.publisher.publish(LifecycleEvent::RangeTransferSkipped {
                node_id: self.node_id.clone(),
                keyspace: task.keyspace.clone(),
                range: task.range,
                target: task.target.clone(),
            });
        }

        for task in &pending {
            self.context
                .ledger
                .record(TransferRecord::new(
                    attempt_id,
                    self.node_id.clone(),
                    task.clone(),
                    TransferStatus::Pending,
                ))
                .await?;
        }

        info!(
            node_id = %self.node_id,
            attempt_id = %attempt_id,
            planned = plan.len(),
            skipped = skipped.len(),
            pending = pending.len(),
            "Streaming ranges"
        );

        let halted = AtomicBool::new(false);
        let concurrency = self.context.engine.max_concurrent_transfers();

        let outcomes: Vec<Option<Result<TransferSummary>>> = stream::iter(pending)
            .map(|task| {
                let halted = &halted;
                async move {
                    if halted.load(Ordering::SeqCst) {
                        return None;
                    }
                    let outcome = self.transfer_task(attempt_id, &task).await;
                    if outcome.is_err() {
                        halted.store(true, Ordering::SeqCst);
                    }
                    Some(outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = DecommissionReport {
            node_id: self.node_id.clone(),
            attempt_id,
            planned: plan.len(),
            skipped: skipped.len(),
            transferred: 0,
            rows: 0,
            bytes: 0,
            elapsed: Duration::ZERO,
        };
        let mut first_error = None;
        let mut failures = 0usize;
        let mut not_dispatched = 0usize;

        for outcome in outcomes {
            match outcome {
                Some(Ok(summary)) => {
                    report.transferred += 1;
                    report.rows += summary.rows;
                    report.bytes += summary.bytes;
                }
                Some(Err(e)) => {
                    failures += 1;
                    first_error.get_or_insert(e);
                }
                None => not_dispatched += 1,
            }
        }

        match first_error {
            Some(error) => {
                warn!(
                    node_id = %self.node_id,
                    attempt_id = %attempt_id,
                    transferred = report.transferred,
                    failures,
                    not_dispatched,
                    error = %error,
                    "Streaming halted"
                );
                Err(error)
            }
            None => Ok(report),
        }
    }

    /// Stream one task and record each step of its progress.
    ///
    /// A ledger write that fails is fatal to the task even if the data arrived.
    async fn transfer_task(&self, attempt_id: AttemptId, task: &StreamTask) -> Result<TransferSummary> {
        let ledger = &self.context.ledger;

        ledger
            .record(TransferRecord::new(
                attempt_id,
                self.node_id.clone(),
                task.clone(),
                TransferStatus::InProgress,
            ))
            .await?;

        match self.context.engine.transfer(task).await {
            Ok(summary) => {
                ledger
                    .record(TransferRecord::new(
                        attempt_id,
                        self.node_id.clone(),
                        task.clone(),
                        TransferStatus::Completed,
                    ))
                    .await?;
                Ok(summary)
            }
            Err(e) => {
                log_transfer_operation(
                    "transfer",
                    self.node_id.as_str(),
                    &task.keyspace,
                    &task.range.to_string(),
                    task.target.as_str(),
                    "failed",
                    Some(&e.to_string()),
                );
                if let Err(ledger_err) = ledger
                    .record(TransferRecord::failed(
                        attempt_id,
                        self.node_id.clone(),
                        task.clone(),
                        e.to_string(),
                    ))
                    .await
                {
                    warn!(task = %task, error = %ledger_err, "Could not record failed transfer");
                }
                Err(e.into())
            }
        }
    }
}
