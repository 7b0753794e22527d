//! Scheduler - the single owner of all matchmaking state
//!
//! # Architecture
//!
//! ```text
//!  join/leave ──▶ command queue ──┐
//!                                 │
//!  intake log ──▶ delivery queue ─┼──▶ Scheduler task ──▶ OutcomeDispatcher ──▶ waiting callers
//!       ▲                         │     (registry, batch,
//!       │                         │      cancelled set)
//!  batch tick ────────────────────┘          │
//!       └──────── publish (join, requeue) ◀──┘
//! ```
//!
//! # Thread Safety
//!
//! Everything mutable lives inside one tokio task. Each event (a command, a
//! delivery, a tick) is handled to completion before the next one is
//! picked up, so registry, batch and cancelled set always have exactly one
//! writer per turn and need no locks.
//!
//! The only suspension visible to callers is the wait in
//! [`SchedulerHandle::join`], which races the outcome slot against the
//! caller's own `max_wait` timer.

use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::accumulator::BatchAccumulator;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::core_types::{RequestId, TopicId, UserId};
use crate::dispatcher::{OutcomeDispatcher, await_outcome};
use crate::error::{IntakeError, SchedulerError};
use crate::intake::{Delivery, DeliveryReceiver, IntakeKind, IntakeLog, ReplayFrom};
use crate::matcher::{BatchMatcher, PassReport};
use crate::models::{MatchRequest, Outcome};
use crate::registry::{Admission, MembershipRegistry};
use crate::stats::{SchedulerStats, SchedulerStatsSnapshot};

// ============================================================
// COMMANDS
// ============================================================

/// Reply to an admission attempt
#[derive(Debug)]
pub enum JoinReply {
    Admitted(oneshot::Receiver<Outcome>),
    Duplicate,
}

#[derive(Debug)]
enum Command {
    Join {
        user_id: UserId,
        display_name: String,
        interests: Vec<TopicId>,
        reply: oneshot::Sender<Result<JoinReply, SchedulerError>>,
    },
    Leave {
        user_id: UserId,
    },
    Shutdown,
}

enum Event {
    Command(Option<Command>),
    Delivery(Delivery),
    Tick,
}

// ============================================================
// HANDLE
// ============================================================

/// Cloneable front door used by the connection layer
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    stats: Arc<SchedulerStats>,
    max_wait: Duration,
}

impl SchedulerHandle {
    /// Ask to be paired and wait for the terminal outcome
    ///
    /// Returns `Ok` for every matchmaking outcome, including
    /// `DuplicateSession` and `TimedOut`. `Err` means the scheduler or its
    /// intake log is unavailable.
    pub async fn join(
        &self,
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        interests: Vec<TopicId>,
    ) -> Result<Outcome, SchedulerError> {
        let user_id = user_id.into();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Join {
                user_id: user_id.clone(),
                display_name: display_name.into(),
                interests,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SchedulerError::Shutdown)?;

        match reply_rx.await.map_err(|_| SchedulerError::Shutdown)?? {
            JoinReply::Admitted(rx) => await_outcome(rx, self.max_wait).await,
            JoinReply::Duplicate => Ok(Outcome::duplicate(&user_id)),
        }
    }

    /// Withdraw a pending request. Fire-and-forget and idempotent.
    pub async fn leave(&self, user_id: impl Into<UserId>) -> Result<(), SchedulerError> {
        self.tx
            .send(Command::Leave {
                user_id: user_id.into(),
            })
            .await
            .map_err(|_| SchedulerError::Shutdown)
    }

    /// Stop the scheduler task; callers still waiting get `Err(Shutdown)`
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

// ============================================================
// SCHEDULER
// ============================================================

pub struct Scheduler {
    config: SchedulerConfig,
    registry: MembershipRegistry,
    accumulator: BatchAccumulator,
    cancelled: FxHashSet<UserId>,
    dispatcher: OutcomeDispatcher,
    matcher: BatchMatcher,
    log: Arc<dyn IntakeLog>,
    clock: Clock,
    next_request_id: RequestId,
    /// Offset of the newest delivery taken into the batch
    last_offset: Option<u64>,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, log: Arc<dyn IntakeLog>, clock: Clock) -> Self {
        let matcher = BatchMatcher::new(config.max_wait_ms);
        Self {
            config,
            registry: MembershipRegistry::new(),
            accumulator: BatchAccumulator::new(),
            cancelled: FxHashSet::default(),
            dispatcher: OutcomeDispatcher::new(),
            matcher,
            log,
            clock,
            next_request_id: 1,
            last_offset: None,
            stats: Arc::new(SchedulerStats::new()),
        }
    }

    /// Admit a user, open their outcome slot and publish the request
    pub fn handle_join(
        &mut self,
        user_id: UserId,
        display_name: String,
        interests: Vec<TopicId>,
    ) -> Result<JoinReply, SchedulerError> {
        let submitted_at = self.clock.now_ms();
        let request_id = self.next_request_id;

        if !self.registry.try_admit(
            &user_id,
            Admission {
                submitted_at,
                request_id,
            },
        ) {
            SchedulerStats::incr(&self.stats.duplicates);
            info!(user_id = %user_id, "Duplicate join refused");
            return Ok(JoinReply::Duplicate);
        }
        self.next_request_id += 1;

        // A same-tick leave of an earlier incarnation must not suppress this one;
        // the earlier request is no longer live and is dropped on its own.
        self.cancelled.remove(&user_id);

        let rx = self.dispatcher.register(&user_id);
        let request = MatchRequest::new(request_id, user_id, display_name, interests, submitted_at);

        if let Err(e) = self.log.publish(IntakeKind::Join, &request) {
            self.registry.remove(&request.user_id);
            self.dispatcher.discard(&request.user_id);
            SchedulerStats::incr(&self.stats.publish_failures);
            warn!(user_id = %request.user_id, error = %e, "Join publish failed, admission rolled back");
            return Err(e.into());
        }

        SchedulerStats::incr(&self.stats.joins);
        debug!(
            user_id = %request.user_id,
            request_id,
            interests = request.interests.len(),
            "Join admitted"
        );
        Ok(JoinReply::Admitted(rx))
    }

    /// Cancel a waiting user; returns `false` when there was nothing to cancel
    pub fn handle_leave(&mut self, user_id: &str) -> bool {
        if self.registry.remove(user_id).is_none() {
            debug!(user_id = %user_id, "Leave ignored, user not waiting");
            return false;
        }
        self.cancelled.insert(user_id.to_owned());
        self.dispatcher.fire_cancel(user_id);
        SchedulerStats::incr(&self.stats.cancels);
        info!(user_id = %user_id, "Match request cancelled");
        true
    }

    /// Add a delivered log entry to the current batch
    pub fn accept_delivery(&mut self, delivery: Delivery) {
        // Keep admission numbers ahead of anything replayed from an older log
        self.next_request_id = self
            .next_request_id
            .max(delivery.request.request_id + 1);
        self.last_offset = Some(delivery.offset);
        self.accumulator.accept(delivery.request);
    }

    /// One batch pass: drain, match, dispatch, expire, re-queue, checkpoint
    pub fn run_tick(&mut self) -> PassReport {
        let consumed = self.last_offset;
        let batch = self.accumulator.drain_and_reset();
        let batch_len = batch.len();
        let now = self.clock.now_ms();
        let report = self
            .matcher
            .run_pass(batch, now, &mut self.registry, &mut self.cancelled);
        if batch_len == 0 {
            return report;
        }

        for pair in &report.matches {
            for outcome in pair.outcomes() {
                self.dispatcher.fire_match(outcome);
            }
            info!(
                user_id = %pair.initiator.user_id,
                peer_user_id = %pair.candidate.user_id,
                topic = %pair.topic,
                session = %pair.session_token,
                "Users matched"
            );
        }

        for request in &report.expired {
            self.dispatcher.fire_timeout(&request.user_id);
        }

        for request in &report.requeue {
            if let Err(e) = self.log.publish(IntakeKind::Requeue, request) {
                SchedulerStats::incr(&self.stats.publish_failures);
                warn!(
                    user_id = %request.user_id,
                    error = %e,
                    "Requeue publish failed, keeping request in next batch"
                );
                self.accumulator.accept(request.clone());
            }
        }

        // Every drained entry is now matched, expired, dropped or republished
        // at a higher offset, so the log may release it
        if let Some(offset) = consumed {
            match self.log.checkpoint(offset + 1) {
                Ok(released) => SchedulerStats::add(&self.stats.released, released as u64),
                Err(e) => warn!(offset, error = %e, "Intake checkpoint failed"),
            }
        }

        SchedulerStats::incr(&self.stats.passes);
        SchedulerStats::add(&self.stats.matches, report.matches.len() as u64);
        SchedulerStats::add(&self.stats.expired, report.expired.len() as u64);
        SchedulerStats::add(&self.stats.requeued, report.requeue.len() as u64);
        SchedulerStats::add(&self.stats.dropped, report.dropped as u64);

        debug!(
            batch = batch_len,
            matched = report.matches.len(),
            expired = report.expired.len(),
            requeued = report.requeue.len(),
            dropped = report.dropped,
            waiting = self.registry.len(),
            "Batch pass complete"
        );
        report
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Join {
                user_id,
                display_name,
                interests,
                reply,
            } => {
                let result = self.handle_join(user_id.clone(), display_name, interests);
                let admitted = matches!(result, Ok(JoinReply::Admitted(_)));
                if reply.send(result).is_err() && admitted {
                    // Caller vanished before learning it was admitted
                    self.registry.remove(&user_id);
                    self.dispatcher.discard(&user_id);
                    debug!(user_id = %user_id, "Join caller gone, admission withdrawn");
                }
            }
            Command::Leave { user_id } => {
                self.handle_leave(&user_id);
            }
            Command::Shutdown => {}
        }
    }

    /// Drive the scheduler until shutdown or until every handle is dropped
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut deliveries: DeliveryReceiver) {
        let period = self.config.batch_tick();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_wait_ms = self.config.max_wait_ms,
            batch_tick_ms = self.config.batch_tick_ms,
            "Scheduler started"
        );

        loop {
            let event = tokio::select! {
                cmd = commands.recv() => Event::Command(cmd),
                Some(delivery) = deliveries.recv() => Event::Delivery(delivery),
                _ = ticker.tick() => Event::Tick,
            };

            match event {
                Event::Command(None) | Event::Command(Some(Command::Shutdown)) => break,
                Event::Command(Some(cmd)) => self.handle_command(cmd),
                Event::Delivery(delivery) => self.accept_delivery(delivery),
                Event::Tick => {
                    // Everything already delivered belongs to this tick
                    while let Ok(delivery) = deliveries.try_recv() {
                        self.accept_delivery(delivery);
                    }
                    self.run_tick();
                }
            }
        }

        let abandoned = self.dispatcher.close_all();
        info!(abandoned, stats = %self.stats.snapshot(), "Scheduler stopped");
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }

    pub fn registry(&self) -> &MembershipRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &OutcomeDispatcher {
        &self.dispatcher
    }

    pub fn pending_batch_len(&self) -> usize {
        self.accumulator.len()
    }
}

/// Subscribe to `log`, start the scheduler task and return its handle
///
/// With `ReplayFrom::Start` the log's history is loaded into the first
/// batch before any command is accepted. Replayed requests from an earlier
/// process are not live and are dropped by the first pass; they only move
/// the admission counter past their ids.
pub fn spawn(
    config: SchedulerConfig,
    log: Arc<dyn IntakeLog>,
    replay: ReplayFrom,
) -> Result<(SchedulerHandle, JoinHandle<()>), IntakeError> {
    let mut deliveries = log.subscribe(replay)?;
    let (tx, rx) = mpsc::channel(config.command_queue_size.max(1));

    let mut scheduler = Scheduler::new(config.clone(), log, Clock::new());
    let mut replayed = 0usize;
    while let Ok(delivery) = deliveries.try_recv() {
        scheduler.accept_delivery(delivery);
        replayed += 1;
    }
    if replayed > 0 {
        info!(replayed, "Intake history loaded");
    }

    let handle = SchedulerHandle {
        tx,
        stats: scheduler.stats(),
        max_wait: config.max_wait(),
    };
    let task = tokio::spawn(scheduler.run(rx, deliveries));
    Ok((handle, task))
}
