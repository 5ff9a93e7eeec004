//! Cycle reset engine.
//!
//! A pass walks every active agent and team. Entities without cycle state get
//! the period containing "now"; entities whose `next_reset` has passed get
//! each elapsed period closed into a history record, one record per period,
//! until they sit on the period containing "now". A failing entity never
//! stops the pass.
//!
//! [`CycleResetService`] runs passes on a timer, the first one immediately.

use crate::{
    core::{
        aggregate::aggregate,
        cycle::{Period, compute_current_period, next_period},
        entity::{CycleBearer, EntityRef},
        store::{CycleStore, PeriodClose},
    },
    errors::{Error, Result},
    realtime::{
        Broadcaster,
        events::{BoardEvent, CycleReset, CyclesInitialized},
    },
};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An entity the pass could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFailure {
    /// The entity that failed
    pub entity: EntityRef,
    /// Error text
    pub message: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// The instant the pass evaluated against
    pub ran_at: DateTime<Utc>,
    /// Entities examined
    pub visited: usize,
    /// Entities that received their first period
    pub initialized: usize,
    /// History records written
    pub periods_closed: usize,
    /// Entities skipped because of an error
    pub failures: Vec<EntityFailure>,
}

impl PassReport {
    const fn new(ran_at: DateTime<Utc>) -> Self {
        Self {
            ran_at,
            visited: 0,
            initialized: 0,
            periods_closed: 0,
            failures: Vec::new(),
        }
    }

    /// True when every entity was processed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::PassIncomplete {
                failed: self.failures.len(),
                total: self.visited,
            })
        }
    }
}

/// One-line description of a pass for logs and operator responses.
#[must_use]
pub fn format_pass_summary(report: &PassReport) -> String {
    let mut summary = format!(
        "Cycle pass at {}: {} checked, {} initialized, {} period(s) closed",
        report.ran_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.visited,
        report.initialized,
        report.periods_closed
    );

    if !report.failures.is_empty() {
        let _ = write!(summary, ", {} failed:", report.failures.len());
        for failure in &report.failures {
            let _ = write!(summary, " [{}: {}]", failure.entity, failure.message);
        }
    }

    summary
}

/// Clears the in-progress flag when a pass ends, including by panic.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Closes elapsed periods and initializes new entities.
pub struct CycleResetEngine {
    store: Arc<dyn CycleStore>,
    broadcaster: Arc<Broadcaster>,
    in_progress: AtomicBool,
}

impl std::fmt::Debug for CycleResetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleResetEngine")
            .field("in_progress", &self.in_progress.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl CycleResetEngine {
    /// Creates an engine over `store` that announces resets on `broadcaster`.
    #[must_use]
    pub fn new(store: Arc<dyn CycleStore>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            in_progress: AtomicBool::new(false),
        }
    }

    fn begin(&self) -> Result<PassGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::PassInProgress)?;
        Ok(PassGuard(&self.in_progress))
    }

    /// Runs a full pass: initialization for new entities, then catch-up for
    /// every entity whose period has elapsed.
    ///
    /// Per-entity failures are logged and listed in the report; only a
    /// failure to load the entity list or an overlapping pass returns `Err`.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let _guard = self.begin()?;
        let entities = self.store.cycle_entities().await?;

        let mut report = PassReport::new(now);
        for entity in &entities {
            report.visited += 1;
            if let Err(e) = self.process_entity(entity.as_ref(), now, &mut report).await {
                let entity_ref = entity.entity_ref();
                error!("Cycle processing failed for {}: {}", entity_ref, e);
                report.failures.push(EntityFailure {
                    entity: entity_ref,
                    message: e.to_string(),
                });
            }
        }

        self.announce_initialized(report.initialized);
        if let Err(e) = self.store.record_pass(now).await {
            warn!("Failed to record pass timestamp: {}", e);
        }

        info!("{}", format_pass_summary(&report));
        Ok(report)
    }

    /// Gives every entity without cycle state the period containing `now`.
    ///
    /// Entities that already have state are left untouched and no history is
    /// written, so repeated calls are harmless.
    #[instrument(skip(self))]
    pub async fn initialize_target_cycles(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let _guard = self.begin()?;
        let entities = self.store.cycle_entities().await?;

        let mut report = PassReport::new(now);
        for entity in entities.iter().filter(|e| e.cycle_state().is_none()) {
            report.visited += 1;
            if let Err(e) = self.initialize_entity(entity.as_ref(), now, &mut report).await {
                let entity_ref = entity.entity_ref();
                error!("Cycle initialization failed for {}: {}", entity_ref, e);
                report.failures.push(EntityFailure {
                    entity: entity_ref,
                    message: e.to_string(),
                });
            }
        }

        self.announce_initialized(report.initialized);
        info!("{}", format_pass_summary(&report));
        Ok(report)
    }

    /// Operator-triggered full pass. Fails if any entity failed.
    pub async fn trigger_reset(&self, now: DateTime<Utc>) -> Result<PassReport> {
        self.run_pass(now).await?.into_result()
    }

    /// Operator-triggered initialization. Fails if any entity failed.
    pub async fn trigger_initialize(&self, now: DateTime<Utc>) -> Result<PassReport> {
        self.initialize_target_cycles(now).await?.into_result()
    }

    async fn process_entity(
        &self,
        entity: &dyn CycleBearer,
        now: DateTime<Utc>,
        report: &mut PassReport,
    ) -> Result<()> {
        if entity.cycle_state().is_none() {
            return self.initialize_entity(entity, now, report).await;
        }

        close_elapsed_periods(self.store.as_ref(), entity, now, &mut |close: &PeriodClose| {
            report.periods_closed += 1;
            self.announce_reset(close);
        })
        .await
    }

    async fn initialize_entity(
        &self,
        entity: &dyn CycleBearer,
        now: DateTime<Utc>,
        report: &mut PassReport,
    ) -> Result<()> {
        let config = entity.cycle_config()?;
        let period = compute_current_period(&config, now);
        if self.store.initialize_cycle(entity.entity_ref(), &period).await? {
            debug!(
                "Initialized {} on {} .. {}",
                entity.entity_ref(),
                period.start,
                period.end
            );
            report.initialized += 1;
        }
        Ok(())
    }

    fn announce_reset(&self, close: &PeriodClose) {
        let event = BoardEvent::CycleReset(CycleReset {
            entity_type: close.entity.kind,
            entity_id: close.entity.id,
            closed: close.closed,
            period_start: close.next.start,
            next_reset: close.next.next_reset(),
            achieved_volume_cents: close.achievement.volume_cents,
            achieved_units: close.achievement.units,
        });
        self.broadcaster.broadcast(&event);
    }

    fn announce_initialized(&self, initialized: usize) {
        if initialized > 0 {
            self.broadcaster
                .broadcast(&BoardEvent::CyclesInitialized(CyclesInitialized { initialized }));
        }
    }
}

/// Closes every period of `entity` that ended at or before `now`, oldest
/// first, leaving the entity on the period containing `now`.
///
/// Each close is written through `store`, one history record per period, with
/// the entity's current targets. `on_close` runs after each successful close,
/// so a failure part way through still reports the periods already closed.
/// Entities without cycle state are left alone.
pub async fn close_elapsed_periods(
    store: &dyn CycleStore,
    entity: &dyn CycleBearer,
    now: DateTime<Utc>,
    on_close: &mut (dyn FnMut(&PeriodClose) + Send),
) -> Result<()> {
    let Some(mut current) = entity.cycle_state() else {
        return Ok(());
    };
    if now < current.end {
        return Ok(());
    }

    let config = entity.cycle_config()?;
    let entity_ref = entity.entity_ref();
    let goals = store.category_goals(entity_ref).await?;

    while now >= current.end {
        let next = next_period(&config, current.end);
        let sales = store.sales_in_window(entity_ref, &current).await?;
        let achievement = aggregate(entity_ref, &current, &sales, &goals);

        let close = PeriodClose {
            entity: entity_ref,
            closed: current,
            next,
            targets: entity.targets(),
            achievement,
            recorded_at: now,
        };
        store.close_period(&close).await?;

        debug!(
            "Closed {} period {} .. {} ({} cents, {} units)",
            entity_ref,
            current.start,
            current.end,
            close.achievement.volume_cents,
            close.achievement.units
        );
        on_close(&close);
        current = next;
    }

    Ok(())
}

/// Runs [`CycleResetEngine::run_pass`] on a fixed interval.
pub struct CycleResetService {
    engine: Arc<CycleResetEngine>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    done: AtomicBool,
    wake: Notify,
}

impl CycleResetService {
    /// Creates a stopped service. A zero interval is raised to one second.
    #[must_use]
    pub fn new(engine: Arc<CycleResetEngine>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };
        Self {
            engine,
            clock,
            interval,
            done: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Spawns the timer loop. The first pass runs immediately.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Cycle reset service started, interval {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = self.wake.notified() => {}
                }

                if self.is_done() {
                    debug!("Cycle reset service shutting down");
                    break;
                }

                self.tick().await;
            }
        })
    }

    async fn tick(&self) {
        let now = self.clock.now();
        match AssertUnwindSafe(self.engine.run_pass(now)).catch_unwind().await {
            Ok(Ok(report)) if !report.is_complete() => {
                warn!(
                    "Cycle pass left {} of {} entities for the next run",
                    report.failures.len(),
                    report.visited
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(Error::PassInProgress)) => debug!("Skipping tick, a pass is already running"),
            Ok(Err(e)) => error!("Cycle pass failed: {}", e),
            Err(_) => error!("Cycle pass panicked; will retry on the next tick"),
        }
    }

    /// Stops the loop after the current pass, if any.
    pub fn shutdown(&self) {
        self.done.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Period an entity would be on at `now`, whether or not it is stored yet.
///
/// # Errors
/// Returns `InvalidCycle` if the entity's stored cycle columns are corrupt.
pub fn effective_period(entity: &dyn CycleBearer, now: DateTime<Utc>) -> Result<Period> {
    match entity.cycle_state() {
        Some(state) if state.contains(now) => Ok(state),
        _ => Ok(compute_current_period(&entity.cycle_config()?, now)),
    }
}
