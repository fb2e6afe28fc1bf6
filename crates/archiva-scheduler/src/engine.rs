use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use archiva_core::config::SchedulerConfig;

use crate::breaker::{BreakerPolicy, CircuitBreaker};
use crate::error::{Result, SchedulerError};
use crate::health::{HealthReport, TaskHealth};
use crate::queue::{ScheduleQueue, TaskId};
use crate::registry::{TaskDeps, TaskRegistry};
use crate::running::RunningSet;
use crate::task::{Task, TaskPolicy};

const COMMAND_BUFFER: usize = 32;
const OUTCOME_BUFFER: usize = 256;

/// Requests served by the control loop between dispatch cycles.
enum Command {
    Register(Arc<dyn Task>),
    Health(oneshot::Sender<HealthReport>),
}

/// Completion report from a concurrent invocation, consumed by the loop
/// for breaker bookkeeping.
struct Outcome {
    task_id: TaskId,
    ok: bool,
}

struct TaskEntry {
    task: Arc<dyn Task>,
    interval: chrono::Duration,
    next_run: DateTime<Utc>,
    breaker: CircuitBreaker,
}

/// Shared front-end for talking to a running engine.
///
/// All scheduler state lives inside the engine; the handle only sends
/// commands over the loop's channel, so there is a single writer by
/// construction.
#[derive(Clone)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Add a task while the engine runs. Its `on_register` hook executes on
    /// the control loop before first scheduling.
    pub async fn register(&self, task: Arc<dyn Task>) -> Result<()> {
        self.cmd_tx
            .send(Command::Register(task))
            .await
            .map_err(|_| SchedulerError::Stopped)
    }

    /// Aggregated health snapshot: every task's `health_check` line plus
    /// the current running-set contents.
    pub async fn health_check(&self) -> Result<HealthReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Health(reply_tx))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        reply_rx.await.map_err(|_| SchedulerError::Stopped)
    }
}

/// Core scheduler: drives every registered task at its fixed-rate cadence.
pub struct SchedulerEngine {
    entries: HashMap<TaskId, TaskEntry>,
    queue: ScheduleQueue,
    running: Arc<RunningSet>,
    next_id: u64,
    poll_interval: Duration,
    default_breaker: BreakerPolicy,
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: mpsc::Receiver<Command>,
    outcome_tx: mpsc::Sender<Outcome>,
    outcome_rx: mpsc::Receiver<Outcome>,
}

impl SchedulerEngine {
    pub fn new(config: &SchedulerConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_BUFFER);
        Self {
            entries: HashMap::new(),
            queue: ScheduleQueue::new(),
            running: Arc::new(RunningSet::new()),
            next_id: 0,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            default_breaker: BreakerPolicy {
                failure_threshold: config.breaker_failure_threshold,
                cooldown: Duration::from_secs(config.breaker_cooldown_secs),
            },
            cmd_tx,
            cmd_rx,
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.entries.len()
    }

    /// Register a task: run its `on_register` hook, then schedule its first
    /// occurrence one interval from now.
    pub fn register(&mut self, task: Arc<dyn Task>) -> TaskId {
        if let Err(e) = task.on_register() {
            error!(task = %task.name(), "on_register failed: {e:#}");
        }

        let id = TaskId::new(self.next_id);
        self.next_id += 1;

        let interval = chrono::Duration::from_std(task.interval())
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        let next_run = Utc::now() + interval;
        let policy = task.retry_policy().unwrap_or(self.default_breaker);

        info!(task = %task.name(), %next_run, "task registered");
        self.entries.insert(
            id,
            TaskEntry {
                task,
                interval,
                next_run,
                breaker: CircuitBreaker::new(policy),
            },
        );
        self.queue.insert(id, next_run);
        id
    }

    /// Instantiate every task in `registry` and register the survivors.
    /// Returns how many were scheduled.
    pub fn discover(&mut self, registry: &TaskRegistry, deps: &TaskDeps) -> usize {
        let tasks = registry.instantiate_all(deps);
        let count = tasks.len();
        for task in tasks {
            self.register(task);
        }
        count
    }

    /// Main control loop. Polls the schedule on a fixed cadence until
    /// `shutdown` flips true, then notifies tasks and drains in-flight work.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tasks = self.entries.len(),
            queued = self.queue.len(),
            "scheduler engine started"
        );

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.cycle(Utc::now()).await;
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_command(cmd);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        self.drain().await;
    }

    // --- private helpers ---------------------------------------------------

    /// One dispatch cycle: settle completed invocations, then dispatch
    /// every task due at or before `now` in (next_run, insertion) order.
    async fn cycle(&mut self, now: DateTime<Utc>) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.record_outcome(outcome.task_id, outcome.ok);
        }

        for id in self.queue.take_due(now) {
            self.dispatch(id, now).await;
        }
    }

    async fn dispatch(&mut self, id: TaskId, now: DateTime<Utc>) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let task = Arc::clone(&entry.task);
        let allowed = entry.breaker.allow(now);
        let name = task.name().to_string();

        if !allowed {
            debug!(task = %name, "breaker open; occurrence skipped");
            self.reschedule(id);
            return;
        }

        match task.policy() {
            TaskPolicy::Exclusive => {
                info!(task = %name, "exclusive task due; waiting for running tasks to finish");
                self.running.drained().await;
                info!(task = %name, "executing exclusive task");
                match task.tick().await {
                    Ok(()) => self.record_outcome(id, true),
                    Err(e) => {
                        error!(task = %name, "exclusive task failed: {e:#}");
                        self.record_outcome(id, false);
                    }
                }
            }
            TaskPolicy::Concurrent => {
                if self.running.is_task_running(id) {
                    warn!(task = %name, "previous invocation still running; occurrence skipped");
                } else {
                    info!(task = %name, "running task");
                    let invocation = self.running.begin(id, &name);
                    let running = Arc::clone(&self.running);
                    let outcome_tx = self.outcome_tx.clone();
                    let handle = tokio::spawn(async move {
                        let result = task.tick().await;
                        let ok = result.is_ok();
                        if let Err(e) = result {
                            error!(task = %task.name(), "task failed: {e:#}");
                        }
                        running.finish(invocation);
                        // try_send: a full channel only costs breaker
                        // accuracy, never delays completion.
                        let _ = outcome_tx.try_send(Outcome { task_id: id, ok });
                    });
                    self.running.attach(invocation, handle);
                }
            }
        }

        self.reschedule(id);
    }

    /// Fixed-rate advance: next occurrence is previous scheduled time plus
    /// one interval. A slow tick can leave the new next_run in the past, in
    /// which case the task fires again on the next cycle.
    fn reschedule(&mut self, id: TaskId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.next_run = entry.next_run + entry.interval;
            self.queue.insert(id, entry.next_run);
        }
    }

    fn record_outcome(&mut self, id: TaskId, ok: bool) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        if ok {
            entry.breaker.record_success();
        } else if entry.breaker.record_failure(Utc::now()) {
            warn!(task = %entry.task.name(), "breaker opened after repeated failures");
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Register(task) => {
                self.register(task);
            }
            Command::Health(reply_tx) => {
                let _ = reply_tx.send(self.health_report());
            }
        }
    }

    /// Snapshot used by the host's health surface.
    pub fn health_report(&self) -> HealthReport {
        let mut tasks: Vec<TaskHealth> = self
            .entries
            .values()
            .map(|entry| TaskHealth {
                name: entry.task.name().to_string(),
                status: entry.task.health_check(),
                breaker: entry.breaker.state(),
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));

        HealthReport {
            tasks,
            running: self.running.snapshot(),
        }
    }

    /// Shutdown coordinator: notify every task, then wait for the running
    /// set to empty. No dispatch happens past this point.
    async fn drain(&mut self) {
        info!("stopping scheduler; notifying tasks");
        for entry in self.entries.values() {
            if let Err(e) = entry.task.stop().await {
                error!(task = %entry.task.name(), "stop hook failed: {e:#}");
            }
        }

        let outstanding = self.running.len();
        if outstanding > 0 {
            info!(outstanding, "waiting for running tasks to finish");
        }
        self.running.drained().await;
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

    /// State shared between mock tasks so tests can observe interleavings.
    #[derive(Default)]
    struct Shared {
        concurrent_active: AtomicI32,
        max_concurrent_active: AtomicI32,
        exclusive_active: AtomicBool,
        violations: AtomicU32,
    }

    struct MockTask {
        name: String,
        interval: Duration,
        policy: TaskPolicy,
        tick_delay: Duration,
        fail: AtomicBool,
        retry: Option<BreakerPolicy>,
        ticks_started: AtomicU32,
        ticks_finished: AtomicU32,
        register_calls: AtomicU32,
        stop_calls: AtomicU32,
        fail_on_register: bool,
        shared: Arc<Shared>,
    }

    impl MockTask {
        fn new(name: &str, policy: TaskPolicy, interval: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                interval,
                policy,
                tick_delay: Duration::ZERO,
                fail: AtomicBool::new(false),
                retry: None,
                ticks_started: AtomicU32::new(0),
                ticks_finished: AtomicU32::new(0),
                register_calls: AtomicU32::new(0),
                stop_calls: AtomicU32::new(0),
                fail_on_register: false,
                shared: Arc::new(Shared::default()),
            })
        }

        fn with_delay(name: &str, policy: TaskPolicy, interval: Duration, delay: Duration) -> Arc<Self> {
            let mut task = Self::new(name, policy, interval);
            Arc::get_mut(&mut task).unwrap().tick_delay = delay;
            task
        }

        fn on_shared(
            name: &str,
            policy: TaskPolicy,
            interval: Duration,
            delay: Duration,
            shared: Arc<Shared>,
        ) -> Arc<Self> {
            let mut task = Self::with_delay(name, policy, interval, delay);
            Arc::get_mut(&mut task).unwrap().shared = shared;
            task
        }
    }

    #[async_trait]
    impl Task for MockTask {
        fn name(&self) -> &str {
            &self.name
        }
        fn interval(&self) -> Duration {
            self.interval
        }
        fn policy(&self) -> TaskPolicy {
            self.policy
        }
        fn retry_policy(&self) -> Option<BreakerPolicy> {
            self.retry
        }

        async fn tick(&self) -> anyhow::Result<()> {
            self.ticks_started.fetch_add(1, Ordering::SeqCst);
            match self.policy {
                TaskPolicy::Concurrent => {
                    if self.shared.exclusive_active.load(Ordering::SeqCst) {
                        self.shared.violations.fetch_add(1, Ordering::SeqCst);
                    }
                    let active = self.shared.concurrent_active.fetch_add(1, Ordering::SeqCst) + 1;
                    self.shared
                        .max_concurrent_active
                        .fetch_max(active, Ordering::SeqCst);
                    tokio::time::sleep(self.tick_delay).await;
                    self.shared.concurrent_active.fetch_sub(1, Ordering::SeqCst);
                }
                TaskPolicy::Exclusive => {
                    if self.shared.concurrent_active.load(Ordering::SeqCst) > 0 {
                        self.shared.violations.fetch_add(1, Ordering::SeqCst);
                    }
                    self.shared.exclusive_active.store(true, Ordering::SeqCst);
                    tokio::time::sleep(self.tick_delay).await;
                    self.shared.exclusive_active.store(false, Ordering::SeqCst);
                }
            }
            self.ticks_finished.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("simulated tick failure");
            }
            Ok(())
        }

        fn health_check(&self) -> String {
            format!("ticks={}", self.ticks_finished.load(Ordering::SeqCst))
        }

        fn on_register(&self) -> anyhow::Result<()> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_register {
                anyhow::bail!("simulated on_register failure");
            }
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_engine(poll: Duration) -> SchedulerEngine {
        let mut engine = SchedulerEngine::new(&SchedulerConfig::default());
        engine.poll_interval = poll;
        engine
    }

    #[tokio::test]
    async fn next_run_advances_at_fixed_rate() {
        let mut engine = test_engine(Duration::from_millis(10));
        let task = MockTask::new("steady", TaskPolicy::Exclusive, Duration::from_secs(1));
        let id = engine.register(task.clone());
        let initial = engine.entries[&id].next_run;

        for n in 1..=4i64 {
            engine.cycle(initial + chrono::Duration::seconds(n - 1)).await;
            assert_eq!(
                engine.entries[&id].next_run,
                initial + chrono::Duration::seconds(n)
            );
        }
        assert_eq!(task.ticks_finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn overrun_refires_on_next_cycle_without_coalescing() {
        let mut engine = test_engine(Duration::from_millis(10));
        let task = MockTask::new("laggy", TaskPolicy::Exclusive, Duration::from_secs(1));
        let id = engine.register(task.clone());
        let initial = engine.entries[&id].next_run;

        // Pretend the loop comes back long after several occurrences were
        // due: each cycle fires exactly once and advances by one interval.
        let late = initial + chrono::Duration::seconds(10);
        engine.cycle(late).await;
        assert_eq!(task.ticks_started.load(Ordering::SeqCst), 1);
        engine.cycle(late).await;
        assert_eq!(task.ticks_started.load(Ordering::SeqCst), 2);
        assert_eq!(
            engine.entries[&id].next_run,
            initial + chrono::Duration::seconds(2)
        );
    }

    #[tokio::test]
    async fn on_register_failure_still_schedules() {
        let mut engine = test_engine(Duration::from_millis(10));
        let mut task = MockTask::new("flaky-init", TaskPolicy::Concurrent, Duration::from_secs(1));
        Arc::get_mut(&mut task).unwrap().fail_on_register = true;
        engine.register(task.clone());

        assert_eq!(task.register_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.task_count(), 1);
        assert_eq!(engine.queue.len(), 1);
    }

    #[tokio::test]
    async fn breaker_opens_and_skips_after_repeated_failures() {
        let mut engine = test_engine(Duration::from_millis(10));
        let mut task = MockTask::new("broken", TaskPolicy::Exclusive, Duration::from_secs(1));
        {
            let t = Arc::get_mut(&mut task).unwrap();
            t.fail = AtomicBool::new(true);
            t.retry = Some(BreakerPolicy {
                failure_threshold: 2,
                cooldown: Duration::from_secs(3600),
            });
        }
        let id = engine.register(task.clone());
        let initial = engine.entries[&id].next_run;

        engine.cycle(initial).await;
        engine.cycle(initial + chrono::Duration::seconds(1)).await;
        assert_eq!(engine.entries[&id].breaker.state(), BreakerState::Open);

        // Third occurrence is skipped, but cadence is preserved.
        engine.cycle(initial + chrono::Duration::seconds(2)).await;
        assert_eq!(task.ticks_started.load(Ordering::SeqCst), 2);
        assert_eq!(
            engine.entries[&id].next_run,
            initial + chrono::Duration::seconds(3)
        );
    }

    #[tokio::test]
    async fn slow_concurrent_task_does_not_block_the_loop() {
        let mut engine = test_engine(Duration::from_millis(10));
        let slow = MockTask::with_delay(
            "slow",
            TaskPolicy::Concurrent,
            Duration::from_millis(40),
            Duration::from_millis(400),
        );
        let fast = MockTask::new("fast", TaskPolicy::Concurrent, Duration::from_millis(40));
        engine.register(slow.clone());
        engine.register(fast.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let fast_ticks = fast.ticks_finished.load(Ordering::SeqCst);
        assert!(
            fast_ticks >= 3,
            "fast task starved by slow concurrent task: {fast_ticks} ticks"
        );

        shutdown_tx.send(true).unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn overlapping_occurrence_of_same_task_is_skipped() {
        let mut engine = test_engine(Duration::from_millis(10));
        let task = MockTask::with_delay(
            "sluggish",
            TaskPolicy::Concurrent,
            Duration::from_millis(30),
            Duration::from_millis(120),
        );
        engine.register(task.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown_tx.send(true).unwrap();
        join.await.unwrap();

        assert_eq!(
            task.shared.max_concurrent_active.load(Ordering::SeqCst),
            1,
            "a task slower than its interval must never overlap itself"
        );
        assert!(task.ticks_started.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn exclusive_serializes_against_concurrent_work() {
        let shared = Arc::new(Shared::default());
        let mut engine = test_engine(Duration::from_millis(10));
        // B fires every 100ms and stays busy for 50ms; A fires every 200ms.
        let b = MockTask::on_shared(
            "b",
            TaskPolicy::Concurrent,
            Duration::from_millis(100),
            Duration::from_millis(50),
            Arc::clone(&shared),
        );
        let a = MockTask::on_shared(
            "a",
            TaskPolicy::Exclusive,
            Duration::from_millis(200),
            Duration::from_millis(20),
            Arc::clone(&shared),
        );
        engine.register(b.clone());
        engine.register(a.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(550)).await;
        shutdown_tx.send(true).unwrap();
        join.await.unwrap();

        assert_eq!(
            shared.violations.load(Ordering::SeqCst),
            0,
            "exclusive tick overlapped concurrent work"
        );
        assert!(a.ticks_finished.load(Ordering::SeqCst) >= 2);
        assert!(b.ticks_finished.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn shutdown_notifies_tasks_and_drains_in_flight_work() {
        let mut engine = test_engine(Duration::from_millis(10));
        let task = MockTask::with_delay(
            "long-haul",
            TaskPolicy::Concurrent,
            Duration::from_millis(50),
            Duration::from_millis(150),
        );
        engine.register(task.clone());
        let running = Arc::clone(&engine.running);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));

        // Let one invocation get in flight, then stop.
        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown_tx.send(true).unwrap();
        join.await.unwrap();

        assert_eq!(task.stop_calls.load(Ordering::SeqCst), 1);
        assert!(running.is_empty(), "drain must wait for in-flight ticks");
        assert_eq!(
            task.ticks_started.load(Ordering::SeqCst),
            task.ticks_finished.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn handle_serves_registration_and_health() {
        let engine = test_engine(Duration::from_millis(10));
        let handle = engine.handle();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));

        let task = MockTask::new("late-comer", TaskPolicy::Concurrent, Duration::from_secs(60));
        handle.register(task.clone()).await.unwrap();

        let report = handle.health_check().await.unwrap();
        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.tasks[0].name, "late-comer");
        assert_eq!(report.running_count(), 0);
        assert_eq!(task.register_calls.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        join.await.unwrap();
        assert!(matches!(
            handle.health_check().await,
            Err(SchedulerError::Stopped)
        ));
    }

    #[tokio::test]
    async fn running_count_reaches_zero_after_stop() {
        let mut engine = test_engine(Duration::from_millis(10));
        let task = MockTask::with_delay(
            "drainer",
            TaskPolicy::Concurrent,
            Duration::from_millis(40),
            Duration::from_millis(100),
        );
        engine.register(task.clone());
        let handle = engine.handle();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(engine.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let report = handle.health_check().await.unwrap();
        // One invocation should be visible mid-flight (advisory snapshot).
        assert!(report.running_count() <= 1);

        shutdown_tx.send(true).unwrap();
        join.await.unwrap();
        assert_eq!(task.ticks_started.load(Ordering::SeqCst), task.ticks_finished.load(Ordering::SeqCst));
    }
}
