//! Automation scheduler: cron timers, startup runs, bounded concurrency,
//! cooperative cancellation.
//!
//! Admission is atomic: the already-running check, the capacity check, and
//! the slot claim all happen under one lock, so two concurrent triggers can
//! never both land in the last free slot. At capacity new triggers are
//! rejected, never queued.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ai::{analyze_automation_result, AiClient};
use crate::db::HubDb;
use crate::error::AutomationError;
use crate::notification::Notifier;
use crate::settings::Settings;
use crate::types::{AutomationDefinition, AutomationRun, RunOutcome, SchedulerStatus};

/// Executes one automation's command to completion, honoring cancellation.
#[async_trait]
pub trait AutomationRunner: Send + Sync {
    async fn run(
        &self,
        def: &AutomationDefinition,
        cancel: CancellationToken,
    ) -> Result<String, AutomationError>;
}

struct SchedulerInner {
    /// Cancellation token per in-flight automation, keyed by automation id.
    running: HashMap<String, CancellationToken>,
    /// One timer task per scheduled automation.
    cron_tasks: HashMap<String, JoinHandle<()>>,
    max_concurrent: usize,
    startup_ran: bool,
}

pub struct AutomationScheduler {
    db: Arc<Mutex<HubDb>>,
    settings: Arc<RwLock<Settings>>,
    runner: Arc<dyn AutomationRunner>,
    ai: Option<Arc<dyn AiClient>>,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<SchedulerInner>,
}

/// Frees the admission slot when an execution ends, whatever the path out.
struct SlotGuard<'a> {
    scheduler: &'a AutomationScheduler,
    automation_id: String,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.scheduler
            .inner
            .lock()
            .running
            .remove(&self.automation_id);
    }
}

impl AutomationScheduler {
    pub fn new(
        db: Arc<Mutex<HubDb>>,
        settings: Arc<RwLock<Settings>>,
        runner: Arc<dyn AutomationRunner>,
        ai: Option<Arc<dyn AiClient>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let max_concurrent = settings.read().max_concurrent_automations.max(1);
        Self {
            db,
            settings,
            runner,
            ai,
            notifier,
            inner: Mutex::new(SchedulerInner {
                running: HashMap::new(),
                cron_tasks: HashMap::new(),
                max_concurrent,
                startup_ran: false,
            }),
        }
    }

    /// Execute one automation now. Rejections (already running, at capacity,
    /// bad config) come back as `Err` with nothing started and no history
    /// written; once admitted, the run record tells the rest of the story
    /// and the returned `AutomationRun` carries the final outcome.
    pub async fn execute_automation(
        &self,
        def: &AutomationDefinition,
    ) -> Result<AutomationRun, AutomationError> {
        if let Some(provider) = &def.provider {
            provider
                .validate()
                .map_err(AutomationError::Configuration)?;
        }

        // Atomic admission: check and claim in one lock scope.
        let token = {
            let mut inner = self.inner.lock();
            if inner.running.contains_key(&def.id) {
                return Err(AutomationError::AlreadyRunning(def.id.clone()));
            }
            if inner.running.len() >= inner.max_concurrent {
                return Err(AutomationError::LimitReached {
                    running: inner.running.len(),
                    max: inner.max_concurrent,
                });
            }
            let token = CancellationToken::new();
            inner.running.insert(def.id.clone(), token.clone());
            token
        };
        let _slot = SlotGuard {
            scheduler: self,
            automation_id: def.id.clone(),
        };

        let mut run = AutomationRun::begin(&def.id);
        if let Err(e) = self.db.lock().insert_automation_run(&run) {
            log::warn!("Failed to record automation run start: {e}");
        }

        log::info!("Running automation '{}' ({})", def.name, def.id);
        let outcome = self.runner.run(def, token).await;

        run.finished_at = Some(Utc::now().to_rfc3339());
        match outcome {
            Ok(output) => {
                run.outcome = Some(RunOutcome::Completed);
                if let (Some(client), Some(_)) = (&self.ai, &def.provider) {
                    run.analysis =
                        analyze_automation_result(client.as_ref(), &def.task, &output).await;
                }
                run.output = Some(output);
            }
            Err(AutomationError::Cancelled) => {
                log::info!("Automation '{}' cancelled", def.name);
                run.outcome = Some(RunOutcome::Cancelled);
            }
            Err(e) => {
                log::error!("Automation '{}' failed: {e}", def.name);
                run.outcome = Some(RunOutcome::Failed);
                run.error = Some(e.to_string());
                if let Err(notify_err) = self
                    .notifier
                    .notify("Automation failed", &format!("'{}' did not complete", def.name))
                {
                    log::warn!("Failed to raise failure notification: {notify_err}");
                }
            }
        }

        if let Err(e) = self.db.lock().finish_automation_run(&run) {
            log::warn!("Failed to record automation run end: {e}");
        }

        Ok(run)
    }

    /// Execute an automation by id, loading its definition from the store.
    pub async fn execute_automation_by_id(
        &self,
        id: &str,
    ) -> Result<AutomationRun, AutomationError> {
        let def = self
            .db
            .lock()
            .get_automation(id)
            .map_err(AutomationError::Db)?
            .ok_or_else(|| AutomationError::NotFound(id.to_string()))?;
        self.execute_automation(&def).await
    }

    /// Request cancellation of a running automation. Returns false when the
    /// automation is not currently running.
    pub fn stop_automation(&self, id: &str) -> bool {
        let inner = self.inner.lock();
        match inner.running.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running automation and tear down all cron timers.
    pub fn stop_all_automations(&self) {
        let mut inner = self.inner.lock();
        for token in inner.running.values() {
            token.cancel();
        }
        for (_, handle) in inner.cron_tasks.drain() {
            handle.abort();
        }
    }

    pub fn is_automation_running(&self, id: &str) -> bool {
        self.inner.lock().running.contains_key(id)
    }

    pub fn get_running_automations_count(&self) -> usize {
        self.inner.lock().running.len()
    }

    pub fn get_max_concurrent_automations(&self) -> usize {
        self.inner.lock().max_concurrent
    }

    /// Change the concurrency limit (minimum 1) and persist it. Running
    /// automations above a lowered limit are unaffected; only new admissions
    /// see the new limit.
    pub fn set_max_concurrent_automations(&self, max: usize) {
        let max = max.max(1);
        self.inner.lock().max_concurrent = max;
        let mut settings = self.settings.write();
        settings.max_concurrent_automations = max;
        if let Err(e) = settings.save() {
            log::warn!("Failed to persist concurrency limit: {e}");
        }
    }

    pub fn get_scheduler_status(&self) -> SchedulerStatus {
        let inner = self.inner.lock();
        SchedulerStatus {
            max_concurrent: inner.max_concurrent,
            running_count: inner.running.len(),
        }
    }

    /// (Re)build cron timers from the stored definitions. Definitions without
    /// a schedule are skipped; unparseable schedules are logged and skipped
    /// so one bad expression cannot take down the rest.
    pub fn load_automation_schedules(self: &Arc<Self>) -> Result<usize, AutomationError> {
        let defs = self
            .db
            .lock()
            .get_all_automations()
            .map_err(AutomationError::Db)?;

        let tz = self.timezone();
        let mut inner = self.inner.lock();
        for (_, handle) in inner.cron_tasks.drain() {
            handle.abort();
        }

        let mut scheduled = 0;
        for def in defs {
            let Some(expr) = def.schedule.clone() else {
                continue;
            };
            let schedule = match parse_cron(&expr) {
                Ok(s) => s,
                Err(e) => {
                    log::error!("Skipping automation '{}': {e}", def.name);
                    continue;
                }
            };

            let scheduler = Arc::clone(self);
            let id = def.id.clone();
            let handle = tokio::spawn(async move {
                scheduler.cron_loop(def, schedule, tz).await;
            });
            inner.cron_tasks.insert(id, handle);
            scheduled += 1;
        }

        log::info!("Scheduled {scheduled} automations");
        Ok(scheduled)
    }

    async fn cron_loop(self: Arc<Self>, def: AutomationDefinition, schedule: Schedule, tz: Tz) {
        loop {
            let now = Utc::now().with_timezone(&tz);
            let Some(next) = schedule.after(&now).next() else {
                log::warn!("Automation '{}' has no upcoming run, stopping timer", def.name);
                return;
            };

            let wait = (next.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            self.spawn_execution(def.clone());
        }
    }

    /// Run an automation in its own task. The timer task only owns the
    /// timing: a schedule reload aborts timers, and a run kicked off here
    /// must survive that and finalize its history row. Stopping a run goes
    /// through its cancellation token, never through task abort.
    fn spawn_execution(self: &Arc<Self>, def: AutomationDefinition) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            match scheduler.execute_automation(&def).await {
                Ok(_) => {}
                Err(e) if e.is_rejection() => {
                    log::warn!("Scheduled run of '{}' skipped: {e}", def.name);
                }
                Err(e) => {
                    log::error!("Scheduled run of '{}' errored: {e}", def.name);
                }
            }
        });
    }

    /// Run every `run_on_startup` automation, sequentially, at most once per
    /// process no matter how often the shell calls this.
    pub async fn run_startup_automations(&self) -> Result<usize, AutomationError> {
        {
            let mut inner = self.inner.lock();
            if inner.startup_ran {
                return Ok(0);
            }
            inner.startup_ran = true;
        }

        let defs = self
            .db
            .lock()
            .get_all_automations()
            .map_err(AutomationError::Db)?;

        let mut ran = 0;
        for def in defs.iter().filter(|d| d.run_on_startup) {
            match self.execute_automation(def).await {
                Ok(_) => ran += 1,
                Err(e) => log::warn!("Startup run of '{}' skipped: {e}", def.name),
            }
        }
        Ok(ran)
    }

    fn timezone(&self) -> Tz {
        let name = self.settings.read().timezone.clone();
        name.parse().unwrap_or_else(|_| {
            log::warn!("Invalid timezone '{name}', falling back to UTC");
            chrono_tz::UTC
        })
    }
}

/// Parse a 5-field cron expression. The cron crate wants 6 fields with
/// seconds, so prepend "0".
pub fn parse_cron(expr: &str) -> Result<Schedule, AutomationError> {
    let full_expr = format!("0 {}", expr);
    full_expr.parse::<Schedule>().map_err(|e| {
        AutomationError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

// =============================================================================
// Subprocess runner
// =============================================================================

/// Runs an automation's command as a subprocess. Cancellation kills the
/// child; `kill_on_drop` covers the process-exit path too.
pub struct CommandRunner;

#[async_trait]
impl AutomationRunner for CommandRunner {
    async fn run(
        &self,
        def: &AutomationDefinition,
        cancel: CancellationToken,
    ) -> Result<String, AutomationError> {
        let Some((program, args)) = def.command.split_first() else {
            return Err(AutomationError::Configuration(format!(
                "Automation '{}' has no command",
                def.name
            )));
        };

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = tokio::io::AsyncReadExt::read_to_end(pipe, &mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = tokio::io::AsyncReadExt::read_to_end(pipe, &mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    log::warn!("Failed to kill cancelled automation process: {e}");
                }
                return Err(AutomationError::Cancelled);
            }
            status = child.wait() => status?,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(stdout)
        } else {
            Err(AutomationError::CommandFailed {
                code: status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::HubDb;
    use crate::notification::RecordingNotifier;
    use tokio::sync::Semaphore;

    fn test_scheduler_with(
        runner: Arc<dyn AutomationRunner>,
        max_concurrent: usize,
    ) -> (
        Arc<AutomationScheduler>,
        Arc<RecordingNotifier>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let db = HubDb::open_at(dir.path().join("test.db")).unwrap();
        // Settings backed by a file inside the tempdir, so persisting them
        // never touches the real home directory.
        let mut settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();
        settings.max_concurrent_automations = max_concurrent;
        let notifier = RecordingNotifier::new();
        let scheduler = Arc::new(AutomationScheduler::new(
            Arc::new(Mutex::new(db)),
            Arc::new(RwLock::new(settings)),
            runner,
            None,
            notifier.clone(),
        ));
        (scheduler, notifier, dir)
    }

    fn def(id: &str) -> AutomationDefinition {
        AutomationDefinition {
            id: id.to_string(),
            name: format!("Job {id}"),
            task: "test task".to_string(),
            schedule: None,
            run_on_startup: false,
            command: vec!["true".to_string()],
            provider: None,
        }
    }

    /// Runner that parks until released, or until cancelled. Semaphore
    /// permits accumulate, so handshakes cannot lose wakeups.
    struct ParkedRunner {
        started: Arc<Semaphore>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl AutomationRunner for ParkedRunner {
        async fn run(
            &self,
            _def: &AutomationDefinition,
            cancel: CancellationToken,
        ) -> Result<String, AutomationError> {
            self.started.add_permits(1);
            tokio::select! {
                _ = cancel.cancelled() => Err(AutomationError::Cancelled),
                permit = self.release.acquire() => {
                    if let Ok(p) = permit {
                        p.forget();
                    }
                    Ok("done".to_string())
                }
            }
        }
    }

    async fn wait_started(started: &Semaphore) {
        started.acquire().await.unwrap().forget();
    }

    struct InstantRunner;

    #[async_trait]
    impl AutomationRunner for InstantRunner {
        async fn run(
            &self,
            _def: &AutomationDefinition,
            _cancel: CancellationToken,
        ) -> Result<String, AutomationError> {
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn test_concurrency_limit_rejects_excess() {
        let started = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        let (scheduler, _, _dir) = test_scheduler_with(
            Arc::new(ParkedRunner {
                started: started.clone(),
                release: release.clone(),
            }),
            2,
        );

        let s1 = scheduler.clone();
        let h1 = tokio::spawn(async move { s1.execute_automation(&def("a1")).await });
        wait_started(&started).await;
        let s2 = scheduler.clone();
        let h2 = tokio::spawn(async move { s2.execute_automation(&def("a2")).await });
        wait_started(&started).await;
        assert_eq!(scheduler.get_running_automations_count(), 2);

        // Third trigger is rejected immediately, not queued.
        let rejected = scheduler.execute_automation(&def("a3")).await;
        assert!(matches!(
            rejected,
            Err(AutomationError::LimitReached { running: 2, max: 2 })
        ));

        release.add_permits(2);
        assert_eq!(
            h1.await.unwrap().unwrap().outcome,
            Some(RunOutcome::Completed)
        );
        assert_eq!(
            h2.await.unwrap().unwrap().outcome,
            Some(RunOutcome::Completed)
        );
        assert_eq!(scheduler.get_running_automations_count(), 0);

        // Slots freed: a new trigger is admitted again.
        release.add_permits(1);
        let run = scheduler.execute_automation(&def("a3")).await.unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Completed));
    }

    #[tokio::test]
    async fn test_same_automation_cannot_run_twice() {
        let started = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        let (scheduler, _, _dir) = test_scheduler_with(
            Arc::new(ParkedRunner {
                started: started.clone(),
                release: release.clone(),
            }),
            4,
        );

        let s1 = scheduler.clone();
        let h1 = tokio::spawn(async move { s1.execute_automation(&def("a1")).await });
        wait_started(&started).await;
        assert!(scheduler.is_automation_running("a1"));

        let second = scheduler.execute_automation(&def("a1")).await;
        assert!(matches!(second, Err(AutomationError::AlreadyRunning(_))));

        release.add_permits(1);
        h1.await.unwrap().unwrap();
        assert!(!scheduler.is_automation_running("a1"));
    }

    #[tokio::test]
    async fn test_cancellation_produces_cancelled_outcome() {
        let started = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        let (scheduler, _, _dir) = test_scheduler_with(
            Arc::new(ParkedRunner {
                started: started.clone(),
                release,
            }),
            2,
        );

        let s1 = scheduler.clone();
        let h1 = tokio::spawn(async move { s1.execute_automation(&def("a1")).await });
        wait_started(&started).await;

        assert!(scheduler.stop_automation("a1"));
        let run = h1.await.unwrap().unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Cancelled));
        assert_eq!(scheduler.get_running_automations_count(), 0);

        // Stopping something that is not running reports false.
        assert!(!scheduler.stop_automation("a1"));
        assert!(!scheduler.stop_automation("ghost"));
    }

    #[tokio::test]
    async fn test_schedule_reload_leaves_running_automation_alone() {
        let started = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        let (scheduler, _, _dir) = test_scheduler_with(
            Arc::new(ParkedRunner {
                started: started.clone(),
                release: release.clone(),
            }),
            2,
        );

        // A scheduled definition, fired the way the cron timer fires it.
        let mut scheduled = def("a1");
        scheduled.schedule = Some("0 0 1 1 *".to_string());
        scheduler.db.lock().upsert_automation(&scheduled).unwrap();
        scheduler.spawn_execution(scheduled);
        wait_started(&started).await;
        assert!(scheduler.is_automation_running("a1"));

        // Rebuilding the timers must not touch the in-flight run.
        scheduler.load_automation_schedules().unwrap();
        assert!(scheduler.is_automation_running("a1"));

        release.add_permits(1);
        for _ in 0..100 {
            if !scheduler.is_automation_running("a1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!scheduler.is_automation_running("a1"));

        // The history row is finalized, not orphaned with a NULL outcome.
        let history = scheduler
            .db
            .lock()
            .get_runs_for_automation("a1", 10)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, Some(RunOutcome::Completed));
        assert!(history[0].finished_at.is_some());

        scheduler.stop_all_automations();
    }

    #[tokio::test]
    async fn test_failed_run_records_error_and_notifies() {
        struct FailingRunner;

        #[async_trait]
        impl AutomationRunner for FailingRunner {
            async fn run(
                &self,
                _def: &AutomationDefinition,
                _cancel: CancellationToken,
            ) -> Result<String, AutomationError> {
                Err(AutomationError::CommandFailed {
                    code: 2,
                    stderr: "no such file".to_string(),
                })
            }
        }

        let (scheduler, notifier, _dir) = test_scheduler_with(Arc::new(FailingRunner), 2);
        let run = scheduler.execute_automation(&def("a1")).await.unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Failed));
        assert!(run.error.as_deref().unwrap().contains("no such file"));
        assert_eq!(notifier.titles(), vec!["Automation failed"]);
    }

    #[tokio::test]
    async fn test_invalid_provider_rejected_before_admission() {
        let (scheduler, _, _dir) = test_scheduler_with(Arc::new(InstantRunner), 2);
        let mut bad = def("a1");
        bad.provider = Some(crate::types::AiProviderConfig::Openai {
            api_key: "".to_string(),
            model: "gpt-4o".to_string(),
        });

        let result = scheduler.execute_automation(&bad).await;
        assert!(matches!(result, Err(AutomationError::Configuration(_))));
        assert_eq!(scheduler.get_running_automations_count(), 0);
    }

    #[tokio::test]
    async fn test_startup_runs_once_per_process() {
        let (scheduler, _, _dir) = test_scheduler_with(Arc::new(InstantRunner), 2);
        let mut startup = def("a1");
        startup.run_on_startup = true;
        scheduler.db.lock().upsert_automation(&startup).unwrap();
        scheduler.db.lock().upsert_automation(&def("a2")).unwrap();

        assert_eq!(scheduler.run_startup_automations().await.unwrap(), 1);
        // Second call is a no-op.
        assert_eq!(scheduler.run_startup_automations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_history_recorded() {
        let (scheduler, _, _dir) = test_scheduler_with(Arc::new(InstantRunner), 2);
        scheduler.db.lock().upsert_automation(&def("a1")).unwrap();

        let run = scheduler.execute_automation_by_id("a1").await.unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Completed));
        assert_eq!(run.output.as_deref(), Some("ok"));

        let history = scheduler
            .db
            .lock()
            .get_runs_for_automation("a1", 10)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, Some(RunOutcome::Completed));
        assert!(history[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn test_execute_by_unknown_id() {
        let (scheduler, _, _dir) = test_scheduler_with(Arc::new(InstantRunner), 2);
        let result = scheduler.execute_automation_by_id("missing").await;
        assert!(matches!(result, Err(AutomationError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_max_concurrent_clamps_to_one() {
        let (scheduler, _, _dir) = test_scheduler_with(Arc::new(InstantRunner), 2);
        scheduler.set_max_concurrent_automations(0);
        assert_eq!(scheduler.get_max_concurrent_automations(), 1);
        let status = scheduler.get_scheduler_status();
        assert_eq!(status.max_concurrent, 1);
        assert_eq!(status.running_count, 0);
    }

    #[test]
    fn test_parse_cron_five_fields() {
        assert!(parse_cron("0 7 * * *").is_ok());
        assert!(parse_cron("*/5 * * * 1-5").is_ok());
        assert!(parse_cron("not a cron").is_err());
    }

    #[tokio::test]
    async fn test_command_runner_empty_command() {
        let runner = CommandRunner;
        let mut empty = def("a1");
        empty.command.clear();
        let result = runner.run(&empty, CancellationToken::new()).await;
        assert!(matches!(result, Err(AutomationError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_command_runner_captures_output() {
        let runner = CommandRunner;
        let mut echo = def("a1");
        echo.command = vec!["echo".to_string(), "hello".to_string()];
        let out = runner.run(&echo, CancellationToken::new()).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_command_runner_failure_carries_stderr() {
        let runner = CommandRunner;
        let mut bad = def("a1");
        bad.command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo oops >&2; exit 3".to_string(),
        ];
        let result = runner.run(&bad, CancellationToken::new()).await;
        match result {
            Err(AutomationError::CommandFailed { code, stderr }) => {
                assert_eq!(code, 3);
                assert!(stderr.contains("oops"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_runner_cancellation_kills_child() {
        let runner = CommandRunner;
        let mut slow = def("a1");
        slow.command = vec!["sleep".to_string(), "30".to_string()];

        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel2.cancel();
        });

        let start = std::time::Instant::now();
        let result = runner.run(&slow, cancel).await;
        assert!(matches!(result, Err(AutomationError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
