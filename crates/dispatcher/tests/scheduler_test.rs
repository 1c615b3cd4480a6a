use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Local, Utc};
use tokio::sync::watch;

use orchestrator_core::config::{RetryConfig, SchedulerConfig};
use orchestrator_core::models::{TaskOutcome, TaskState, ANALYSIS_TASK_ID, DETECTION_TASK_ID};
use orchestrator_core::traits::{action_fn, TaskAction};
use orchestrator_core::SchedulerError;
use orchestrator_dispatcher::{ScheduledTask, SchedulerEvent, TaskScheduler};

const POLL: Duration = Duration::from_millis(20);

fn fast_scheduler() -> Arc<TaskScheduler> {
    let config = SchedulerConfig {
        retry: RetryConfig {
            base_interval_seconds: 1,
            ..RetryConfig::default()
        },
        ..SchedulerConfig::default()
    };
    Arc::new(TaskScheduler::new(config).with_poll_interval(POLL))
}

fn succeeding() -> Arc<dyn TaskAction> {
    action_fn(|| async { TaskOutcome::success() })
}

fn failing() -> Arc<dyn TaskAction> {
    action_fn(|| async { TaskOutcome::failure("sensor unreachable") })
}

fn sleeping(duration: Duration) -> Arc<dyn TaskAction> {
    action_fn(move || async move {
        tokio::time::sleep(duration).await;
        TaskOutcome::success()
    })
}

#[tokio::test]
async fn test_interval_task_runs_without_catching_up() {
    let scheduler = fast_scheduler();
    let mut events = scheduler.subscribe();
    scheduler
        .schedule_custom_task("t1", "periodic", succeeding(), 1, 0)
        .await
        .unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop().await.unwrap();

    let task = scheduler.get_task("t1").await.unwrap();
    assert!((2..=3).contains(&task.run_count), "run_count = {}", task.run_count);
    assert_eq!(task.error_count, 0);

    let status = scheduler.get_status().await;
    assert_eq!(status.stats.failed_executions, 0);
    assert_eq!(status.stats.total_executions, task.run_count);

    let mut starts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SchedulerEvent::TaskStarted { started_at, .. } = event {
            starts.push(started_at);
        }
    }
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= ChronoDuration::milliseconds(950));
    }
}

#[tokio::test]
async fn test_failing_task_exhausts_retries() {
    let scheduler = fast_scheduler();
    let mut events = scheduler.subscribe();
    let task = ScheduledTask::interval("t2", "always fails", failing(), 60)
        .with_max_retries(2)
        .with_initial_delay(Duration::ZERO);
    scheduler.register_task(task).await.unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    scheduler.stop().await.unwrap();

    let task = scheduler.get_task("t2").await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.error_count, 3);
    assert_eq!(task.run_count, 0);
    assert_eq!(task.last_error.as_deref(), Some("sensor unreachable"));
    assert!(task.enabled);
    assert!(task.next_run >= Utc::now() + ChronoDuration::seconds(50));

    let mut retries = 0;
    let mut exhausted = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SchedulerEvent::TaskRetryScheduled { .. } => retries += 1,
            SchedulerEvent::TaskFailed { error_count, .. } => {
                exhausted += 1;
                assert_eq!(error_count, 3);
            }
            _ => {}
        }
    }
    assert_eq!(retries, 2);
    assert_eq!(exhausted, 1);
}

#[tokio::test]
async fn test_pause_and_resume_detection() {
    let scheduler = fast_scheduler();
    scheduler.schedule_detection(succeeding(), 60).await.unwrap();

    let now = Utc::now();
    scheduler.pause_detection(300).await.unwrap();

    let status = scheduler.get_status().await;
    assert!(status.paused);
    let detection = status.task(DETECTION_TASK_ID).unwrap();
    assert!(!detection.enabled);
    assert_eq!(detection.state, TaskState::Cancelled);
    assert!(detection.next_run >= now + ChronoDuration::seconds(300));
    assert!(detection.paused_until.is_some());

    scheduler.resume_detection().await.unwrap();
    let status = scheduler.get_status().await;
    assert!(!status.paused);
    let detection = status.task(DETECTION_TASK_ID).unwrap();
    assert!(detection.enabled);
    assert_eq!(detection.state, TaskState::Pending);
    assert!(detection.next_run <= Utc::now() + ChronoDuration::seconds(60));
}

#[tokio::test]
async fn test_pause_re_enables_after_duration() {
    let scheduler = fast_scheduler();
    scheduler.schedule_detection(succeeding(), 60).await.unwrap();
    scheduler.pause_detection(1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1300)).await;
    let detection = scheduler.get_task(DETECTION_TASK_ID).await.unwrap();
    assert!(detection.enabled);
    assert!(detection.paused_until.is_none());
    assert_eq!(detection.state, TaskState::Pending);
}

#[tokio::test]
async fn test_second_pause_supersedes_first_timer() {
    let scheduler = fast_scheduler();
    scheduler.schedule_detection(succeeding(), 60).await.unwrap();
    scheduler.pause_detection(1).await.unwrap();
    scheduler.pause_detection(3).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let detection = scheduler.get_task(DETECTION_TASK_ID).await.unwrap();
    assert!(!detection.enabled);
}

#[tokio::test]
async fn test_detection_controls_require_registered_task() {
    let scheduler = fast_scheduler();
    assert!(matches!(
        scheduler.pause_detection(300).await,
        Err(SchedulerError::TaskNotFound { .. })
    ));
    assert!(matches!(
        scheduler.update_detection_interval(600).await,
        Err(SchedulerError::TaskNotFound { .. })
    ));
}

#[tokio::test]
async fn test_update_detection_interval_resets_next_run() {
    let scheduler = fast_scheduler();
    scheduler.schedule_detection(succeeding(), 5).await.unwrap();

    let before = Utc::now();
    let next_run = scheduler.update_detection_interval(600).await.unwrap();
    let after = Utc::now();

    assert!(next_run >= before + ChronoDuration::seconds(600));
    assert!(next_run <= after + ChronoDuration::seconds(600));
    let detection = scheduler.get_task(DETECTION_TASK_ID).await.unwrap();
    assert_eq!(detection.schedule.period_seconds(), 600);
    assert_eq!(detection.next_run, next_run);

    assert!(matches!(
        scheduler.update_detection_interval(0).await,
        Err(SchedulerError::InvalidInterval { seconds: 0 })
    ));
}

#[tokio::test]
async fn test_duplicate_registration_overwrites() {
    let scheduler = fast_scheduler();
    scheduler
        .schedule_custom_task("dup", "first", succeeding(), 10, 0)
        .await
        .unwrap();
    scheduler
        .schedule_custom_task("dup", "second", succeeding(), 20, 5)
        .await
        .unwrap();

    let status = scheduler.get_status().await;
    assert_eq!(status.tasks.len(), 1);
    let task = status.task("dup").unwrap();
    assert_eq!(task.name, "second");
    assert_eq!(task.schedule.period_seconds(), 20);
}

#[tokio::test]
async fn test_completion_of_overwritten_task_is_discarded() {
    let scheduler = fast_scheduler();
    let (release_tx, release_rx) = watch::channel(false);
    let blocking = action_fn(move || {
        let mut release = release_rx.clone();
        async move {
            let _ = release.wait_for(|released| *released).await;
            TaskOutcome::failure("old registration")
        }
    });
    scheduler
        .schedule_custom_task("x", "old", blocking, 1, 0)
        .await
        .unwrap();
    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);

    scheduler
        .schedule_custom_task("x", "new", succeeding(), 1, 0)
        .await
        .unwrap();
    assert_eq!(
        scheduler.get_task("x").await.unwrap().state,
        TaskState::Running
    );
    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 0);

    release_tx.send_replace(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let task = scheduler.get_task("x").await.unwrap();
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(task.error_count, 0);

    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let task = scheduler.get_task("x").await.unwrap();
    assert_eq!(task.name, "new");
    assert_eq!(task.run_count, 1);
}

#[tokio::test]
async fn test_reregistration_after_removal_waits_for_running_execution() {
    let scheduler = fast_scheduler();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let counted = || {
        let (current, peak) = (current.clone(), peak.clone());
        action_fn(move || {
            let (current, peak) = (current.clone(), peak.clone());
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(500)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                TaskOutcome::success()
            }
        })
    };

    scheduler
        .schedule_custom_task("t", "first", counted(), 1, 0)
        .await
        .unwrap();
    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);

    scheduler.remove_task("t").await.unwrap();
    scheduler
        .schedule_custom_task("t", "second", counted(), 1, 0)
        .await
        .unwrap();
    assert_eq!(
        scheduler.get_task("t").await.unwrap().state,
        TaskState::Running
    );
    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(700)).await;
    let task = scheduler.get_task("t").await.unwrap();
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(task.run_count, 0);

    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(scheduler.get_task("t").await.unwrap().run_count, 1);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_removed_task_completion_is_dropped() {
    let scheduler = fast_scheduler();
    scheduler
        .schedule_custom_task("gone", "gone", sleeping(Duration::from_millis(200)), 1, 0)
        .await
        .unwrap();
    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);
    scheduler.remove_task("gone").await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(scheduler.get_task("gone").await.is_none());

    // 执行结束后重新注册的任务不再等待
    scheduler
        .schedule_custom_task("gone", "back", succeeding(), 1, 0)
        .await
        .unwrap();
    assert_eq!(
        scheduler.get_task("gone").await.unwrap().state,
        TaskState::Pending
    );
    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);
}

#[tokio::test]
async fn test_stale_completion_keeps_paused_task_cancelled() {
    let scheduler = fast_scheduler();
    scheduler
        .schedule_custom_task("p", "old", sleeping(Duration::from_millis(200)), 1, 0)
        .await
        .unwrap();
    assert_eq!(scheduler.dispatch_due_tasks().await.unwrap(), 1);

    scheduler
        .schedule_custom_task("p", "new", succeeding(), 1, 0)
        .await
        .unwrap();
    scheduler.pause_task("p", 60).await.unwrap();
    assert_eq!(
        scheduler.get_task("p").await.unwrap().state,
        TaskState::Running
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    let task = scheduler.get_task("p").await.unwrap();
    assert_eq!(task.state, TaskState::Cancelled);
    assert!(!task.enabled);
    assert_eq!(task.run_count, 0);

    scheduler.resume_task("p").await.unwrap();
    assert_eq!(
        scheduler.get_task("p").await.unwrap().state,
        TaskState::Pending
    );
}

#[tokio::test]
async fn test_start_twice_fails() {
    let scheduler = fast_scheduler();
    scheduler.start().await.unwrap();
    assert!(matches!(
        scheduler.start().await,
        Err(SchedulerError::AlreadyRunning)
    ));
    assert!(scheduler.is_running());
    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());
    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_execution() {
    let scheduler = fast_scheduler();
    scheduler
        .schedule_custom_task("slow", "slow", sleeping(Duration::from_millis(400)), 60, 0)
        .await
        .unwrap();
    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    scheduler.stop().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(!scheduler.is_running());

    let task = scheduler.get_task("slow").await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.run_count, 1);
}

#[tokio::test]
async fn test_stop_times_out_on_stuck_execution() {
    let config = SchedulerConfig::default();
    let scheduler = Arc::new(
        TaskScheduler::new(config)
            .with_poll_interval(POLL)
            .with_shutdown_timeout(Duration::from_millis(200)),
    );
    scheduler
        .schedule_custom_task("stuck", "stuck", sleeping(Duration::from_secs(30)), 60, 0)
        .await
        .unwrap();
    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let result = scheduler.stop().await;
    assert!(matches!(result, Err(SchedulerError::ShutdownTimeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!scheduler.is_running());
    assert!(!scheduler.get_status().await.running);
}

#[tokio::test]
async fn test_panicking_action_counts_as_failure() {
    let scheduler = fast_scheduler();
    async fn crash() -> TaskOutcome {
        panic!("detector crashed")
    }
    scheduler
        .schedule_custom_task("boom", "panics", action_fn(crash), 60, 0)
        .await
        .unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let task = scheduler.get_task("boom").await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.error_count, 1);
    assert!(task.last_error.unwrap().contains("panic"));
    assert!(scheduler.is_running());
    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_single_running_execution_per_task() {
    let scheduler = fast_scheduler();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (current_ref, peak_ref) = (current.clone(), peak.clone());
    let action = action_fn(move || {
        let current = current_ref.clone();
        let peak = peak_ref.clone();
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1500)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            TaskOutcome::success()
        }
    });
    scheduler
        .schedule_custom_task("overlap", "overlap", action, 1, 0)
        .await
        .unwrap();
    scheduler.start().await.unwrap();

    for _ in 0..20 {
        let _ = scheduler.trigger_task("overlap").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    scheduler.stop().await.unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(scheduler.get_task("overlap").await.unwrap().run_count >= 1);
}

#[tokio::test]
async fn test_daily_analysis_next_run_is_next_local_occurrence() {
    let scheduler = fast_scheduler();
    let target = (Local::now() + ChronoDuration::hours(2)).format("%H:%M").to_string();
    let next_run = scheduler
        .schedule_daily_analysis(succeeding(), &target)
        .await
        .unwrap();

    let now = Utc::now();
    assert!(next_run > now);
    assert!(next_run <= now + ChronoDuration::hours(24));
    assert_eq!(
        next_run.with_timezone(&Local).format("%H:%M").to_string(),
        target
    );
    let task = scheduler.get_task(ANALYSIS_TASK_ID).await.unwrap();
    assert!(task.schedule.is_daily());
}

#[tokio::test]
async fn test_trigger_and_remove_task() {
    let scheduler = fast_scheduler();
    scheduler.schedule_detection(succeeding(), 3600).await.unwrap();
    scheduler.start().await.unwrap();

    scheduler.trigger_task(DETECTION_TASK_ID).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        scheduler.get_task(DETECTION_TASK_ID).await.unwrap().run_count,
        1
    );

    scheduler.remove_task(DETECTION_TASK_ID).await.unwrap();
    assert!(scheduler.get_task(DETECTION_TASK_ID).await.is_none());
    assert!(matches!(
        scheduler.remove_task(DETECTION_TASK_ID).await,
        Err(SchedulerError::TaskNotFound { .. })
    ));
    assert!(matches!(
        scheduler.trigger_task("missing").await,
        Err(SchedulerError::TaskNotFound { .. })
    ));
    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_trigger_rejects_paused_task() {
    let scheduler = fast_scheduler();
    scheduler.schedule_detection(succeeding(), 60).await.unwrap();
    scheduler.pause_detection(60).await.unwrap();
    assert!(matches!(
        scheduler.trigger_task(DETECTION_TASK_ID).await,
        Err(SchedulerError::TaskExecution(_))
    ));
}
