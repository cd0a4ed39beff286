//! Periodic background tasks running alongside a burst

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use crate::tasks::Task;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A task re-run on a fixed interval while its benchmark is active
#[derive(Debug, Clone)]
pub struct BackgroundTask {
    pub task: Arc<dyn Task>,
    /// Offset of the first run from scheduler start
    pub first_run_after: Duration,
    pub run_every: Duration,
    /// Offset from scheduler start after which the task is disabled
    pub run_until: Option<Duration>,
}

impl BackgroundTask {
    pub fn new(task: Arc<dyn Task>, run_every: Duration) -> Self {
        Self {
            task,
            first_run_after: Duration::ZERO,
            run_every,
            run_until: None,
        }
    }

    pub fn with_first_run_after(mut self, delay: Duration) -> Self {
        self.first_run_after = delay;
        self
    }

    pub fn with_run_until(mut self, until: Duration) -> Self {
        self.run_until = Some(until);
        self
    }
}

struct Scheduled {
    task: BackgroundTask,
    /// `None` once the task is disabled
    next_run: Option<Instant>,
    deadline: Option<Instant>,
}

/// Polls its tasks once per second until told to stop
#[derive(Debug)]
pub struct BackgroundScheduler {
    tasks: Vec<BackgroundTask>,
    poll_interval: Duration,
}

impl BackgroundScheduler {
    pub fn new(tasks: Vec<BackgroundTask>) -> Self {
        Self {
            tasks,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Run until `stop` turns true.
    ///
    /// Due tasks run sequentially. A failing task is logged and stays
    /// scheduled.
    pub async fn run(self, stop: watch::Receiver<bool>) {
        let start = Instant::now();
        let mut scheduled: Vec<Scheduled> = self
            .tasks
            .into_iter()
            .map(|task| Scheduled {
                next_run: Some(start + task.first_run_after),
                deadline: task.run_until.map(|until| start + until),
                task,
            })
            .collect();

        tracing::info!("Starting background scheduler with {} tasks", scheduled.len());

        loop {
            for entry in scheduled.iter_mut() {
                let name = entry.task.task.name();
                if entry.next_run.is_some_and(|next| next <= Instant::now()) {
                    tracing::info!("Running background task {}", name);
                    if let Err(e) = entry.task.task.run().await {
                        tracing::error!("Background task {} failed: {}", name, e);
                    }
                    entry.next_run = Some(Instant::now() + entry.task.run_every);
                }

                if entry.next_run.is_some()
                    && entry.deadline.is_some_and(|deadline| deadline <= Instant::now())
                {
                    tracing::info!("Stopped background task {}, run_until has passed", name);
                    entry.next_run = None;
                }
            }

            if *stop.borrow() {
                break;
            }
            sleep(self.poll_interval).await;
        }

        tracing::info!("Background scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Destination;
    use crate::tasks::{TaskError, TaskResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingTask {
        runs: AtomicUsize,
        fail: bool,
    }

    impl CountingTask {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                fail,
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Task for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }

        fn destinations(&self) -> &[Destination] {
            &[]
        }

        async fn run_at(&self, _destination: &Destination) -> TaskResult<()> {
            Ok(())
        }

        async fn run(&self) -> TaskResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TaskError::Failed {
                    name: "counting".into(),
                    status: "exit status: 1".into(),
                });
            }
            Ok(())
        }
    }

    async fn run_for(tasks: Vec<BackgroundTask>, millis: u64) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(BackgroundScheduler::new(tasks).run(stop_rx));
        sleep(Duration::from_millis(millis)).await;
        stop_tx.send_replace(true);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval() {
        let task = CountingTask::new(false);
        let background = BackgroundTask::new(task.clone(), Duration::from_secs(3))
            .with_first_run_after(Duration::from_secs(2));

        run_for(vec![background], 11_500).await;

        // t = 2, 5, 8, 11
        assert_eq!(task.runs(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boundary_tick_executes() {
        let task = CountingTask::new(false);
        let background = BackgroundTask::new(task.clone(), Duration::from_secs(3))
            .with_first_run_after(Duration::from_secs(2));

        // window ends exactly on the fourth run: floor((11 - 2) / 3) + 1
        run_for(vec![background], 11_000).await;

        assert_eq!(task.runs(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_disables_task() {
        let task = CountingTask::new(false);
        let background = BackgroundTask::new(task.clone(), Duration::from_secs(2))
            .with_run_until(Duration::from_secs(5));

        run_for(vec![background], 10_500).await;

        // t = 0, 2, 4
        assert_eq!(task.runs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_task_scheduled() {
        let task = CountingTask::new(true);
        let background = BackgroundTask::new(task.clone(), Duration::from_secs(2));

        run_for(vec![background], 4_500).await;

        assert_eq!(task.runs(), 3);
    }
}
