pub mod tasks;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};
use uuid::Uuid;

/// Background maintenance jobs (heartbeat, stream status) on cron schedules
pub struct Scheduler {
    inner: JobScheduler,
    jobs: Mutex<Vec<(String, Uuid)>>,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self {
            inner,
            jobs: Mutex::new(Vec::new()),
        })
    }

    /// Add a recurring job. `cron_expr` has six fields, seconds first.
    pub async fn add_cron_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<Uuid>
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |id, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                debug!("Job '{}' ({}) firing", name, id);
                fut.await;
            })
        })
        .with_context(|| format!("Invalid cron expression for job '{}': {}", name, cron_expr))?;

        let id = self
            .inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job '{}'", name))?;

        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push((name.to_string(), id));
        }
        info!("Scheduled job '{}' ({}) with cron: {}", name, id, cron_expr);
        Ok(id)
    }

    /// Names of the registered jobs, in registration order
    pub fn job_names(&self) -> Vec<String> {
        self.jobs
            .lock()
            .map(|jobs| jobs.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started with jobs: {:?}", self.job_names());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
