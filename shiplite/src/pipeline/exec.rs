//! Plan executor.

use super::task::BoxedTask;
use futures::future::try_join_all;
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

/// Tasks grouped under one execution mode.
pub struct Stage<Ctx> {
    pub tasks: Vec<BoxedTask<Ctx>>,
    pub execution: ExecutionMode,
}

impl<Ctx> Stage<Ctx> {
    pub fn sequential(tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self {
            tasks,
            execution: ExecutionMode::Sequential,
        }
    }

    pub fn parallel(tasks: Vec<BoxedTask<Ctx>>) -> Self {
        Self {
            tasks,
            execution: ExecutionMode::Parallel,
        }
    }
}

/// Ordered stages selected from a plan table.
pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<Ctx>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<Ctx>>) -> Self {
        Self { stages }
    }
}

#[derive(Debug, Clone)]
pub struct TaskTiming {
    pub name: &'static str,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct PlanMetrics {
    pub total_duration_ms: u128,
    pub tasks: Vec<TaskTiming>,
}

impl PlanMetrics {
    pub fn task_duration_ms(&self, name: &str) -> Option<u128> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.duration_ms)
    }

    pub fn log_summary(&self) {
        for task in &self.tasks {
            tracing::debug!(task = task.name, duration_ms = %task.duration_ms, "task timing");
        }
        tracing::info!(total_ms = %self.total_duration_ms, "plan finished");
    }
}

/// Run every stage of the plan in order, aborting on the first task error.
pub async fn run_plan<Ctx>(plan: ExecutionPlan<Ctx>, ctx: Ctx) -> ShipliteResult<PlanMetrics>
where
    Ctx: Clone,
{
    let total_start = Instant::now();
    let mut timings = Vec::new();

    for (index, stage) in plan.stages.into_iter().enumerate() {
        tracing::debug!(
            stage = index,
            mode = ?stage.execution,
            tasks = stage.tasks.len(),
            "stage start"
        );

        match stage.execution {
            ExecutionMode::Sequential => {
                for task in stage.tasks {
                    let name = task.name();
                    let start = Instant::now();
                    task.run(ctx.clone()).await?;
                    timings.push(TaskTiming {
                        name,
                        duration_ms: start.elapsed().as_millis(),
                    });
                }
            }
            ExecutionMode::Parallel => {
                let futures = stage.tasks.into_iter().map(|task| {
                    let ctx = ctx.clone();
                    async move {
                        let name = task.name();
                        let start = Instant::now();
                        task.run(ctx).await?;
                        Ok::<TaskTiming, ShipliteError>(TaskTiming {
                            name,
                            duration_ms: start.elapsed().as_millis(),
                        })
                    }
                });
                timings.extend(try_join_all(futures).await?);
            }
        }
    }

    Ok(PlanMetrics {
        total_duration_ms: total_start.elapsed().as_millis(),
        tasks: timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageTask;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct Record(&'static str);

    #[async_trait]
    impl StageTask<Log> for Record {
        async fn run(self: Box<Self>, ctx: Log) -> ShipliteResult<()> {
            ctx.lock().unwrap().push(self.0);
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    struct Fail;

    #[async_trait]
    impl StageTask<Log> for Fail {
        async fn run(self: Box<Self>, _ctx: Log) -> ShipliteResult<()> {
            Err(ShipliteError::Internal("boom".into()))
        }

        fn name(&self) -> &'static str {
            "fail"
        }
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Stage<Log>> = vec![
            Stage::sequential(vec![Box::new(Record("a"))]),
            Stage::parallel(vec![Box::new(Record("b")), Box::new(Record("c"))]),
            Stage::sequential(vec![Box::new(Record("d"))]),
        ];
        let plan = ExecutionPlan::new(stages);

        let metrics = run_plan(plan, Arc::clone(&log)).await.unwrap();

        let entries = log.lock().unwrap().clone();
        assert_eq!(entries[0], "a");
        assert_eq!(entries[3], "d");
        assert!(entries[1..3].contains(&"b") && entries[1..3].contains(&"c"));
        assert_eq!(metrics.tasks.len(), 4);
        assert!(metrics.task_duration_ms("a").is_some());
        assert!(metrics.task_duration_ms("missing").is_none());
    }

    #[tokio::test]
    async fn first_failure_aborts_later_stages() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Stage<Log>> = vec![
            Stage::sequential(vec![Box::new(Fail)]),
            Stage::sequential(vec![Box::new(Record("late"))]),
        ];
        let plan = ExecutionPlan::new(stages);

        assert!(run_plan(plan, Arc::clone(&log)).await.is_err());
        assert!(log.lock().unwrap().is_empty());
    }
}
