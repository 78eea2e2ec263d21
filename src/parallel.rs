use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::{ButterflyError, Result};

/// Executes tasks in parallel with a specified concurrency limit
#[derive(Debug, Clone)]
pub struct ParallelProcessor {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

impl ParallelProcessor {
    /// Creates a new parallel processor with the specified concurrency limit
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Concurrency limit in effect
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs every future to completion and returns their results in input
    /// order. A failing future never cancels the others; a panicking one is
    /// reported as [`ButterflyError::Aggregation`].
    pub async fn process<F, T>(&self, tasks: Vec<F>) -> Vec<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let semaphore = self.semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ButterflyError::Aggregation(e.to_string()))?;
                task.await
            }));
        }

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(ButterflyError::Aggregation(format!("task panicked: {}", e))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    type BoxedTask<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

    fn boxed<T>(fut: impl Future<Output = Result<T>> + Send + 'static) -> BoxedTask<T> {
        Box::pin(fut)
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let processor = ParallelProcessor::new(3);
        let make_task = |duration: u64, value: i32| async move {
            sleep(Duration::from_millis(duration)).await;
            Ok(value)
        };

        let tasks = vec![
            boxed(make_task(40, 1)),
            boxed(make_task(10, 2)),
            boxed(make_task(30, 3)),
            boxed(make_task(5, 4)),
        ];

        let results: Vec<i32> = processor
            .process(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_affect_others() {
        let processor = ParallelProcessor::new(2);
        let tasks = vec![
            boxed(async { Ok(1) }),
            boxed(async { Err(ButterflyError::new("Test error")) }),
            boxed(async { Ok(3) }),
        ];

        let results = processor.process(tasks).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let processor = ParallelProcessor::new(2);
        assert_eq!(processor.max_concurrent(), 2);
        assert_eq!(ParallelProcessor::new(0).max_concurrent(), 1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                boxed(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        processor.process(tasks).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panics_become_aggregation_errors() {
        let processor = ParallelProcessor::new(1);
        let tasks = vec![boxed(async {
            if true {
                panic!("boom");
            }
            Ok(())
        })];

        let results = processor.process(tasks).await;
        assert!(matches!(results[0], Err(ButterflyError::Aggregation(_))));
    }
}
