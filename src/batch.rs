use crate::{
    config::BatchConfig,
    error::{internal_error, validation_error, AppError},
    features::FeatureExtractor,
    probe::{NetworkProbe, ReputationProbe},
    types::FeatureVector,
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::{debug, info, warn};

/// Stops a running batch from dispatching further URLs.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// One vector per input URL, in input order.
    pub vectors: Vec<FeatureVector>,
    /// Indices that ended up with the all-zero fallback vector.
    pub fallbacks: usize,
}

pub struct BatchExtractor<P = NetworkProbe> {
    extractor: Arc<FeatureExtractor<P>>,
    concurrency: usize,
}

impl<P: ReputationProbe> BatchExtractor<P> {
    pub fn new(extractor: Arc<FeatureExtractor<P>>, concurrency: usize) -> Result<Self, AppError> {
        if concurrency == 0 {
            return Err(validation_error("batch concurrency must be at least 1"));
        }
        Ok(Self {
            extractor,
            concurrency,
        })
    }

    pub fn from_config(
        extractor: Arc<FeatureExtractor<P>>,
        config: &BatchConfig,
    ) -> Result<Self, AppError> {
        Self::new(extractor, config.concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn extract_all(&self, urls: &[String]) -> Result<BatchOutput, AppError> {
        self.extract_all_with_cancel(urls, &CancelHandle::new()).await
    }

    pub async fn extract_all_with_cancel(
        &self,
        urls: &[String],
        cancel: &CancelHandle,
    ) -> Result<BatchOutput, AppError> {
        let start = Instant::now();
        let extractor = &self.extractor;

        let vectors = dispatch_ordered(
            urls.to_vec(),
            self.concurrency,
            cancel,
            |url| {
                let extractor = Arc::clone(extractor);
                async move { extractor.extract(&url).await }
            },
            FeatureVector::fallback,
        )
        .await?;

        let fallbacks = vectors.iter().filter(|v| v.is_fallback()).count();
        info!(
            "Extracted features for {} URLs ({} fallback vectors) in {:.1}s",
            vectors.len(),
            fallbacks,
            start.elapsed().as_secs_f64()
        );

        Ok(BatchOutput { vectors, fallbacks })
    }
}

/// Runs `task` over `inputs` with at most `limit` tasks in flight and returns
/// the results in input order. A task that panics or is aborted yields
/// `fallback()` at its index.
pub(crate) async fn dispatch_ordered<T, R, F, Fut>(
    inputs: Vec<T>,
    limit: usize,
    cancel: &CancelHandle,
    task: F,
    fallback: fn() -> R,
) -> Result<Vec<R>, AppError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = inputs.len();
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles: Vec<JoinHandle<R>> = Vec::with_capacity(total);

    for input in inputs {
        if cancel.is_cancelled() {
            break;
        }
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|_| internal_error("batch semaphore closed"))?;
        // Cancellation may have arrived while waiting for a slot
        if cancel.is_cancelled() {
            break;
        }

        let future = task(input);
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            future.await
        }));
    }

    let dispatched = handles.len();
    let mut results = Vec::with_capacity(dispatched);
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(result) => {
                debug!("Batch item {}/{} complete", index + 1, total);
                results.push(result);
            }
            Err(e) => {
                warn!("Batch item {} failed, substituting fallback: {}", index, e);
                results.push(fallback());
            }
        }
    }

    if dispatched < total {
        return Err(AppError::Cancelled { dispatched, total });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let inputs: Vec<u64> = (0..20).collect();
        let results = dispatch_ordered(
            inputs,
            4,
            &CancelHandle::new(),
            |n| async move {
                // Later items finish first
                tokio::time::sleep(Duration::from_millis(40 - 2 * n)).await;
                n * 10
            },
            || 0,
        )
        .await
        .unwrap();

        assert_eq!(results, (0..20).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_item_gets_fallback() {
        let results = dispatch_ordered(
            vec![1, 2, 3],
            2,
            &CancelHandle::new(),
            |n: i32| async move {
                if n == 2 {
                    panic!("bad item");
                }
                n
            },
            || -1,
        )
        .await
        .unwrap();

        assert_eq!(results, vec![1, -1, 3]);
    }

    #[tokio::test]
    async fn test_in_flight_tasks_never_exceed_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        dispatch_ordered(
            (0..30).collect::<Vec<u32>>(),
            3,
            &CancelHandle::new(),
            |_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            },
            || (),
        )
        .await
        .unwrap();

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {}", peak);
    }

    #[tokio::test]
    async fn test_cancel_stops_dispatch() {
        let cancel = CancelHandle::new();
        let trigger = cancel.clone();

        let result = dispatch_ordered(
            (0..50).collect::<Vec<u32>>(),
            1,
            &cancel,
            move |n| {
                if n == 4 {
                    trigger.cancel();
                }
                async move { n }
            },
            || 0,
        )
        .await;

        match result {
            Err(AppError::Cancelled { dispatched, total }) => {
                assert_eq!(dispatched, 5);
                assert_eq!(total, 50);
            }
            other => panic!("expected cancellation, got {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results = dispatch_ordered(
            Vec::<u8>::new(),
            10,
            &CancelHandle::new(),
            |n| async move { n },
            || 0,
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }
}
