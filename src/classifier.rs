//! Background dispatch of remote classification calls.
//!
//! The [`Classifier`] trait is the contract of the external classification
//! service. [`ClassificationWorker`] runs it on its own thread so the frame
//! thread never waits on the network; responses come back over a channel keyed
//! by item id and are applied by whoever owns the items.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::detection::LabelCandidate;
use crate::error::{ClassifierError, Error};
use crate::item::ItemId;
use crate::thumbnail::Thumbnail;

pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, thumbnail: &Thumbnail) -> Result<Vec<LabelCandidate>, ClassifierError>;
}

impl<F> Classifier for F
where
    F: Fn(&Thumbnail) -> Result<Vec<LabelCandidate>, ClassifierError> + Send + Sync + 'static,
{
    #[inline]
    fn classify(&self, thumbnail: &Thumbnail) -> Result<Vec<LabelCandidate>, ClassifierError> {
        self(thumbnail)
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub item: ItemId,
    pub thumbnail: Thumbnail,
}

#[derive(Debug)]
pub struct ClassificationResponse {
    pub item: ItemId,
    pub outcome: Result<Vec<LabelCandidate>, ClassifierError>,
}

/// Owns the classification thread.
///
/// Dropping the worker discards queued requests. A call already running is
/// allowed to finish, so the drop blocks for at most one classification.
pub struct ClassificationWorker {
    jobs: Option<Sender<ClassificationRequest>>,
    shutdown: Arc<AtomicBool>,
    results: Receiver<ClassificationResponse>,
    handle: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl ClassificationWorker {
    pub fn spawn(classifier: Arc<dyn Classifier>) -> Result<Self, Error> {
        let (job_tx, job_rx) = mpsc::channel::<ClassificationRequest>();
        let (result_tx, result_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();

        let handle = std::thread::Builder::new()
            .name("classification-worker".into())
            .spawn(move || {
                tracing::info!("Classification worker started");

                for request in job_rx {
                    if stop.load(Ordering::Acquire) {
                        tracing::debug!(
                            item = %request.item,
                            "Discarding queued requests on shutdown"
                        );
                        break;
                    }

                    let outcome = classifier.classify(&request.thumbnail);
                    let response = ClassificationResponse {
                        item: request.item,
                        outcome,
                    };

                    if result_tx.send(response).is_err() {
                        break;
                    }
                }

                tracing::info!("Classification worker stopped");
            })?;

        Ok(Self {
            jobs: Some(job_tx),
            shutdown,
            results: result_rx,
            handle: Some(handle),
            in_flight: 0,
        })
    }

    pub fn submit(&mut self, request: ClassificationRequest) -> Result<(), Error> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or(Error::WorkerGone("worker already shut down"))?;

        jobs.send(request)
            .map_err(|_| Error::WorkerGone("job channel closed"))?;
        self.in_flight += 1;

        Ok(())
    }

    /// Responses that are ready right now, without blocking.
    pub fn drain(&mut self) -> Vec<ClassificationResponse> {
        let mut ready = Vec::new();

        loop {
            match self.results.try_recv() {
                Ok(response) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    ready.push(response);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.in_flight > 0 {
                        tracing::warn!(
                            lost = self.in_flight,
                            "Classification worker exited with requests in flight"
                        );
                        self.in_flight = 0;
                    }
                    break;
                }
            }
        }

        ready
    }

    /// Blocks until every submitted request has been answered.
    pub fn wait_all(&mut self) -> Result<Vec<ClassificationResponse>, Error> {
        let mut ready = Vec::with_capacity(self.in_flight);

        while self.in_flight > 0 {
            match self.results.recv() {
                Ok(response) => {
                    self.in_flight -= 1;
                    ready.push(response);
                }
                Err(_) => {
                    self.in_flight = 0;
                    return Err(Error::WorkerGone("result channel closed"));
                }
            }
        }

        Ok(ready)
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for ClassificationWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.jobs.take();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Classification worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn answers_every_request() {
        let classifier = |thumb: &Thumbnail| -> Result<Vec<LabelCandidate>, ClassifierError> {
            Ok(vec![LabelCandidate::new("mug", thumb.len() as f32 / 10.0)])
        };
        let mut worker = ClassificationWorker::spawn(Arc::new(classifier)).unwrap();

        for i in 1..=3u64 {
            worker
                .submit(ClassificationRequest {
                    item: ItemId(i),
                    thumbnail: Thumbnail::from(vec![0u8; i as usize]),
                })
                .unwrap();
        }
        assert_eq!(worker.in_flight(), 3);

        let mut responses = worker.wait_all().unwrap();
        responses.sort_by_key(|r| r.item);

        assert_eq!(worker.in_flight(), 0);
        assert_eq!(responses.len(), 3);
        let labels = responses[2].outcome.as_ref().unwrap();
        assert!((labels[0].confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn classifier_errors_are_delivered() {
        let classifier = |_: &Thumbnail| -> Result<Vec<LabelCandidate>, ClassifierError> {
            Err(ClassifierError::Timeout(200))
        };
        let mut worker = ClassificationWorker::spawn(Arc::new(classifier)).unwrap();

        worker
            .submit(ClassificationRequest {
                item: ItemId(1),
                thumbnail: Thumbnail::from(vec![1]),
            })
            .unwrap();

        let responses = worker.wait_all().unwrap();
        assert!(matches!(
            responses[0].outcome,
            Err(ClassifierError::Timeout(200))
        ));
    }

    #[test]
    fn drop_discards_queued_requests() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let counter = calls.clone();
        let classifier = move |_: &Thumbnail| -> Result<Vec<LabelCandidate>, ClassifierError> {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.lock().map(|rx| rx.recv());
            Ok(Vec::new())
        };
        let mut worker = ClassificationWorker::spawn(Arc::new(classifier)).unwrap();

        for i in 1..=4u64 {
            worker
                .submit(ClassificationRequest {
                    item: ItemId(i),
                    thumbnail: Thumbnail::from(vec![1]),
                })
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::yield_now();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let _ = release_tx.send(());
        });

        drop(worker);
        releaser.join().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drain_is_non_blocking() {
        let classifier =
            |_: &Thumbnail| -> Result<Vec<LabelCandidate>, ClassifierError> { Ok(Vec::new()) };
        let mut worker = ClassificationWorker::spawn(Arc::new(classifier)).unwrap();

        assert!(worker.drain().is_empty());
        assert!(worker.wait_all().unwrap().is_empty());
    }
}
