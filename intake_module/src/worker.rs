use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info};

use crate::event::ChatEvent;
use crate::pipeline::{BatchOutcome, ReportPipeline};

/// Anything that can consume one webhook batch on the worker thread.
pub trait BatchProcessor: Send + 'static {
    fn process_batch(&self, events: Vec<ChatEvent>) -> BatchOutcome;
}

impl BatchProcessor for ReportPipeline {
    fn process_batch(&self, events: Vec<ChatEvent>) -> BatchOutcome {
        ReportPipeline::process_batch(self, events)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    #[error("Channel closed")]
    ChannelClosed,
    #[error("Batch worker panicked")]
    Panicked,
}

/// Sending half of the batch queue. Cheap to clone; submitting never blocks.
#[derive(Debug, Clone)]
pub struct BatchQueue {
    sender: Sender<Vec<ChatEvent>>,
}

impl BatchQueue {
    pub fn submit(&self, batch: Vec<ChatEvent>) -> Result<(), WorkerError> {
        self.sender
            .send(batch)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

/// Handle to the worker thread.
#[derive(Debug)]
pub struct BatchWorker {
    handle: thread::JoinHandle<BatchOutcome>,
}

impl BatchWorker {
    /// Wait for the worker to drain the queue and exit. Only returns once
    /// every [`BatchQueue`] clone has been dropped. Yields the running totals.
    pub fn join(self) -> Result<BatchOutcome, WorkerError> {
        self.handle.join().map_err(|_| WorkerError::Panicked)
    }
}

/// Start the single writer. Batches are processed one at a time in
/// submission order, so no two sheet operations ever interleave.
pub fn spawn_batch_worker<P: BatchProcessor>(processor: P) -> (BatchQueue, BatchWorker) {
    let (sender, receiver) = unbounded::<Vec<ChatEvent>>();
    let handle = thread::spawn(move || run_worker(processor, receiver));
    (BatchQueue { sender }, BatchWorker { handle })
}

fn run_worker<P: BatchProcessor>(processor: P, receiver: Receiver<Vec<ChatEvent>>) -> BatchOutcome {
    info!("Batch worker started");
    let mut totals = BatchOutcome::default();
    for batch in receiver {
        let outcome = processor.process_batch(batch);
        if outcome.failed > 0 {
            error!(
                "Batch finished with {} failed event(s): {:?}",
                outcome.failed, outcome
            );
        } else {
            info!(
                "Batch processed: {} event(s), {} row(s) appended, {} price update(s), {} ignored",
                outcome.events, outcome.rows_appended, outcome.prices_updated, outcome.ignored
            );
        }
        totals.events += outcome.events;
        totals.rows_appended += outcome.rows_appended;
        totals.prices_updated += outcome.prices_updated;
        totals.ignored += outcome.ignored;
        totals.failed += outcome.failed;
    }
    info!("Batch worker stopped");
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSource;
    use std::sync::{Arc, Mutex};

    /// Records batch contents; fails events whose text is "fail".
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl BatchProcessor for Recorder {
        fn process_batch(&self, events: Vec<ChatEvent>) -> BatchOutcome {
            let mut outcome = BatchOutcome::default();
            for event in events {
                let text = event.text_body().unwrap_or_default().to_string();
                outcome.events += 1;
                if text == "fail" {
                    outcome.failed += 1;
                } else {
                    outcome.rows_appended += 1;
                }
                self.seen.lock().expect("lock").push(text);
            }
            outcome
        }
    }

    fn batch(texts: &[&str]) -> Vec<ChatEvent> {
        texts
            .iter()
            .map(|text| ChatEvent::text(EventSource::user("U1"), *text))
            .collect()
    }

    #[test]
    fn batches_are_processed_in_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (queue, worker) = spawn_batch_worker(Recorder { seen: seen.clone() });

        queue.submit(batch(&["a", "b"])).expect("submit 1");
        queue.submit(batch(&["fail"])).expect("submit 2");
        queue.clone().submit(batch(&["c"])).expect("submit 3");
        drop(queue);

        let totals = worker.join().expect("join");
        assert_eq!(totals.events, 4);
        assert_eq!(totals.rows_appended, 3);
        assert_eq!(totals.failed, 1);
        assert_eq!(*seen.lock().expect("lock"), vec!["a", "b", "fail", "c"]);
    }

    #[test]
    fn concurrent_submitters_share_one_writer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (queue, worker) = spawn_batch_worker(Recorder { seen: seen.clone() });

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let text = format!("msg{}", i);
                    queue.submit(batch(&[text.as_str()])).expect("submit");
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread join");
        }
        drop(queue);

        let totals = worker.join().expect("join");
        assert_eq!(totals.events, 5);
        let seen = seen.lock().expect("lock");
        for i in 0..5 {
            assert!(seen.contains(&format!("msg{}", i)), "missing msg{}", i);
        }
    }

    #[test]
    fn submit_fails_once_worker_is_gone() {
        struct Panicker;
        impl BatchProcessor for Panicker {
            fn process_batch(&self, _: Vec<ChatEvent>) -> BatchOutcome {
                panic!("processor blew up");
            }
        }

        let (queue, worker) = spawn_batch_worker(Panicker);
        queue.submit(batch(&["x"])).expect("first submit is accepted");
        assert!(matches!(worker.join(), Err(WorkerError::Panicked)));
        assert!(matches!(
            queue.submit(batch(&["y"])),
            Err(WorkerError::ChannelClosed)
        ));
    }
}
