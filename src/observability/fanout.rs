//! Ordered, isolated event delivery to a set of targets.
//!
//! # Responsibilities
//! - Give every target its own delivery lane (queue + worker thread)
//! - Enqueue each published event on every lane, in registration order
//! - Keep delivering after a target panics
//! - Drain and join lanes on close, without waiting forever on a stuck target
//!
//! # Design Decisions
//! - Publishing never blocks: lanes are unbounded queues
//! - A blocking target stalls only its own lane
//! - Lanes run on plain threads because targets are synchronous module code

use std::sync::{PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::resilience::isolation::run_isolated;

struct Lane<E> {
    name: String,
    tx: Option<mpsc::UnboundedSender<E>>,
    worker: Option<JoinHandle<()>>,
}

/// A set of delivery lanes for one module kind.
pub struct Fanout<E> {
    kind: &'static str,
    lanes: RwLock<Vec<Lane<E>>>,
}

impl<E: Clone + Send + 'static> Fanout<E> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            lanes: RwLock::new(Vec::new()),
        }
    }

    /// Register a target. Lanes receive events in the order they were added.
    pub fn add_lane<F>(&self, name: &str, mut deliver: F) -> std::io::Result<()>
    where
        F: FnMut(E) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<E>();
        let kind = self.kind;
        let lane_name = name.to_string();
        let index = self.len();

        let worker = std::thread::Builder::new()
            .name(format!("{kind}-{index}"))
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    if let Err(panic) = run_isolated(|| deliver(event)) {
                        metrics::record_module_failure(kind);
                        tracing::warn!(kind, module = %lane_name, panic = %panic, "Module panicked during delivery");
                    }
                }
            })?;

        self.lanes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Lane {
                name: name.to_string(),
                tx: Some(tx),
                worker: Some(worker),
            });
        Ok(())
    }

    /// Enqueue `event` on every open lane.
    pub fn publish(&self, event: E) {
        let lanes = self.lanes.read().unwrap_or_else(PoisonError::into_inner);
        for lane in lanes.iter() {
            if let Some(tx) = &lane.tx {
                // A closed receiver means the worker is gone; nothing to do.
                let _ = tx.send(event.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting events, let lanes drain, and join their workers.
    ///
    /// Lanes are joined in registration order. A lane still busy when `grace`
    /// expires is detached and reported.
    pub fn close(&self, grace: Duration) {
        let workers: Vec<(String, JoinHandle<()>)> = {
            let mut lanes = self.lanes.write().unwrap_or_else(PoisonError::into_inner);
            lanes
                .iter_mut()
                .filter_map(|lane| {
                    lane.tx = None;
                    lane.worker.take().map(|w| (lane.name.clone(), w))
                })
                .collect()
        };

        let deadline = Instant::now() + grace;
        for (name, worker) in workers {
            while !worker.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(2));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                tracing::warn!(kind = self.kind, module = %name, "Delivery lane still busy at close, detaching");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn delivers_in_order_to_every_lane() {
        let fanout = Fanout::<u32>::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for lane in 0..2u32 {
            let seen = Arc::clone(&seen);
            fanout
                .add_lane(&format!("lane-{lane}"), move |event| {
                    seen.lock().unwrap().push((lane, event));
                })
                .unwrap();
        }

        for event in 0..5 {
            fanout.publish(event);
        }
        fanout.close(Duration::from_secs(2));

        let seen = seen.lock().unwrap();
        for lane in 0..2u32 {
            let events: Vec<u32> = seen.iter().filter(|(l, _)| *l == lane).map(|(_, e)| *e).collect();
            assert_eq!(events, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn panicking_target_does_not_starve_others() {
        let fanout = Fanout::<u32>::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        fanout.add_lane("bad", |_| panic!("boom")).unwrap();
        let sink = Arc::clone(&seen);
        fanout
            .add_lane("good", move |event| sink.lock().unwrap().push(event))
            .unwrap();

        fanout.publish(1);
        fanout.publish(2);
        fanout.close(Duration::from_secs(2));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn stuck_lane_is_detached_at_close() {
        let fanout = Fanout::<u32>::new("test");
        fanout
            .add_lane("stuck", |_| std::thread::sleep(Duration::from_secs(5)))
            .unwrap();
        fanout.publish(1);

        let started = Instant::now();
        fanout.close(Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(2));

        // Publishing after close is a no-op.
        fanout.publish(2);
    }
}
