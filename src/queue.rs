//! Serial work queue.
//!
//! `SerialQueue<S>` runs jobs one at a time, in submission order, on a single
//! named thread that owns `S`. State living inside a queue is only ever
//! touched from that thread, so it needs no lock.

use anyhow::{anyhow, Result};
use std::sync::mpsc;
use std::thread::JoinHandle;

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

pub struct SerialQueue<S> {
    label: String,
    tx: Option<mpsc::Sender<Job<S>>>,
    join: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> SerialQueue<S> {
    /// Spawn the worker thread, moving `state` onto it.
    pub fn spawn(label: &str, state: S) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job<S>>();
        let join = std::thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                let mut state = state;
                for job in rx {
                    job(&mut state);
                }
            })
            .map_err(|e| anyhow!("failed to spawn queue {}: {}", label, e))?;
        Ok(Self {
            label: label.to_string(),
            tx: Some(tx),
            join: Some(join),
        })
    }

    /// Enqueue a job and return immediately.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(Box::new(job)).is_err() {
            log::warn!("queue {} stopped; job dropped", self.label);
        }
    }

    /// Enqueue a job and wait for its result.
    ///
    /// Every job submitted before this one has completed when it returns.
    pub fn run_sync<R, F>(&self, job: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.dispatch(move |state| {
            let _ = tx.send(job(state));
        });
        rx.recv()
            .map_err(|_| anyhow!("queue {} stopped before the job ran", self.label))
    }
}

impl<S> Drop for SerialQueue<S> {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain pending jobs and exit.
        self.tx.take();
        if let Some(join) = self.join.take() {
            if join.thread().id() == std::thread::current().id() {
                return;
            }
            if join.join().is_err() {
                log::error!("queue {} worker panicked", self.label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_run_in_order_on_one_thread() -> Result<()> {
        let queue = SerialQueue::spawn("test.queue", Vec::new())?;
        for i in 0..10 {
            queue.dispatch(move |seen: &mut Vec<u32>| seen.push(i));
        }
        let (seen, name) = queue.run_sync(|seen| {
            (
                seen.clone(),
                std::thread::current().name().map(str::to_string),
            )
        })?;
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(name.as_deref(), Some("test.queue"));
        Ok(())
    }

    #[test]
    fn drop_drains_pending_jobs() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        {
            let queue = SerialQueue::spawn("test.drain", 0u32)?;
            for _ in 0..5 {
                let tx = tx.clone();
                queue.dispatch(move |count| {
                    *count += 1;
                    let _ = tx.send(*count);
                });
            }
        }
        drop(tx);
        assert_eq!(rx.iter().last(), Some(5));
        Ok(())
    }
}
