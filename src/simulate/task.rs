use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, TryRecvError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus<T> {
    Pending,
    Succeeded(T),
    Failed(String),
}

impl<T> TaskStatus<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}

impl<T> From<Result<T, String>> for TaskStatus<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(value) => TaskStatus::Succeeded(value),
            Err(message) => TaskStatus::Failed(message),
        }
    }
}

/// Handle to work running on a background thread. The worker reports once
/// over a single-slot channel. Dropping the handle abandons the result; the
/// work itself is not cancelled.
pub struct Task<T> {
    rx: Option<Receiver<Result<T, String>>>,
    status: TaskStatus<T>,
}

impl<T: Send + 'static> Task<T> {
    pub fn spawn<F>(name: &str, delay: Duration, work: F) -> Self
    where
        F: FnOnce() -> Result<T, String> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let name = name.to_string();
        thread::spawn(move || {
            debug!("{} started", name);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            // The receiver may already be gone; nobody is waiting then.
            let _ = tx.send(work());
            debug!("{} finished", name);
        });
        Self {
            rx: Some(rx),
            status: TaskStatus::Pending,
        }
    }
}

impl<T> Task<T> {
    /// Non-blocking check for the outcome.
    pub fn poll(&mut self) -> &TaskStatus<T> {
        if let Some(rx) = &self.rx {
            match rx.try_recv() {
                Ok(result) => {
                    self.status = result.into();
                    self.rx = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.status = TaskStatus::Failed("worker stopped without a result".to_string());
                    self.rx = None;
                }
            }
        }
        &self.status
    }

    /// Blocks until the worker reports.
    pub fn wait(mut self) -> TaskStatus<T> {
        if let Some(rx) = self.rx.take() {
            self.status = match rx.recv() {
                Ok(result) => result.into(),
                Err(_) => TaskStatus::Failed("worker stopped without a result".to_string()),
            };
        }
        self.status
    }

    pub fn is_pending(&mut self) -> bool {
        self.poll().is_pending()
    }
}
