//! Background maintenance on a fixed interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use super::MaintenanceReport;
use crate::error::Result;

/// Starts maintenance threads.
pub struct MaintenanceScheduler;

impl MaintenanceScheduler {
    /// Run `cycle` every `interval` on a named thread until the handle is
    /// stopped or dropped. The stop flag handed to `cycle` is raised on stop,
    /// so a running cycle ends at its next sub-pass boundary.
    pub fn start<F>(interval: Duration, mut cycle: F) -> Result<SchedulerHandle>
    where
        F: FnMut(&AtomicBool) -> Result<MaintenanceReport> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (wake, signal) = mpsc::channel::<()>();
        let flag = stop.clone();

        let thread = thread::Builder::new()
            .name("cortex-maintenance".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs_f64(), "maintenance scheduler started");
                loop {
                    match signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    match cycle(&flag) {
                        Ok(report) if report.interrupted => break,
                        Ok(report) => debug!(noop = report.is_noop(), "scheduled cycle finished"),
                        Err(e) => error!(error = %e, "scheduled maintenance cycle failed"),
                    }
                }
                info!("maintenance scheduler stopped");
            })?;

        Ok(SchedulerHandle {
            stop,
            wake,
            thread: Some(thread),
        })
    }
}

/// Owns a running scheduler thread.
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    wake: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the scheduler and wait for its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        // The thread may already be gone.
        let _ = self.wake.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("maintenance thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_runs_cycles_until_stopped() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let counter = cycles.clone();

        let handle = MaintenanceScheduler::start(Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(MaintenanceReport::default())
        })
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while cycles.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_running());
        handle.stop();

        let after_stop = cycles.load(Ordering::SeqCst);
        assert!(after_stop >= 3);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cycles.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_drop_stops_long_interval() {
        let handle = MaintenanceScheduler::start(Duration::from_secs(3600), |_| {
            Ok(MaintenanceReport::default())
        })
        .unwrap();

        let started = std::time::Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
