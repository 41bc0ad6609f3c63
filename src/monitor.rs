//! Heartbeat and memory watch for a running stage phase.
//!
//! Martian considers a job dead when its `heartbeat` journal goes stale, so
//! a background thread refreshes it for as long as the stage runs.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::metadata::Journal;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

pub struct Monitor {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Start the monitor thread. `mem_gb` is the allocation to warn against.
    pub fn start(journal: Journal, interval: Duration, mem_gb: usize) -> Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("martian-monitor".into())
            .spawn(move || {
                let pid = sysinfo::get_current_pid().ok();
                let mut sys = System::new();
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = journal.update("heartbeat") {
                                warn!("Failed to write heartbeat: {e:#}");
                            }
                            if let Some(pid) = pid {
                                check_memory(&mut sys, pid, mem_gb);
                            }
                        }
                        // Stop requested, or the Monitor was dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("Failed to spawn monitor thread")?;
        Ok(Monitor {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Monitor thread panicked");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_memory(sys: &mut System, pid: Pid, mem_gb: usize) {
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    let Some(process) = sys.process(pid) else {
        return;
    };
    let rss = process.memory();
    debug!("resident memory: {} MB", rss / (1024 * 1024));
    let limit = mem_gb as u64 * BYTES_PER_GB;
    if limit > 0 && rss > limit {
        warn!(
            "resident memory {:.2} GB exceeds the {mem_gb} GB allocated to this job",
            rss as f64 / BYTES_PER_GB as f64
        );
    }
}
