// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::EntityRef;
use anyhow::{Result, anyhow};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::context::{GridContext, Outbound};
use crate::data::{FetchRequest, FetchResponse};
use crate::edit::{SaveRequest, SaveResponse, StateBatchRequest, StateBatchResponse};
use crate::error::SaveFailure;
use crate::sync::DEFAULT_POLL_INTERVAL;

/// Finished backend work, delivered back to the grid in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Fetch {
        seq: u64,
        result: Result<FetchResponse, String>,
    },
    Save {
        id: u64,
        result: Result<SaveResponse, SaveFailure>,
    },
    StateBatch {
        id: u64,
        result: Result<StateBatchResponse, SaveFailure>,
    },
    SyncPoll {
        result: Result<bool, String>,
    },
    SyncTriggered {
        result: Result<(), String>,
    },
    SyncPollDue,
}

/// Server side of a grid. Implementations that do real I/O off-thread
/// override [`GridBackend::spawn`]; the default runs the job inline.
pub trait GridBackend {
    fn fetch_breakdown(&mut self, request: &FetchRequest) -> Result<FetchResponse>;
    fn save_stat(&mut self, request: &SaveRequest) -> Result<SaveResponse, SaveFailure>;
    fn save_state_batch(
        &mut self,
        request: &StateBatchRequest,
    ) -> Result<StateBatchResponse, SaveFailure>;
    fn sync_status(&mut self, entity: EntityRef) -> Result<bool>;
    fn trigger_sync(&mut self, entity: EntityRef) -> Result<()>;

    fn execute(&mut self, job: Outbound) -> Completion {
        match job {
            Outbound::Fetch(request) => Completion::Fetch {
                seq: request.seq,
                result: self
                    .fetch_breakdown(&request)
                    .map_err(|error| format!("{error:#}")),
            },
            Outbound::Save(request) => Completion::Save {
                id: request.id,
                result: self.save_stat(&request),
            },
            Outbound::StateBatch(request) => Completion::StateBatch {
                id: request.id,
                result: self.save_state_batch(&request),
            },
            Outbound::SyncPoll(entity) => Completion::SyncPoll {
                result: self
                    .sync_status(entity)
                    .map_err(|error| format!("{error:#}")),
            },
            Outbound::TriggerSync(entity) => Completion::SyncTriggered {
                result: self
                    .trigger_sync(entity)
                    .map_err(|error| format!("{error:#}")),
            },
        }
    }

    fn spawn(&mut self, job: Outbound, tx: Sender<Completion>) -> Result<()> {
        let completion = self.execute(job);
        tx.send(completion)
            .map_err(|_| anyhow!("grid completion channel closed"))?;
        Ok(())
    }
}

/// Background ticker that asks for a sync status poll every `interval`.
#[derive(Debug)]
struct PollTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PollTimer {
    fn start(interval: Duration, tx: Sender<Completion>) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if tx.send(Completion::SyncPollDue).is_err() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("sync poll timer thread panicked");
        }
    }
}

/// Drives a [`GridContext`] against a [`GridBackend`].
pub struct GridRuntime<B: GridBackend> {
    context: GridContext,
    backend: B,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    poll_interval: Option<Duration>,
    poll_timer: Option<PollTimer>,
}

impl<B: GridBackend> GridRuntime<B> {
    pub fn new(context: GridContext, backend: B) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            context,
            backend,
            tx,
            rx,
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            poll_timer: None,
        }
    }

    /// `None` disables the background timer; polls then only happen through
    /// [`GridRuntime::poll_sync_now`].
    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self.poll_timer = None;
        self
    }

    pub fn context(&self) -> &GridContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut GridContext {
        &mut self.context
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sender(&self) -> Sender<Completion> {
        self.tx.clone()
    }

    /// Hands every queued job to the backend.
    pub fn flush(&mut self) -> Result<usize> {
        let jobs = self.context.take_outbound();
        let count = jobs.len();
        for job in jobs {
            self.backend.spawn(job, self.tx.clone())?;
        }
        Ok(count)
    }

    /// Applies every completion that has already arrived.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.rx.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        self.reconcile_timers();
        applied
    }

    /// Waits up to `timeout` for one completion and applies it.
    pub fn pump_blocking(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.apply(completion);
                self.pump();
                true
            }
            Err(_) => false,
        }
    }

    /// Flushes and pumps until no work is queued and nothing is waiting.
    pub fn run_until_idle(&mut self) -> Result<()> {
        loop {
            let sent = self.flush()?;
            let applied = self.pump();
            if sent == 0 && applied == 0 && !self.context.has_outbound() {
                return Ok(());
            }
        }
    }

    /// Runs one status poll right away when a sync is in progress.
    pub fn poll_sync_now(&mut self) -> Result<bool> {
        let due = self.context.sync_poll_due();
        self.run_until_idle()?;
        Ok(due)
    }

    pub fn is_polling(&self) -> bool {
        self.poll_timer.is_some()
    }

    pub fn stop_polling(&mut self) {
        self.poll_timer = None;
        self.context.stop_polling();
    }

    pub fn teardown(&mut self) {
        self.poll_timer = None;
        self.context.teardown();
        while self.rx.try_recv().is_ok() {}
    }

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Fetch { seq, result } => self.context.complete_fetch(seq, result),
            Completion::Save { id, result } => self.context.complete_save(id, result),
            Completion::StateBatch { id, result } => {
                self.context.complete_state_batch(id, result);
            }
            Completion::SyncPoll { result } => self.context.complete_sync_poll(result),
            Completion::SyncTriggered { result } => self.context.complete_sync_trigger(result),
            Completion::SyncPollDue => {
                self.context.sync_poll_due();
            }
        }
    }

    fn reconcile_timers(&mut self) {
        match (self.context.is_syncing(), self.poll_timer.is_some()) {
            (true, false) => {
                if let Some(interval) = self.poll_interval {
                    debug!(?interval, "starting sync poll timer");
                    self.poll_timer = Some(PollTimer::start(interval, self.tx.clone()));
                }
            }
            (false, true) => {
                debug!("stopping sync poll timer");
                self.poll_timer = None;
            }
            _ => {}
        }
    }
}

impl<B: GridBackend> Drop for GridRuntime<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
