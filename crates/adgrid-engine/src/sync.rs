// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    NotSyncing,
    Syncing {
        polls: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTransition {
    Unchanged,
    Started,
    /// Sync finished: refetch the root page once and refresh charts.
    Completed,
    /// Status poll failed; polling stops without a refetch.
    Failed,
}

/// Sync progress for one top-level entity.
#[derive(Debug, Clone, Default)]
pub struct SyncMachine {
    state: SyncState,
    last_sync_date: Option<String>,
    poll_in_flight: bool,
}

impl SyncMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self.state, SyncState::Syncing { .. })
    }

    pub fn last_sync_date(&self) -> Option<&str> {
        self.last_sync_date.as_deref()
    }

    pub fn trigger(&mut self) -> SyncTransition {
        self.start()
    }

    /// Folds the sync fields of a root response into the machine.
    pub fn observe_load(
        &mut self,
        is_sync_in_progress: Option<bool>,
        last_sync_date: Option<String>,
    ) -> SyncTransition {
        if last_sync_date.is_some() {
            self.last_sync_date = last_sync_date;
        }
        match is_sync_in_progress {
            Some(true) => self.start(),
            Some(false) | None => SyncTransition::Unchanged,
        }
    }

    /// Claims the next poll slot; false while not syncing or while a poll is
    /// still outstanding.
    pub fn poll_due(&mut self) -> bool {
        if !self.is_syncing() || self.poll_in_flight {
            return false;
        }
        self.poll_in_flight = true;
        true
    }

    pub fn on_poll_result(&mut self, result: Result<bool, String>) -> SyncTransition {
        self.poll_in_flight = false;
        let SyncState::Syncing { polls } = self.state else {
            return SyncTransition::Unchanged;
        };
        match result {
            Ok(true) => {
                self.state = SyncState::Syncing { polls: polls + 1 };
                SyncTransition::Unchanged
            }
            Ok(false) => {
                self.state = SyncState::NotSyncing;
                SyncTransition::Completed
            }
            Err(_) => {
                self.state = SyncState::NotSyncing;
                SyncTransition::Failed
            }
        }
    }

    pub fn stop(&mut self) {
        self.state = SyncState::NotSyncing;
        self.poll_in_flight = false;
    }

    fn start(&mut self) -> SyncTransition {
        if self.is_syncing() {
            return SyncTransition::Unchanged;
        }
        self.state = SyncState::Syncing { polls: 0 };
        SyncTransition::Started
    }
}
