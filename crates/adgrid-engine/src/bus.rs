// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{BreakdownId, EntityRef};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::data::BranchKey;
use crate::error::GridError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RowUpdated,
    RowUpdatedError,
    ExtSelectionUpdated,
    ExtCollapseUpdated,
    DataUpdated,
    DataError,
    SyncStateChanged,
    ChartRefreshRequested,
}

impl Topic {
    pub const ALL: [Self; 8] = [
        Self::RowUpdated,
        Self::RowUpdatedError,
        Self::ExtSelectionUpdated,
        Self::ExtCollapseUpdated,
        Self::DataUpdated,
        Self::DataError,
        Self::SyncStateChanged,
        Self::ChartRefreshRequested,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    RowUpdated {
        row: BreakdownId,
    },
    RowUpdatedError {
        row: BreakdownId,
        field: String,
        error: GridError,
    },
    SelectionUpdated,
    CollapseUpdated {
        row: BreakdownId,
        collapsed: bool,
    },
    DataUpdated {
        branch: BranchKey,
    },
    DataError {
        branch: BranchKey,
        message: String,
    },
    SyncStateChanged {
        entity: EntityRef,
        syncing: bool,
    },
    ChartRefreshRequested {
        entity: EntityRef,
    },
}

impl GridEvent {
    pub const fn topic(&self) -> Topic {
        match self {
            Self::RowUpdated { .. } => Topic::RowUpdated,
            Self::RowUpdatedError { .. } => Topic::RowUpdatedError,
            Self::SelectionUpdated => Topic::ExtSelectionUpdated,
            Self::CollapseUpdated { .. } => Topic::ExtCollapseUpdated,
            Self::DataUpdated { .. } => Topic::DataUpdated,
            Self::DataError { .. } => Topic::DataError,
            Self::SyncStateChanged { .. } => Topic::SyncStateChanged,
            Self::ChartRefreshRequested { .. } => Topic::ChartRefreshRequested,
        }
    }
}

struct Subscriber {
    topics: Vec<Topic>,
    tx: Sender<GridEvent>,
}

/// Typed publish/subscribe hub owned by one grid. Subscribers whose receiver
/// was dropped are pruned on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, topics: &[Topic]) -> Receiver<GridEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(Subscriber {
            topics: topics.to_vec(),
            tx,
        });
        rx
    }

    pub fn subscribe_all(&mut self) -> Receiver<GridEvent> {
        self.subscribe(&Topic::ALL)
    }

    pub fn publish(&mut self, event: GridEvent) {
        let topic = event.topic();
        self.subscribers.retain(|subscriber| {
            if !subscriber.topics.contains(&topic) {
                return true;
            }
            subscriber.tx.send(event.clone()).is_ok()
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
