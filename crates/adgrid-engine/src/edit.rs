// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{BreakdownId, EntityRef, EntityState, StatData, StatMap, StatValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub row: BreakdownId,
    pub field: String,
}

impl CellKey {
    pub fn new(row: BreakdownId, field: impl Into<String>) -> Self {
        Self {
            row,
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub id: u64,
    pub row: BreakdownId,
    pub entity: Option<EntityRef>,
    pub field: String,
    pub value: StatData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveTicket {
    pub id: u64,
    /// Waiting behind an earlier save on the same cell.
    pub queued: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub updated_stats: StatMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateToggle {
    pub row: BreakdownId,
    pub entity: Option<EntityRef>,
    pub state: EntityState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateBatchRequest {
    pub id: u64,
    pub rows: Vec<StateToggle>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateBatchResponse {
    #[serde(default)]
    pub updated: BTreeMap<BreakdownId, StatMap>,
}

/// What the context has to do once a save settles.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveSettled {
    Committed {
        cell: CellKey,
        next: Option<SaveRequest>,
    },
    RolledBack {
        cell: CellKey,
        restore: Option<StatValue>,
        cancelled: Vec<u64>,
    },
}

#[derive(Debug, Clone)]
struct CellSlot {
    committed: Option<StatValue>,
    in_flight: u64,
    sent: StatData,
    queue: VecDeque<SaveRequest>,
}

#[derive(Debug, Clone)]
struct PendingToggle {
    toggle: StateToggle,
    previous: Option<StatValue>,
}

/// Serializes saves per cell and remembers what to restore when one fails.
#[derive(Debug, Clone)]
pub struct EditCoordinator {
    next_id: u64,
    cells: BTreeMap<CellKey, CellSlot>,
    in_flight: HashMap<u64, CellKey>,
    pending_states: Vec<PendingToggle>,
    state_batches: HashMap<u64, Vec<PendingToggle>>,
}

impl Default for EditCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl EditCoordinator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            cells: BTreeMap::new(),
            in_flight: HashMap::new(),
            pending_states: Vec::new(),
            state_batches: HashMap::new(),
        }
    }

    /// Registers a save. Returns the ticket and, when the cell was idle, the
    /// request to dispatch now.
    pub fn submit(
        &mut self,
        cell: CellKey,
        entity: Option<EntityRef>,
        value: StatData,
        current: Option<StatValue>,
    ) -> (SaveTicket, Option<SaveRequest>) {
        let id = self.allocate_id();
        let request = SaveRequest {
            id,
            row: cell.row.clone(),
            entity,
            field: cell.field.clone(),
            value,
        };

        if let Some(slot) = self.cells.get_mut(&cell) {
            debug!(
                id,
                row = %cell.row,
                field = %cell.field,
                "queued save behind in-flight save"
            );
            slot.queue.push_back(request);
            return (SaveTicket { id, queued: true }, None);
        }

        self.in_flight.insert(id, cell.clone());
        self.cells.insert(
            cell,
            CellSlot {
                committed: current,
                in_flight: id,
                sent: request.value.clone(),
                queue: VecDeque::new(),
            },
        );
        (SaveTicket { id, queued: false }, Some(request))
    }

    pub fn has_pending(&self, cell: &CellKey) -> bool {
        self.cells.contains_key(cell)
    }

    pub fn cell_for(&self, id: u64) -> Option<&CellKey> {
        self.in_flight.get(&id)
    }

    pub fn queued_len(&self, cell: &CellKey) -> usize {
        self.cells.get(cell).map_or(0, |slot| slot.queue.len())
    }

    /// Marks save `id` as confirmed. `confirmed` is the value the server
    /// echoed for the cell, if any; otherwise the value that was sent is taken
    /// as confirmed. Either becomes the rollback target for queued saves.
    pub fn commit(&mut self, id: u64, confirmed: Option<StatValue>) -> Option<SaveSettled> {
        let cell = self.in_flight.remove(&id)?;
        let slot = self.cells.get_mut(&cell)?;
        if slot.in_flight != id {
            return None;
        }
        let sent = std::mem::take(&mut slot.sent);
        let confirmed = confirmed.unwrap_or_else(|| StatValue {
            value: sent,
            ..slot.committed.clone().unwrap_or_default()
        });
        slot.committed = Some(confirmed);
        let next = slot.queue.pop_front();
        match &next {
            Some(request) => {
                slot.in_flight = request.id;
                slot.sent = request.value.clone();
                self.in_flight.insert(request.id, cell.clone());
            }
            None => {
                self.cells.remove(&cell);
            }
        }
        Some(SaveSettled::Committed { cell, next })
    }

    /// Marks save `id` as failed; every save queued behind it is cancelled.
    pub fn fail(&mut self, id: u64) -> Option<SaveSettled> {
        let cell = self.in_flight.remove(&id)?;
        let slot = self.cells.remove(&cell)?;
        let cancelled = slot.queue.into_iter().map(|request| request.id).collect();
        Some(SaveSettled::RolledBack {
            cell,
            restore: slot.committed,
            cancelled,
        })
    }

    /// Buffers a state toggle; toggling the same row twice keeps the first
    /// pre-edit value and the latest state.
    pub fn buffer_state(&mut self, toggle: StateToggle, previous: Option<StatValue>) {
        if let Some(existing) = self
            .pending_states
            .iter_mut()
            .find(|pending| pending.toggle.row == toggle.row)
        {
            existing.toggle.state = toggle.state;
            return;
        }
        self.pending_states.push(PendingToggle { toggle, previous });
    }

    pub fn pending_state_count(&self) -> usize {
        self.pending_states.len()
    }

    pub fn flush_states(&mut self) -> Option<StateBatchRequest> {
        if self.pending_states.is_empty() {
            return None;
        }
        let id = self.allocate_id();
        let pending = std::mem::take(&mut self.pending_states);
        let rows = pending
            .iter()
            .map(|pending| pending.toggle.clone())
            .collect();
        self.state_batches.insert(id, pending);
        Some(StateBatchRequest { id, rows })
    }

    /// Rows of a finished batch paired with the value to restore on failure.
    pub fn settle_states(&mut self, id: u64) -> Option<Vec<(BreakdownId, Option<StatValue>)>> {
        self.state_batches.remove(&id).map(|pending| {
            pending
                .into_iter()
                .map(|pending| (pending.toggle.row, pending.previous))
                .collect()
        })
    }

    pub fn reset(&mut self) {
        self.cells.clear();
        self.in_flight.clear();
        self.pending_states.clear();
        self.state_batches.clear();
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
