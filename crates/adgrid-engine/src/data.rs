// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{
    BreakdownId, BreakdownLevel, DateRange, EntityRef, RowData, SortDirection, StatMap,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::tree::NewRow;

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParentKey {
    Root,
    Row(BreakdownId),
}

impl ParentKey {
    pub fn breakdown_id(&self) -> Option<&BreakdownId> {
        match self {
            Self::Root => None,
            Self::Row(id) => Some(id),
        }
    }
}

/// One list of siblings: the children of `parent` at `level`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchKey {
    pub parent: ParentKey,
    pub level: BreakdownLevel,
}

impl BranchKey {
    pub fn root(level: BreakdownLevel) -> Self {
        Self {
            parent: ParentKey::Root,
            level,
        }
    }

    pub fn under(parent: BreakdownId, level: BreakdownLevel) -> Self {
        Self {
            parent: ParentKey::Row(parent),
            level,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent == ParentKey::Root
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub branch: BranchKey,
    pub offset: usize,
    pub page_size: usize,
    pub sort_field: Option<String>,
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
    pub page_size: usize,
    pub total_count: Option<usize>,
    pub loaded_count: usize,
}

impl Cursor {
    pub fn has_more(&self) -> bool {
        self.total_count
            .is_some_and(|total| self.loaded_count < total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchState {
    Idle,
    Loading,
    Loaded,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
}

/// Everything a backend needs to serve one breakdown page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub seq: u64,
    pub key: FetchKey,
    pub query: QueryParams,
    pub entity: Option<EntityRef>,
    pub levels: Vec<BreakdownLevel>,
}

impl FetchRequest {
    pub fn parent_id(&self) -> Option<&BreakdownId> {
        self.key.branch.parent.breakdown_id()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
    #[serde(default)]
    pub stats: StatMap,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub in_group: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub rows: Vec<FetchedRow>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<StatMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sync_in_progress: Option<bool>,
}

impl FetchResponse {
    pub fn into_new_rows(self, level: BreakdownLevel) -> Vec<NewRow> {
        self.rows
            .into_iter()
            .map(|row| NewRow {
                id: row_id(level, &row.id),
                breakdown: level,
                entity: row.entity,
                data: RowData {
                    stats: row.stats,
                    archived: row.archived,
                },
                in_group: row.in_group,
            })
            .collect()
    }
}

/// Sibling-unique row id: `<level>:<entity-or-key>`.
pub fn row_id(level: BreakdownLevel, raw_id: &str) -> String {
    format!("{}:{raw_id}", level.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub coalesced: bool,
}

#[derive(Debug, Clone)]
struct InFlight {
    key: FetchKey,
    query: QueryParams,
}

#[derive(Debug, Clone)]
struct Branch {
    state: BranchState,
    cursor: Cursor,
}

/// Tracks what has been requested, what is still in flight, and how far
/// each branch has been paged.
#[derive(Debug, Clone)]
pub struct DataService {
    page_size: usize,
    sort_field: Option<String>,
    sort_direction: SortDirection,
    query: QueryParams,
    next_seq: u64,
    latest: HashMap<FetchKey, u64>,
    in_flight: HashMap<u64, InFlight>,
    branches: HashMap<BranchKey, Branch>,
}

impl DataService {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            sort_field: None,
            sort_direction: SortDirection::default(),
            query: QueryParams::default(),
            next_seq: 1,
            latest: HashMap::new(),
            in_flight: HashMap::new(),
            branches: HashMap::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn order(&self) -> (Option<&str>, SortDirection) {
        (self.sort_field.as_deref(), self.sort_direction)
    }

    pub fn set_order(&mut self, field: Option<String>, direction: SortDirection) {
        self.sort_field = field;
        self.sort_direction = direction;
    }

    pub fn branch_state(&self, branch: &BranchKey) -> BranchState {
        self.branches
            .get(branch)
            .map_or(BranchState::Idle, |entry| entry.state.clone())
    }

    pub fn cursor(&self, branch: &BranchKey) -> Option<Cursor> {
        self.branches.get(branch).map(|entry| entry.cursor)
    }

    pub fn next_offset(&self, branch: &BranchKey) -> usize {
        self.cursor(branch).map_or(0, |cursor| cursor.loaded_count)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn fetch_key(&self, branch: BranchKey, offset: usize) -> FetchKey {
        FetchKey {
            branch,
            offset,
            page_size: self.page_size,
            sort_field: self.sort_field.clone(),
            sort_direction: self.sort_direction,
        }
    }

    /// Registers a fetch. An identical request already in flight for the
    /// same query is reused unless `force` is set.
    pub fn begin(&mut self, key: FetchKey, force: bool) -> FetchTicket {
        if !force
            && let Some(&seq) = self.latest.get(&key)
            && self
                .in_flight
                .get(&seq)
                .is_some_and(|pending| pending.query == self.query)
        {
            debug!(seq, offset = key.offset, "coalesced breakdown fetch");
            return FetchTicket {
                seq,
                coalesced: true,
            };
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.latest.insert(key.clone(), seq);
        self.in_flight.insert(
            seq,
            InFlight {
                key: key.clone(),
                query: self.query.clone(),
            },
        );
        let page_size = self.page_size;
        let branch = self
            .branches
            .entry(key.branch.clone())
            .or_insert_with(|| Branch {
                state: BranchState::Idle,
                cursor: Cursor {
                    offset: 0,
                    page_size,
                    total_count: None,
                    loaded_count: 0,
                },
            });
        branch.state = BranchState::Loading;
        debug!(
            seq,
            offset = key.offset,
            level = key.branch.level.as_str(),
            "issued breakdown fetch"
        );
        FetchTicket {
            seq,
            coalesced: false,
        }
    }

    /// Claims the response for `seq`. Returns `None` when a newer request for
    /// the same key was issued since, or a reset made it obsolete. Once the
    /// latest request for a key is claimed the key is no longer tracked;
    /// older responses still in flight then find no entry and are dropped.
    pub fn accept(&mut self, seq: u64) -> Option<FetchKey> {
        let Some(pending) = self.in_flight.remove(&seq) else {
            warn!(seq, "dropping response for a request issued before reset");
            return None;
        };
        if self.latest.get(&pending.key) != Some(&seq) {
            warn!(seq, offset = pending.key.offset, "dropping stale breakdown response");
            return None;
        }
        self.latest.remove(&pending.key);
        Some(pending.key)
    }

    /// Marks the page for `key` merged; `loaded_count` is how many rows the
    /// branch holds afterwards.
    pub fn complete(&mut self, key: &FetchKey, loaded_count: usize, total_count: usize) {
        if let Some(branch) = self.branches.get_mut(&key.branch) {
            branch.state = BranchState::Loaded;
            branch.cursor.offset = key.offset;
            branch.cursor.loaded_count = loaded_count;
            branch.cursor.total_count = Some(total_count);
        }
    }

    pub fn fail(&mut self, key: &FetchKey, message: &str) {
        if let Some(branch) = self.branches.get_mut(&key.branch) {
            branch.state = BranchState::Error(message.to_owned());
        }
    }

    /// Forgets branches hanging off rows that no longer exist.
    pub fn forget_rows(&mut self, removed: &[BreakdownId]) {
        if removed.is_empty() {
            return;
        }
        self.branches.retain(|branch, _| {
            branch
                .parent
                .breakdown_id()
                .is_none_or(|parent| !removed.contains(parent))
        });
    }

    /// Starts over for a new query: every in-flight response becomes stale.
    pub fn reset(&mut self, query: QueryParams) {
        self.query = query;
        self.clear_branches();
    }

    pub fn clear_branches(&mut self) {
        self.latest.clear();
        self.in_flight.clear();
        self.branches.clear();
    }
}
