// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{
    BreakdownId, BreakdownLevel, BreakdownPath, ColumnData, ColumnType, Currency, EntityRef,
    EntityState, GridColumn, SortDirection, StatData, StatValue, ValidationError,
    parse_edit_value, parse_state,
};
use anyhow::{Context, Result, bail};
use std::sync::mpsc::Receiver;
use tracing::{debug, warn};

use crate::bus::{EventBus, GridEvent, Topic};
use crate::collapse::{CollapseService, DEFAULT_EXPANDED_DEPTH};
use crate::columns::{GridMeta, RendererColumnDescriptor, map_columns};
use crate::data::{
    BranchKey, BranchState, Cursor, DEFAULT_PAGE_SIZE, DataService, FetchRequest, FetchResponse,
    FetchTicket, ParentKey, QueryParams,
};
use crate::edit::{
    CellKey, EditCoordinator, SaveRequest, SaveResponse, SaveSettled, SaveTicket,
    StateBatchRequest, StateBatchResponse, StateToggle,
};
use crate::error::{GridError, SaveFailure};
use crate::prefs::{EXPANDED_DEPTH_KEY, ORDER_KEY, PreferenceStore};
use crate::selection::{
    BulkSelection, RowSelection, SelectionConfig, SelectionFilter, SelectionService,
};
use crate::sync::{SyncMachine, SyncTransition};
use crate::tree::{Row, RowKey, RowPatch, RowTree, StatPatch};

#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    /// Root entity; `None` only for an all-accounts grid.
    pub entity: Option<EntityRef>,
    pub path: BreakdownPath,
    pub columns: Vec<GridColumn>,
    pub currency: Currency,
    pub can_edit_archived: bool,
    pub page_size: usize,
    pub expanded_depth: usize,
}

impl GridConfig {
    pub fn new(
        entity: Option<EntityRef>,
        grid_level: BreakdownLevel,
        levels: Vec<BreakdownLevel>,
        columns: Vec<GridColumn>,
    ) -> Result<Self, GridError> {
        let path = BreakdownPath::new(grid_level, levels)
            .map_err(|error| GridError::InvalidBreakdownPath(error.to_string()))?;
        Ok(Self {
            entity,
            path,
            columns,
            currency: Currency::default(),
            can_edit_archived: false,
            page_size: DEFAULT_PAGE_SIZE,
            expanded_depth: DEFAULT_EXPANDED_DEPTH,
        })
    }
}

/// Work the context wants a backend to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Fetch(FetchRequest),
    Save(SaveRequest),
    StateBatch(StateBatchRequest),
    SyncPoll(EntityRef),
    TriggerSync(EntityRef),
}

/// One line of the flattened grid handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleRow {
    Row(RowKey),
    LoadMore {
        branch: BranchKey,
        depth: usize,
        remaining: usize,
    },
    Footer(RowKey),
}

enum EditValue {
    Stat(StatData),
    State(EntityState),
}

/// Owner of every piece of grid state. All row mutations go through
/// [`GridContext::apply_patch`], which publishes `RowUpdated`.
#[derive(Debug)]
pub struct GridContext {
    meta: GridMeta,
    entity: Option<EntityRef>,
    columns: Vec<GridColumn>,
    descriptors: Vec<RendererColumnDescriptor>,
    tree: RowTree,
    collapse: CollapseService,
    selection: SelectionService,
    data: DataService,
    sync: SyncMachine,
    edits: EditCoordinator,
    bus: EventBus,
    outbound: Vec<Outbound>,
}

impl GridContext {
    pub fn new(config: GridConfig) -> Result<Self> {
        if config.page_size == 0 {
            bail!("page size must be positive -- set [grid].page_size to at least 1");
        }
        let grid_level = config.path.grid_level();
        let entity_matches = match config.entity {
            None => grid_level == BreakdownLevel::AllAccounts,
            Some(entity) => grid_level.entity_kind() == Some(entity.kind),
        };
        if !entity_matches {
            bail!(
                "grid level {} does not match root entity {}",
                grid_level.as_str(),
                config
                    .entity
                    .map_or_else(|| "(none)".to_owned(), |entity| entity.to_string())
            );
        }

        let meta = GridMeta {
            currency: config.currency,
            can_edit_archived: config.can_edit_archived,
            path: config.path,
        };
        let descriptors = map_columns(&meta, &config.columns);
        let collapse = CollapseService::new(meta.path.depth(), config.expanded_depth);
        let selection = SelectionService::new(SelectionConfig {
            can_edit_archived: meta.can_edit_archived,
            footer_selectable: !meta.path.contains(BreakdownLevel::Publisher),
        });

        Ok(Self {
            entity: config.entity,
            columns: config.columns,
            descriptors,
            tree: RowTree::new(),
            collapse,
            selection,
            data: DataService::new(config.page_size),
            sync: SyncMachine::new(),
            edits: EditCoordinator::new(),
            bus: EventBus::new(),
            outbound: Vec::new(),
            meta,
        })
    }

    pub fn meta(&self) -> &GridMeta {
        &self.meta
    }

    pub fn entity(&self) -> Option<EntityRef> {
        self.entity
    }

    pub fn descriptors(&self) -> &[RendererColumnDescriptor] {
        &self.descriptors
    }

    pub fn tree(&self) -> &RowTree {
        &self.tree
    }

    pub fn row(&self, id: &BreakdownId) -> Option<&Row> {
        self.tree.row(id)
    }

    pub fn subscribe(&mut self, topics: &[Topic]) -> Receiver<GridEvent> {
        self.bus.subscribe(topics)
    }

    pub fn subscribe_all(&mut self) -> Receiver<GridEvent> {
        self.bus.subscribe_all()
    }

    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn in_flight_fetches(&self) -> usize {
        self.data.in_flight_count()
    }

    // --- data ---------------------------------------------------------------

    pub fn load(&mut self) -> FetchTicket {
        let branch = BranchKey::root(self.meta.path.base());
        self.issue_fetch(branch, 0, false)
    }

    pub fn reload(&mut self) -> FetchTicket {
        let branch = BranchKey::root(self.meta.path.base());
        self.issue_fetch(branch, 0, true)
    }

    /// Requests the next page below `parent` (`None` for the base rows).
    pub fn load_more(
        &mut self,
        parent: Option<&BreakdownId>,
    ) -> Result<Option<FetchTicket>, GridError> {
        let branch = self.branch_for(parent).ok_or_else(|| {
            GridError::UnknownRow(parent.map_or_else(String::new, ToString::to_string))
        })?;
        let Some(cursor) = self.data.cursor(&branch) else {
            return Ok(None);
        };
        if !cursor.has_more() {
            return Ok(None);
        }
        Ok(Some(self.issue_fetch(branch, cursor.loaded_count, false)))
    }

    pub fn order(&self) -> (Option<&str>, SortDirection) {
        self.data.order()
    }

    /// Re-sorts the grid: every branch is refetched in the new order.
    pub fn set_order(&mut self, field: Option<String>, direction: SortDirection) -> FetchTicket {
        self.data.set_order(field, direction);
        self.data.clear_branches();
        self.reload()
    }

    pub fn query(&self) -> &QueryParams {
        self.data.query()
    }

    /// Full reset for a new date range or filter set.
    pub fn set_query(&mut self, query: QueryParams) -> FetchTicket {
        self.data.reset(query);
        self.tree.reset();
        self.collapse.clear();
        self.edits.reset();
        if self.selection.set_selection_filter(SelectionFilter::None) {
            self.bus.publish(GridEvent::SelectionUpdated);
        }
        self.load()
    }

    pub fn branch_state(&self, parent: Option<&BreakdownId>) -> BranchState {
        self.branch_for(parent)
            .map_or(BranchState::Idle, |branch| self.data.branch_state(&branch))
    }

    pub fn cursor(&self, parent: Option<&BreakdownId>) -> Option<Cursor> {
        self.branch_for(parent)
            .and_then(|branch| self.data.cursor(&branch))
    }

    pub fn complete_fetch(&mut self, seq: u64, result: Result<FetchResponse, String>) {
        let Some(key) = self.data.accept(seq) else {
            return;
        };
        let branch = key.branch.clone();
        let mut response = match result {
            Ok(response) => response,
            Err(message) => {
                warn!(seq, %message, "breakdown fetch failed");
                self.data.fail(&key, &message);
                self.bus.publish(GridEvent::DataError { branch, message });
                return;
            }
        };

        let parent = match &branch.parent {
            ParentKey::Root => None,
            ParentKey::Row(id) => match self.tree.find(id) {
                Some(parent) => Some(parent),
                None => {
                    debug!(seq, parent = %id, "parent row left the grid before its page arrived");
                    return;
                }
            },
        };

        if branch.is_root() && key.offset == 0 {
            if let Some(totals) = response.totals.take()
                && let Err(error) = self.tree.set_footer_stats(totals)
            {
                warn!(%error, "could not apply totals to footer");
            }
            let transition = self.sync.observe_load(
                response.is_sync_in_progress,
                response.last_sync_date.take(),
            );
            self.publish_sync(transition);
        }

        let total_count = response.total_count;
        let rows = response.into_new_rows(branch.level);
        // A first page only answers for the rows it covers unless it spans the
        // whole branch; rows from later pages keep their place.
        let merged = if key.offset > 0 {
            self.tree.append_children(parent, rows)
        } else if total_count <= key.page_size {
            self.tree.reconcile_children(parent, rows)
        } else {
            self.tree.reconcile_window(parent, rows, key.page_size)
        };
        let outcome = match merged {
            Ok(outcome) => outcome,
            Err(error) => {
                let message = error.to_string();
                warn!(seq, %message, "could not merge breakdown page");
                self.data.fail(&key, &message);
                self.bus.publish(GridEvent::DataError { branch, message });
                return;
            }
        };

        self.collapse.forget(&outcome.removed);
        self.data.forget_rows(&outcome.removed);
        let loaded_count = self.tree.children_of(parent).len();
        self.data.complete(&key, loaded_count, total_count);
        debug!(
            seq,
            offset = key.offset,
            inserted = outcome.inserted,
            updated = outcome.updated,
            removed = outcome.removed.len(),
            "merged breakdown page"
        );
        self.bus.publish(GridEvent::DataUpdated { branch });

        for row_key in outcome.keys {
            self.fetch_children(row_key, false);
        }
    }

    fn issue_fetch(&mut self, branch: BranchKey, offset: usize, force: bool) -> FetchTicket {
        let levels = self.levels_through(branch.level);
        let key = self.data.fetch_key(branch, offset);
        let ticket = self.data.begin(key.clone(), force);
        if !ticket.coalesced {
            self.outbound.push(Outbound::Fetch(FetchRequest {
                seq: ticket.seq,
                key,
                query: self.data.query().clone(),
                entity: self.entity,
                levels,
            }));
        }
        ticket
    }

    /// Fetches the children of an expanded row whose branch is not loaded.
    /// Errored branches are only retried on an explicit expand.
    fn fetch_children(&mut self, key: RowKey, retry: bool) -> Option<FetchTicket> {
        let row = self.tree.get(key)?;
        if !self.collapse.is_row_collapsable(row) || self.collapse.is_row_collapsed(row) {
            return None;
        }
        let id = row.breakdown_id.clone();
        let branch = self.branch_for(Some(&id))?;
        match self.data.branch_state(&branch) {
            BranchState::Idle => Some(self.issue_fetch(branch, 0, false)),
            BranchState::Error(_) if retry => Some(self.issue_fetch(branch, 0, false)),
            BranchState::Error(_) | BranchState::Loading | BranchState::Loaded => None,
        }
    }

    fn branch_for(&self, parent: Option<&BreakdownId>) -> Option<BranchKey> {
        match parent {
            None => Some(BranchKey::root(self.meta.path.base())),
            Some(id) => {
                let row = self.tree.row(id)?;
                if row.is_footer() {
                    return None;
                }
                let level = self.meta.path.level_at(row.depth() + 1)?;
                Some(BranchKey::under(id.clone(), level))
            }
        }
    }

    fn levels_through(&self, level: BreakdownLevel) -> Vec<BreakdownLevel> {
        let levels = self.meta.path.levels();
        let end = levels
            .iter()
            .position(|candidate| *candidate == level)
            .map_or(levels.len(), |index| index + 1);
        levels[..end].to_vec()
    }

    // --- collapse -----------------------------------------------------------

    pub fn is_row_collapsed(&self, id: &BreakdownId) -> bool {
        self.tree
            .row(id)
            .is_some_and(|row| self.collapse.is_row_collapsed(row))
    }

    pub fn is_row_collapsable(&self, id: &BreakdownId) -> bool {
        self.tree
            .row(id)
            .is_some_and(|row| self.collapse.is_row_collapsable(row))
    }

    pub fn set_row_collapsed(&mut self, id: &BreakdownId, collapsed: bool) -> Result<(), GridError> {
        let row = self
            .tree
            .row(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        let key = row.key;
        if self.collapse.set_row_collapsed(row, collapsed) {
            self.bus.publish(GridEvent::CollapseUpdated {
                row: id.clone(),
                collapsed,
            });
        }
        if !collapsed {
            self.fetch_children(key, true);
        }
        Ok(())
    }

    pub fn set_level_collapsed(&mut self, depth: usize, collapsed: bool) {
        self.collapse.set_level_collapsed(depth, collapsed);
        self.after_bulk_collapse(|row| row.depth() == depth);
    }

    pub fn expand_all(&mut self) {
        self.collapse.expand_all();
        self.after_bulk_collapse(|_| true);
    }

    fn after_bulk_collapse(&mut self, affected: impl Fn(&Row) -> bool) {
        let rows: Vec<(RowKey, BreakdownId, bool)> = self
            .tree
            .iter()
            .filter(|row| affected(row) && self.collapse.is_row_collapsable(row))
            .map(|row| {
                (
                    row.key,
                    row.breakdown_id.clone(),
                    self.collapse.is_row_collapsed(row),
                )
            })
            .collect();
        for (key, id, collapsed) in rows {
            self.bus.publish(GridEvent::CollapseUpdated { row: id, collapsed });
            if !collapsed {
                self.fetch_children(key, false);
            }
        }
    }

    // --- selection ----------------------------------------------------------

    pub fn set_row_selection(&mut self, id: &BreakdownId, selected: bool) -> Result<bool, GridError> {
        let row = self
            .tree
            .row(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        let changed = self.selection.set_row_selection(row, selected);
        if changed {
            self.bus.publish(GridEvent::SelectionUpdated);
        }
        Ok(changed)
    }

    pub fn set_selection_filter(&mut self, filter: SelectionFilter) {
        self.selection.set_selection_filter(filter);
        self.bus.publish(GridEvent::SelectionUpdated);
    }

    /// Whether `id` is in the selection; the row need not be loaded yet.
    pub fn is_selected(&self, id: &BreakdownId) -> bool {
        self.selection.is_selected(id)
    }

    pub fn row_selection(&self, id: &BreakdownId) -> Option<RowSelection> {
        let row = self.tree.row(id)?;
        Some(self.selection.row_selection(&self.tree, row))
    }

    pub fn bulk_selection(&self) -> BulkSelection {
        self.selection.bulk_selection()
    }

    // --- edits --------------------------------------------------------------

    /// Single entry point for row mutations.
    pub fn apply_patch(&mut self, id: &BreakdownId, patch: RowPatch) -> Result<RowPatch, GridError> {
        let key = self
            .tree
            .find(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        let inverse = self.tree.apply_patch(key, patch)?;
        self.bus.publish(GridEvent::RowUpdated { row: id.clone() });
        Ok(inverse)
    }

    /// Validates raw input for a cell and saves it. State-selector edits are
    /// buffered for the next state batch and return no ticket.
    pub fn edit_cell(
        &mut self,
        id: &BreakdownId,
        field: &str,
        raw: &str,
    ) -> Result<Option<SaveTicket>, GridError> {
        let value = match self.validate_edit(id, field, raw) {
            Ok(value) => value,
            Err(error) => {
                self.bus.publish(GridEvent::RowUpdatedError {
                    row: id.clone(),
                    field: field.to_owned(),
                    error: error.clone(),
                });
                return Err(error);
            }
        };
        match value {
            EditValue::State(state) => self.save_state(id, state).map(|()| None),
            EditValue::Stat(value) => self.save_data(id, field, value).map(Some),
        }
    }

    /// Optimistically writes `value` and schedules the save, queued behind
    /// any save already in flight for the same cell.
    pub fn save_data(
        &mut self,
        id: &BreakdownId,
        field: &str,
        value: StatData,
    ) -> Result<SaveTicket, GridError> {
        let row = self
            .tree
            .row(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        let entity = row.entity;
        let current = row.stat(field).cloned();
        let (ticket, dispatch) =
            self.edits
                .submit(CellKey::new(id.clone(), field), entity, value.clone(), current);
        self.apply_patch(id, RowPatch::set_value(field, value))?;
        if let Some(request) = dispatch {
            self.outbound.push(Outbound::Save(request));
        }
        Ok(ticket)
    }

    pub fn complete_save(&mut self, id: u64, result: Result<SaveResponse, SaveFailure>) {
        let Some(cell) = self.edits.cell_for(id).cloned() else {
            debug!(id, "ignoring result for a save that is no longer pending");
            return;
        };
        match result {
            Ok(response) => {
                let confirmed = response.updated_stats.get(&cell.field).cloned();
                let Some(SaveSettled::Committed { next, .. }) = self.edits.commit(id, confirmed)
                else {
                    return;
                };
                let mut stats = response.updated_stats;
                if next.is_some() {
                    // The newer optimistic value stays until its own save settles.
                    stats.remove(&cell.field);
                }
                if !stats.is_empty()
                    && let Err(error) = self.apply_patch(&cell.row, RowPatch::merge_stats(stats))
                {
                    debug!(id, %error, "saved row left the grid");
                }
                debug!(id, row = %cell.row, field = %cell.field, "save committed");
                if let Some(next) = next {
                    self.outbound.push(Outbound::Save(next));
                }
            }
            Err(failure) => {
                let Some(SaveSettled::RolledBack {
                    restore, cancelled, ..
                }) = self.edits.fail(id)
                else {
                    return;
                };
                self.restore_cell(&cell.row, &cell.field, restore);
                let error = failure.into_grid_error(&cell.field);
                warn!(
                    id,
                    row = %cell.row,
                    field = %cell.field,
                    cancelled = cancelled.len(),
                    %error,
                    "save failed; rolled back"
                );
                self.bus.publish(GridEvent::RowUpdatedError {
                    row: cell.row.clone(),
                    field: cell.field.clone(),
                    error: error.clone(),
                });
                if error.forces_refetch() {
                    self.refetch_branch_of(&cell.row);
                }
            }
        }
    }

    /// Optimistically toggles a row's delivery state and buffers the change
    /// for the next [`GridContext::flush_state_batch`].
    pub fn save_state(&mut self, id: &BreakdownId, state: EntityState) -> Result<(), GridError> {
        let row = self
            .tree
            .row(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        if row.is_footer() {
            return Err(ValidationError::NotEditable(EntityState::FIELD.to_owned()).into());
        }
        let toggle = StateToggle {
            row: id.clone(),
            entity: row.entity,
            state,
        };
        let previous = row.stat(EntityState::FIELD).cloned();
        self.edits.buffer_state(toggle, previous);
        self.apply_patch(
            id,
            RowPatch::set_value(EntityState::FIELD, StatData::Number(state.code() as f64)),
        )?;
        Ok(())
    }

    pub fn pending_state_toggles(&self) -> usize {
        self.edits.pending_state_count()
    }

    pub fn flush_state_batch(&mut self) -> Option<u64> {
        let batch = self.edits.flush_states()?;
        let id = batch.id;
        debug!(id, rows = batch.rows.len(), "flushing state batch");
        self.outbound.push(Outbound::StateBatch(batch));
        Some(id)
    }

    pub fn complete_state_batch(
        &mut self,
        id: u64,
        result: Result<StateBatchResponse, SaveFailure>,
    ) {
        let Some(rows) = self.edits.settle_states(id) else {
            return;
        };
        match result {
            Ok(response) => {
                for (row, stats) in response.updated {
                    if let Err(error) = self.apply_patch(&row, RowPatch::merge_stats(stats)) {
                        debug!(id, %error, "state batch row left the grid");
                    }
                }
            }
            Err(failure) => {
                let error = failure.into_grid_error(EntityState::FIELD);
                warn!(id, rows = rows.len(), %error, "state batch failed; rolled back");
                for (row, previous) in rows {
                    self.restore_cell(&row, EntityState::FIELD, previous);
                    self.bus.publish(GridEvent::RowUpdatedError {
                        row,
                        field: EntityState::FIELD.to_owned(),
                        error: error.clone(),
                    });
                }
            }
        }
    }

    fn validate_edit(
        &self,
        id: &BreakdownId,
        field: &str,
        raw: &str,
    ) -> Result<EditValue, GridError> {
        let row = self
            .tree
            .row(id)
            .ok_or_else(|| GridError::UnknownRow(id.to_string()))?;
        let not_editable = || ValidationError::NotEditable(field.to_owned());
        let (column_type, data) = self.column(field).ok_or_else(not_editable)?;
        let locked = !data.editable
            || row.is_footer()
            || (row.data.archived && !self.meta.can_edit_archived)
            || row.stat(field).is_some_and(|stat| !stat.is_editable);
        if locked {
            return Err(not_editable().into());
        }
        if column_type == ColumnType::StateSelector {
            return Ok(EditValue::State(parse_state(raw)?));
        }
        Ok(EditValue::Stat(parse_edit_value(column_type, data, raw)?))
    }

    fn column(&self, field: &str) -> Option<(ColumnType, &ColumnData)> {
        self.columns.iter().find_map(|column| {
            let data = column.data.as_ref()?;
            if data.field != field {
                return None;
            }
            Some((column.kind()?, data))
        })
    }

    fn restore_cell(&mut self, id: &BreakdownId, field: &str, previous: Option<StatValue>) {
        let mut patch = RowPatch::default();
        patch.stats.insert(
            field.to_owned(),
            previous.map_or(StatPatch::Remove, StatPatch::Replace),
        );
        if let Err(error) = self.apply_patch(id, patch) {
            debug!(row = %id, %error, "rolled back row left the grid");
        }
    }

    fn refetch_branch_of(&mut self, id: &BreakdownId) {
        let parent = id.parent();
        if let Some(branch) = self.branch_for(parent.as_ref()) {
            self.issue_fetch(branch, 0, true);
        }
    }

    // --- sync ---------------------------------------------------------------

    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    pub fn last_sync_date(&self) -> Option<&str> {
        self.sync.last_sync_date()
    }

    pub fn trigger_sync(&mut self) -> bool {
        let Some(entity) = self.entity else {
            return false;
        };
        let transition = self.sync.trigger();
        self.outbound.push(Outbound::TriggerSync(entity));
        self.publish_sync(transition);
        true
    }

    pub fn complete_sync_trigger(&mut self, result: Result<(), String>) {
        if let Err(message) = result {
            warn!(%message, "sync trigger failed");
            self.stop_polling();
        }
    }

    /// Claims a poll slot; queues a status request when syncing and no poll
    /// is outstanding.
    pub fn sync_poll_due(&mut self) -> bool {
        let Some(entity) = self.entity else {
            return false;
        };
        if !self.sync.poll_due() {
            return false;
        }
        self.outbound.push(Outbound::SyncPoll(entity));
        true
    }

    pub fn complete_sync_poll(&mut self, result: Result<bool, String>) {
        if let Err(message) = &result {
            let error = GridError::SyncPoll {
                message: message.clone(),
            };
            warn!(%error, "polling stopped");
        }
        let transition = self.sync.on_poll_result(result);
        self.publish_sync(transition);
        if transition == SyncTransition::Completed {
            self.reload();
            if let Some(entity) = self.entity {
                self.bus
                    .publish(GridEvent::ChartRefreshRequested { entity });
            }
        }
    }

    pub fn stop_polling(&mut self) {
        let was_syncing = self.sync.is_syncing();
        self.sync.stop();
        if was_syncing && let Some(entity) = self.entity {
            self.bus.publish(GridEvent::SyncStateChanged {
                entity,
                syncing: false,
            });
        }
    }

    fn publish_sync(&mut self, transition: SyncTransition) {
        let Some(entity) = self.entity else {
            return;
        };
        let syncing = match transition {
            SyncTransition::Unchanged => return,
            SyncTransition::Started => true,
            SyncTransition::Completed | SyncTransition::Failed => false,
        };
        self.bus
            .publish(GridEvent::SyncStateChanged { entity, syncing });
    }

    // --- rendering ----------------------------------------------------------

    /// Rows in display order after collapse, with a load-more placeholder
    /// after every partially loaded branch and the footer last.
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut out = Vec::with_capacity(self.tree.len() + 1);
        let root = BranchKey::root(self.meta.path.base());
        self.push_visible(None, Some(root), 1, &mut out);
        out.push(VisibleRow::Footer(self.tree.footer_key()));
        out
    }

    fn push_visible(
        &self,
        parent: Option<RowKey>,
        branch: Option<BranchKey>,
        depth: usize,
        out: &mut Vec<VisibleRow>,
    ) {
        for key in self.tree.children_of(parent) {
            out.push(VisibleRow::Row(*key));
            let Some(row) = self.tree.get(*key) else {
                continue;
            };
            if self.collapse.is_row_collapsable(row) && !self.collapse.is_row_collapsed(row) {
                let child_branch = self.branch_for(Some(&row.breakdown_id));
                self.push_visible(Some(*key), child_branch, depth + 1, out);
            }
        }
        if let Some(branch) = branch
            && let Some(cursor) = self.data.cursor(&branch)
            && let Some(total) = cursor.total_count
            && cursor.loaded_count < total
        {
            out.push(VisibleRow::LoadMore {
                branch,
                depth,
                remaining: total - cursor.loaded_count,
            });
        }
    }

    // --- preferences --------------------------------------------------------

    pub fn save_preferences(&self, store: &mut dyn PreferenceStore, grid: &str) -> Result<()> {
        store.set(
            grid,
            EXPANDED_DEPTH_KEY,
            &self.collapse.expanded_depth().to_string(),
        )?;
        match self.data.order() {
            (Some(field), SortDirection::Desc) => store.set(grid, ORDER_KEY, &format!("-{field}"))?,
            (Some(field), SortDirection::Asc) => store.set(grid, ORDER_KEY, field)?,
            (None, _) => store.remove(grid, ORDER_KEY)?,
        }
        Ok(())
    }

    /// Applies stored preferences; call before the first `load`.
    pub fn restore_preferences(&mut self, store: &dyn PreferenceStore, grid: &str) -> Result<()> {
        if let Some(depth) = store.get(grid, EXPANDED_DEPTH_KEY)? {
            let depth = depth
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid {EXPANDED_DEPTH_KEY} preference {depth:?}"))?;
            self.collapse = CollapseService::new(self.meta.path.depth(), depth);
        }
        if let Some(order) = store.get(grid, ORDER_KEY)? {
            let (field, direction) = match order.strip_prefix('-') {
                Some(field) => (field, SortDirection::Desc),
                None => (order.as_str(), SortDirection::Asc),
            };
            if !field.is_empty() {
                self.data.set_order(Some(field.to_owned()), direction);
            }
        }
        Ok(())
    }

    /// Stops polling and drops subscribers and pending work.
    pub fn teardown(&mut self) {
        self.sync.stop();
        self.edits.reset();
        self.outbound.clear();
        self.bus.clear();
    }
}
