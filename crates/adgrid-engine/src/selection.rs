// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::BreakdownId;
use std::collections::BTreeMap;

use crate::tree::{Row, RowTree};

pub const ARCHIVED_TOOLTIP: &str = "Archived rows cannot be selected.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    None,
    All,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionFilter {
    All,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckboxState {
    Unchecked,
    Checked,
    Indeterminate,
}

impl CheckboxState {
    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Unchecked => "[ ]",
            Self::Checked => "[x]",
            Self::Indeterminate => "[-]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionConfig {
    pub can_edit_archived: bool,
    pub footer_selectable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSelection {
    pub selectable: bool,
    pub selected: CheckboxState,
    pub tooltip: Option<String>,
}

/// Payload shape for bulk actions. Every id stands for its whole subtree,
/// rows not fetched yet included, and the nearest listed ancestor of a row
/// decides whether it is in the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSelection {
    pub select_all: bool,
    pub selected_ids: Vec<BreakdownId>,
    pub not_selected_ids: Vec<BreakdownId>,
}

/// Selection as a base decided by the mode plus explicit per-subtree
/// overrides. A row takes the value of its nearest overridden ancestor (or
/// itself), so rows fetched after a toggle inherit it.
#[derive(Debug, Clone)]
pub struct SelectionService {
    config: SelectionConfig,
    mode: SelectionMode,
    overrides: BTreeMap<BreakdownId, bool>,
}

impl SelectionService {
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            mode: SelectionMode::None,
            overrides: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn is_row_selectable(&self, row: &Row) -> bool {
        if row.is_footer() {
            return self.config.footer_selectable;
        }
        !row.data.archived || self.config.can_edit_archived
    }

    pub fn is_selected(&self, id: &BreakdownId) -> bool {
        if self.mode == SelectionMode::None {
            return false;
        }
        self.nearest_override(Some(id.clone()))
            .unwrap_or(self.mode == SelectionMode::All)
    }

    /// Applies a checkbox toggle; returns whether anything changed. The toggle
    /// covers the row's whole subtree, loaded or not.
    pub fn set_row_selection(&mut self, row: &Row, selected: bool) -> bool {
        if !self.is_row_selectable(row) {
            return false;
        }
        if row.is_footer() {
            let filter = if selected {
                SelectionFilter::All
            } else {
                SelectionFilter::None
            };
            return self.set_selection_filter(filter);
        }
        if self.mode == SelectionMode::None {
            if !selected {
                return false;
            }
            self.mode = SelectionMode::Custom;
        }

        let before = (self.mode, self.overrides.clone());
        let id = &row.breakdown_id;
        self.overrides
            .retain(|candidate, _| candidate != id && !id.is_ancestor_of(candidate));
        let inherited = self
            .nearest_override(id.parent())
            .unwrap_or(self.mode == SelectionMode::All);
        if inherited != selected {
            self.overrides.insert(id.clone(), selected);
        }
        if self.mode == SelectionMode::Custom && !self.overrides.values().any(|value| *value) {
            self.mode = SelectionMode::None;
            self.overrides.clear();
        }
        before != (self.mode, self.overrides.clone())
    }

    pub fn set_selection_filter(&mut self, filter: SelectionFilter) -> bool {
        let mode = match filter {
            SelectionFilter::All => SelectionMode::All,
            SelectionFilter::None => SelectionMode::None,
        };
        let changed = self.mode != mode || !self.overrides.is_empty();
        self.mode = mode;
        self.overrides.clear();
        changed
    }

    pub fn checkbox_state(&self, tree: &RowTree, row: &Row) -> CheckboxState {
        if row.is_footer() {
            return match self.mode {
                SelectionMode::All if self.overrides.is_empty() => CheckboxState::Checked,
                SelectionMode::All | SelectionMode::Custom => CheckboxState::Indeterminate,
                SelectionMode::None => CheckboxState::Unchecked,
            };
        }

        let mut total = 0usize;
        let mut selected = 0usize;
        for key in tree.descendants(row.key) {
            let Some(descendant) = tree.get(key) else {
                continue;
            };
            if !self.is_row_selectable(descendant) {
                continue;
            }
            total += 1;
            if self.is_selected(&descendant.breakdown_id) {
                selected += 1;
            }
        }

        if total == 0 {
            return if self.is_row_selectable(row) && self.is_selected(&row.breakdown_id) {
                CheckboxState::Checked
            } else {
                CheckboxState::Unchecked
            };
        }
        match selected {
            0 => CheckboxState::Unchecked,
            count if count == total => CheckboxState::Checked,
            _ => CheckboxState::Indeterminate,
        }
    }

    pub fn row_selection(&self, tree: &RowTree, row: &Row) -> RowSelection {
        let selectable = self.is_row_selectable(row);
        let tooltip = (!selectable && !row.is_footer() && row.data.archived)
            .then(|| ARCHIVED_TOOLTIP.to_owned());
        RowSelection {
            selectable,
            selected: self.checkbox_state(tree, row),
            tooltip,
        }
    }

    pub fn bulk_selection(&self) -> BulkSelection {
        let ids = |wanted: bool| -> Vec<BreakdownId> {
            self.overrides
                .iter()
                .filter(|(_, value)| **value == wanted)
                .map(|(id, _)| id.clone())
                .collect()
        };
        BulkSelection {
            select_all: self.mode == SelectionMode::All,
            selected_ids: ids(true),
            not_selected_ids: ids(false),
        }
    }

    pub fn reset(&mut self) {
        self.mode = SelectionMode::None;
        self.overrides.clear();
    }

    fn nearest_override(&self, start: Option<BreakdownId>) -> Option<bool> {
        let mut cursor = start;
        while let Some(id) = cursor {
            if let Some(value) = self.overrides.get(&id) {
                return Some(*value);
            }
            cursor = id.parent();
        }
        None
    }
}
