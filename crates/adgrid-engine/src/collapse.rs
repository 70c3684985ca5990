// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::BreakdownId;
use std::collections::HashMap;

use crate::tree::Row;

pub const DEFAULT_EXPANDED_DEPTH: usize = 1;

/// Per-row collapse overrides on top of a depth-based default.
#[derive(Debug, Clone)]
pub struct CollapseService {
    expanded_depth: usize,
    path_depth: usize,
    overrides: HashMap<BreakdownId, bool>,
}

impl CollapseService {
    pub fn new(path_depth: usize, expanded_depth: usize) -> Self {
        Self {
            expanded_depth,
            path_depth,
            overrides: HashMap::new(),
        }
    }

    pub fn is_row_collapsable(&self, row: &Row) -> bool {
        !row.is_footer() && row.depth() < self.path_depth
    }

    pub fn is_row_collapsed(&self, row: &Row) -> bool {
        if !self.is_row_collapsable(row) {
            return false;
        }
        self.overrides
            .get(&row.breakdown_id)
            .copied()
            .unwrap_or(row.depth() > self.expanded_depth)
    }

    /// Records the override; returns whether the effective state changed.
    pub fn set_row_collapsed(&mut self, row: &Row, collapsed: bool) -> bool {
        if !self.is_row_collapsable(row) {
            return false;
        }
        let was = self.is_row_collapsed(row);
        self.overrides.insert(row.breakdown_id.clone(), collapsed);
        was != collapsed
    }

    /// Moves the default for a whole level and drops overrides at that depth.
    pub fn set_level_collapsed(&mut self, depth: usize, collapsed: bool) {
        if collapsed {
            self.expanded_depth = self.expanded_depth.min(depth.saturating_sub(1));
        } else {
            self.expanded_depth = self.expanded_depth.max(depth);
        }
        self.overrides.retain(|id, _| id.depth() != depth);
    }

    pub fn expand_all(&mut self) {
        self.expanded_depth = self.path_depth;
        self.overrides.clear();
    }

    pub fn forget(&mut self, removed: &[BreakdownId]) {
        for id in removed {
            self.overrides.remove(id);
        }
    }

    pub fn clear(&mut self) {
        self.overrides.clear();
    }

    pub fn expanded_depth(&self) -> usize {
        self.expanded_depth
    }
}
