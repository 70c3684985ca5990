// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{
    BreakdownId, BreakdownLevel, EntityRef, RowData, RowLevel, StatData, StatMap, StatValue,
};
use std::collections::{BTreeMap, HashMap};

use crate::error::GridError;

/// Arena handle for a row. Handles are never reused within one tree, not
/// even across [`RowTree::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: RowKey,
    pub id: String,
    pub breakdown_id: BreakdownId,
    pub parent: Option<RowKey>,
    pub level: RowLevel,
    pub breakdown: Option<BreakdownLevel>,
    pub entity: Option<EntityRef>,
    pub data: RowData,
    pub in_group: bool,
    children: Vec<RowKey>,
}

impl Row {
    pub fn is_footer(&self) -> bool {
        self.level == RowLevel::Footer
    }

    pub fn depth(&self) -> usize {
        self.level.depth()
    }

    pub fn children(&self) -> &[RowKey] {
        &self.children
    }

    pub fn stat(&self, field: &str) -> Option<&StatValue> {
        self.data.stats.get(field)
    }
}

/// A row as it arrives from a breakdown response, before it has a place in
/// the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRow {
    pub id: String,
    pub breakdown: BreakdownLevel,
    pub entity: Option<EntityRef>,
    pub data: RowData,
    pub in_group: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatPatch {
    Replace(StatValue),
    SetValue(StatData),
    Remove,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowPatch {
    pub stats: BTreeMap<String, StatPatch>,
    pub archived: Option<bool>,
    pub in_group: Option<bool>,
}

impl RowPatch {
    pub fn set_value(field: impl Into<String>, value: StatData) -> Self {
        let mut patch = Self::default();
        patch.stats.insert(field.into(), StatPatch::SetValue(value));
        patch
    }

    /// Patch that turns `current` into exactly `next`.
    pub fn replace_all(current: &RowData, next: RowData) -> Self {
        let mut stats: BTreeMap<String, StatPatch> = current
            .stats
            .keys()
            .filter(|field| !next.stats.contains_key(*field))
            .map(|field| (field.clone(), StatPatch::Remove))
            .collect();
        for (field, value) in next.stats {
            if current.stats.get(&field) != Some(&value) {
                stats.insert(field, StatPatch::Replace(value));
            }
        }
        Self {
            stats,
            archived: (current.archived != next.archived).then_some(next.archived),
            in_group: None,
        }
    }

    /// Merges server-confirmed stats over whatever is there now.
    pub fn merge_stats(stats: StatMap) -> Self {
        Self {
            stats: stats
                .into_iter()
                .map(|(field, value)| (field, StatPatch::Replace(value)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty() && self.archived.is_none() && self.in_group.is_none()
    }
}

/// Result of reconciling one branch against a fresh page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub keys: Vec<RowKey>,
    pub inserted: usize,
    pub updated: usize,
    pub removed: Vec<BreakdownId>,
}

/// Breakdown rows in an arena; rows refer to their parent by key and to their
/// children by an ordered key list, so nothing holds a back-pointer.
#[derive(Debug, Clone)]
pub struct RowTree {
    rows: BTreeMap<RowKey, Row>,
    next_key: u64,
    index: HashMap<BreakdownId, RowKey>,
    roots: Vec<RowKey>,
    footer: Row,
}

impl Default for RowTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RowTree {
    pub fn new() -> Self {
        let footer_key = RowKey(0);
        let footer_id = BreakdownId::footer();
        let footer = Row {
            key: footer_key,
            id: footer_id.as_str().to_owned(),
            breakdown_id: footer_id.clone(),
            parent: None,
            level: RowLevel::Footer,
            breakdown: None,
            entity: None,
            data: RowData::default(),
            in_group: false,
            children: Vec::new(),
        };
        let mut index = HashMap::new();
        index.insert(footer_id, footer_key);
        // Key 0 belongs to the footer, which lives outside the arena.
        Self {
            rows: BTreeMap::new(),
            next_key: 1,
            index,
            roots: Vec::new(),
            footer,
        }
    }

    pub fn footer(&self) -> &Row {
        &self.footer
    }

    pub const fn footer_key(&self) -> RowKey {
        self.footer.key
    }

    pub fn get(&self, key: RowKey) -> Option<&Row> {
        if key == self.footer.key {
            return Some(&self.footer);
        }
        self.rows.get(&key)
    }

    fn get_mut(&mut self, key: RowKey) -> Option<&mut Row> {
        if key == self.footer.key {
            return Some(&mut self.footer);
        }
        self.rows.get_mut(&key)
    }

    pub fn find(&self, breakdown_id: &BreakdownId) -> Option<RowKey> {
        self.index.get(breakdown_id).copied()
    }

    pub fn row(&self, breakdown_id: &BreakdownId) -> Option<&Row> {
        self.find(breakdown_id).and_then(|key| self.get(key))
    }

    pub fn roots(&self) -> &[RowKey] {
        &self.roots
    }

    pub fn children_of(&self, parent: Option<RowKey>) -> &[RowKey] {
        match parent {
            None => &self.roots,
            Some(key) => self.get(key).map_or(&[], |row| row.children.as_slice()),
        }
    }

    /// Rows currently held, footer excluded.
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every row below `key`, depth first, in child order.
    pub fn descendants(&self, key: RowKey) -> Vec<RowKey> {
        let mut out = Vec::new();
        let mut stack: Vec<RowKey> = self
            .get(key)
            .map(|row| row.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(row) = self.get(next) {
                stack.extend(row.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn ancestors(&self, key: RowKey) -> Vec<RowKey> {
        let mut out = Vec::new();
        let mut cursor = self.get(key).and_then(|row| row.parent);
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = self.get(parent).and_then(|row| row.parent);
        }
        out
    }

    /// Applies `patch` and returns the patch that undoes it.
    pub fn apply_patch(&mut self, key: RowKey, patch: RowPatch) -> Result<RowPatch, GridError> {
        let row = self
            .get_mut(key)
            .ok_or_else(|| GridError::UnknownRow(format!("#{}", key.0)))?;

        let mut inverse = RowPatch::default();
        for (field, change) in patch.stats {
            let previous = row.data.stats.get(&field).cloned();
            let undo = match change {
                StatPatch::Replace(value) => {
                    row.data.stats.insert(field.clone(), value);
                    previous.map_or(StatPatch::Remove, StatPatch::Replace)
                }
                StatPatch::SetValue(value) => match row.data.stats.get_mut(&field) {
                    Some(existing) => {
                        StatPatch::SetValue(std::mem::replace(&mut existing.value, value))
                    }
                    None => {
                        row.data.stats.insert(
                            field.clone(),
                            StatValue {
                                value,
                                ..StatValue::default()
                            },
                        );
                        StatPatch::Remove
                    }
                },
                StatPatch::Remove => match row.data.stats.remove(&field) {
                    Some(old) => StatPatch::Replace(old),
                    None => continue,
                },
            };
            inverse.stats.insert(field, undo);
        }
        if let Some(archived) = patch.archived {
            inverse.archived = Some(std::mem::replace(&mut row.data.archived, archived));
        }
        if let Some(in_group) = patch.in_group {
            inverse.in_group = Some(std::mem::replace(&mut row.in_group, in_group));
        }
        Ok(inverse)
    }

    /// Reconciles every child of `parent` with a page that lists the whole
    /// branch: existing rows are patched in place, rows missing from the page
    /// are dropped along with their subtree, and the result follows the page
    /// order.
    pub fn reconcile_children(
        &mut self,
        parent: Option<RowKey>,
        rows: Vec<NewRow>,
    ) -> Result<MergeOutcome, GridError> {
        self.reconcile_window(parent, rows, usize::MAX)
    }

    /// Like [`RowTree::reconcile_children`], but only the first `window`
    /// children are answerable to the page. Children past the window were
    /// loaded by later pages and keep their place after the page rows.
    pub fn reconcile_window(
        &mut self,
        parent: Option<RowKey>,
        rows: Vec<NewRow>,
        window: usize,
    ) -> Result<MergeOutcome, GridError> {
        let mut outcome = MergeOutcome::default();
        let mut covered = self.children_of(parent).to_vec();
        let beyond = covered.split_off(window.min(covered.len()));
        let mut keys = Vec::with_capacity(rows.len());
        for new_row in rows {
            let (key, inserted) = self.upsert(parent, new_row)?;
            if inserted {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        for stale in covered.into_iter().filter(|key| !keys.contains(key)) {
            outcome.removed.extend(self.remove_subtree(stale));
        }
        let mut children = keys.clone();
        children.extend(beyond.into_iter().filter(|key| !keys.contains(key)));
        self.set_children(parent, children);
        outcome.keys = keys;
        Ok(outcome)
    }

    /// Appends a later page below the rows already loaded for `parent`.
    pub fn append_children(
        &mut self,
        parent: Option<RowKey>,
        rows: Vec<NewRow>,
    ) -> Result<MergeOutcome, GridError> {
        let mut outcome = MergeOutcome::default();
        let mut keys = self.children_of(parent).to_vec();
        for new_row in rows {
            let (key, inserted) = self.upsert(parent, new_row)?;
            if inserted {
                outcome.inserted += 1;
                keys.push(key);
            } else {
                outcome.updated += 1;
            }
            outcome.keys.push(key);
        }
        self.set_children(parent, keys);
        Ok(outcome)
    }

    pub fn set_footer_stats(&mut self, stats: StatMap) -> Result<RowPatch, GridError> {
        let next = RowData {
            stats,
            archived: false,
        };
        let patch = RowPatch::replace_all(&self.footer.data, next);
        self.apply_patch(self.footer.key, patch)
    }

    /// Removes `key` and everything below it; returns the removed paths.
    pub fn remove_subtree(&mut self, key: RowKey) -> Vec<BreakdownId> {
        if key == self.footer.key {
            return Vec::new();
        }
        let Some(parent) = self.get(key).map(|row| row.parent) else {
            return Vec::new();
        };
        match parent {
            None => self.roots.retain(|root| *root != key),
            Some(parent_key) => {
                if let Some(parent_row) = self.get_mut(parent_key) {
                    parent_row.children.retain(|child| *child != key);
                }
            }
        }

        let mut doomed = vec![key];
        doomed.extend(self.descendants(key));
        let mut removed = Vec::with_capacity(doomed.len());
        for victim in doomed {
            if let Some(row) = self.rows.remove(&victim) {
                self.index.remove(&row.breakdown_id);
                removed.push(row.breakdown_id);
            }
        }
        removed
    }

    /// Drops every data row; the footer stays and loses its stats.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.footer.data = RowData::default();
        self.index.retain(|id, _| id.is_footer());
        self.roots.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    fn upsert(
        &mut self,
        parent: Option<RowKey>,
        new_row: NewRow,
    ) -> Result<(RowKey, bool), GridError> {
        let breakdown_id = match parent {
            None => BreakdownId::root(&new_row.id),
            Some(parent_key) => {
                let parent_row = self
                    .get(parent_key)
                    .ok_or_else(|| GridError::UnknownRow(format!("#{}", parent_key.0)))?;
                parent_row.breakdown_id.child(&new_row.id)
            }
        };

        if let Some(existing) = self.find(&breakdown_id) {
            let current = self
                .get(existing)
                .map(|row| (row.data.clone(), row.in_group))
                .unwrap_or_default();
            let mut patch = RowPatch::replace_all(&current.0, new_row.data);
            if current.1 != new_row.in_group {
                patch.in_group = Some(new_row.in_group);
            }
            if !patch.is_empty() {
                self.apply_patch(existing, patch)?;
            }
            return Ok((existing, false));
        }

        let key = RowKey(self.next_key);
        self.next_key += 1;
        let depth = breakdown_id.depth();
        self.index.insert(breakdown_id.clone(), key);
        self.rows.insert(
            key,
            Row {
                key,
                id: new_row.id,
                breakdown_id,
                parent,
                level: RowLevel::for_depth(depth),
                breakdown: Some(new_row.breakdown),
                entity: new_row.entity,
                data: new_row.data,
                in_group: new_row.in_group,
                children: Vec::new(),
            },
        );
        Ok((key, true))
    }

    fn set_children(&mut self, parent: Option<RowKey>, keys: Vec<RowKey>) {
        match parent {
            None => self.roots = keys,
            Some(parent_key) => {
                if let Some(row) = self.get_mut(parent_key) {
                    row.children = keys;
                }
            }
        }
    }
}
