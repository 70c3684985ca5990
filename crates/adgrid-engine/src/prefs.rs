// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeMap;

pub const EXPANDED_DEPTH_KEY: &str = "expanded_depth";
pub const ORDER_KEY: &str = "order";

/// Key/value preferences scoped by grid name.
pub trait PreferenceStore {
    fn get(&self, grid: &str, key: &str) -> Result<Option<String>>;
    fn set(&mut self, grid: &str, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, grid: &str, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<(String, String), String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, grid: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .get(&(grid.to_owned(), key.to_owned()))
            .cloned())
    }

    fn set(&mut self, grid: &str, key: &str, value: &str) -> Result<()> {
        self.values
            .insert((grid.to_owned(), key.to_owned()), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, grid: &str, key: &str) -> Result<()> {
        self.values.remove(&(grid.to_owned(), key.to_owned()));
        Ok(())
    }
}
