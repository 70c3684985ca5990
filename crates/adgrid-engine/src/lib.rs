// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod bus;
pub mod collapse;
pub mod columns;
pub mod context;
pub mod data;
pub mod edit;
pub mod error;
pub mod prefs;
pub mod runtime;
pub mod selection;
pub mod sync;
pub mod tree;

pub use bus::{EventBus, GridEvent, Topic};
pub use collapse::CollapseService;
pub use columns::{
    GridMeta, Pinned, RendererBinding, RendererColumnDescriptor, SortOptions, format_cell,
    format_refund, map_column, map_columns,
};
pub use context::{GridConfig, GridContext, Outbound, VisibleRow};
pub use data::{
    BranchKey, BranchState, Cursor, FetchRequest, FetchResponse, FetchTicket, FetchedRow,
    ParentKey, QueryParams,
};
pub use edit::{
    SaveRequest, SaveResponse, SaveTicket, StateBatchRequest, StateBatchResponse, StateToggle,
};
pub use error::{GridError, SaveFailure};
pub use prefs::{MemoryPreferences, PreferenceStore};
pub use runtime::{Completion, GridBackend, GridRuntime};
pub use selection::{BulkSelection, CheckboxState, RowSelection, SelectionFilter, SelectionMode};
pub use sync::SyncState;
pub use tree::{Row, RowKey, RowPatch, RowTree, StatPatch};
