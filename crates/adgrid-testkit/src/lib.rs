// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_engine::data::row_id;
use adgrid_engine::{
    Completion, FetchRequest, FetchResponse, FetchedRow, GridBackend, Outbound, SaveFailure,
    SaveRequest, SaveResponse, StateBatchRequest, StateBatchResponse,
};
use adgrid_model::{
    BreakdownId, BreakdownLevel, ColumnData, ColumnType, EntityRef, EntityState, GridColumn,
    SortDirection, StatData, StatMap, StatValue,
};
use anyhow::{Context, Result, anyhow, bail};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

const CAMPAIGN_THEMES: [&str; 12] = [
    "Spring Sale",
    "Back to School",
    "Holiday Push",
    "Brand Awareness",
    "Retargeting",
    "Product Launch",
    "Summer Clearance",
    "Newsletter Signup",
    "App Installs",
    "Lead Gen",
    "Webinar",
    "Black Friday",
];

const AUDIENCES: [&str; 8] = [
    "Desktop",
    "Mobile",
    "US East",
    "US West",
    "EU",
    "Returning Visitors",
    "Lookalike",
    "Broad",
];

const SOURCES: [&str; 10] = [
    "yahoo",
    "outbrain",
    "taboola",
    "triplelift",
    "sharethrough",
    "gumgum",
    "teads",
    "nativo",
    "revcontent",
    "mgid",
];

const PUBLISHER_WORDS: [&str; 12] = [
    "daily", "metro", "tech", "sports", "recipes", "travel", "finance", "garden", "health",
    "motor", "style", "news",
];

const AD_TITLES: [&str; 8] = [
    "You won't believe this deal",
    "Top 10 picks for this season",
    "Save big before it's gone",
    "The smarter way to shop",
    "Experts recommend this",
    "Try it free for 30 days",
    "Limited time offer",
    "See what's new",
];

pub const BASE_PAGE_ROWS: usize = 12;
pub const NESTED_PAGE_ROWS: usize = 4;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator for plausible campaign data.
#[derive(Debug, Clone)]
pub struct AdFaker {
    rng: DeterministicRng,
    next_entity_id: i64,
}

impl AdFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_entity_id: 100,
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn entity_name(&mut self, level: BreakdownLevel) -> String {
        match level {
            BreakdownLevel::ContentAd => self.pick(&AD_TITLES).to_owned(),
            BreakdownLevel::AdGroup => format!("{} ad group", self.pick(&AUDIENCES)),
            BreakdownLevel::Account | BreakdownLevel::AllAccounts => {
                format!("{} Media", self.pick(&PUBLISHER_WORDS).to_ascii_uppercase())
            }
            _ => format!("{} - {}", self.pick(&CAMPAIGN_THEMES), self.pick(&AUDIENCES)),
        }
    }

    /// Unique within one branch for `index` below a few hundred.
    pub fn source_slug(&mut self, index: usize) -> String {
        let base = SOURCES[index % SOURCES.len()];
        match index / SOURCES.len() {
            0 => base.to_owned(),
            round => format!("{base}-{round}"),
        }
    }

    pub fn publisher_domain(&mut self, index: usize) -> String {
        format!("{}{index}.com", self.pick(&PUBLISHER_WORDS))
    }

    pub fn money(&mut self, min_cents: i64, max_cents: i64) -> f64 {
        self.int_range(min_cents, max_cents) as f64 / 100.0
    }

    /// Impressions, clicks, spend and the rates derived from them.
    pub fn delivery_stats(&mut self) -> StatMap {
        let impressions = self.int_range(1_000, 250_000);
        let clicks = self.int_range(0, impressions / 50);
        let spend = self.money(500, 90_000);
        let mut stats = StatMap::new();
        stats.insert("impressions".to_owned(), StatValue::number(impressions as f64));
        stats.insert("clicks".to_owned(), StatValue::number(clicks as f64));
        stats.insert("spend".to_owned(), StatValue::number(spend));
        stats.insert(
            "ctr".to_owned(),
            StatValue::number(round2(clicks as f64 * 100.0 / impressions as f64)),
        );
        let cpc = if clicks == 0 {
            StatValue::default()
        } else {
            StatValue::number(round2(spend / clicks as f64))
        };
        stats.insert("cpc".to_owned(), cpc);
        stats
    }

    pub fn modified_at(&mut self) -> StatData {
        let offset = Duration::minutes(self.int_range(0, 60 * 24 * 30));
        (reference_now() - offset)
            .format(&Rfc3339)
            .map_or(StatData::Null, StatData::Text)
    }

    pub fn row(&mut self, level: BreakdownLevel, index: usize) -> FetchedRow {
        let mut stats = self.delivery_stats();
        let (id, entity) = match level.entity_kind() {
            Some(kind) => {
                let id = self.next_entity_id;
                self.next_entity_id += 1;
                (id.to_string(), Some(EntityRef::new(kind, id)))
            }
            None => match level {
                BreakdownLevel::Publisher => (self.publisher_domain(index), None),
                _ => (self.source_slug(index), None),
            },
        };

        let name = match level {
            BreakdownLevel::Source | BreakdownLevel::Publisher => id.clone(),
            _ => self.entity_name(level),
        };
        stats.insert("breakdown_name".to_owned(), StatValue::text(name));
        if entity.is_some() {
            let state = if self.int_n(5) == 0 {
                EntityState::Paused
            } else {
                EntityState::Active
            };
            stats.insert(
                EntityState::FIELD.to_owned(),
                StatValue::number(state.code() as f64).editable(),
            );
            stats.insert(
                "daily_budget".to_owned(),
                StatValue::number(self.money(1_000, 50_000)).editable(),
            );
            stats.insert(
                "last_modified".to_owned(),
                StatValue {
                    value: self.modified_at(),
                    ..StatValue::default()
                },
            );
        } else {
            let percent = self.int_range(-50, 150) as f64;
            stats.insert(
                "bid_modifier".to_owned(),
                StatValue::number((percent + 100.0) / 100.0).editable(),
            );
        }

        FetchedRow {
            id,
            entity,
            stats,
            archived: self.int_n(10) == 0,
            in_group: false,
        }
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn reference_now() -> OffsetDateTime {
    time::macros::datetime!(2026-05-01 09:00 UTC)
}

/// Column set used by demos and tests: the common stats plus whatever the
/// base level can edit.
pub fn demo_columns(base: BreakdownLevel) -> Vec<GridColumn> {
    let mut columns = vec![
        GridColumn::new(ColumnType::Checkbox, ColumnData::new("checked", "")),
        GridColumn::new(
            ColumnType::Breakdown,
            ColumnData::new("breakdown_name", base.label()),
        ),
    ];
    if base.entity_kind().is_some() {
        let mut state = ColumnData::new(EntityState::FIELD, "Status");
        state.editable = true;
        state.total_row = false;
        columns.push(GridColumn::new(ColumnType::StateSelector, state));

        let mut budget = ColumnData::new("daily_budget", "Daily budget");
        budget.editable = true;
        budget.fraction_size = Some(2);
        budget.help = Some("Maximum spend per day.".to_owned());
        columns.push(GridColumn::new(ColumnType::Currency, budget));
    } else {
        let mut modifier = ColumnData::new("bid_modifier", "Bid modifier");
        modifier.editable = true;
        modifier.total_row = false;
        columns.push(GridColumn::new(ColumnType::BidModifier, modifier));
    }

    columns.push(GridColumn::new(
        ColumnType::Number,
        ColumnData::new("impressions", "Impressions"),
    ));
    columns.push(GridColumn::new(
        ColumnType::Number,
        ColumnData::new("clicks", "Clicks"),
    ));
    columns.push(GridColumn::new(
        ColumnType::Currency,
        ColumnData::new("spend", "Spend"),
    ));
    let mut ctr = ColumnData::new("ctr", "CTR");
    ctr.fraction_size = Some(2);
    columns.push(GridColumn::new(ColumnType::Percent, ctr));
    columns.push(GridColumn::new(
        ColumnType::Currency,
        ColumnData::new("cpc", "Avg. CPC"),
    ));
    if base.entity_kind().is_some() {
        let mut modified = ColumnData::new("last_modified", "Last modified");
        modified.total_row = false;
        columns.push(GridColumn::new(ColumnType::DateTime, modified));
    }
    columns
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Fetch {
        level: BreakdownLevel,
        parent: Option<BreakdownId>,
        offset: usize,
        limit: usize,
    },
    Save {
        row: BreakdownId,
        field: String,
        value: StatData,
    },
    StateBatch {
        rows: usize,
    },
    SyncStatus(EntityRef),
    TriggerSync(EntityRef),
}

type BranchData = BTreeMap<(String, BreakdownLevel), Vec<FetchedRow>>;

/// In-memory [`GridBackend`] with generated rows, scripted failures and a
/// record of every call it served.
#[derive(Debug)]
pub struct DemoBackend {
    faker: AdFaker,
    base_rows: usize,
    nested_rows: usize,
    branches: BranchData,
    calls: Vec<BackendCall>,
    fetch_failures: VecDeque<String>,
    save_failures: VecDeque<SaveFailure>,
    sync_answers: VecDeque<bool>,
    sync_poll_failures: VecDeque<String>,
    sync_in_progress: bool,
    last_sync_date: Option<String>,
    holding: bool,
    held: Vec<(Outbound, Sender<Completion>)>,
}

impl DemoBackend {
    pub fn new(seed: u64) -> Self {
        Self {
            faker: AdFaker::new(seed),
            base_rows: BASE_PAGE_ROWS,
            nested_rows: NESTED_PAGE_ROWS,
            branches: BTreeMap::new(),
            calls: Vec::new(),
            fetch_failures: VecDeque::new(),
            save_failures: VecDeque::new(),
            sync_answers: VecDeque::new(),
            sync_poll_failures: VecDeque::new(),
            sync_in_progress: false,
            last_sync_date: Some("2026-05-01T08:45:00Z".to_owned()),
            holding: false,
            held: Vec::new(),
        }
    }

    pub fn with_rows(mut self, base_rows: usize, nested_rows: usize) -> Self {
        self.base_rows = base_rows;
        self.nested_rows = nested_rows;
        self
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn fetch_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, BackendCall::Fetch { .. }))
            .count()
    }

    pub fn sync_status_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, BackendCall::SyncStatus(_)))
            .count()
    }

    pub fn fail_next_fetch(&mut self, message: impl Into<String>) {
        self.fetch_failures.push_back(message.into());
    }

    pub fn fail_next_save(&mut self, failure: SaveFailure) {
        self.save_failures.push_back(failure);
    }

    /// Answers for the next status polls; once exhausted every poll reports
    /// the sync as finished.
    pub fn script_sync(&mut self, answers: impl IntoIterator<Item = bool>) {
        self.sync_answers.extend(answers);
    }

    pub fn fail_next_sync_poll(&mut self, message: impl Into<String>) {
        self.sync_poll_failures.push_back(message.into());
    }

    pub fn set_sync_in_progress(&mut self, in_progress: bool) {
        self.sync_in_progress = in_progress;
    }

    /// While holding, spawned jobs wait for [`DemoBackend::release_held`].
    pub fn set_holding(&mut self, holding: bool) {
        self.holding = holding;
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Runs held jobs, newest first when `reverse` is set.
    pub fn release_held(&mut self, reverse: bool) -> Result<usize> {
        let mut held = std::mem::take(&mut self.held);
        if reverse {
            held.reverse();
        }
        let count = held.len();
        for (job, tx) in held {
            let completion = self.execute(job);
            tx.send(completion)
                .map_err(|_| anyhow!("grid completion channel closed"))?;
        }
        Ok(count)
    }

    /// Current server-side value of a stat.
    pub fn stat(&self, row: &BreakdownId, field: &str) -> Option<&StatValue> {
        self.find_row(row).and_then(|found| found.stats.get(field))
    }

    fn branch_rows(&mut self, parent: &str, level: BreakdownLevel) -> &mut Vec<FetchedRow> {
        let count = if parent.is_empty() {
            self.base_rows
        } else {
            self.nested_rows
        };
        let faker = &mut self.faker;
        self.branches
            .entry((parent.to_owned(), level))
            .or_insert_with(|| (0..count).map(|index| faker.row(level, index)).collect())
    }

    fn find_row(&self, id: &BreakdownId) -> Option<&FetchedRow> {
        let parent = id.parent().map(|parent| parent.as_str().to_owned());
        let parent = parent.unwrap_or_default();
        self.branches
            .iter()
            .filter(|((branch_parent, _), _)| *branch_parent == parent)
            .find_map(|((_, level), rows)| {
                rows.iter()
                    .find(|row| row_id(*level, &row.id) == id.row_id())
            })
    }

    fn find_row_mut(&mut self, id: &BreakdownId) -> Option<&mut FetchedRow> {
        let parent = id.parent().map(|parent| parent.as_str().to_owned());
        let parent = parent.unwrap_or_default();
        self.branches
            .iter_mut()
            .filter(|((branch_parent, _), _)| *branch_parent == parent)
            .find_map(|((_, level), rows)| {
                let level = *level;
                rows.iter_mut()
                    .find(|row| row_id(level, &row.id) == id.row_id())
            })
    }
}

fn sort_rows(rows: &mut [FetchedRow], field: &str, direction: SortDirection) {
    rows.sort_by(|left, right| {
        let left = left.stats.get(field).and_then(|stat| stat.value.as_f64());
        let right = right.stats.get(field).and_then(|stat| stat.value.as_f64());
        let ordering = left
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&right.unwrap_or(f64::NEG_INFINITY));
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn sum_totals(rows: &[FetchedRow]) -> StatMap {
    let mut totals = StatMap::new();
    for field in ["impressions", "clicks", "spend"] {
        let sum: f64 = rows
            .iter()
            .filter_map(|row| row.stats.get(field).and_then(|stat| stat.value.as_f64()))
            .sum();
        totals.insert(field.to_owned(), StatValue::number(round2(sum)));
    }
    totals
}

impl GridBackend for DemoBackend {
    fn fetch_breakdown(&mut self, request: &FetchRequest) -> Result<FetchResponse> {
        let level = request.key.branch.level;
        let parent = request.parent_id().cloned();
        let offset = request.key.offset;
        let limit = request.key.page_size;
        self.calls.push(BackendCall::Fetch {
            level,
            parent: parent.clone(),
            offset,
            limit,
        });
        if let Some(message) = self.fetch_failures.pop_front() {
            bail!("{message}");
        }

        let parent_key = parent
            .as_ref()
            .map(|id| id.as_str().to_owned())
            .unwrap_or_default();
        let mut rows = self.branch_rows(&parent_key, level).clone();
        if let Some(field) = &request.key.sort_field {
            sort_rows(&mut rows, field, request.key.sort_direction);
        }
        let total_count = rows.len();
        let page: Vec<FetchedRow> = rows
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        let root_page = parent.is_none() && offset == 0;
        Ok(FetchResponse {
            rows: page,
            total_count,
            totals: root_page.then(|| sum_totals(&rows)),
            last_sync_date: if root_page {
                self.last_sync_date.clone()
            } else {
                None
            },
            is_sync_in_progress: root_page.then_some(self.sync_in_progress),
        })
    }

    fn save_stat(&mut self, request: &SaveRequest) -> Result<SaveResponse, SaveFailure> {
        self.calls.push(BackendCall::Save {
            row: request.row.clone(),
            field: request.field.clone(),
            value: request.value.clone(),
        });
        if let Some(failure) = self.save_failures.pop_front() {
            return Err(failure);
        }
        let row = self
            .find_row_mut(&request.row)
            .ok_or_else(|| SaveFailure::Conflict {
                message: format!("row {} no longer exists", request.row),
            })?;
        let stat = row.stats.entry(request.field.clone()).or_default();
        stat.value = request.value.clone();
        stat.is_editable = true;

        let mut updated_stats = StatMap::new();
        updated_stats.insert(request.field.clone(), stat.clone());
        Ok(SaveResponse { updated_stats })
    }

    fn save_state_batch(
        &mut self,
        request: &StateBatchRequest,
    ) -> Result<StateBatchResponse, SaveFailure> {
        self.calls.push(BackendCall::StateBatch {
            rows: request.rows.len(),
        });
        if let Some(failure) = self.save_failures.pop_front() {
            return Err(failure);
        }
        let mut updated = BTreeMap::new();
        for toggle in &request.rows {
            let Some(row) = self.find_row_mut(&toggle.row) else {
                continue;
            };
            let stat = StatValue::number(toggle.state.code() as f64).editable();
            row.stats.insert(EntityState::FIELD.to_owned(), stat.clone());
            let mut stats = StatMap::new();
            stats.insert(EntityState::FIELD.to_owned(), stat);
            updated.insert(toggle.row.clone(), stats);
        }
        Ok(StateBatchResponse { updated })
    }

    fn sync_status(&mut self, entity: EntityRef) -> Result<bool> {
        self.calls.push(BackendCall::SyncStatus(entity));
        if let Some(message) = self.sync_poll_failures.pop_front() {
            bail!("{message}");
        }
        let syncing = self.sync_answers.pop_front().unwrap_or(false);
        if !syncing {
            self.sync_in_progress = false;
            self.last_sync_date = Some("2026-05-01T09:00:00Z".to_owned());
        }
        Ok(syncing)
    }

    fn trigger_sync(&mut self, entity: EntityRef) -> Result<()> {
        self.calls.push(BackendCall::TriggerSync(entity));
        self.sync_in_progress = true;
        Ok(())
    }

    fn spawn(&mut self, job: Outbound, tx: Sender<Completion>) -> Result<()> {
        if self.holding {
            self.held.push((job, tx));
            return Ok(());
        }
        let completion = self.execute(job);
        tx.send(completion)
            .map_err(|_| anyhow!("grid completion channel closed"))?;
        Ok(())
    }
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("config.toml");
    Ok((dir, path))
}
