// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::Date;

use crate::ids::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownLevel {
    AllAccounts,
    Account,
    Campaign,
    AdGroup,
    Source,
    Publisher,
    ContentAd,
}

impl BreakdownLevel {
    pub const ALL: [Self; 7] = [
        Self::AllAccounts,
        Self::Account,
        Self::Campaign,
        Self::AdGroup,
        Self::Source,
        Self::Publisher,
        Self::ContentAd,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllAccounts => "all_accounts",
            Self::Account => "account",
            Self::Campaign => "campaign",
            Self::AdGroup => "ad_group",
            Self::Source => "source",
            Self::Publisher => "publisher",
            Self::ContentAd => "content_ad",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == value)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::AllAccounts => "All accounts",
            Self::Account => "Account",
            Self::Campaign => "Campaign",
            Self::AdGroup => "Ad group",
            Self::Source => "Media source",
            Self::Publisher => "Publisher",
            Self::ContentAd => "Content ad",
        }
    }

    /// Position in the hierarchy; the three sibling breakdowns below ad group
    /// share a rank.
    pub const fn rank(self) -> u8 {
        match self {
            Self::AllAccounts => 0,
            Self::Account => 1,
            Self::Campaign => 2,
            Self::AdGroup => 3,
            Self::Source | Self::Publisher | Self::ContentAd => 4,
        }
    }

    pub const fn is_delivery(self) -> bool {
        matches!(self, Self::Source | Self::Publisher | Self::ContentAd)
    }

    pub const fn entity_kind(self) -> Option<EntityKind> {
        match self {
            Self::Account => Some(EntityKind::Account),
            Self::Campaign => Some(EntityKind::Campaign),
            Self::AdGroup => Some(EntityKind::AdGroup),
            Self::ContentAd => Some(EntityKind::ContentAd),
            Self::AllAccounts | Self::Source | Self::Publisher => None,
        }
    }
}

/// The level a grid is rooted at plus the ordered breakdowns rendered below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownPath {
    grid_level: BreakdownLevel,
    levels: Vec<BreakdownLevel>,
}

impl BreakdownPath {
    pub fn new(grid_level: BreakdownLevel, levels: Vec<BreakdownLevel>) -> Result<Self> {
        if grid_level.is_delivery() {
            bail!(
                "grid level {} cannot host breakdowns -- root the grid at an account, campaign or ad group",
                grid_level.as_str()
            );
        }
        if levels.is_empty() {
            bail!("breakdown path is empty -- choose at least one breakdown");
        }

        let mut previous = grid_level;
        for (index, level) in levels.iter().copied().enumerate() {
            if level == BreakdownLevel::AllAccounts {
                bail!("all_accounts is a grid level, not a breakdown");
            }
            if level.rank() <= previous.rank() {
                bail!(
                    "breakdown {} cannot follow {} -- breakdowns must descend the account hierarchy",
                    level.as_str(),
                    previous.as_str()
                );
            }
            if level.is_delivery() && index + 1 != levels.len() {
                bail!(
                    "breakdown {} must be the last level; source, publisher and content ad are exclusive",
                    level.as_str()
                );
            }
            previous = level;
        }

        Ok(Self { grid_level, levels })
    }

    pub fn grid_level(&self) -> BreakdownLevel {
        self.grid_level
    }

    pub fn levels(&self) -> &[BreakdownLevel] {
        &self.levels
    }

    /// Breakdown of the rows at `depth` (1 = base rows).
    pub fn level_at(&self, depth: usize) -> Option<BreakdownLevel> {
        depth.checked_sub(1).and_then(|index| self.levels.get(index).copied())
    }

    pub fn base(&self) -> BreakdownLevel {
        self.levels[0]
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn contains(&self, level: BreakdownLevel) -> bool {
        self.levels.contains(&level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowLevel {
    Base,
    Nested(u8),
    Footer,
}

impl RowLevel {
    pub fn for_depth(depth: usize) -> Self {
        if depth <= 1 {
            Self::Base
        } else {
            Self::Nested(u8::try_from(depth).unwrap_or(u8::MAX))
        }
    }

    pub const fn depth(self) -> usize {
        match self {
            Self::Base => 1,
            Self::Nested(depth) => depth as usize,
            Self::Footer => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum StatData {
    #[default]
    Null,
    Number(f64),
    Text(String),
    Object(serde_json::Map<String, serde_json::Value>),
}

impl StatData {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<f64>().ok(),
            Self::Null | Self::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Optimal,
    Medium,
    Bad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatValue {
    #[serde(default)]
    pub value: StatData,
    #[serde(default)]
    pub is_editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_status: Option<GoalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popover_message: Option<String>,
}

impl StatValue {
    pub fn number(value: f64) -> Self {
        Self {
            value: StatData::Number(value),
            ..Self::default()
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: StatData::Text(value.into()),
            ..Self::default()
        }
    }

    pub fn editable(mut self) -> Self {
        self.is_editable = true;
        self
    }
}

pub type StatMap = BTreeMap<String, StatValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RowData {
    #[serde(default)]
    pub stats: StatMap,
    #[serde(default)]
    pub archived: bool,
}

pub fn refund_field(field: &str) -> String {
    format!("{field}_refund")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Aud,
    Mxn,
}

impl Currency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Aud => "AUD",
            Self::Mxn => "MXN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USD" => Some(Self::Usd),
            "EUR" => Some(Self::Eur),
            "GBP" => Some(Self::Gbp),
            "AUD" => Some(Self::Aud),
            "MXN" => Some(Self::Mxn),
            _ => None,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Usd => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
            Self::Aud => "A$",
            Self::Mxn => "MX$",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Delivery state toggled from the state-selector column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Active,
    Paused,
}

impl EntityState {
    pub const FIELD: &'static str = "state";

    pub const fn code(self) -> i64 {
        match self {
            Self::Active => 1,
            Self::Paused => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Active),
            2 => Some(Self::Paused),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Paused => "Paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Checkbox,
    Breakdown,
    Text,
    Number,
    Percent,
    Seconds,
    DateTime,
    Currency,
    BidModifier,
    Status,
    StateSelector,
    Thumbnail,
    PerformanceIndicator,
    SubmissionStatus,
    Actions,
    ExternalLink,
    Stats,
}

impl ColumnType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkbox => "checkbox",
            Self::Breakdown => "breakdown",
            Self::Text => "text",
            Self::Number => "number",
            Self::Percent => "percent",
            Self::Seconds => "seconds",
            Self::DateTime => "date_time",
            Self::Currency => "currency",
            Self::BidModifier => "bid_modifier",
            Self::Status => "status",
            Self::StateSelector => "state_selector",
            Self::Thumbnail => "thumbnail",
            Self::PerformanceIndicator => "performance_indicator",
            Self::SubmissionStatus => "submission_status",
            Self::Actions => "actions",
            Self::ExternalLink => "external_link",
            Self::Stats => "stats",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "checkbox" => Some(Self::Checkbox),
            "breakdown" => Some(Self::Breakdown),
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "percent" => Some(Self::Percent),
            "seconds" => Some(Self::Seconds),
            "date_time" => Some(Self::DateTime),
            "currency" => Some(Self::Currency),
            "bid_modifier" => Some(Self::BidModifier),
            "status" => Some(Self::Status),
            "state_selector" => Some(Self::StateSelector),
            "thumbnail" => Some(Self::Thumbnail),
            "performance_indicator" => Some(Self::PerformanceIndicator),
            "submission_status" => Some(Self::SubmissionStatus),
            "actions" => Some(Self::Actions),
            "external_link" => Some(Self::ExternalLink),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnData {
    pub field: String,
    pub name: String,
    #[serde(default)]
    pub editable: bool,
    #[serde(default = "default_true")]
    pub total_row: bool,
    #[serde(default = "default_true")]
    pub order: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_order: Option<SortDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction_size: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ColumnData {
    pub fn new(field: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            name: name.into(),
            editable: false,
            total_row: true,
            order: true,
            initial_order: None,
            fraction_size: None,
            default_value: None,
            help: None,
        }
    }
}

/// Abstract column definition; `column_type` stays a raw string so unknown
/// types coming from configuration survive until the mapper registry sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridColumn {
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ColumnData>,
}

impl GridColumn {
    pub fn new(column_type: ColumnType, data: ColumnData) -> Self {
        Self {
            column_type: column_type.as_str().to_owned(),
            data: Some(data),
        }
    }

    pub fn kind(&self) -> Option<ColumnType> {
        ColumnType::parse(&self.column_type)
    }

    pub fn field(&self) -> Option<&str> {
        self.data.as_ref().map(|data| data.field.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Result<Self> {
        if end < start {
            bail!("date range end {end} must be on/after start {start}");
        }
        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::{BreakdownLevel, BreakdownPath, ColumnType, Currency, GridColumn, RowLevel};

    #[test]
    fn breakdown_path_accepts_descending_levels() {
        let path = BreakdownPath::new(
            BreakdownLevel::Account,
            vec![
                BreakdownLevel::Campaign,
                BreakdownLevel::AdGroup,
                BreakdownLevel::Source,
            ],
        )
        .expect("valid path");

        assert_eq!(path.base(), BreakdownLevel::Campaign);
        assert_eq!(path.level_at(3), Some(BreakdownLevel::Source));
        assert_eq!(path.level_at(4), None);
        assert_eq!(path.level_at(0), None);
    }

    #[test]
    fn breakdown_path_rejects_sibling_delivery_breakdowns() {
        let error = BreakdownPath::new(
            BreakdownLevel::AdGroup,
            vec![BreakdownLevel::Source, BreakdownLevel::Publisher],
        )
        .expect_err("source and publisher are exclusive");
        assert!(error.to_string().contains("source"));
    }

    #[test]
    fn breakdown_path_rejects_ascending_levels() {
        assert!(
            BreakdownPath::new(
                BreakdownLevel::AllAccounts,
                vec![BreakdownLevel::Campaign, BreakdownLevel::Account],
            )
            .is_err()
        );
        assert!(
            BreakdownPath::new(BreakdownLevel::Campaign, vec![BreakdownLevel::Campaign]).is_err()
        );
        assert!(BreakdownPath::new(BreakdownLevel::Account, Vec::new()).is_err());
    }

    #[test]
    fn breakdown_level_names_parse_back() {
        assert_eq!(BreakdownLevel::parse("ad_group"), Some(BreakdownLevel::AdGroup));
        assert_eq!(
            BreakdownLevel::parse("all_accounts"),
            Some(BreakdownLevel::AllAccounts)
        );
        assert_eq!(BreakdownLevel::parse("Campaign"), None);
        assert_eq!(BreakdownLevel::parse(""), None);
    }

    #[test]
    fn row_level_follows_depth() {
        assert_eq!(RowLevel::for_depth(1), RowLevel::Base);
        assert_eq!(RowLevel::for_depth(3), RowLevel::Nested(3));
        assert_eq!(RowLevel::Nested(3).depth(), 3);
    }

    #[test]
    fn currency_parse_is_case_insensitive() {
        assert_eq!(Currency::parse("eur"), Some(Currency::Eur));
        assert_eq!(Currency::parse("JPY"), None);
        assert_eq!(Currency::Eur.symbol(), "€");
    }

    #[test]
    fn unknown_column_type_survives_deserialization() {
        let column: GridColumn =
            serde_json::from_str(r#"{"type":"sparkline","data":{"field":"x","name":"X"}}"#)
                .expect("column json");
        assert_eq!(column.kind(), None);
        assert_eq!(column.field(), Some("x"));

        let known: GridColumn =
            serde_json::from_str(r#"{"type":"currency"}"#).expect("column json");
        assert_eq!(known.kind(), Some(ColumnType::Currency));
        assert!(known.data.is_none());
    }
}
