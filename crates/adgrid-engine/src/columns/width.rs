// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{BreakdownLevel, ColumnType};

const CHAR_WIDTH: u16 = 7;
const HEADER_PADDING: u16 = 24;
const SORT_ICON_WIDTH: u16 = 14;
const HELP_ICON_WIDTH: u16 = 18;
const DEFAULT_MIN_WIDTH: u16 = 90;

pub const fn min_width(column_type: Option<ColumnType>) -> u16 {
    match column_type {
        Some(ColumnType::Checkbox) => 40,
        Some(ColumnType::Breakdown) => 200,
        Some(ColumnType::StateSelector) => 60,
        Some(ColumnType::Thumbnail) => 70,
        Some(ColumnType::PerformanceIndicator) => 50,
        Some(ColumnType::Status | ColumnType::SubmissionStatus) => 120,
        Some(ColumnType::Currency | ColumnType::BidModifier) => 110,
        Some(ColumnType::DateTime) => 140,
        Some(ColumnType::ExternalLink) => 100,
        Some(ColumnType::Actions) => 80,
        Some(
            ColumnType::Text
            | ColumnType::Number
            | ColumnType::Percent
            | ColumnType::Seconds
            | ColumnType::Stats,
        )
        | None => DEFAULT_MIN_WIDTH,
    }
}

/// Width the header needs: text metrics plus whichever icons it shows.
pub fn header_width(header: &str, sortable: bool, has_help: bool) -> u16 {
    let chars = u16::try_from(header.chars().count()).unwrap_or(u16::MAX);
    let mut width = chars.saturating_mul(CHAR_WIDTH).saturating_add(HEADER_PADDING);
    if sortable {
        width = width.saturating_add(SORT_ICON_WIDTH);
    }
    if has_help {
        width = width.saturating_add(HELP_ICON_WIDTH);
    }
    width
}

pub fn column_width(
    column_type: Option<ColumnType>,
    header: &str,
    sortable: bool,
    has_help: bool,
) -> u16 {
    min_width(column_type).max(header_width(header, sortable, has_help))
}

/// The actions column ignores header metrics; its width depends only on how
/// many row actions the breakdown offers.
pub const fn actions_width(breakdown: BreakdownLevel) -> u16 {
    match breakdown {
        BreakdownLevel::AllAccounts | BreakdownLevel::Account => 80,
        BreakdownLevel::Campaign => 110,
        BreakdownLevel::AdGroup => 140,
        BreakdownLevel::ContentAd => 170,
        BreakdownLevel::Source | BreakdownLevel::Publisher => 60,
    }
}
