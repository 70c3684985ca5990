// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

use crate::{ColumnData, ColumnType, EntityState, StatData};

pub const MAX_MONEY_VALUE: f64 = 1_000_000_000.0;
pub const MIN_BID_MODIFIER_PERCENT: f64 = -90.0;
pub const MAX_BID_MODIFIER_PERCENT: f64 = 1000.0;
const DEFAULT_MONEY_FRACTION: u8 = 2;
const BID_MODIFIER_FRACTION: u8 = 2;

/// Input rejected before it reaches the save coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a value is required")]
    Required,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("value cannot be negative")]
    Negative,
    #[error("use at most {max} decimal places")]
    TooManyDecimals { max: u8 },
    #[error("value must be between {min} and {max}")]
    OutOfRange { min: String, max: String },
    #[error("unknown state {0:?} -- use active or paused")]
    InvalidState(String),
    #[error("field {0} is not editable")]
    NotEditable(String),
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Turns raw user input for an editable cell into the value sent to the server.
pub fn parse_edit_value(
    column_type: ColumnType,
    data: &ColumnData,
    raw: &str,
) -> ValidationResult<StatData> {
    match column_type {
        ColumnType::Currency => {
            parse_money(raw, data.fraction_size.unwrap_or(DEFAULT_MONEY_FRACTION))
                .map(StatData::Number)
        }
        ColumnType::Number | ColumnType::Percent | ColumnType::Seconds | ColumnType::Stats => {
            parse_decimal(raw, data.fraction_size.unwrap_or(DEFAULT_MONEY_FRACTION))
                .map(StatData::Number)
        }
        ColumnType::BidModifier => parse_bid_modifier_percent(raw).map(StatData::Number),
        ColumnType::StateSelector => {
            parse_state(raw).map(|state| StatData::Number(state.code() as f64))
        }
        ColumnType::Checkbox
        | ColumnType::Breakdown
        | ColumnType::Text
        | ColumnType::DateTime
        | ColumnType::Status
        | ColumnType::Thumbnail
        | ColumnType::PerformanceIndicator
        | ColumnType::SubmissionStatus
        | ColumnType::Actions
        | ColumnType::ExternalLink => Err(ValidationError::NotEditable(data.field.clone())),
    }
}

pub fn parse_money(raw: &str, fraction_size: u8) -> ValidationResult<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, ',' | '$' | '€' | '£' | ' '))
        .collect();
    let value = parse_decimal(&cleaned, fraction_size)?;
    if value > MAX_MONEY_VALUE {
        return Err(ValidationError::OutOfRange {
            min: "0".to_owned(),
            max: format!("{MAX_MONEY_VALUE:.0}"),
        });
    }
    Ok(value)
}

pub fn parse_decimal(raw: &str, fraction_size: u8) -> ValidationResult<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required);
    }
    let value = parse_finite(trimmed)?;
    if value < 0.0 {
        return Err(ValidationError::Negative);
    }
    check_decimals(trimmed, fraction_size)?;
    Ok(value)
}

/// Bid modifiers are edited as a percent change and stored as a multiplier:
/// `105.5` becomes `(105.5 + 100) / 100 = 2.055`.
pub fn parse_bid_modifier_percent(raw: &str) -> ValidationResult<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required);
    }
    let percent = parse_finite(trimmed.trim_start_matches('+'))?;
    check_decimals(trimmed, BID_MODIFIER_FRACTION)?;
    if !(MIN_BID_MODIFIER_PERCENT..=MAX_BID_MODIFIER_PERCENT).contains(&percent) {
        return Err(ValidationError::OutOfRange {
            min: format!("{MIN_BID_MODIFIER_PERCENT:.0}%"),
            max: format!("{MAX_BID_MODIFIER_PERCENT:.0}%"),
        });
    }
    Ok(bid_modifier_from_percent(percent))
}

pub fn bid_modifier_from_percent(percent: f64) -> f64 {
    (percent + 100.0) / 100.0
}

pub fn bid_modifier_to_percent(modifier: f64) -> f64 {
    modifier * 100.0 - 100.0
}

pub fn parse_state(raw: &str) -> ValidationResult<EntityState> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Err(ValidationError::Required),
        "active" | "enabled" | "1" => Ok(EntityState::Active),
        "paused" | "inactive" | "2" => Ok(EntityState::Paused),
        other => Err(ValidationError::InvalidState(other.to_owned())),
    }
}

fn parse_finite(value: &str) -> ValidationResult<f64> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(ValidationError::InvalidNumber(value.to_owned())),
    }
}

fn check_decimals(value: &str, max: u8) -> ValidationResult<()> {
    let decimals = value
        .split_once('.')
        .map_or(0, |(_, fraction)| fraction.len());
    if decimals > usize::from(max) {
        return Err(ValidationError::TooManyDecimals { max });
    }
    Ok(())
}
