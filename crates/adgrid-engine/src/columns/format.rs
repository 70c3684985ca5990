// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{Currency, EntityState, StatData, bid_modifier_to_percent};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

pub const NOT_AVAILABLE: &str = "N/A";

/// Value formatter attached to a column descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    NotAvailable,
    Text,
    Number { fraction_size: u8 },
    Currency { currency: Currency, fraction_size: u8 },
    Percent { fraction_size: u8 },
    Seconds,
    DateTime,
    BidModifier,
    State,
}

impl Formatter {
    pub fn format(self, value: &StatData) -> String {
        match self {
            Self::NotAvailable => NOT_AVAILABLE.to_owned(),
            Self::Text => match value {
                StatData::Null => String::new(),
                StatData::Number(number) => trim_number(*number),
                StatData::Text(text) => text.clone(),
                StatData::Object(object) => object
                    .get("text")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            },
            Self::Number { fraction_size } => {
                numeric(value, |number| group_thousands(number, fraction_size))
            }
            Self::Currency {
                currency,
                fraction_size,
            } => numeric(value, |number| format_currency(number, currency, fraction_size)),
            Self::Percent { fraction_size } => numeric(value, |number| {
                format!("{number:.prec$}%", prec = usize::from(fraction_size))
            }),
            Self::Seconds => numeric(value, |number| format!("{number:.1} s")),
            Self::DateTime => match value {
                StatData::Text(raw) => format_date_time(raw),
                StatData::Null => NOT_AVAILABLE.to_owned(),
                other => Self::Text.format(other),
            },
            Self::BidModifier => {
                let modifier = match value {
                    StatData::Object(object) => {
                        object.get("modifier").and_then(serde_json::Value::as_f64)
                    }
                    other => other.as_f64(),
                };
                modifier.map_or_else(|| NOT_AVAILABLE.to_owned(), format_bid_modifier)
            }
            Self::State => value
                .as_f64()
                .and_then(|code| EntityState::from_code(code as i64))
                .map_or_else(String::new, |state| state.label().to_owned()),
        }
    }
}

fn numeric(value: &StatData, render: impl FnOnce(f64) -> String) -> String {
    value
        .as_f64()
        .map_or_else(|| NOT_AVAILABLE.to_owned(), render)
}

/// `1234.5` with two decimals becomes `1,234.50`; the sign leads.
pub fn group_thousands(value: f64, fraction_size: u8) -> String {
    let fixed = format!("{:.prec$}", value.abs(), prec = usize::from(fraction_size));
    let (whole, fraction) = match fixed.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    if value < 0.0 && fixed.chars().any(|ch| ch.is_ascii_digit() && ch != '0') {
        grouped.insert(0, '-');
    }
    grouped
}

pub fn format_currency(value: f64, currency: Currency, fraction_size: u8) -> String {
    let grouped = group_thousands(value, fraction_size);
    match grouped.strip_prefix('-') {
        Some(unsigned) => format!("-{}{unsigned}", currency.symbol()),
        None => format!("{}{grouped}", currency.symbol()),
    }
}

pub fn format_bid_modifier(modifier: f64) -> String {
    let percent = bid_modifier_to_percent(modifier);
    if percent >= 0.0 {
        format!("+{percent:.2}%")
    } else {
        format!("{percent:.2}%")
    }
}

fn format_date_time(raw: &str) -> String {
    let display = format_description!("[month]/[day]/[year] [hour]:[minute]");
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .and_then(|parsed| parsed.format(&display).ok())
        .unwrap_or_else(|| raw.to_owned())
}

fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
