// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Projection of abstract grid columns onto renderer-neutral descriptors.
//!
//! Descriptors are computed once per grid configuration. The renderer pairs
//! them with the flattened visible rows and calls [`format_cell`] for text.

mod format;
mod mappers;
mod width;

use adgrid_model::{
    BreakdownLevel, BreakdownPath, ColumnType, Currency, GridColumn, SortDirection, StatData,
};

use crate::tree::Row;

pub use format::{
    Formatter, NOT_AVAILABLE, format_bid_modifier, format_currency, group_thousands,
};
pub use mappers::{ColumnMapper, mapper_for};
pub use width::{actions_width, column_width, header_width, min_width};

pub const FOOTER_LABEL: &str = "Totals";

/// Grid-level facts every mapper may consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridMeta {
    pub path: BreakdownPath,
    pub currency: Currency,
    pub can_edit_archived: bool,
}

impl GridMeta {
    pub fn breakdown(&self) -> BreakdownLevel {
        self.path.base()
    }

    /// Breakdowns whose currency stats carry a `<field>_refund` sibling.
    pub fn is_refund_eligible(&self) -> bool {
        matches!(
            self.breakdown(),
            BreakdownLevel::Account | BreakdownLevel::Campaign
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pinned {
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererBinding {
    Plain,
    Checkbox,
    Breakdown,
    EditableStat,
    BidModifier,
    Status,
    StateSelector,
    Thumbnail,
    PerformanceIndicator,
    SubmissionStatus,
    Actions,
    ExternalLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOptions {
    pub sortable: bool,
    pub initial_direction: SortDirection,
    pub sort_field: Option<String>,
}

impl SortOptions {
    pub fn disabled() -> Self {
        Self {
            sortable: false,
            initial_direction: SortDirection::default(),
            sort_field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererColumnDescriptor {
    pub column_type: Option<ColumnType>,
    pub header_name: String,
    pub field: String,
    pub width: u16,
    pub min_width: u16,
    pub renderer: RendererBinding,
    pub formatter: Formatter,
    pub sort: SortOptions,
    pub pinned: Pinned,
    pub editable: bool,
    pub show_on_footer: bool,
    pub help: Option<String>,
    pub refund_field: Option<String>,
}

pub fn map_column(meta: &GridMeta, column: &GridColumn) -> RendererColumnDescriptor {
    let column_type = column.kind();
    match &column.data {
        Some(data) => mapper_for(column_type).map(meta, column_type, data),
        None => RendererColumnDescriptor {
            column_type,
            header_name: String::new(),
            field: String::new(),
            width: min_width(column_type),
            min_width: min_width(column_type),
            renderer: RendererBinding::Plain,
            formatter: Formatter::NotAvailable,
            sort: SortOptions::disabled(),
            pinned: Pinned::None,
            editable: false,
            show_on_footer: false,
            help: None,
            refund_field: None,
        },
    }
}

pub fn map_columns(meta: &GridMeta, columns: &[GridColumn]) -> Vec<RendererColumnDescriptor> {
    columns
        .iter()
        .map(|column| map_column(meta, column))
        .collect()
}

/// Display text for one cell; empty where the renderer draws a widget.
pub fn format_cell(descriptor: &RendererColumnDescriptor, row: &Row) -> String {
    if row.is_footer() && !descriptor.show_on_footer {
        return String::new();
    }
    match descriptor.renderer {
        RendererBinding::Checkbox | RendererBinding::Actions => return String::new(),
        RendererBinding::Breakdown if row.is_footer() => return FOOTER_LABEL.to_owned(),
        RendererBinding::Breakdown => {
            return row
                .stat(&descriptor.field)
                .map(|stat| descriptor.formatter.format(&stat.value))
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| row.id.clone());
        }
        _ => {}
    }
    match row.stat(&descriptor.field) {
        Some(stat) => descriptor.formatter.format(&stat.value),
        None => descriptor.formatter.format(&StatData::Null),
    }
}

/// Refund deduction shown next to a currency value, when the row has one.
pub fn format_refund(descriptor: &RendererColumnDescriptor, row: &Row) -> Option<String> {
    let refund_field = descriptor.refund_field.as_deref()?;
    let amount = row.stat(refund_field)?.value.as_f64()?;
    if amount == 0.0 {
        return None;
    }
    Some(descriptor.formatter.format(&StatData::Number(amount)))
}

#[cfg(test)]
mod tests {
    use super::{
        Formatter, GridMeta, Pinned, RendererBinding, format_cell, format_refund, map_column,
    };
    use crate::tree::{NewRow, RowTree};
    use adgrid_model::{
        BreakdownLevel, BreakdownPath, ColumnData, ColumnType, Currency, GridColumn, RowData,
        StatValue,
    };

    fn campaign_meta(currency: Currency) -> GridMeta {
        GridMeta {
            path: BreakdownPath::new(
                BreakdownLevel::Account,
                vec![BreakdownLevel::Campaign, BreakdownLevel::AdGroup],
            )
            .expect("valid path"),
            currency,
            can_edit_archived: false,
        }
    }

    #[test]
    fn missing_data_maps_to_sentinel_descriptor() {
        let column = GridColumn {
            column_type: "currency".to_owned(),
            data: None,
        };
        let descriptor = map_column(&campaign_meta(Currency::Usd), &column);
        assert_eq!(descriptor.header_name, "");
        assert_eq!(descriptor.field, "");
        assert_eq!(descriptor.formatter, Formatter::NotAvailable);
        assert!(!descriptor.sort.sortable);
    }

    #[test]
    fn cells_render_values_refunds_and_footer_rules() {
        let meta = campaign_meta(Currency::Eur);
        let mut spend = ColumnData::new("spend", "Spend");
        spend.editable = true;
        let spend = map_column(&meta, &GridColumn::new(ColumnType::Currency, spend));
        let mut clicks = ColumnData::new("clicks", "Clicks");
        clicks.total_row = false;
        let clicks = map_column(&meta, &GridColumn::new(ColumnType::Number, clicks));
        let name = map_column(
            &meta,
            &GridColumn::new(
                ColumnType::Breakdown,
                ColumnData::new("breakdown_name", "Campaign"),
            ),
        );
        assert_eq!(name.pinned, Pinned::Left);
        assert_eq!(name.renderer, RendererBinding::Breakdown);

        let mut data = RowData::default();
        data.stats
            .insert("spend".to_owned(), StatValue::number(1234.5));
        data.stats
            .insert("spend_refund".to_owned(), StatValue::number(-20.0));
        data.stats.insert("clicks".to_owned(), StatValue::number(800.0));
        let mut tree = RowTree::new();
        let keys = tree
            .reconcile_children(
                None,
                vec![NewRow {
                    id: "campaign:9".to_owned(),
                    breakdown: BreakdownLevel::Campaign,
                    entity: None,
                    data: data.clone(),
                    in_group: false,
                }],
            )
            .expect("merge")
            .keys;
        tree.set_footer_stats(data.stats).expect("totals");
        let row = tree.get(keys[0]).expect("row");

        assert_eq!(format_cell(&spend, row), "€1,234.50");
        assert_eq!(format_refund(&spend, row).as_deref(), Some("-€20.00"));
        assert_eq!(format_cell(&name, row), "campaign:9");
        assert_eq!(format_cell(&clicks, row), "800");
        assert_eq!(format_cell(&clicks, tree.footer()), "");
        assert_eq!(format_cell(&name, tree.footer()), "Totals");
        assert_eq!(format_cell(&spend, tree.footer()), "€1,234.50");
    }
}
