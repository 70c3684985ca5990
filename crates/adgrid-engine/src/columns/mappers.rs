// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_model::{ColumnData, ColumnType, refund_field};

use super::width::{actions_width, column_width, min_width};
use super::{
    Formatter, GridMeta, Pinned, RendererBinding, RendererColumnDescriptor, SortOptions,
};

const DEFAULT_CURRENCY_FRACTION: u8 = 2;
const DEFAULT_PERCENT_FRACTION: u8 = 2;

/// Pure projection of one column onto a descriptor.
pub trait ColumnMapper: Sync {
    fn map(
        &self,
        meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor;
}

pub fn mapper_for(column_type: Option<ColumnType>) -> &'static dyn ColumnMapper {
    match column_type {
        Some(ColumnType::Checkbox) => &CheckboxMapper,
        Some(ColumnType::Breakdown) => &BreakdownMapper,
        Some(ColumnType::Text) => &TextMapper,
        Some(
            ColumnType::Number
            | ColumnType::Percent
            | ColumnType::Seconds
            | ColumnType::DateTime
            | ColumnType::Stats,
        ) => &StatsMapper,
        Some(ColumnType::Currency) => &CURRENCY,
        Some(ColumnType::BidModifier) => &BID_MODIFIER,
        Some(ColumnType::StateSelector) => &StateSelectorMapper,
        Some(ColumnType::Status) => &STATUS,
        Some(ColumnType::Thumbnail) => &THUMBNAIL,
        Some(ColumnType::PerformanceIndicator) => &PERFORMANCE_INDICATOR,
        Some(ColumnType::SubmissionStatus) => &SUBMISSION_STATUS,
        Some(ColumnType::ExternalLink) => &EXTERNAL_LINK,
        Some(ColumnType::Actions) => &ActionsMapper,
        None => &NullMapper,
    }
}

static CURRENCY: CurrencyMapper = CurrencyMapper { stats: StatsMapper };
static BID_MODIFIER: BidModifierMapper = BidModifierMapper { stats: StatsMapper };
static STATUS: DecorationMapper = DecorationMapper {
    renderer: RendererBinding::Status,
    sortable: true,
};
static THUMBNAIL: DecorationMapper = DecorationMapper {
    renderer: RendererBinding::Thumbnail,
    sortable: false,
};
static PERFORMANCE_INDICATOR: DecorationMapper = DecorationMapper {
    renderer: RendererBinding::PerformanceIndicator,
    sortable: false,
};
static SUBMISSION_STATUS: DecorationMapper = DecorationMapper {
    renderer: RendererBinding::SubmissionStatus,
    sortable: false,
};
static EXTERNAL_LINK: DecorationMapper = DecorationMapper {
    renderer: RendererBinding::ExternalLink,
    sortable: false,
};

fn base_descriptor(column_type: Option<ColumnType>, data: &ColumnData) -> RendererColumnDescriptor {
    let sortable = data.order;
    RendererColumnDescriptor {
        column_type,
        header_name: data.name.clone(),
        field: data.field.clone(),
        width: column_width(column_type, &data.name, sortable, data.help.is_some()),
        min_width: min_width(column_type),
        renderer: RendererBinding::Plain,
        formatter: Formatter::Text,
        sort: SortOptions {
            sortable,
            initial_direction: data.initial_order.unwrap_or_default(),
            sort_field: sortable.then(|| data.field.clone()),
        },
        pinned: Pinned::None,
        editable: false,
        show_on_footer: data.total_row,
        help: data.help.clone(),
        refund_field: None,
    }
}

fn without_sort(mut descriptor: RendererColumnDescriptor) -> RendererColumnDescriptor {
    if descriptor.sort.sortable {
        descriptor.sort = SortOptions::disabled();
        descriptor.width = column_width(
            descriptor.column_type,
            &descriptor.header_name,
            false,
            descriptor.help.is_some(),
        );
    }
    descriptor
}

struct NullMapper;

impl ColumnMapper for NullMapper {
    fn map(
        &self,
        _meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        base_descriptor(column_type, data)
    }
}

struct CheckboxMapper;

impl ColumnMapper for CheckboxMapper {
    fn map(
        &self,
        _meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        let width = min_width(column_type);
        RendererColumnDescriptor {
            header_name: String::new(),
            width,
            renderer: RendererBinding::Checkbox,
            sort: SortOptions::disabled(),
            pinned: Pinned::Left,
            show_on_footer: true,
            help: None,
            ..base_descriptor(column_type, data)
        }
    }
}

struct BreakdownMapper;

impl ColumnMapper for BreakdownMapper {
    fn map(
        &self,
        _meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        RendererColumnDescriptor {
            renderer: RendererBinding::Breakdown,
            pinned: Pinned::Left,
            show_on_footer: true,
            ..base_descriptor(column_type, data)
        }
    }
}

struct TextMapper;

impl ColumnMapper for TextMapper {
    fn map(
        &self,
        _meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        base_descriptor(column_type, data)
    }
}

/// Read-only numeric stats; the currency and bid-modifier mappers build on it.
struct StatsMapper;

impl ColumnMapper for StatsMapper {
    fn map(
        &self,
        _meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        let formatter = match column_type {
            Some(ColumnType::Percent) => Formatter::Percent {
                fraction_size: data.fraction_size.unwrap_or(DEFAULT_PERCENT_FRACTION),
            },
            Some(ColumnType::Seconds) => Formatter::Seconds,
            Some(ColumnType::DateTime) => Formatter::DateTime,
            _ => Formatter::Number {
                fraction_size: data.fraction_size.unwrap_or(0),
            },
        };
        RendererColumnDescriptor {
            formatter,
            ..base_descriptor(column_type, data)
        }
    }
}

struct CurrencyMapper {
    stats: StatsMapper,
}

impl ColumnMapper for CurrencyMapper {
    fn map(
        &self,
        meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        let mut descriptor = self.stats.map(meta, column_type, data);
        descriptor.formatter = Formatter::Currency {
            currency: meta.currency,
            fraction_size: data.fraction_size.unwrap_or(DEFAULT_CURRENCY_FRACTION),
        };
        if data.editable {
            descriptor.editable = true;
            descriptor.renderer = RendererBinding::EditableStat;
        }
        if data.editable || meta.is_refund_eligible() {
            descriptor.refund_field = Some(refund_field(&data.field));
        }
        descriptor
    }
}

struct BidModifierMapper {
    stats: StatsMapper,
}

impl ColumnMapper for BidModifierMapper {
    fn map(
        &self,
        meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        let mut descriptor = self.stats.map(meta, column_type, data);
        descriptor.formatter = Formatter::BidModifier;
        descriptor.renderer = RendererBinding::BidModifier;
        descriptor.editable = data.editable;
        descriptor.show_on_footer = false;
        descriptor
    }
}

struct StateSelectorMapper;

impl ColumnMapper for StateSelectorMapper {
    fn map(
        &self,
        _meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        let descriptor = without_sort(base_descriptor(column_type, data));
        RendererColumnDescriptor {
            renderer: RendererBinding::StateSelector,
            formatter: Formatter::State,
            pinned: Pinned::Left,
            editable: data.editable,
            show_on_footer: false,
            ..descriptor
        }
    }
}

/// Status-like widgets that never show totals.
struct DecorationMapper {
    renderer: RendererBinding,
    sortable: bool,
}

impl ColumnMapper for DecorationMapper {
    fn map(
        &self,
        _meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        let mut descriptor = base_descriptor(column_type, data);
        if !self.sortable {
            descriptor = without_sort(descriptor);
        }
        RendererColumnDescriptor {
            renderer: self.renderer,
            show_on_footer: false,
            ..descriptor
        }
    }
}

struct ActionsMapper;

impl ColumnMapper for ActionsMapper {
    fn map(
        &self,
        meta: &GridMeta,
        column_type: Option<ColumnType>,
        data: &ColumnData,
    ) -> RendererColumnDescriptor {
        let width = actions_width(meta.breakdown());
        RendererColumnDescriptor {
            header_name: String::new(),
            width,
            min_width: width,
            renderer: RendererBinding::Actions,
            sort: SortOptions::disabled(),
            pinned: Pinned::Right,
            show_on_footer: false,
            ..base_descriptor(column_type, data)
        }
    }
}
