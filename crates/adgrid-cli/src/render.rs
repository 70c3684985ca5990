// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_engine::{
    GridContext, RendererBinding, RendererColumnDescriptor, Row, VisibleRow, format_cell,
    format_refund,
};

const COLUMN_GAP: &str = "  ";
const INDENT: &str = "  ";

/// Renders the grid's visible rows as an aligned plain-text table.
pub fn render_grid(context: &GridContext) -> String {
    let columns: Vec<&RendererColumnDescriptor> = context
        .descriptors()
        .iter()
        .filter(|descriptor| is_textual(descriptor))
        .collect();

    let mut lines: Vec<Vec<String>> = vec![
        columns
            .iter()
            .map(|descriptor| descriptor.header_name.clone())
            .collect(),
    ];
    let mut notes = Vec::new();
    for visible in context.visible_rows() {
        match visible {
            VisibleRow::Row(key) | VisibleRow::Footer(key) => {
                if let Some(row) = context.tree().get(key) {
                    lines.push(render_row(context, &columns, row));
                }
            }
            VisibleRow::LoadMore {
                depth, remaining, ..
            } => {
                notes.push(lines.len());
                let mut line = vec![String::new(); columns.len()];
                if let Some(first) = line.first_mut() {
                    *first = format!("{}… {remaining} more", INDENT.repeat(depth));
                }
                lines.push(line);
            }
        }
    }

    let widths = column_widths(&lines, columns.len());
    let mut out = String::new();
    for (index, line) in lines.iter().enumerate() {
        let cells: Vec<String> = if notes.contains(&index) {
            line.iter().take(1).cloned().collect()
        } else {
            line.iter()
                .zip(&widths)
                .map(|(cell, width)| pad(cell, *width))
                .collect()
        };
        out.push_str(cells.join(COLUMN_GAP).trim_end());
        out.push('\n');
        if index == 0 {
            let gaps = COLUMN_GAP.len() * widths.len().saturating_sub(1);
            let rule_width = widths.iter().sum::<usize>() + gaps;
            out.push_str(&"-".repeat(rule_width));
            out.push('\n');
        }
    }
    out
}

fn is_textual(descriptor: &RendererColumnDescriptor) -> bool {
    !matches!(
        descriptor.renderer,
        RendererBinding::Checkbox | RendererBinding::Actions | RendererBinding::Thumbnail
    ) && !descriptor.header_name.is_empty()
}

fn render_row(
    context: &GridContext,
    columns: &[&RendererColumnDescriptor],
    row: &Row,
) -> Vec<String> {
    columns
        .iter()
        .map(|descriptor| {
            let mut text = format_cell(descriptor, row);
            if let Some(refund) = format_refund(descriptor, row) {
                text = format!("{text} (refund {refund})");
            }
            if descriptor.renderer == RendererBinding::Breakdown && !row.is_footer() {
                let marker = if !context.is_row_collapsable(&row.breakdown_id) {
                    ' '
                } else if context.is_row_collapsed(&row.breakdown_id) {
                    '+'
                } else {
                    '-'
                };
                let indent = INDENT.repeat(row.depth().saturating_sub(1));
                text = format!("{indent}{marker} {text}");
            }
            text
        })
        .collect()
}

fn column_widths(lines: &[Vec<String>], count: usize) -> Vec<usize> {
    let mut widths = vec![0; count];
    for line in lines {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

fn pad(cell: &str, width: usize) -> String {
    let len = cell.chars().count();
    format!("{cell}{}", " ".repeat(width.saturating_sub(len)))
}
