// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_engine::{
    BranchState, FetchResponse, FetchedRow, GridConfig, GridContext, GridError, GridEvent,
    GridRuntime, RowPatch, SaveFailure, SelectionFilter, Topic, VisibleRow, format_cell,
};
use adgrid_model::{
    BreakdownId, BreakdownLevel, EntityRef, EntityState, SortDirection, StatData, StatMap,
    StatValue,
};
use adgrid_testkit::{BackendCall, DemoBackend, demo_columns};
use anyhow::{Context, Result};
use std::time::Duration;

fn runtime(
    entity: &str,
    grid_level: BreakdownLevel,
    levels: Vec<BreakdownLevel>,
    backend: DemoBackend,
) -> Result<GridRuntime<DemoBackend>> {
    let entity = EntityRef::parse(entity).context("entity ref")?;
    let columns = demo_columns(levels[0]);
    let mut config = GridConfig::new(Some(entity), grid_level, levels, columns)?;
    config.can_edit_archived = true;
    let context = GridContext::new(config)?;
    Ok(GridRuntime::new(context, backend).with_poll_interval(None))
}

fn campaign_runtime(backend: DemoBackend) -> Result<GridRuntime<DemoBackend>> {
    runtime(
        "account:1",
        BreakdownLevel::Account,
        vec![BreakdownLevel::Campaign, BreakdownLevel::Source],
        backend,
    )
}

fn paged_campaign_context(page_size: usize) -> Result<GridContext> {
    let entity = EntityRef::parse("account:1").context("entity ref")?;
    let mut config = GridConfig::new(
        Some(entity),
        BreakdownLevel::Account,
        vec![BreakdownLevel::Campaign, BreakdownLevel::Source],
        demo_columns(BreakdownLevel::Campaign),
    )?;
    config.page_size = page_size;
    Ok(GridContext::new(config)?)
}

fn loaded(mut runtime: GridRuntime<DemoBackend>) -> Result<GridRuntime<DemoBackend>> {
    runtime.context_mut().load();
    runtime.run_until_idle()?;
    Ok(runtime)
}

fn root_id(runtime: &GridRuntime<DemoBackend>, index: usize) -> Result<BreakdownId> {
    let tree = runtime.context().tree();
    let key = tree.roots().get(index).context("root row")?;
    Ok(tree.get(*key).context("row")?.breakdown_id.clone())
}

fn root_ids(runtime: &GridRuntime<DemoBackend>) -> Vec<BreakdownId> {
    let tree = runtime.context().tree();
    tree.roots()
        .iter()
        .filter_map(|key| tree.get(*key))
        .map(|row| row.breakdown_id.clone())
        .collect()
}

fn stat_f64(runtime: &GridRuntime<DemoBackend>, id: &BreakdownId, field: &str) -> Option<f64> {
    runtime
        .context()
        .row(id)
        .and_then(|row| row.stat(field))
        .and_then(|stat| stat.value.as_f64())
}

#[test]
fn footer_is_unique_across_reloads() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(11))?)?;
    for _ in 0..3 {
        runtime.context_mut().reload();
        runtime.run_until_idle()?;
    }

    let rows = runtime.context().visible_rows();
    let footers = rows
        .iter()
        .filter(|row| matches!(row, VisibleRow::Footer(_)))
        .count();
    assert_eq!(footers, 1);
    assert!(matches!(rows.last(), Some(VisibleRow::Footer(_))));
    assert_eq!(runtime.context().tree().roots().len(), 12);
    assert!(
        runtime
            .context()
            .tree()
            .footer()
            .stat("spend")
            .is_some(),
        "root page totals land on the footer"
    );
    Ok(())
}

#[test]
fn failed_save_restores_value_and_reports_error() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(12))?)?;
    let errors = runtime.context_mut().subscribe(&[Topic::RowUpdatedError]);
    let row = root_id(&runtime, 0)?;
    let original = stat_f64(&runtime, &row, "daily_budget");

    runtime
        .backend_mut()
        .fail_next_save(SaveFailure::transport("connection reset by peer"));
    runtime
        .context_mut()
        .edit_cell(&row, "daily_budget", "999.99")?;
    assert_eq!(stat_f64(&runtime, &row, "daily_budget"), Some(999.99));
    runtime.run_until_idle()?;

    assert_eq!(stat_f64(&runtime, &row, "daily_budget"), original);
    let event = errors.try_recv()?;
    let GridEvent::RowUpdatedError { field, error, .. } = event else {
        panic!("expected a row error, got {event:?}");
    };
    assert_eq!(field, "daily_budget");
    assert_eq!(
        error.user_message(),
        "Something went wrong while saving. Please try again."
    );
    Ok(())
}

#[test]
fn conflict_refetches_the_rows_branch() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(13))?)?;
    let row = root_id(&runtime, 1)?;
    runtime.backend_mut().clear_calls();
    runtime.backend_mut().fail_next_save(SaveFailure::Conflict {
        message: "budget changed".to_owned(),
    });

    runtime.context_mut().edit_cell(&row, "daily_budget", "40")?;
    runtime.run_until_idle()?;

    let refetches = runtime
        .backend()
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::Fetch { parent: None, offset: 0, .. }))
        .count();
    assert_eq!(refetches, 1);
    Ok(())
}

#[test]
fn saves_on_one_cell_reach_the_server_in_order() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(14))?)?;
    let row = root_id(&runtime, 0)?;
    runtime.backend_mut().clear_calls();
    runtime.backend_mut().set_holding(true);

    let first = runtime
        .context_mut()
        .edit_cell(&row, "daily_budget", "10")?
        .context("first ticket")?;
    let second = runtime
        .context_mut()
        .edit_cell(&row, "daily_budget", "20")?
        .context("second ticket")?;
    assert!(!first.queued);
    assert!(second.queued);
    assert_eq!(stat_f64(&runtime, &row, "daily_budget"), Some(20.0));

    runtime.flush()?;
    assert_eq!(runtime.backend().held_len(), 1, "second save waits");
    runtime.backend_mut().release_held(false)?;
    runtime.run_until_idle()?;
    assert_eq!(
        stat_f64(&runtime, &row, "daily_budget"),
        Some(20.0),
        "queued optimistic value survives the first commit"
    );
    assert_eq!(runtime.backend().held_len(), 1);
    runtime.backend_mut().release_held(false)?;
    runtime.run_until_idle()?;

    let sent: Vec<f64> = runtime
        .backend()
        .calls()
        .iter()
        .filter_map(|call| match call {
            BackendCall::Save { value, .. } => value.as_f64(),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![10.0, 20.0]);
    assert_eq!(stat_f64(&runtime, &row, "daily_budget"), Some(20.0));
    Ok(())
}

#[test]
fn collapse_then_expand_does_not_refetch() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(15))?)?;
    let row = root_id(&runtime, 0)?;
    let fetches = runtime.backend().fetch_calls();
    assert!(!runtime.context().is_row_collapsed(&row));

    runtime.context_mut().set_row_collapsed(&row, true)?;
    let hidden = runtime.context().visible_rows().len();
    runtime.context_mut().set_row_collapsed(&row, false)?;
    runtime.run_until_idle()?;

    assert_eq!(runtime.backend().fetch_calls(), fetches);
    assert!(runtime.context().visible_rows().len() > hidden);
    Ok(())
}

#[test]
fn select_all_round_trip_through_exclusions() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(16))?)?;
    let row = root_id(&runtime, 2)?;

    runtime
        .context_mut()
        .set_selection_filter(SelectionFilter::All);
    assert!(runtime.context_mut().set_row_selection(&row, false)?);
    let bulk = runtime.context().bulk_selection();
    assert!(bulk.select_all);
    assert!(bulk.not_selected_ids.contains(&row));
    assert_eq!(
        bulk.not_selected_ids,
        vec![row.clone()],
        "one exclusion covers the row and everything below it"
    );

    assert!(runtime.context_mut().set_row_selection(&row, true)?);
    let bulk = runtime.context().bulk_selection();
    assert!(bulk.select_all);
    assert!(bulk.not_selected_ids.is_empty());
    assert!(bulk.selected_ids.is_empty());
    Ok(())
}

#[test]
fn reselected_child_leaves_its_group_excluded() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(27))?)?;
    let group = root_id(&runtime, 2)?;
    let child = {
        let tree = runtime.context().tree();
        let key = tree.find(&group).context("group row")?;
        let first = *tree.children_of(Some(key)).first().context("loaded child")?;
        tree.get(first).context("child row")?.breakdown_id.clone()
    };
    let not_loaded = group.child("source:not-loaded");

    runtime
        .context_mut()
        .set_selection_filter(SelectionFilter::All);
    runtime.context_mut().set_row_selection(&group, false)?;
    assert!(runtime.context_mut().set_row_selection(&child, true)?);

    let context = runtime.context();
    assert!(context.is_selected(&child));
    assert!(!context.is_selected(&group));
    assert!(!context.is_selected(&not_loaded));
    let bulk = context.bulk_selection();
    assert!(bulk.select_all);
    assert_eq!(bulk.not_selected_ids, vec![group]);
    assert_eq!(bulk.selected_ids, vec![child]);
    Ok(())
}

#[test]
fn currency_cells_and_footer_label_format() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(17))?)?;
    let row = root_id(&runtime, 0)?;
    runtime
        .context_mut()
        .apply_patch(&row, RowPatch::set_value("spend", StatData::Number(1234.5)))?;

    let context = runtime.context();
    let spend = context
        .descriptors()
        .iter()
        .find(|descriptor| descriptor.field == "spend")
        .context("spend column")?;
    let name = context
        .descriptors()
        .iter()
        .find(|descriptor| descriptor.field == "breakdown_name")
        .context("breakdown column")?;
    assert_eq!(format_cell(spend, context.row(&row).context("row")?), "$1,234.50");
    assert_eq!(format_cell(name, context.tree().footer()), "Totals");
    Ok(())
}

#[test]
fn sync_completes_after_polls_and_refetches_once() -> Result<()> {
    let mut backend = DemoBackend::new(18);
    backend.set_sync_in_progress(true);
    backend.script_sync([true, true]);
    let mut runtime = loaded(campaign_runtime(backend)?)?;
    let events = runtime
        .context_mut()
        .subscribe(&[Topic::SyncStateChanged, Topic::ChartRefreshRequested]);
    assert!(runtime.context().is_syncing());
    runtime.backend_mut().clear_calls();

    for _ in 0..2 {
        assert!(runtime.poll_sync_now()?);
        assert!(runtime.context().is_syncing());
    }
    assert!(runtime.poll_sync_now()?);
    assert!(!runtime.context().is_syncing());
    assert!(!runtime.poll_sync_now()?, "no polls once the sync is done");

    assert_eq!(runtime.backend().sync_status_calls(), 3);
    assert_eq!(runtime.backend().fetch_calls(), 1);
    assert!(matches!(
        events.try_recv()?,
        GridEvent::SyncStateChanged { syncing: false, .. }
    ));
    assert!(matches!(
        events.try_recv()?,
        GridEvent::ChartRefreshRequested { .. }
    ));
    assert!(!runtime.is_polling());
    Ok(())
}

#[test]
fn superseded_response_is_discarded() -> Result<()> {
    let mut runtime = campaign_runtime(DemoBackend::new(19))?;
    runtime.backend_mut().set_holding(true);
    runtime.context_mut().load();
    runtime.flush()?;
    runtime
        .context_mut()
        .set_order(Some("spend".to_owned()), SortDirection::Asc);
    runtime.flush()?;
    assert_eq!(runtime.backend().held_len(), 2);

    runtime.backend_mut().release_held(true)?;
    runtime.backend_mut().set_holding(false);
    runtime.run_until_idle()?;

    let tree = runtime.context().tree();
    assert_eq!(tree.roots().len(), 12);
    let spend: Vec<f64> = tree
        .roots()
        .iter()
        .filter_map(|key| tree.get(*key))
        .filter_map(|row| row.stat("spend").and_then(|stat| stat.value.as_f64()))
        .collect();
    assert!(spend.windows(2).all(|pair| pair[0] <= pair[1]));
    Ok(())
}

#[test]
fn bid_modifier_percent_is_saved_as_multiplier() -> Result<()> {
    let mut runtime = loaded(runtime(
        "campaign:7",
        BreakdownLevel::Campaign,
        vec![BreakdownLevel::Source],
        DemoBackend::new(20),
    )?)?;
    let row = root_id(&runtime, 0)?;

    runtime
        .context_mut()
        .edit_cell(&row, "bid_modifier", "105.5")?;
    runtime.run_until_idle()?;

    let saved = runtime
        .backend()
        .stat(&row, "bid_modifier")
        .and_then(|stat| stat.value.as_f64())
        .context("saved modifier")?;
    assert!((saved - 2.055).abs() < 1e-9);
    let descriptor = runtime
        .context()
        .descriptors()
        .iter()
        .find(|descriptor| descriptor.field == "bid_modifier")
        .context("bid modifier column")?;
    let row = runtime.context().row(&row).context("row")?;
    assert_eq!(format_cell(descriptor, row), "+105.50%");
    Ok(())
}

#[test]
fn bid_modifier_out_of_range_is_rejected_locally() -> Result<()> {
    let mut runtime = loaded(runtime(
        "campaign:7",
        BreakdownLevel::Campaign,
        vec![BreakdownLevel::Source],
        DemoBackend::new(21),
    )?)?;
    let row = root_id(&runtime, 0)?;
    runtime.backend_mut().clear_calls();

    let error = runtime
        .context_mut()
        .edit_cell(&row, "bid_modifier", "2000")
        .expect_err("beyond the allowed range");
    assert!(matches!(error, GridError::Validation(_)));
    runtime.run_until_idle()?;
    assert!(runtime.backend().calls().is_empty());
    Ok(())
}

#[test]
fn state_toggles_go_out_in_one_batch() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(22))?)?;
    let first = root_id(&runtime, 0)?;
    let second = root_id(&runtime, 1)?;
    runtime.backend_mut().clear_calls();

    assert!(
        runtime
            .context_mut()
            .edit_cell(&first, EntityState::FIELD, "paused")?
            .is_none()
    );
    runtime
        .context_mut()
        .edit_cell(&second, EntityState::FIELD, "paused")?;
    assert_eq!(runtime.context().pending_state_toggles(), 2);
    runtime.run_until_idle()?;
    assert!(runtime.backend().calls().is_empty(), "nothing sent before flush");

    runtime.context_mut().flush_state_batch();
    runtime.run_until_idle()?;
    assert_eq!(
        runtime.backend().calls(),
        &[BackendCall::StateBatch { rows: 2 }]
    );
    let paused = EntityState::Paused.code() as f64;
    assert_eq!(
        runtime
            .backend()
            .stat(&second, EntityState::FIELD)
            .and_then(|stat| stat.value.as_f64()),
        Some(paused)
    );
    assert_eq!(stat_f64(&runtime, &first, EntityState::FIELD), Some(paused));
    Ok(())
}

#[test]
fn fetch_failure_marks_branch_and_retry_recovers() -> Result<()> {
    let mut backend = DemoBackend::new(23);
    backend.fail_next_fetch("gateway timeout");
    let mut runtime = campaign_runtime(backend)?;
    let errors = runtime.context_mut().subscribe(&[Topic::DataError]);
    runtime.context_mut().load();
    runtime.run_until_idle()?;

    assert!(matches!(
        runtime.context().branch_state(None),
        adgrid_engine::BranchState::Error(_)
    ));
    assert!(matches!(errors.try_recv()?, GridEvent::DataError { .. }));

    runtime.context_mut().load();
    runtime.run_until_idle()?;
    assert_eq!(
        runtime.context().branch_state(None),
        adgrid_engine::BranchState::Loaded
    );
    Ok(())
}

#[test]
fn failed_refetch_keeps_loaded_rows() -> Result<()> {
    let mut runtime = loaded(campaign_runtime(DemoBackend::new(24))?)?;
    let before = root_ids(&runtime);
    let first = before.first().context("first root")?.clone();
    let spend = stat_f64(&runtime, &first, "spend");
    let visible = runtime.context().visible_rows().len();
    let errors = runtime.context_mut().subscribe(&[Topic::DataError]);

    runtime.backend_mut().fail_next_fetch("gateway timeout");
    runtime.context_mut().reload();
    runtime.run_until_idle()?;

    assert!(matches!(errors.try_recv()?, GridEvent::DataError { .. }));
    assert!(matches!(
        runtime.context().branch_state(None),
        BranchState::Error(_)
    ));
    assert_eq!(root_ids(&runtime), before);
    assert_eq!(stat_f64(&runtime, &first, "spend"), spend);
    assert_eq!(runtime.context().visible_rows().len(), visible);
    assert!(runtime.context().tree().footer().stat("spend").is_some());
    Ok(())
}

#[test]
fn failed_status_poll_stops_polling_without_refetch() -> Result<()> {
    let mut backend = DemoBackend::new(25);
    backend.set_sync_in_progress(true);
    backend.fail_next_sync_poll("status endpoint unavailable");
    let runtime =
        campaign_runtime(backend)?.with_poll_interval(Some(Duration::from_secs(3600)));
    let mut runtime = loaded(runtime)?;
    assert!(runtime.context().is_syncing());
    assert!(runtime.is_polling());
    let events = runtime
        .context_mut()
        .subscribe(&[Topic::SyncStateChanged, Topic::ChartRefreshRequested]);
    runtime.backend_mut().clear_calls();

    assert!(runtime.poll_sync_now()?);

    assert!(!runtime.context().is_syncing());
    assert!(!runtime.is_polling());
    assert_eq!(runtime.backend().sync_status_calls(), 1);
    assert_eq!(runtime.backend().fetch_calls(), 0, "a failed poll never refetches");
    assert!(matches!(
        events.try_recv()?,
        GridEvent::SyncStateChanged { syncing: false, .. }
    ));
    assert!(events.try_recv().is_err(), "no chart refresh after a failed poll");
    assert!(!runtime.poll_sync_now()?);
    assert_eq!(runtime.backend().sync_status_calls(), 1);
    Ok(())
}

fn campaign_page(ids: &[&str], spend: f64) -> FetchResponse {
    let rows = ids
        .iter()
        .map(|id| {
            let mut stats = StatMap::new();
            stats.insert("spend".to_owned(), StatValue::number(spend));
            FetchedRow {
                id: (*id).to_owned(),
                entity: None,
                stats,
                archived: false,
                in_group: false,
            }
        })
        .collect();
    FetchResponse {
        rows,
        total_count: ids.len(),
        ..FetchResponse::default()
    }
}

#[test]
fn older_response_for_the_same_page_is_discarded() -> Result<()> {
    let mut context = paged_campaign_context(50)?;
    let updates = context.subscribe(&[Topic::DataUpdated]);
    let older = context.reload();
    let newer = context.reload();
    assert_ne!(older.seq, newer.seq);
    context.take_outbound();

    context.complete_fetch(newer.seq, Ok(campaign_page(&["12", "13"], 5.0)));
    context.complete_fetch(older.seq, Ok(campaign_page(&["11"], 9.0)));

    let tree = context.tree();
    let ids: Vec<&str> = tree
        .roots()
        .iter()
        .filter_map(|key| tree.get(*key))
        .map(|row| row.id.as_str())
        .collect();
    assert_eq!(ids, vec!["campaign:12", "campaign:13"]);
    let spend = context
        .row(&BreakdownId::root("campaign:12"))
        .and_then(|row| row.stat("spend"))
        .and_then(|stat| stat.value.as_f64());
    assert_eq!(spend, Some(5.0));
    assert!(matches!(updates.try_recv()?, GridEvent::DataUpdated { .. }));
    assert!(updates.try_recv().is_err(), "the older page merged nothing");
    Ok(())
}

/// Loads one page of five, then races the second page against a forced
/// first-page refetch. `refetch_first` picks which response lands first.
fn race_second_page_against_refetch(refetch_first: bool) -> Result<GridRuntime<DemoBackend>> {
    let backend = DemoBackend::new(26).with_rows(12, 2);
    let runtime =
        GridRuntime::new(paged_campaign_context(5)?, backend).with_poll_interval(None);
    let mut runtime = loaded(runtime)?;
    assert_eq!(root_ids(&runtime).len(), 5);

    runtime.backend_mut().set_holding(true);
    runtime
        .context_mut()
        .load_more(None)?
        .context("second page ticket")?;
    runtime.context_mut().reload();
    runtime.flush()?;
    assert_eq!(runtime.backend().held_len(), 2);

    runtime.backend_mut().release_held(refetch_first)?;
    runtime.backend_mut().set_holding(false);
    runtime.run_until_idle()?;
    Ok(runtime)
}

#[test]
fn first_page_refetch_keeps_later_pages_in_either_order() -> Result<()> {
    let page_first = race_second_page_against_refetch(false)?;
    let refetch_first = race_second_page_against_refetch(true)?;

    assert_eq!(root_ids(&page_first).len(), 10);
    assert_eq!(root_ids(&page_first), root_ids(&refetch_first));
    for runtime in [&page_first, &refetch_first] {
        let cursor = runtime.context().cursor(None).context("root cursor")?;
        assert_eq!(cursor.loaded_count, 10);
        assert!(cursor.has_more());
        let tree = runtime.context().tree();
        let later = root_ids(runtime)
            .get(7)
            .and_then(|id| tree.find(id))
            .context("row from the second page")?;
        assert_eq!(
            tree.children_of(Some(later)).len(),
            2,
            "second-page rows keep their loaded children"
        );
    }

    let mut page_first = page_first;
    page_first.context_mut().load_more(None)?;
    page_first.run_until_idle()?;
    assert_eq!(root_ids(&page_first).len(), 12);
    Ok(())
}
