// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_api::ApiClient;
use adgrid_engine::data::{BranchKey, FetchKey, QueryParams};
use adgrid_engine::{FetchRequest, GridConfig, GridContext, GridRuntime, SaveFailure, SaveRequest};
use adgrid_model::{BreakdownId, BreakdownLevel, EntityRef, SortDirection, StatData};
use anyhow::{Context, Result, anyhow};
use std::io::Read;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Response, Server};

fn json_response(status: u16, body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
}

fn root_request(entity: Option<EntityRef>) -> FetchRequest {
    FetchRequest {
        seq: 1,
        key: FetchKey {
            branch: BranchKey::root(BreakdownLevel::Campaign),
            offset: 0,
            page_size: 50,
            sort_field: None,
            sort_direction: SortDirection::Desc,
        },
        query: QueryParams::default(),
        entity,
        levels: vec![BreakdownLevel::Campaign],
    }
}

const CAMPAIGN_PAGE: &str = r#"{
    "success": true,
    "data": {
        "rows": [
            {"id": "12", "entity": {"kind": "campaign", "id": 12},
             "stats": {"breakdown_name": {"value": "Spring Sale"},
                       "spend": {"value": 1234.5}}}
        ],
        "total_count": 1,
        "totals": {"spend": {"value": 1234.5}},
        "is_sync_in_progress": false
    }
}"#;

#[test]
fn unreachable_server_error_names_the_config_key() -> Result<()> {
    let client = ApiClient::new("http://127.0.0.1:1/api", Duration::from_millis(50))?;
    let error = client
        .fetch(&root_request(EntityRef::parse("account:1")))
        .expect_err("fetch should fail for unreachable endpoint");
    assert!(error.to_string().contains("[api].base_url"));
    Ok(())
}

#[test]
fn fetch_posts_to_the_breakdown_endpoint() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/api", server.server_addr());

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(request.method(), &Method::Post);
        assert_eq!(request.url(), "/api/grid/account/1/breakdown/campaign/");
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("request body");
        let body: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(body["breakdown"], "campaign");
        assert_eq!(body["limit"], 50);
        assert!(body.get("parent_id").is_none());
        request
            .respond(json_response(200, CAMPAIGN_PAGE))
            .expect("response should succeed");
    });

    let client = ApiClient::new(&addr, Duration::from_secs(1))?;
    let page = client.fetch(&root_request(EntityRef::parse("account:1")))?;
    assert_eq!(page.total_count, 1);
    assert_eq!(page.rows[0].id, "12");
    assert_eq!(page.is_sync_in_progress, Some(false));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn all_accounts_grid_uses_its_own_path() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/grid/all_accounts/breakdown/campaign/");
        let body = r#"{"success":true,"data":{"rows":[],"total_count":0}}"#;
        request
            .respond(json_response(200, body))
            .expect("response should succeed");
    });

    let client = ApiClient::new(&addr, Duration::from_secs(1))?;
    let page = client.fetch(&root_request(None))?;
    assert!(page.rows.is_empty());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn save_errors_map_by_status() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let replies = [
            (
                400,
                r#"{"success":false,"data":{"errors":{"daily_budget":["Too low."]}}}"#,
            ),
            (409, r#"{"success":false,"message":"Budget was changed."}"#),
            (500, "internal error"),
            (
                200,
                r#"{"success":true,"data":{"updated_stats":{"daily_budget":{"value":25.0,"is_editable":true}}}}"#,
            ),
        ];
        for (status, body) in replies {
            let request = server.recv().expect("request expected");
            assert_eq!(request.url(), "/grid/rows/save/");
            request
                .respond(json_response(status, body))
                .expect("response should succeed");
        }
    });

    let client = ApiClient::new(&addr, Duration::from_secs(1))?;
    let request = SaveRequest {
        id: 1,
        row: BreakdownId::root("campaign:12"),
        entity: EntityRef::parse("campaign:12"),
        field: "daily_budget".to_owned(),
        value: StatData::Number(25.0),
    };

    let field = client.save(&request).expect_err("400");
    assert!(matches!(field, SaveFailure::Field { .. }));
    assert_eq!(
        field.into_grid_error("daily_budget").user_message(),
        "Too low."
    );
    assert_eq!(
        client.save(&request).expect_err("409"),
        SaveFailure::Conflict {
            message: "Budget was changed.".to_owned()
        }
    );
    assert!(matches!(
        client.save(&request).expect_err("500"),
        SaveFailure::Transport { .. }
    ));
    let saved = client.save(&request)?;
    assert_eq!(
        saved
            .updated_stats
            .get("daily_budget")
            .and_then(|stat| stat.value.as_f64()),
        Some(25.0)
    );

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn sync_status_and_trigger_share_an_endpoint() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("trigger expected");
        assert_eq!(request.method(), &Method::Post);
        assert_eq!(request.url(), "/account/1/sync/");
        request
            .respond(json_response(200, r#"{"success":true}"#))
            .expect("response should succeed");

        let request = server.recv().expect("poll expected");
        assert_eq!(request.method(), &Method::Get);
        assert_eq!(request.url(), "/account/1/sync/");
        request
            .respond(json_response(
                200,
                r#"{"success":true,"data":{"is_sync_in_progress":true}}"#,
            ))
            .expect("response should succeed");
    });

    let client = ApiClient::new(&addr, Duration::from_secs(1))?;
    let account = EntityRef::parse("account:1").context("entity")?;
    client.start_sync(account)?;
    assert!(client.sync_in_progress(account)?);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn threaded_client_delivers_pages_to_the_runtime() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response(200, CAMPAIGN_PAGE))
            .expect("response should succeed");
    });

    let config = GridConfig::new(
        EntityRef::parse("account:1"),
        BreakdownLevel::Account,
        vec![BreakdownLevel::Campaign],
        Vec::new(),
    )?;
    let client = ApiClient::new(&addr, Duration::from_secs(1))?.threaded(true);
    let mut runtime =
        GridRuntime::new(GridContext::new(config)?, client).with_poll_interval(None);
    runtime.context_mut().load();
    runtime.flush()?;
    assert!(runtime.pump_blocking(Duration::from_secs(2)));

    let row = runtime
        .context()
        .row(&BreakdownId::root("campaign:12"))
        .context("fetched row")?;
    assert_eq!(
        row.stat("spend").and_then(|stat| stat.value.as_f64()),
        Some(1234.5)
    );

    handle.join().expect("server thread should join");
    Ok(())
}
