// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_engine::{
    Completion, FetchRequest, FetchResponse, GridBackend, Outbound, SaveFailure, SaveRequest,
    SaveResponse, StateBatchRequest, StateBatchResponse,
};
use adgrid_model::{EntityRef, SortDirection, StatData};
use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const ALL_ACCOUNTS_SEGMENT: &str = "all_accounts";

/// Blocking client for the grid REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    timeout: Duration,
    threaded: bool,
    http: HttpClient,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let base_url = Url::parse(trimmed)
            .with_context(|| format!("api.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                base_url.scheme()
            );
        }
        if base_url.cannot_be_a_base() {
            bail!("api.base_url {trimmed:?} cannot carry a path");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            threaded: false,
            http,
        })
    }

    /// Runs each backend job on its own worker thread instead of inline.
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut segments = vec!["grid".to_owned()];
        match request.entity {
            Some(entity) => {
                segments.push(entity.kind.as_str().to_owned());
                segments.push(entity.id.to_string());
            }
            None => segments.push(ALL_ACCOUNTS_SEGMENT.to_owned()),
        }
        segments.push("breakdown".to_owned());
        segments.extend(
            request
                .levels
                .iter()
                .map(|level| level.as_str().to_owned()),
        );
        let url = self.endpoint(segments.as_slice())?;
        let body = FetchBody::from_request(request);
        let response = self.http.post(url.clone()).json(&body);
        let data: FetchResponse = self.send(response, &url)?;
        debug!(
            seq = request.seq,
            rows = data.rows.len(),
            total = data.total_count,
            "fetched breakdown page"
        );
        Ok(data)
    }

    pub fn save(&self, request: &SaveRequest) -> Result<SaveResponse, SaveFailure> {
        let url = self
            .endpoint(&["grid", "rows", "save"])
            .map_err(SaveFailure::transport)?;
        let body = SaveBody {
            row_id: request.row.as_str(),
            entity: request.entity,
            field: &request.field,
            value: &request.value,
        };
        self.send_save(self.http.post(url.clone()).json(&body), &url)
    }

    pub fn save_states(
        &self,
        request: &StateBatchRequest,
    ) -> Result<StateBatchResponse, SaveFailure> {
        let url = self
            .endpoint(&["grid", "rows", "state"])
            .map_err(SaveFailure::transport)?;
        let rows = request
            .rows
            .iter()
            .map(|toggle| StateBody {
                row_id: toggle.row.as_str(),
                entity: toggle.entity,
                state: toggle.state.code(),
            })
            .collect();
        self.send_save(
            self.http.post(url.clone()).json(&StateBatchBody { rows }),
            &url,
        )
    }

    pub fn sync_in_progress(&self, entity: EntityRef) -> Result<bool> {
        let url = self.sync_endpoint(entity)?;
        let data: SyncStatusData = self.send(self.http.get(url.clone()), &url)?;
        Ok(data.is_sync_in_progress)
    }

    pub fn start_sync(&self, entity: EntityRef) -> Result<()> {
        let url = self.sync_endpoint(entity)?;
        self.send_envelope::<serde_json::Value>(self.http.post(url.clone()), &url)?
            .check()
    }

    fn sync_endpoint(&self, entity: EntityRef) -> Result<Url> {
        self.endpoint(&[entity.kind.as_str(), &entity.id.to_string(), "sync"])
    }

    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("api.base_url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
        self.send_envelope(request, url)?.into_data()
    }

    fn send_envelope<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &Url,
    ) -> Result<Envelope<T>> {
        let response = request
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "api response");
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        response
            .json()
            .with_context(|| format!("decode response from {url}"))
    }

    fn send_save<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &Url,
    ) -> Result<T, SaveFailure> {
        let response = request.send().map_err(|error| {
            SaveFailure::transport(connection_error(&self.base_url, error))
        })?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "api response");
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let failure = save_failure(status, &body);
            warn!(%url, status = status.as_u16(), %failure, "save rejected");
            return Err(failure);
        }
        let envelope: Envelope<T> = response.json().map_err(|error| {
            SaveFailure::transport(format!("decode response from {url}: {error}"))
        })?;
        envelope.into_data().map_err(SaveFailure::transport)
    }
}

impl GridBackend for ApiClient {
    fn fetch_breakdown(&mut self, request: &FetchRequest) -> Result<FetchResponse> {
        self.fetch(request)
    }

    fn save_stat(&mut self, request: &SaveRequest) -> Result<SaveResponse, SaveFailure> {
        self.save(request)
    }

    fn save_state_batch(
        &mut self,
        request: &StateBatchRequest,
    ) -> Result<StateBatchResponse, SaveFailure> {
        self.save_states(request)
    }

    fn sync_status(&mut self, entity: EntityRef) -> Result<bool> {
        self.sync_in_progress(entity)
    }

    fn trigger_sync(&mut self, entity: EntityRef) -> Result<()> {
        self.start_sync(entity)
    }

    fn spawn(&mut self, job: Outbound, tx: Sender<Completion>) -> Result<()> {
        if !self.threaded {
            let completion = self.execute(job);
            tx.send(completion)
                .map_err(|_| anyhow!("grid completion channel closed"))?;
            return Ok(());
        }
        let mut worker = self.clone();
        thread::Builder::new()
            .name("adgrid-api".to_owned())
            .spawn(move || {
                let completion = worker.execute(job);
                if tx.send(completion).is_err() {
                    debug!("grid dropped before api response arrived");
                }
            })
            .context("spawn api worker thread")?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct FetchBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    breakdown: &'a str,
    offset: usize,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    filters: &'a BTreeMap<String, String>,
}

impl<'a> FetchBody<'a> {
    fn from_request(request: &'a FetchRequest) -> Self {
        let key = &request.key;
        let order = key.sort_field.as_ref().map(|field| match key.sort_direction {
            SortDirection::Desc => format!("-{field}"),
            SortDirection::Asc => field.clone(),
        });
        let range = request.query.date_range;
        Self {
            parent_id: request.parent_id().map(|id| id.as_str()),
            breakdown: key.branch.level.as_str(),
            offset: key.offset,
            limit: key.page_size,
            order,
            start_date: range.map(|range| range.start.to_string()),
            end_date: range.map(|range| range.end.to_string()),
            filters: &request.query.filters,
        }
    }
}

#[derive(Debug, Serialize)]
struct SaveBody<'a> {
    row_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity: Option<EntityRef>,
    field: &'a str,
    value: &'a StatData,
}

#[derive(Debug, Serialize)]
struct StateBody<'a> {
    row_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity: Option<EntityRef>,
    state: i64,
}

#[derive(Debug, Serialize)]
struct StateBatchBody<'a> {
    rows: Vec<StateBody<'a>>,
}

#[derive(Debug, Deserialize)]
struct SyncStatusData {
    #[serde(default)]
    is_sync_in_progress: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn check(&self) -> Result<()> {
        if self.success == Some(false) {
            bail!(
                "server reported failure: {}",
                self.message.as_deref().unwrap_or("no message")
            );
        }
        Ok(())
    }

    fn into_data(self) -> Result<T> {
        self.check()?;
        self.data
            .ok_or_else(|| anyhow!("server response is missing its data payload"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldMessages {
    One(String),
    Many(Vec<String>),
}

impl FieldMessages {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(message) => vec![message],
            Self::Many(messages) => messages,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorData {
    #[serde(default)]
    errors: BTreeMap<String, FieldMessages>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<ErrorData>,
}

impl ErrorEnvelope {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn message(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.message.as_deref())
            .or(self.message.as_deref())
            .filter(|message| !message.is_empty())
    }
}

fn save_failure(status: StatusCode, body: &str) -> SaveFailure {
    let envelope = ErrorEnvelope::parse(body);
    match status {
        StatusCode::CONFLICT => SaveFailure::Conflict {
            message: envelope
                .message()
                .unwrap_or("row changed on the server")
                .to_owned(),
        },
        StatusCode::BAD_REQUEST
            if envelope
                .data
                .as_ref()
                .is_some_and(|data| !data.errors.is_empty()) =>
        {
            let errors = envelope
                .data
                .map(|data| data.errors)
                .unwrap_or_default()
                .into_iter()
                .map(|(field, messages)| (field, messages.into_vec()))
                .collect();
            SaveFailure::Field { errors }
        }
        _ => SaveFailure::transport(clean_error_response(status, body)),
    }
}

fn connection_error(base_url: &Url, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check [api].base_url and that the server is running ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Some(message) = ErrorEnvelope::parse(body).message() {
        return anyhow!("server error ({}): {}", status.as_u16(), message);
    }
    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }
    anyhow!("server returned {}", status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::{ApiClient, FetchBody, save_failure};
    use adgrid_engine::SaveFailure;
    use adgrid_engine::data::{BranchKey, FetchKey, QueryParams};
    use adgrid_engine::FetchRequest;
    use adgrid_model::{BreakdownId, BreakdownLevel, DateRange, SortDirection};
    use reqwest::StatusCode;
    use std::time::Duration;
    use time::macros::date;

    #[test]
    fn base_url_must_be_http() {
        let error = ApiClient::new("ftp://example.com", Duration::from_secs(1))
            .expect_err("ftp is not allowed");
        assert!(error.to_string().contains("http or https"));
        assert!(ApiClient::new("  ", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn endpoints_keep_base_path_and_trailing_slash() {
        let client = ApiClient::new("http://ads.example.com/api/", Duration::from_secs(1))
            .expect("client");
        let url = client
            .endpoint(&["grid", "rows", "save"])
            .expect("endpoint");
        assert_eq!(url.as_str(), "http://ads.example.com/api/grid/rows/save/");
    }

    #[test]
    fn fetch_body_encodes_order_and_dates() {
        let mut query = QueryParams::default();
        query.date_range = Some(
            DateRange::new(date!(2026 - 04 - 01), date!(2026 - 04 - 30)).expect("range"),
        );
        let request = FetchRequest {
            seq: 3,
            key: FetchKey {
                branch: BranchKey::under(BreakdownId::root("campaign:4"), BreakdownLevel::Source),
                offset: 50,
                page_size: 50,
                sort_field: Some("spend".to_owned()),
                sort_direction: SortDirection::Desc,
            },
            query,
            entity: None,
            levels: vec![BreakdownLevel::Campaign, BreakdownLevel::Source],
        };
        let body = serde_json::to_value(FetchBody::from_request(&request)).expect("json");
        assert_eq!(
            body,
            serde_json::json!({
                "parent_id": "campaign:4",
                "breakdown": "source",
                "offset": 50,
                "limit": 50,
                "order": "-spend",
                "start_date": "2026-04-01",
                "end_date": "2026-04-30",
            })
        );
    }

    #[test]
    fn status_codes_map_to_save_failures() {
        let field = save_failure(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"data":{"errors":{"daily_budget":"Must be at least $10."}}}"#,
        );
        let SaveFailure::Field { errors } = field else {
            panic!("expected field errors, got {field:?}");
        };
        assert_eq!(
            errors.get("daily_budget"),
            Some(&vec!["Must be at least $10.".to_owned()])
        );

        let conflict = save_failure(StatusCode::CONFLICT, "");
        assert!(matches!(conflict, SaveFailure::Conflict { .. }));

        let bare_400 = save_failure(StatusCode::BAD_REQUEST, "bad input");
        assert_eq!(
            bare_400,
            SaveFailure::Transport {
                message: "server error (400): bad input".to_owned()
            }
        );
        let outage = save_failure(StatusCode::BAD_GATEWAY, "<html>...</html>");
        assert!(matches!(outage, SaveFailure::Transport { .. }));
    }
}
