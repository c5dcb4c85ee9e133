// SPDX-License-Identifier: GPL-3.0-or-later

//! Fan-out behind `Endpoint::all`.
//!
//! Three shapes are handled: offset paging (first page, then every
//! remaining offset at once), cursor paging (follow `next` one page at a
//! time) and ID batches (split the input list into chunks, one call per
//! chunk). Constituent results are merged in index order regardless of
//! the order in which they complete.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::client::ClientContext;
use crate::endpoint::{BatchSpec, Collect, EndpointDescriptor, Pagination};
use crate::error::{BatchUnit, ClientError, Result};
use crate::handle::RequestHandle;
use crate::ids::{extract_ids, find_item, unique};
use crate::merge::merge_pages;
use crate::params::{render, ParamValue, Params};
use crate::transport::ApiRequest;

/// Options for [`Endpoint::all`](crate::client::Endpoint::all).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllOptions {
    /// Chunk size for ID batches. Defaults to the endpoint's maximum.
    pub chunk_size: Option<usize>,
    /// Drop repeated input IDs before chunking.
    pub unique: bool,
}

impl AllOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

pub(crate) fn dispatch_all(
    ctx: Arc<ClientContext>,
    descriptor: &'static EndpointDescriptor,
    params: Params,
    options: AllOptions,
) -> Result<RequestHandle> {
    if let Some(batch) = descriptor.batch {
        return dispatch_chunked(ctx, descriptor, params, batch, options);
    }
    match descriptor.pagination {
        Pagination::Offset { max_limit } => dispatch_offset(ctx, descriptor, params, max_limit),
        Pagination::Cursor { max_limit } => dispatch_cursor(ctx, descriptor, params, max_limit),
        Pagination::None => Err(ClientError::validation(format!(
            "{} supports neither pagination nor batching",
            descriptor.name
        ))),
    }
}

fn dispatch_offset(
    ctx: Arc<ClientContext>,
    descriptor: &'static EndpointDescriptor,
    params: Params,
    max_limit: u32,
) -> Result<RequestHandle> {
    let name = descriptor.name;
    let start = params.int("offset").unwrap_or(0).max(0) as u64;

    let mut first = params.clone();
    first.set("limit", i64::from(max_limit));
    first.set("offset", start as i64);
    let first_request = render(descriptor, &first)?;

    Ok(RequestHandle::spawn(name, async move {
        let first_page = ctx
            .execute(name, &first_request)
            .await
            .map_err(|e| aggregation(name, BatchUnit::Page, 0, e))?;

        let total = find_item("total", &first_page).and_then(Value::as_u64).unwrap_or(0);
        let page_size = find_item("limit", &first_page)
            .and_then(Value::as_u64)
            .filter(|size| *size > 0)
            .unwrap_or(u64::from(max_limit));

        let offsets = remaining_offsets(start, total, page_size);
        debug!(target: "dispatch", endpoint = name, total, page_size, "fetching {} more pages", offsets.len());

        let mut tasks = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let mut page = params.clone();
            page.set("limit", page_size as i64);
            page.set("offset", offset as i64);
            tasks.push(spawn_call(ctx.clone(), name, render(descriptor, &page)?));
        }

        let mut pages = vec![first_page];
        pages.extend(join_in_order(name, BatchUnit::Page, tasks, 1).await?);
        Ok(merge_pages(pages))
    }))
}

fn dispatch_cursor(
    ctx: Arc<ClientContext>,
    descriptor: &'static EndpointDescriptor,
    params: Params,
    max_limit: u32,
) -> Result<RequestHandle> {
    let name = descriptor.name;
    let mut first = params;
    first.set("limit", i64::from(max_limit));
    let first_request = render(descriptor, &first)?;

    Ok(RequestHandle::spawn(name, async move {
        let mut pages = Vec::new();
        let mut request = first_request;
        loop {
            let page = ctx
                .execute(name, &request)
                .await
                .map_err(|e| aggregation(name, BatchUnit::Page, pages.len(), e))?;
            let next = find_item("next", &page).and_then(Value::as_str).map(str::to_string);
            pages.push(page);

            match next {
                Some(url) => {
                    trace!(target: "dispatch", endpoint = name, "following cursor {}", url);
                    request = ApiRequest::get(url);
                }
                None => break,
            }
        }
        debug!(target: "dispatch", endpoint = name, "collected {} cursor pages", pages.len());
        Ok(merge_pages(pages))
    }))
}

fn dispatch_chunked(
    ctx: Arc<ClientContext>,
    descriptor: &'static EndpointDescriptor,
    params: Params,
    batch: BatchSpec,
    options: AllOptions,
) -> Result<RequestHandle> {
    let name = descriptor.name;
    let invalid = |message: String| ClientError::validation(format!("{name}: {message}"));

    let object_type = descriptor
        .param(batch.param)
        .and_then(|spec| spec.kind.object_type())
        .ok_or_else(|| invalid(format!("batch parameter `{}` is not an id list", batch.param)))?;

    let chunk_size = options.chunk_size.unwrap_or(batch.max_size);
    if chunk_size == 0 || chunk_size > batch.max_size {
        return Err(invalid(format!(
            "chunk size must be between 1 and {}, got {chunk_size}",
            batch.max_size
        )));
    }

    let items = match params.get(batch.param) {
        None => Vec::new(),
        Some(value) => value
            .as_items()
            .ok_or_else(|| invalid(format!("`{}` must be a list of items", batch.param)))?,
    };
    let mut ids = extract_ids(object_type, &items)?;
    if options.unique {
        ids = unique(ids);
    }

    if ids.is_empty() {
        debug!(target: "dispatch", endpoint = name, "empty batch input, no requests issued");
        return Ok(RequestHandle::ready(name, empty_result(batch.collect)));
    }

    // Render every chunk up front so a bad parameter fails before any I/O.
    let requests = ids
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk_params = params.clone();
            chunk_params.set(batch.param, ParamValue::Strings(chunk.to_vec()));
            render(descriptor, &chunk_params)
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        target: "dispatch",
        endpoint = name,
        ids = ids.len(),
        chunk_size,
        "dispatching {} chunks",
        requests.len()
    );

    let tasks: Vec<_> = requests
        .into_iter()
        .map(|request| spawn_call(ctx.clone(), name, request))
        .collect();

    Ok(RequestHandle::spawn(name, async move {
        let results = join_in_order(name, BatchUnit::Chunk, tasks, 0).await?;
        Ok(match (merge_pages(results), batch.collect) {
            (Value::Null, collect) => empty_result(collect),
            (merged, _) => merged,
        })
    }))
}

fn spawn_call(ctx: Arc<ClientContext>, endpoint: &'static str, request: ApiRequest) -> JoinHandle<Result<Value>> {
    tokio::spawn(async move { ctx.execute(endpoint, &request).await })
}

/// Await `tasks` in index order. The first failure seen is therefore the
/// lowest-indexed one; results of its siblings are dropped.
async fn join_in_order(
    endpoint: &'static str,
    unit: BatchUnit,
    tasks: Vec<JoinHandle<Result<Value>>>,
    first_index: usize,
) -> Result<Vec<Value>> {
    let mut results = Vec::with_capacity(tasks.len());
    for (position, task) in tasks.into_iter().enumerate() {
        let index = first_index + position;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ClientError::TaskFailed(e.to_string())),
        };
        results.push(outcome.map_err(|e| aggregation(endpoint, unit, index, e))?);
    }
    Ok(results)
}

fn aggregation(endpoint: &str, unit: BatchUnit, index: usize, source: ClientError) -> ClientError {
    ClientError::Aggregation {
        endpoint: endpoint.to_string(),
        unit,
        index,
        source: Box::new(source),
    }
}

fn empty_result(collect: Collect) -> Value {
    match collect {
        Collect::Field(field) => json!({ field: [] }),
        Collect::Array => json!([]),
        Collect::Nothing => json!({}),
    }
}

/// Offsets of the pages after the one starting at `start`.
fn remaining_offsets(start: u64, total: u64, page_size: u64) -> Vec<u64> {
    if page_size == 0 {
        return Vec::new();
    }
    (1..)
        .map(|k| start + k * page_size)
        .take_while(|offset| *offset < total)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_offsets() {
        assert_eq!(remaining_offsets(0, 257, 50), vec![50, 100, 150, 200, 250]);
        assert_eq!(remaining_offsets(100, 257, 50), vec![150, 200, 250]);
        assert!(remaining_offsets(0, 50, 50).is_empty());
        assert!(remaining_offsets(0, 0, 50).is_empty());
        assert!(remaining_offsets(300, 257, 50).is_empty());
    }

    #[test]
    fn test_empty_result_shapes() {
        assert_eq!(empty_result(Collect::Field("tracks")), json!({"tracks": []}));
        assert_eq!(empty_result(Collect::Array), json!([]));
        assert_eq!(empty_result(Collect::Nothing), json!({}));
    }

    #[test]
    fn test_options_builder() {
        let options = AllOptions::new().chunk_size(10).unique(true);
        assert_eq!(options.chunk_size, Some(10));
        assert!(options.unique);
    }
}
