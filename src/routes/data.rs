//! Document endpoints
//!
//! Writes run the two-phase rule check: when the record does not exist
//! yet, the write rule is evaluated without a resource; once a record
//! exists, the check is re-run with the loaded document and that
//! resource-aware verdict is the one that gates the mutation (so an
//! ownership rule admits the owner's update while denying everyone
//! else). Reads follow the same shape, and list/query additionally
//! gate on the collection before filtering per record. Successful
//! mutations broadcast to the real-time hub.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::query::{execute, parse_query_params, Query};
use crate::realtime::ChangeEvent;
use crate::routes::{error_response, forbidden, json_response, not_found};
use crate::rules::Resource;
use crate::server::AppState;
use crate::store::{document_id, Document};

/// Body of `POST /data/set`
#[derive(Debug, Deserialize)]
pub struct SetRequest {
    pub collection: String,
    pub key: String,
    /// Must be a JSON object; documents are schemaless mappings
    pub value: Map<String, Value>,
}

/// `POST /data/set`
pub fn handle_set(
    state: &AppState,
    principal: Option<&str>,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let request: SetRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {e}"),
            )
        }
    };

    let id = document_id(&request.collection, &request.key);
    let allowed = match state.store.get(&id) {
        Some(existing) => state.rules.validate_write(
            &request.collection,
            principal,
            Some(Resource::from(&existing)),
        ),
        None => state
            .rules
            .validate_write(&request.collection, principal, None),
    };
    if !allowed {
        return forbidden(&format!(
            "Write access denied to collection: {}",
            request.collection
        ));
    }

    let owner = principal.unwrap_or_default();
    let doc = match state
        .store
        .set(&request.collection, &request.key, request.value, owner)
    {
        Ok(doc) => doc,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    state
        .hub
        .publish(&ChangeEvent::update(&doc.collection, &doc.key));
    info!("Data stored: {}/{}", doc.collection, doc.key);

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "collection": doc.collection,
            "key": doc.key,
            "message": "Data stored successfully",
        }),
    )
}

/// `GET /data/get/{collection}/{key}`
pub fn handle_get(
    state: &AppState,
    principal: Option<&str>,
    collection: &str,
    key: &str,
) -> Response<Full<Bytes>> {
    let doc = state.store.get(&document_id(collection, key));

    let allowed = match &doc {
        Some(doc) => state
            .rules
            .validate_read(collection, principal, Some(Resource::from(doc))),
        None => state.rules.validate_read(collection, principal, None),
    };
    if !allowed {
        return forbidden(&format!("Read access denied to collection: {collection}"));
    }

    let Some(doc) = doc else {
        return not_found("Data not found");
    };

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "collection": collection,
            "key": key,
            "data": doc.value,
            "owner": doc.owner,
        }),
    )
}

/// `GET /data/list/{collection}`
pub fn handle_list(
    state: &AppState,
    principal: Option<&str>,
    collection: &str,
) -> Response<Full<Bytes>> {
    if !state.rules.validate_read(collection, principal, None) {
        return forbidden(&format!("Read access denied to collection: {collection}"));
    }

    let readable = readable_documents(state, principal, collection);
    let items: Map<String, Value> = readable
        .iter()
        .map(|doc| (doc.key.clone(), doc.value.clone()))
        .collect();

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "collection": collection,
            "count": items.len(),
            "items": items,
        }),
    )
}

/// `GET /data/query/{collection}?where=…&orderBy=…&limit=…&startAfter=…`
pub fn handle_query(
    state: &AppState,
    principal: Option<&str>,
    collection: &str,
    params: &[(String, String)],
) -> Response<Full<Bytes>> {
    if !state.rules.validate_read(collection, principal, None) {
        return forbidden(&format!("Read access denied to collection: {collection}"));
    }

    let candidates = readable_documents(state, principal, collection);
    let query: Query =
        parse_query_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let results = execute(candidates, &query);

    let items: Map<String, Value> = results
        .iter()
        .map(|doc| (doc.key.clone(), doc.value.clone()))
        .collect();
    let rows: Vec<Value> = results
        .iter()
        .map(|doc| {
            json!({
                "key": doc.key,
                "data": doc.value,
                "owner": doc.owner,
                "created_at": doc.created_at.to_rfc3339(),
            })
        })
        .collect();

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "collection": collection,
            "count": results.len(),
            "query": query,
            "items": items,
            "results": rows,
        }),
    )
}

/// `DELETE /data/delete/{collection}/{key}`
pub fn handle_delete(
    state: &AppState,
    principal: Option<&str>,
    collection: &str,
    key: &str,
) -> Response<Full<Bytes>> {
    let id = document_id(collection, key);
    let doc = state.store.get(&id);

    let allowed = match &doc {
        Some(doc) => state
            .rules
            .validate_write(collection, principal, Some(Resource::from(doc))),
        None => state.rules.validate_write(collection, principal, None),
    };
    if !allowed {
        return forbidden(&format!("Write access denied to collection: {collection}"));
    }

    if doc.is_none() {
        return not_found("Data not found");
    }

    state.store.delete(&id);
    state.hub.publish(&ChangeEvent::delete(collection, key));
    info!("Data deleted: {}/{}", collection, key);

    json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": "Data deleted successfully" }),
    )
}

/// `DELETE /data/clear/{collection}`: bulk maintenance delete.
///
/// Removes exactly the records the caller could delete individually:
/// each record's resource-aware write check must pass. One delete
/// event is broadcast per removed record.
pub fn handle_clear(
    state: &AppState,
    principal: Option<&str>,
    collection: &str,
) -> Response<Full<Bytes>> {
    let deletable: Vec<String> = state
        .store
        .list(collection)
        .iter()
        .filter(|doc| {
            state
                .rules
                .validate_write(collection, principal, Some(Resource::from(*doc)))
        })
        .map(|doc| doc.id.clone())
        .collect();

    let removed = state.store.remove_many(&deletable);
    for doc in &removed {
        state
            .hub
            .publish(&ChangeEvent::delete(&doc.collection, &doc.key));
    }
    info!("Cleared {} record(s) from {}", removed.len(), collection);

    json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "collection": collection,
            "deleted": removed.len(),
        }),
    )
}

/// Snapshot a collection and keep the records this principal may read
fn readable_documents(
    state: &AppState,
    principal: Option<&str>,
    collection: &str,
) -> Vec<Document> {
    state
        .store
        .list(collection)
        .into_iter()
        .filter(|doc| {
            state
                .rules
                .validate_read(collection, principal, Some(Resource::from(doc)))
        })
        .collect()
}
