// SPDX-License-Identifier: GPL-3.0-or-later

//! Spotify object references.
//!
//! Endpoints that take IDs accept bare IDs, `spotify:` URIs, open.spotify.com
//! URLs, or whole JSON objects previously returned by the API (a saved-track
//! wrapper, an album with nested artists, ...). Everything is normalized to
//! bare IDs here.

use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Track,
    Artist,
    Album,
    Playlist,
    User,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Track => "track",
            ObjectType::Artist => "artist",
            ObjectType::Album => "album",
            ObjectType::Playlist => "playlist",
            ObjectType::User => "user",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that identifies one or more Spotify objects.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRef {
    Id(String),
    Object(Value),
}

impl From<&str> for ItemRef {
    fn from(value: &str) -> Self {
        ItemRef::Id(value.to_string())
    }
}

impl From<String> for ItemRef {
    fn from(value: String) -> Self {
        ItemRef::Id(value)
    }
}

impl From<&String> for ItemRef {
    fn from(value: &String) -> Self {
        ItemRef::Id(value.clone())
    }
}

impl From<Value> for ItemRef {
    fn from(value: Value) -> Self {
        match value {
            Value::String(id) => ItemRef::Id(id),
            other => ItemRef::Object(other),
        }
    }
}

impl From<&Value> for ItemRef {
    fn from(value: &Value) -> Self {
        ItemRef::from(value.clone())
    }
}

/// Strip URL and URI decoration from an ID string.
pub fn id_from_str(raw: &str) -> &str {
    if raw.starts_with("http") {
        let path = raw.split(['?', '#']).next().unwrap_or(raw);
        path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
    } else if raw.starts_with("spotify:") {
        raw.rsplit(':').next().unwrap_or(raw)
    } else {
        raw
    }
}

pub fn to_uri(object_type: ObjectType, id: &str) -> String {
    format!("spotify:{}:{}", object_type, id_from_str(id))
}

/// Depth-first search for `key`, descending into nested objects only.
pub fn find_item<'a>(key: &str, value: &'a Value) -> Option<&'a Value> {
    let object = value.as_object()?;
    if let Some(found) = object.get(key) {
        return Some(found);
    }
    object
        .values()
        .filter(|nested| nested.is_object())
        .find_map(|nested| find_item(key, nested))
}

/// The item list of a page or batch response.
pub fn extract_list(value: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(items) = value {
        return Some(items);
    }
    ["items", "tracks", "albums", "artists"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|found| match found {
            Value::Array(items) => Some(items),
            Value::Object(_) => found.get("items").and_then(Value::as_array),
            _ => None,
        })
}

/// Resolve every reference to the bare IDs of `object_type`, in input order.
pub fn extract_ids(object_type: ObjectType, items: &[ItemRef]) -> Result<Vec<String>> {
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            ItemRef::Id(raw) => ids.push(id_from_str(raw).to_string()),
            ItemRef::Object(value) => ids_from_object(object_type, value, &mut ids)?,
        }
    }
    Ok(ids)
}

pub fn extract_id(object_type: ObjectType, item: &ItemRef) -> Result<String> {
    extract_ids(object_type, std::slice::from_ref(item))?
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::validation(format!("no {object_type} id found")))
}

fn ids_from_object(object_type: ObjectType, value: &Value, ids: &mut Vec<String>) -> Result<()> {
    let not_found = || ClientError::validation(format!("object does not reference a {object_type}"));

    if value.get("type").and_then(Value::as_str) == Some(object_type.as_str()) {
        let id = value.get("id").and_then(Value::as_str).ok_or_else(not_found)?;
        ids.push(id.to_string());
        return Ok(());
    }

    match object_type {
        ObjectType::Album => {
            let id = find_item("album", value)
                .and_then(|album| album.get("id"))
                .and_then(Value::as_str)
                .ok_or_else(not_found)?;
            ids.push(id.to_string());
        }
        ObjectType::Artist => {
            let artists = find_item("artists", value)
                .and_then(Value::as_array)
                .ok_or_else(not_found)?;
            ids.extend(
                artists
                    .iter()
                    .filter_map(|artist| artist.get("id").and_then(Value::as_str))
                    .map(str::to_string),
            );
        }
        ObjectType::Track => {
            if let Some(track) = value.get("track") {
                let id = track.get("id").and_then(Value::as_str).ok_or_else(not_found)?;
                ids.push(id.to_string());
            } else {
                let tracks = find_item("tracks", value).ok_or_else(not_found)?;
                let list = tracks
                    .as_array()
                    .or_else(|| tracks.get("items").and_then(Value::as_array))
                    .ok_or_else(not_found)?;
                ids.extend(
                    list.iter()
                        .filter_map(|track| track.get("id").and_then(Value::as_str))
                        .map(str::to_string),
                );
            }
        }
        ObjectType::Playlist | ObjectType::User => {
            let id = value.get("id").and_then(Value::as_str).ok_or_else(not_found)?;
            ids.push(id.to_string());
        }
    }
    Ok(())
}

/// Drop repeated IDs, keeping the first occurrence.
pub fn unique(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
