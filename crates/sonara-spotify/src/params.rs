// SPDX-License-Identifier: GPL-3.0-or-later

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::form_urlencoded::byte_serialize;

use crate::endpoint::{EndpointDescriptor, Location, ParamKind, ParamSpec};
use crate::error::{ClientError, Result};
use crate::ids::{extract_id, extract_ids, to_uri, ItemRef};
use crate::transport::ApiRequest;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Items(Vec<ItemRef>),
    Strings(Vec<String>),
    Json(Value),
}

impl ParamValue {
    fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Str(_) => "string",
            ParamValue::Int(_) => "integer",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Items(_) => "item list",
            ParamValue::Strings(_) => "string list",
            ParamValue::Json(_) => "json",
        }
    }

    /// View this value as a list of object references.
    pub fn as_items(&self) -> Option<Vec<ItemRef>> {
        match self {
            ParamValue::Items(items) => Some(items.clone()),
            ParamValue::Strings(ids) => Some(ids.iter().map(ItemRef::from).collect()),
            ParamValue::Str(id) => Some(vec![ItemRef::from(id)]),
            ParamValue::Json(Value::Array(values)) => Some(values.iter().map(ItemRef::from).collect()),
            ParamValue::Json(value @ Value::Object(_)) => Some(vec![ItemRef::Object(value.clone())]),
            _ => None,
        }
    }

    fn as_scalar_string(&self) -> Option<String> {
        match self {
            ParamValue::Str(s) => Some(s.clone()),
            ParamValue::Int(n) => Some(n.to_string()),
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::Strings(list) => Some(list.join(",")),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<ItemRef>> for ParamValue {
    fn from(value: Vec<ItemRef>) -> Self {
        ParamValue::Items(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::Strings(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(value: Vec<&str>) -> Self {
        ParamValue::Strings(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        ParamValue::Json(value)
    }
}

/// Named arguments for one endpoint call.
///
/// # Example
/// ```
/// # use sonara_spotify::Params;
/// let params = Params::new()
///     .with("id", "0OdUWJ0sBjDrqHygGUXeCF")
///     .with("market", "SE")
///     .with("limit", 10);
/// assert!(params.get("market").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a list of object references (IDs, URIs, URLs or JSON objects).
    pub fn items<I, T>(self, name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ItemRef>,
    {
        self.with(
            name,
            ParamValue::Items(items.into_iter().map(Into::into).collect()),
        )
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Validate `params` against `descriptor` and render the concrete request.
///
/// Runs before any I/O; every problem is reported as a validation error.
pub(crate) fn render(descriptor: &EndpointDescriptor, params: &Params) -> Result<ApiRequest> {
    let invalid = |message: String| ClientError::validation(format!("{}: {message}", descriptor.name));

    let mut path = descriptor.path.to_string();
    let mut query: Vec<(String, String)> = descriptor
        .fixed_query
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut body = Map::new();

    for (name, value) in params.iter() {
        if descriptor.param(name).is_none() {
            if !descriptor.open_query {
                return Err(invalid(format!("unknown parameter `{name}`")));
            }
            let rendered = value
                .as_scalar_string()
                .ok_or_else(|| invalid(format!("extra parameter `{name}` must be a scalar")))?;
            query.push((name.to_string(), rendered));
        }
    }

    for spec in descriptor.params {
        let Some(value) = params.get(spec.name) else {
            if spec.required {
                return Err(invalid(format!("missing required parameter `{}`", spec.name)));
            }
            continue;
        };

        let rendered = render_value(spec, value).map_err(invalid)?;
        match spec.location {
            Location::Path => {
                let text = match rendered {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let encoded: String = byte_serialize(text.as_bytes()).collect();
                path = path.replace(&format!("{{{}}}", spec.name), &encoded);
            }
            Location::Query => {
                let text = match rendered {
                    Value::String(s) => s,
                    Value::Array(values) => values
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                query.push((spec.name.to_string(), text));
            }
            Location::Body => {
                body.insert(spec.name.to_string(), rendered);
            }
        }
    }

    let has_body_params = descriptor.params.iter().any(|p| p.location == Location::Body);

    Ok(ApiRequest {
        verb: descriptor.verb,
        path,
        query,
        body: has_body_params.then_some(Value::Object(body)),
    })
}

fn render_value(spec: &ParamSpec, value: &ParamValue) -> std::result::Result<Value, String> {
    let mismatch = || {
        format!(
            "parameter `{}` expects {:?}, got {}",
            spec.name,
            spec.kind,
            value.kind_name()
        )
    };

    match spec.kind {
        ParamKind::String => match value {
            ParamValue::Str(s) => Ok(Value::String(s.clone())),
            _ => Err(mismatch()),
        },
        ParamKind::Integer => match value {
            ParamValue::Int(n) => Ok(Value::from(*n)),
            _ => Err(mismatch()),
        },
        ParamKind::Boolean => match value {
            ParamValue::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(mismatch()),
        },
        ParamKind::StringList => match value {
            ParamValue::Strings(list) => Ok(Value::from(list.clone())),
            ParamValue::Str(s) => Ok(Value::from(vec![s.clone()])),
            _ => Err(mismatch()),
        },
        ParamKind::Json => match value {
            ParamValue::Json(json) => Ok(json.clone()),
            _ => Err(mismatch()),
        },
        ParamKind::Id(object_type) => {
            let items = value.as_items().ok_or_else(mismatch)?;
            match items.as_slice() {
                [item] => extract_id(object_type, item)
                    .map(Value::String)
                    .map_err(|e| e.to_string()),
                _ => Err(format!("parameter `{}` expects exactly one {object_type}", spec.name)),
            }
        }
        ParamKind::Ids(object_type) | ParamKind::Uris(object_type) | ParamKind::UriObjects(object_type) => {
            let items = value.as_items().ok_or_else(mismatch)?;
            let ids = extract_ids(object_type, &items).map_err(|e| e.to_string())?;
            if ids.is_empty() {
                return Err(format!("parameter `{}` needs at least one {object_type}", spec.name));
            }
            Ok(match spec.kind {
                ParamKind::Ids(_) => Value::String(ids.join(",")),
                ParamKind::Uris(_) => {
                    Value::from(ids.iter().map(|id| to_uri(object_type, id)).collect::<Vec<_>>())
                }
                _ => Value::Array(
                    ids.iter()
                        .map(|id| serde_json::json!({ "uri": to_uri(object_type, id) }))
                        .collect(),
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointId;
    use crate::transport::Verb;
    use serde_json::json;

    #[test]
    fn test_render_path_and_query() {
        let params = Params::new()
            .with("id", "spotify:artist:0OdUWJ0sBjDrqHygGUXeCF")
            .with("limit", 50)
            .with("offset", 100)
            .with("country", "CA");
        let request = render(EndpointId::ArtistAlbums.descriptor(), &params).unwrap();

        assert_eq!(request.verb, Verb::Get);
        assert_eq!(request.path, "/artists/0OdUWJ0sBjDrqHygGUXeCF/albums");
        assert_eq!(request.query_value("limit"), Some("50"));
        assert_eq!(request.query_value("offset"), Some("100"));
        assert_eq!(request.query_value("country"), Some("CA"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_render_comma_joined_ids() {
        let params = Params::new().items("ids", ["a", "spotify:track:b", "https://open.spotify.com/track/c"]);
        let request = render(EndpointId::Tracks.descriptor(), &params).unwrap();
        assert_eq!(request.query_value("ids"), Some("a,b,c"));
    }

    #[test]
    fn test_render_body_uris() {
        let params = Params::new()
            .with("playlist_id", "pl")
            .items("uris", ["t1", "t2"])
            .with("position", 0);
        let request = render(EndpointId::PlaylistAddTracks.descriptor(), &params).unwrap();

        assert_eq!(request.verb, Verb::Post);
        assert_eq!(request.path, "/playlists/pl/tracks");
        assert_eq!(
            request.body,
            Some(json!({"uris": ["spotify:track:t1", "spotify:track:t2"], "position": 0}))
        );
    }

    #[test]
    fn test_render_uri_objects() {
        let params = Params::new()
            .with("playlist_id", "pl")
            .items("tracks", ["t1"])
            .with("snapshot_id", "snap");
        let request = render(EndpointId::PlaylistRemoveTracks.descriptor(), &params).unwrap();
        assert_eq!(
            request.body,
            Some(json!({"tracks": [{"uri": "spotify:track:t1"}], "snapshot_id": "snap"}))
        );
    }

    #[test]
    fn test_fixed_query_is_sent() {
        let request = render(EndpointId::CurrentUserFollowedArtists.descriptor(), &Params::new()).unwrap();
        assert_eq!(request.query_value("type"), Some("artist"));
    }

    #[test]
    fn test_missing_required_parameter() {
        let result = render(EndpointId::Search.descriptor(), &Params::new().with("q", "eels"));
        match result {
            Err(ClientError::Validation(message)) => assert!(message.contains("`type`"), "{message}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_kind_mismatch() {
        let params = Params::new().with("limit", "ten");
        let result = render(EndpointId::CurrentUserSavedTracks.descriptor(), &params);
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_unknown_parameter_rejected_unless_open() {
        let closed = render(EndpointId::Me.descriptor(), &Params::new().with("bogus", 1));
        assert!(matches!(closed, Err(ClientError::Validation(_))));

        let open = render(
            EndpointId::Recommendations.descriptor(),
            &Params::new().items("seed_artists", ["a1"]).with("min_energy", "0.4"),
        )
        .unwrap();
        assert_eq!(open.query_value("min_energy"), Some("0.4"));
        assert_eq!(open.query_value("seed_artists"), Some("a1"));
    }

    #[test]
    fn test_empty_id_list_rejected() {
        let params = Params::new().items("ids", Vec::<String>::new());
        assert!(matches!(
            render(EndpointId::Tracks.descriptor(), &params),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn test_string_list_joined_in_query() {
        let params = Params::new().with("seed_genres", vec!["rock", "jazz"]);
        let request = render(EndpointId::Recommendations.descriptor(), &params).unwrap();
        assert_eq!(request.query_value("seed_genres"), Some("rock,jazz"));
    }
}
