
use serde_json::{json, Value};
use sonara_spotify::{
    AllOptions, ApiRequest, BatchUnit, ClientError, Credentials, EndpointId, Params, SpotifyClient,
};
use std::time::Duration;
use stub_transport::{Reply, StubTransport};

fn client(transport: &StubTransport) -> SpotifyClient {
    SpotifyClient::with_transport(transport.clone(), Credentials::bearer("token"))
}

fn query_u64(request: &ApiRequest, name: &str) -> u64 {
    request
        .query_value(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn ids_of(request: &ApiRequest) -> Vec<String> {
    request
        .query_value("ids")
        .map(|ids| ids.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Echo every requested ID back as a track object.
fn echo_tracks(request: &ApiRequest) -> Value {
    let tracks: Vec<Value> = ids_of(request)
        .into_iter()
        .map(|id| json!({"id": id, "type": "track"}))
        .collect();
    json!({ "tracks": tracks })
}

fn returned_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|track| track["id"].as_str().unwrap().to_string())
        .collect()
}

/// A saved-tracks listing with `total` items numbered from zero.
fn numbered_pages(total: u64) -> StubTransport {
    StubTransport::new(move |request, _| {
        let offset = query_u64(request, "offset");
        let limit = query_u64(request, "limit");
        let items: Vec<u64> = (offset..(offset + limit).min(total)).collect();
        Reply::ok(json!({
            "items": items,
            "limit": limit,
            "offset": offset,
            "total": total,
        }))
    })
}

#[tokio::test]
async fn test_chunks_merge_in_input_order_despite_delays() {
    let transport = StubTransport::new(|request, _| {
        // Earlier chunks answer later.
        let first = ids_of(request)[0].trim_start_matches('t').parse::<u64>().unwrap();
        Reply::ok(echo_tracks(request)).after(Duration::from_millis(60 - first * 5))
    });
    let client = client(&transport);

    let input: Vec<String> = (0..10).map(|n| format!("t{n}")).collect();
    let all = client
        .endpoint(EndpointId::Tracks)
        .all(Params::new().items("ids", &input), AllOptions::new().chunk_size(3))
        .unwrap();

    let tracks = all.fetch("tracks").await.unwrap();
    assert_eq!(returned_ids(&tracks), input);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_empty_input_resolves_without_requests() {
    let transport = StubTransport::new(|request, _| Reply::ok(echo_tracks(request)));
    let client = client(&transport);

    let all = client
        .endpoint(EndpointId::Tracks)
        .all(Params::new().items("ids", Vec::<String>::new()), AllOptions::default())
        .unwrap();

    assert!(all.is_finished());
    assert_eq!(all.fetch(None).await.unwrap(), json!({"tracks": []}));
    assert_eq!(transport.calls(), 0);

    let contains = client
        .all(
            EndpointId::CurrentUserSavedTracksContains,
            Params::new(),
            AllOptions::default(),
        )
        .unwrap();
    assert_eq!(contains.fetch(None).await.unwrap(), json!([]));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_offset_pagination_fetches_every_page_once() {
    let transport = numbered_pages(257);
    let client = client(&transport);

    let all = client
        .endpoint(EndpointId::CurrentUserSavedTracks)
        .all(Params::new(), AllOptions::default())
        .unwrap();

    let items = all.fetch("items").await.unwrap();
    let expected: Vec<u64> = (0..257).collect();
    assert_eq!(items, json!(expected));
    assert_eq!(transport.calls(), 6);

    let mut offsets: Vec<u64> = transport
        .requests()
        .iter()
        .map(|request| query_u64(request, "offset"))
        .collect();
    offsets.sort_unstable();
    assert_eq!(offsets, vec![0, 50, 100, 150, 200, 250]);
}

#[tokio::test]
async fn test_offset_pagination_keeps_first_page_links() {
    let transport = StubTransport::new(|request, _| {
        let offset = query_u64(request, "offset");
        let previous = match offset {
            0 => Value::Null,
            _ => json!(format!("https://api.spotify.com/v1/me/tracks?offset={}", offset - 50)),
        };
        Reply::ok(json!({
            "items": [offset],
            "limit": 50,
            "offset": offset,
            "previous": previous,
            "next": format!("https://api.spotify.com/v1/me/tracks?offset={}", offset + 50),
            "total": 150,
        }))
    });
    let client = client(&transport);

    let merged = client
        .all(EndpointId::CurrentUserSavedTracks, Params::new(), AllOptions::default())
        .unwrap()
        .fetch(None)
        .await
        .unwrap();

    assert_eq!(merged["items"], json!([0, 50, 100]));
    assert_eq!(merged["previous"], Value::Null);
    assert_eq!(merged["offset"], json!(0));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_offset_pagination_starts_at_caller_offset() {
    let transport = numbered_pages(257);
    let client = client(&transport);

    let all = client
        .all(
            EndpointId::CurrentUserSavedTracks,
            Params::new().with("offset", 100),
            AllOptions::default(),
        )
        .unwrap();

    let items = all.fetch("items").await.unwrap();
    assert_eq!(items.as_array().unwrap().len(), 157);
    assert_eq!(items[0], json!(100));
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_single_page_listing_makes_one_request() {
    let transport = numbered_pages(12);
    let client = client(&transport);

    let all = client
        .all(EndpointId::CurrentUserPlaylists, Params::new(), AllOptions::default())
        .unwrap();

    assert_eq!(all.fetch("items").await.unwrap().as_array().unwrap().len(), 12);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_repeated_fetch_resolves_once() {
    let transport = StubTransport::new(|_, _| {
        Reply::ok(json!({"id": "wizzler", "display_name": "JM Wizzler"})).after(Duration::from_millis(10))
    });
    let client = client(&transport);

    let handle = client.call(EndpointId::Me, Params::new()).unwrap();
    let first = handle.fetch(None).await.unwrap();
    let second = handle.fetch("display_name").await.unwrap();
    let third = handle.clone().fetch(None).await.unwrap();

    assert_eq!(first, third);
    assert_eq!(second, json!("JM Wizzler"));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_lowest_failing_chunk_is_reported() {
    let transport = StubTransport::new(|request, _| match ids_of(request)[0].as_str() {
        // Chunk 3 fails slowly, chunk 4 fails at once.
        "t3" => Reply::status(500, json!({"error": {"status": 500, "message": "chunk three"}}))
            .after(Duration::from_millis(40)),
        "t4" => Reply::status(502, json!({"error": {"status": 502, "message": "chunk four"}})),
        _ => Reply::ok(echo_tracks(request)),
    });
    let client = client(&transport);

    let input: Vec<String> = (0..5).map(|n| format!("t{n}")).collect();
    let all = client
        .endpoint(EndpointId::Tracks)
        .all(Params::new().items("ids", &input), AllOptions::new().chunk_size(1))
        .unwrap();

    match all.fetch(None).await {
        Err(ClientError::Aggregation {
            endpoint,
            unit,
            index,
            source,
        }) => {
            assert_eq!(endpoint, "tracks");
            assert_eq!(unit, BatchUnit::Chunk);
            assert_eq!(index, 3);
            assert_eq!(source.status(), Some(500));
        }
        other => panic!("expected aggregation error, got {other:?}"),
    }
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn test_failing_page_is_reported() {
    let transport = StubTransport::new(|request, _| {
        let offset = query_u64(request, "offset");
        if offset == 100 {
            return Reply::status(503, Value::Null);
        }
        Reply::ok(json!({"items": [offset], "limit": 50, "total": 200}))
    });
    let client = client(&transport);

    let error = client
        .all(EndpointId::CurrentUserSavedAlbums, Params::new(), AllOptions::default())
        .unwrap()
        .fetch(None)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ClientError::Aggregation { unit: BatchUnit::Page, index: 2, .. }
    ));
    assert_eq!(error.status(), Some(503));
}

#[tokio::test]
async fn test_all_on_plain_endpoint_is_rejected_before_io() {
    let transport = StubTransport::new(|_, _| Reply::ok(json!({})));
    let client = client(&transport);

    let result = client
        .endpoint(EndpointId::Artist)
        .all(Params::new().with("id", "a1"), AllOptions::default());

    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_unknown_parameter_in_batch_is_rejected_before_io() {
    let transport = StubTransport::new(|request, _| Reply::ok(echo_tracks(request)));
    let client = client(&transport);

    let result = client.all(
        EndpointId::Tracks,
        Params::new().items("ids", ["t1", "t2"]).with("colour", "blue"),
        AllOptions::default(),
    );

    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_unique_drops_repeated_ids() {
    let transport = StubTransport::new(|request, _| Reply::ok(echo_tracks(request)));
    let client = client(&transport);

    let all = client
        .all(
            EndpointId::Tracks,
            Params::new().items("ids", ["b", "spotify:track:a", "b", "a", "c"]),
            AllOptions::new().unique(true),
        )
        .unwrap();

    assert_eq!(returned_ids(&all.fetch("tracks").await.unwrap()), vec!["b", "a", "c"]);
    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.requests()[0].query_value("ids"), Some("b,a,c"));
}

#[tokio::test]
async fn test_cursor_pagination_follows_next_links() {
    let transport = StubTransport::new(|request, _| {
        if request.path.starts_with("https://") {
            Reply::ok(json!({"artists": {
                "items": [{"id": "c"}],
                "next": null,
                "cursors": {"after": null},
                "total": 3
            }}))
        } else {
            Reply::ok(json!({"artists": {
                "items": [{"id": "a"}, {"id": "b"}],
                "next": "https://api.spotify.com/v1/me/following?type=artist&after=b&limit=50",
                "cursors": {"after": "b"},
                "total": 3
            }}))
        }
    });
    let client = client(&transport);

    let all = client
        .all(EndpointId::CurrentUserFollowedArtists, Params::new(), AllOptions::default())
        .unwrap();

    let items = all.fetch("items").await.unwrap();
    assert_eq!(items, json!([{"id": "a"}, {"id": "b"}, {"id": "c"}]));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "/me/following");
    assert_eq!(requests[0].query_value("type"), Some("artist"));
    assert_eq!(requests[0].query_value("limit"), Some("50"));
    assert!(requests[1].path.contains("after=b"));
}

#[tokio::test]
async fn test_array_results_concatenate() {
    let transport = StubTransport::new(|request, _| {
        let flags: Vec<bool> = ids_of(request).iter().map(|id| id.ends_with('1')).collect();
        Reply::ok(json!(flags))
    });
    let client = client(&transport);

    let all = client
        .all(
            EndpointId::CurrentUserSavedTracksContains,
            Params::new().items("ids", ["x1", "x2", "y1"]),
            AllOptions::new().chunk_size(2),
        )
        .unwrap();

    assert_eq!(all.fetch(None).await.unwrap(), json!([true, false, true]));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_join_many_extracts_item_lists() {
    let transport = StubTransport::new(|request, _| {
        let id = request.path.rsplit('/').nth(1).unwrap_or_default().to_string();
        Reply::ok(json!({"items": [{"album_of": id}], "total": 1}))
    });
    let client = client(&transport);

    let handles: Vec<_> = ["al1", "al2"]
        .iter()
        .map(|id| {
            client
                .call(EndpointId::AlbumTracks, Params::new().with("id", *id))
                .unwrap()
        })
        .collect();

    let items = client.join_many(&handles, true).await.unwrap();
    assert_eq!(items, vec![json!({"album_of": "al1"}), json!({"album_of": "al2"})]);

    let whole = client.join_many(&handles, false).await.unwrap();
    assert_eq!(whole.len(), 2);
    assert_eq!(transport.calls(), 2);
}
