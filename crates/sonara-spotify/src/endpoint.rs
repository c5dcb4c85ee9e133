// SPDX-License-Identifier: GPL-3.0-or-later

//! Declarative table of Spotify Web API operations.
//!
//! Each operation is an immutable [`EndpointDescriptor`] living in static
//! memory, reachable through the typed [`EndpointId`] accessor or by name.

use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;
use crate::ids::ObjectType;
use crate::transport::Verb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    /// One object reference, rendered as a bare ID.
    Id(ObjectType),
    /// Object references, rendered as comma-joined IDs.
    Ids(ObjectType),
    /// Object references, rendered as `spotify:` URIs.
    Uris(ObjectType),
    /// Object references, rendered as `[{"uri": ...}]`.
    UriObjects(ObjectType),
    StringList,
    /// Passed through verbatim.
    Json,
}

impl ParamKind {
    pub fn object_type(self) -> Option<ObjectType> {
        match self {
            ParamKind::Id(t) | ParamKind::Ids(t) | ParamKind::Uris(t) | ParamKind::UriObjects(t) => {
                Some(t)
            }
            _ => None,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            ParamKind::Ids(_) | ParamKind::Uris(_) | ParamKind::UriObjects(_) | ParamKind::StringList
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub location: Location,
    pub required: bool,
}

macro_rules! param {
    ($location:ident, $name:literal, $kind:expr) => {
        ParamSpec { name: $name, kind: $kind, location: Location::$location, required: false }
    };
    ($location:ident, $name:literal, $kind:expr, required) => {
        ParamSpec { name: $name, kind: $kind, location: Location::$location, required: true }
    };
}

macro_rules! path {
    ($name:literal, $kind:expr) => {
        param!(Path, $name, $kind, required)
    };
}

macro_rules! query {
    ($($args:tt)*) => {
        param!(Query, $($args)*)
    };
}

macro_rules! body {
    ($($args:tt)*) => {
        param!(Body, $($args)*)
    };
}

const LIMIT: ParamSpec = query!("limit", ParamKind::Integer);
const OFFSET: ParamSpec = query!("offset", ParamKind::Integer);
const MARKET: ParamSpec = query!("market", ParamKind::String);
const COUNTRY: ParamSpec = query!("country", ParamKind::String);
const LOCALE: ParamSpec = query!("locale", ParamKind::String);
const SNAPSHOT_ID: ParamSpec = body!("snapshot_id", ParamKind::String);
const TIME_RANGE: ParamSpec = query!("time_range", ParamKind::String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    None,
    /// `limit`/`offset` pages carrying a `total`.
    Offset { max_limit: u32 },
    /// Pages linked through their `next` URL.
    Cursor { max_limit: u32 },
}

/// What an aggregated batch result collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    /// A list under this top-level key, e.g. `{"tracks": [...]}`.
    Field(&'static str),
    /// The response itself is a JSON array.
    Array,
    /// No list in the response (write operations).
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSpec {
    /// The list parameter split into chunks.
    pub param: &'static str,
    pub max_size: usize,
    pub collect: Collect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub name: &'static str,
    pub verb: Verb,
    /// Path template with `{param}` placeholders.
    pub path: &'static str,
    pub params: &'static [ParamSpec],
    /// Query pairs always sent.
    pub fixed_query: &'static [(&'static str, &'static str)],
    pub pagination: Pagination,
    pub batch: Option<BatchSpec>,
    /// Accept undeclared scalar parameters as extra query pairs.
    pub open_query: bool,
}

impl EndpointDescriptor {
    const fn new(name: &'static str, verb: Verb, path: &'static str, params: &'static [ParamSpec]) -> Self {
        Self {
            name,
            verb,
            path,
            params,
            fixed_query: &[],
            pagination: Pagination::None,
            batch: None,
            open_query: false,
        }
    }

    const fn offset(self, max_limit: u32) -> Self {
        Self { pagination: Pagination::Offset { max_limit }, ..self }
    }

    const fn cursor(self, max_limit: u32) -> Self {
        Self { pagination: Pagination::Cursor { max_limit }, ..self }
    }

    const fn batch(self, param: &'static str, max_size: usize, collect: Collect) -> Self {
        Self { batch: Some(BatchSpec { param, max_size, collect }), ..self }
    }

    const fn fixed(self, fixed_query: &'static [(&'static str, &'static str)]) -> Self {
        Self { fixed_query, ..self }
    }

    const fn open_query(self) -> Self {
        Self { open_query: true, ..self }
    }

    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|spec| spec.name == name)
    }

    /// Whether `all` can be used on this endpoint.
    pub fn supports_all(&self) -> bool {
        self.batch.is_some() || self.pagination != Pagination::None
    }
}

macro_rules! endpoint_table {
    ($($id:ident => $descriptor:expr,)+) => {
        /// Typed accessor for every declared endpoint.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EndpointId {
            $($id,)+
        }

        impl EndpointId {
            pub const ALL: &'static [EndpointId] = &[$(EndpointId::$id,)+];

            pub fn descriptor(self) -> &'static EndpointDescriptor {
                match self {
                    $(EndpointId::$id => {
                        static DESCRIPTOR: EndpointDescriptor = $descriptor;
                        &DESCRIPTOR
                    })+
                }
            }
        }
    };
}

use ObjectType::{Album, Artist, Playlist, Track, User};
use ParamKind::{Boolean, Id, Ids, Integer, Json, StringList, UriObjects, Uris};
use Verb::{Delete, Get, Post, Put};

endpoint_table! {
    Track => EndpointDescriptor::new("track", Get, "/tracks/{id}", &[path!("id", Id(Track)), MARKET]),
    Tracks => EndpointDescriptor::new("tracks", Get, "/tracks", &[query!("ids", Ids(Track), required), MARKET])
        .batch("ids", 50, Collect::Field("tracks")),
    Artist => EndpointDescriptor::new("artist", Get, "/artists/{id}", &[path!("id", Id(Artist))]),
    Artists => EndpointDescriptor::new("artists", Get, "/artists", &[query!("ids", Ids(Artist), required)])
        .batch("ids", 50, Collect::Field("artists")),
    ArtistAlbums => EndpointDescriptor::new(
        "artist_albums",
        Get,
        "/artists/{id}/albums",
        &[path!("id", Id(Artist)), query!("include_groups", ParamKind::String), COUNTRY, MARKET, LIMIT, OFFSET],
    )
    .offset(50),
    ArtistTopTracks => EndpointDescriptor::new(
        "artist_top_tracks",
        Get,
        "/artists/{id}/top-tracks",
        &[path!("id", Id(Artist)), query!("country", ParamKind::String, required)],
    ),
    ArtistRelatedArtists => EndpointDescriptor::new(
        "artist_related_artists",
        Get,
        "/artists/{id}/related-artists",
        &[path!("id", Id(Artist))],
    ),
    Album => EndpointDescriptor::new("album", Get, "/albums/{id}", &[path!("id", Id(Album)), MARKET]),
    AlbumTracks => EndpointDescriptor::new(
        "album_tracks",
        Get,
        "/albums/{id}/tracks",
        &[path!("id", Id(Album)), MARKET, LIMIT, OFFSET],
    )
    .offset(50),
    Albums => EndpointDescriptor::new("albums", Get, "/albums", &[query!("ids", Ids(Album), required), MARKET])
        .batch("ids", 20, Collect::Field("albums")),
    Search => EndpointDescriptor::new(
        "search",
        Get,
        "/search",
        &[query!("q", ParamKind::String, required), query!("type", ParamKind::String, required), MARKET, LIMIT, OFFSET],
    )
    .offset(50),
    User => EndpointDescriptor::new("user", Get, "/users/{user_id}", &[path!("user_id", Id(User))]),
    Me => EndpointDescriptor::new("me", Get, "/me", &[]),
    CurrentUserPlaylists => EndpointDescriptor::new("current_user_playlists", Get, "/me/playlists", &[LIMIT, OFFSET])
        .offset(50),
    UserPlaylists => EndpointDescriptor::new(
        "user_playlists",
        Get,
        "/users/{user_id}/playlists",
        &[path!("user_id", Id(User)), LIMIT, OFFSET],
    )
    .offset(50),
    Playlist => EndpointDescriptor::new(
        "playlist",
        Get,
        "/playlists/{playlist_id}",
        &[path!("playlist_id", Id(Playlist)), query!("fields", ParamKind::String), MARKET],
    ),
    PlaylistTracks => EndpointDescriptor::new(
        "playlist_tracks",
        Get,
        "/playlists/{playlist_id}/tracks",
        &[path!("playlist_id", Id(Playlist)), query!("fields", ParamKind::String), MARKET, LIMIT, OFFSET],
    )
    .offset(100),
    PlaylistCreate => EndpointDescriptor::new(
        "playlist_create",
        Post,
        "/users/{user_id}/playlists",
        &[
            path!("user_id", Id(User)),
            body!("name", ParamKind::String, required),
            body!("public", Boolean),
            body!("collaborative", Boolean),
            body!("description", ParamKind::String),
        ],
    ),
    PlaylistChangeDetails => EndpointDescriptor::new(
        "playlist_change_details",
        Put,
        "/playlists/{playlist_id}",
        &[
            path!("playlist_id", Id(Playlist)),
            body!("name", ParamKind::String),
            body!("public", Boolean),
            body!("collaborative", Boolean),
            body!("description", ParamKind::String),
        ],
    ),
    PlaylistUnfollow => EndpointDescriptor::new(
        "playlist_unfollow",
        Delete,
        "/playlists/{playlist_id}/followers",
        &[path!("playlist_id", Id(Playlist))],
    ),
    PlaylistFollow => EndpointDescriptor::new(
        "playlist_follow",
        Put,
        "/playlists/{playlist_id}/followers",
        &[path!("playlist_id", Id(Playlist)), body!("public", Boolean)],
    ),
    PlaylistFollowersContains => EndpointDescriptor::new(
        "playlist_followers_contains",
        Get,
        "/playlists/{playlist_id}/followers/contains",
        &[path!("playlist_id", Id(Playlist)), query!("ids", Ids(User), required)],
    )
    .batch("ids", 5, Collect::Array),
    PlaylistAddTracks => EndpointDescriptor::new(
        "playlist_add_tracks",
        Post,
        "/playlists/{playlist_id}/tracks",
        &[path!("playlist_id", Id(Playlist)), body!("uris", Uris(Track), required), body!("position", Integer)],
    )
    .batch("uris", 100, Collect::Nothing),
    PlaylistReplaceTracks => EndpointDescriptor::new(
        "playlist_replace_tracks",
        Put,
        "/playlists/{playlist_id}/tracks",
        &[path!("playlist_id", Id(Playlist)), body!("uris", Uris(Track), required)],
    ),
    PlaylistReorderTracks => EndpointDescriptor::new(
        "playlist_reorder_tracks",
        Put,
        "/playlists/{playlist_id}/tracks",
        &[
            path!("playlist_id", Id(Playlist)),
            body!("range_start", Integer, required),
            body!("insert_before", Integer, required),
            body!("range_length", Integer),
            SNAPSHOT_ID,
        ],
    ),
    PlaylistRemoveTracks => EndpointDescriptor::new(
        "playlist_remove_tracks",
        Delete,
        "/playlists/{playlist_id}/tracks",
        &[path!("playlist_id", Id(Playlist)), body!("tracks", UriObjects(Track), required), SNAPSHOT_ID],
    )
    .batch("tracks", 100, Collect::Nothing),
    PlaylistRemoveSpecificOccurrences => EndpointDescriptor::new(
        "playlist_remove_specific_occurrences",
        Delete,
        "/playlists/{playlist_id}/tracks",
        &[path!("playlist_id", Id(Playlist)), body!("tracks", Json, required), SNAPSHOT_ID],
    ),
    CurrentUserSavedAlbums => EndpointDescriptor::new("current_user_saved_albums", Get, "/me/albums", &[MARKET, LIMIT, OFFSET])
        .offset(50),
    CurrentUserSavedAlbumsAdd => EndpointDescriptor::new(
        "current_user_saved_albums_add",
        Put,
        "/me/albums",
        &[query!("ids", Ids(Album), required)],
    )
    .batch("ids", 20, Collect::Nothing),
    CurrentUserSavedTracks => EndpointDescriptor::new("current_user_saved_tracks", Get, "/me/tracks", &[MARKET, LIMIT, OFFSET])
        .offset(50),
    CurrentUserSavedTracksAdd => EndpointDescriptor::new(
        "current_user_saved_tracks_add",
        Put,
        "/me/tracks",
        &[query!("ids", Ids(Track), required)],
    )
    .batch("ids", 50, Collect::Nothing),
    CurrentUserSavedTracksDelete => EndpointDescriptor::new(
        "current_user_saved_tracks_delete",
        Delete,
        "/me/tracks",
        &[query!("ids", Ids(Track), required)],
    )
    .batch("ids", 50, Collect::Nothing),
    CurrentUserSavedTracksContains => EndpointDescriptor::new(
        "current_user_saved_tracks_contains",
        Get,
        "/me/tracks/contains",
        &[query!("ids", Ids(Track), required)],
    )
    .batch("ids", 50, Collect::Array),
    CurrentUserFollowedArtists => EndpointDescriptor::new(
        "current_user_followed_artists",
        Get,
        "/me/following",
        &[LIMIT, query!("after", ParamKind::String)],
    )
    .fixed(&[("type", "artist")])
    .cursor(50),
    CurrentUserTopArtists => EndpointDescriptor::new(
        "current_user_top_artists",
        Get,
        "/me/top/artists",
        &[TIME_RANGE, LIMIT, OFFSET],
    )
    .offset(50),
    CurrentUserTopTracks => EndpointDescriptor::new(
        "current_user_top_tracks",
        Get,
        "/me/top/tracks",
        &[TIME_RANGE, LIMIT, OFFSET],
    )
    .offset(50),
    CurrentUserRecentlyPlayed => EndpointDescriptor::new(
        "current_user_recently_played",
        Get,
        "/me/player/recently-played",
        &[query!("after", Integer), query!("before", Integer), LIMIT],
    )
    .cursor(50),
    FeaturedPlaylists => EndpointDescriptor::new(
        "featured_playlists",
        Get,
        "/browse/featured-playlists",
        &[LOCALE, COUNTRY, query!("timestamp", ParamKind::String), LIMIT, OFFSET],
    )
    .offset(50),
    NewReleases => EndpointDescriptor::new("new_releases", Get, "/browse/new-releases", &[COUNTRY, LIMIT, OFFSET])
        .offset(50),
    Categories => EndpointDescriptor::new("categories", Get, "/browse/categories", &[COUNTRY, LOCALE, LIMIT, OFFSET])
        .offset(50),
    CategoryPlaylists => EndpointDescriptor::new(
        "category_playlists",
        Get,
        "/browse/categories/{category_id}/playlists",
        &[path!("category_id", ParamKind::String), COUNTRY, LIMIT, OFFSET],
    )
    .offset(50),
    Recommendations => EndpointDescriptor::new(
        "recommendations",
        Get,
        "/recommendations",
        &[
            query!("seed_artists", Ids(Artist)),
            query!("seed_genres", StringList),
            query!("seed_tracks", Ids(Track)),
            MARKET,
            LIMIT,
        ],
    )
    .open_query(),
    ArtistRecommendations => EndpointDescriptor::new(
        "artist_recommendations",
        Get,
        "/recommendations",
        &[query!("seed_artists", Ids(Artist), required), MARKET, LIMIT],
    )
    .batch("seed_artists", 5, Collect::Field("tracks"))
    .open_query(),
    RecommendationGenreSeeds => EndpointDescriptor::new(
        "recommendation_genre_seeds",
        Get,
        "/recommendations/available-genre-seeds",
        &[],
    ),
    AudioFeatures => EndpointDescriptor::new("audio_features", Get, "/audio-features", &[query!("ids", Ids(Track), required)])
        .batch("ids", 100, Collect::Field("audio_features")),
    AudioAnalysis => EndpointDescriptor::new("audio_analysis", Get, "/audio-analysis/{id}", &[path!("id", Id(Track))]),
}

impl EndpointId {
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EndpointId {
    type Err = ClientError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        EndpointId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == name)
            .ok_or_else(|| ClientError::validation(format!("unknown endpoint `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique_and_resolvable() {
        let mut seen = HashSet::new();
        for id in EndpointId::ALL {
            assert!(seen.insert(id.name()), "duplicate endpoint name {}", id.name());
            assert_eq!(id.name().parse::<EndpointId>().unwrap(), *id);
        }
        assert!("no_such_endpoint".parse::<EndpointId>().is_err());
    }

    #[test]
    fn test_path_placeholders_are_declared_path_params() {
        for id in EndpointId::ALL {
            let descriptor = id.descriptor();
            let mut rest = descriptor.path;
            while let Some(start) = rest.find('{') {
                let end = rest[start..].find('}').expect("unterminated placeholder") + start;
                let name = &rest[start + 1..end];
                let spec = descriptor
                    .param(name)
                    .unwrap_or_else(|| panic!("{}: undeclared placeholder {}", descriptor.name, name));
                assert_eq!(spec.location, Location::Path);
                rest = &rest[end + 1..];
            }
        }
    }

    #[test]
    fn test_capabilities_declare_their_params() {
        for id in EndpointId::ALL {
            let descriptor = id.descriptor();
            if let Some(batch) = descriptor.batch {
                let spec = descriptor.param(batch.param).expect("batch param declared");
                assert!(spec.kind.is_list(), "{}: batch param must be a list", descriptor.name);
                assert!(spec.kind.object_type().is_some());
                assert!(batch.max_size > 0);
            }
            match descriptor.pagination {
                Pagination::Offset { .. } => {
                    assert!(descriptor.param("limit").is_some(), "{}", descriptor.name);
                    assert!(descriptor.param("offset").is_some(), "{}", descriptor.name);
                }
                Pagination::Cursor { .. } => {
                    assert!(descriptor.param("limit").is_some(), "{}", descriptor.name);
                }
                Pagination::None => {}
            }
        }
    }

    #[test]
    fn test_supports_all() {
        assert!(EndpointId::Tracks.descriptor().supports_all());
        assert!(EndpointId::CurrentUserSavedTracks.descriptor().supports_all());
        assert!(EndpointId::CurrentUserFollowedArtists.descriptor().supports_all());
        assert!(!EndpointId::Track.descriptor().supports_all());
        assert!(!EndpointId::Me.descriptor().supports_all());
    }
}
