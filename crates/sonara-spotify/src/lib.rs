// SPDX-License-Identifier: GPL-3.0-or-later

//! Asynchronous Spotify Web API client.
//!
//! Every operation of the Web API is declared once in a static endpoint
//! table. Calls run concurrently on the tokio runtime and hand back a
//! [`RequestHandle`] right away. [`Endpoint::all`] collects a whole paginated
//! listing, or an arbitrarily long ID list split into API-sized chunks, into
//! one merged result.

pub mod auth;
pub mod client;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod handle;
pub mod ids;
pub mod merge;
pub mod models;
pub mod params;
mod throttle;
pub mod transport;

pub use auth::{AuthorizationCode, ClientCredentials, Credentials, StaticToken, TokenProvider};
pub use client::{Endpoint, SpotifyClient, SpotifyClientBuilder};
pub use dispatch::AllOptions;
pub use endpoint::{EndpointDescriptor, EndpointId};
pub use error::{AuthError, BatchUnit, ClientError, Result, TransportError};
pub use handle::RequestHandle;
pub use ids::{ItemRef, ObjectType};
pub use params::{ParamValue, Params};
pub use transport::{ApiRequest, HttpTransport, RetryPolicy, Transport, TransportResponse, Verb};
