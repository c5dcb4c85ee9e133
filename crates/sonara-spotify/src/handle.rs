// SPDX-License-Identifier: GPL-3.0-or-later

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{ClientError, Result};
use crate::ids::find_item;

type Outcome = Result<Value>;

/// A call that is in flight or already finished.
///
/// The work starts as soon as the handle is created. Awaiting [`fetch`]
/// resolves it once; every later fetch, from any clone of the handle,
/// reads the cached outcome. Dropping the handle does not cancel the work.
///
/// [`fetch`]: RequestHandle::fetch
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: &'static str,
    task: Mutex<Option<JoinHandle<Outcome>>>,
    outcome: OnceCell<Outcome>,
}

impl RequestHandle {
    /// Run `work` on the runtime and return a handle to its outcome.
    pub(crate) fn spawn<F>(endpoint: &'static str, work: F) -> Self
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                task: Mutex::new(Some(tokio::spawn(work))),
                outcome: OnceCell::new(),
            }),
        }
    }

    /// A handle that is already resolved to `value`.
    pub fn ready(endpoint: &'static str, value: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                task: Mutex::new(None),
                outcome: OnceCell::new_with(Some(Ok(value))),
            }),
        }
    }

    pub fn endpoint(&self) -> &'static str {
        self.inner.endpoint
    }

    /// Whether `fetch` would return without waiting on I/O.
    pub fn is_finished(&self) -> bool {
        if self.inner.outcome.initialized() {
            return true;
        }
        match self.inner.task.try_lock() {
            Ok(task) => task.as_ref().map_or(true, JoinHandle::is_finished),
            Err(_) => false,
        }
    }

    async fn resolve(&self) -> &Outcome {
        self.inner
            .outcome
            .get_or_init(|| async {
                let mut task = self.inner.task.lock().await;
                let outcome = match task.as_mut() {
                    Some(join) => match join.await {
                        Ok(outcome) => outcome,
                        Err(e) => Err(ClientError::TaskFailed(e.to_string())),
                    },
                    None => Err(ClientError::TaskFailed("request already consumed".to_string())),
                };
                task.take();
                trace!(target: "spotify", endpoint = self.inner.endpoint, ok = outcome.is_ok(), "request resolved");
                outcome
            })
            .await
    }

    /// The whole result, or the value under `field`.
    ///
    /// `field` is looked up depth-first through nested objects, so
    /// `fetch("items")` also finds the items of a search result's nested
    /// paging object.
    pub async fn fetch<'f>(&self, field: impl Into<Option<&'f str>>) -> Result<Value> {
        let field = field.into();
        let value = self.resolve().await.clone()?;
        match field {
            None => Ok(value),
            Some(name) => find_item(name, &value)
                .cloned()
                .ok_or_else(|| ClientError::MissingField(name.to_string())),
        }
    }

    pub async fn fetch_as<'f, T: DeserializeOwned>(
        &self,
        field: impl Into<Option<&'f str>>,
    ) -> Result<T> {
        let value = self.fetch(field).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("endpoint", &self.inner.endpoint)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_handle_is_finished() {
        let handle = RequestHandle::ready("tracks", json!({"tracks": []}));
        assert!(handle.is_finished());
        assert_eq!(handle.fetch("tracks").await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_work_runs_once_across_clones() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = RequestHandle::spawn("me", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(json!({"id": "me", "display_name": "Me"}))
        });

        let other = handle.clone();
        let (a, b) = tokio::join!(handle.fetch(None), other.fetch("id"));
        assert_eq!(a.unwrap()["display_name"], "Me");
        assert_eq!(b.unwrap(), json!("me"));
        assert_eq!(handle.fetch("id").await.unwrap(), json!("me"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_error_is_cached() {
        let handle = RequestHandle::spawn("track", async {
            Err(ClientError::Remote {
                endpoint: "track".to_string(),
                status: 404,
                message: "non existing id".to_string(),
            })
        });

        for _ in 0..2 {
            match handle.fetch(None).await {
                Err(ClientError::Remote { status, .. }) => assert_eq!(status, 404),
                other => panic!("expected remote error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_field() {
        let handle = RequestHandle::ready("me", json!({"id": "u"}));
        assert!(matches!(
            handle.fetch("email").await,
            Err(ClientError::MissingField(name)) if name == "email"
        ));
    }

    #[tokio::test]
    async fn test_fetch_as_deserializes() {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }

        let handle = RequestHandle::ready("artist", json!({"name": "Eels", "popularity": 60}));
        let artist: Named = handle.fetch_as(None).await.unwrap();
        assert_eq!(artist.name, "Eels");
    }
}
