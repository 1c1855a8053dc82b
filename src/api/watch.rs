//! Server-sent event streams of live collection snapshots.
//!
//! Each snapshot is the whole collection, so a client that falls behind only
//! needs the newest one: the listener overwrites a single watch slot instead
//! of queueing.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt as _};

use super::session_for;
use crate::data::SubscriptionHandle;
use crate::errors::AppError;
use crate::models::{Note, Todo};
use crate::AppState;

/// GET /api/users/{uid}/notes/watch - One `notes` event per snapshot.
pub async fn watch_notes(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let ctx = session_for(uid)?;
    let (publish, rx) = latest_snapshot::<Note>();
    let handle = state.data.subscribe_notes_for(ctx, publish);

    Ok(sse_response("notes", rx, handle))
}

/// GET /api/users/{uid}/todos/watch - One `todos` event per snapshot.
pub async fn watch_todos(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let ctx = session_for(uid)?;
    let (publish, rx) = latest_snapshot::<Todo>();
    let handle = state.data.subscribe_todos_for(ctx, publish);

    Ok(sse_response("todos", rx, handle))
}

type SnapshotSlot<T> = watch::Receiver<Option<Vec<T>>>;

/// A subscription callback that keeps only the most recent snapshot.
fn latest_snapshot<T>() -> (impl Fn(Vec<T>) + Send + Sync + 'static, SnapshotSlot<T>)
where
    T: Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(None);
    let publish = move |snapshot: Vec<T>| {
        tx.send_replace(Some(snapshot));
    };
    (publish, rx)
}

/// Snapshots as they become current; intermediate ones a slow reader missed
/// are skipped.
fn snapshots<T>(rx: SnapshotSlot<T>) -> impl Stream<Item = Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    WatchStream::new(rx).filter_map(|slot| slot)
}

/// The stream owns the subscription, so the listener stops when the client
/// disconnects and axum drops the stream.
fn sse_response<T>(
    event_type: &'static str,
    rx: SnapshotSlot<T>,
    handle: SubscriptionHandle,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let stream = snapshots(rx).filter_map(move |snapshot| {
        let _subscription = &handle;
        match serde_json::to_string(&snapshot) {
            Ok(json) => Some(Ok(Event::default().event(event_type).data(json))),
            Err(e) => {
                tracing::warn!(event_type, "Failed to encode snapshot: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;
    use crate::data::test_support::{data_access, session};

    #[tokio::test]
    async fn test_stalled_reader_holds_only_latest_snapshot() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");

        let (publish, mut rx) = latest_snapshot::<Note>();
        let _handle = data.subscribe_notes_for(ctx.clone(), publish);

        for i in 0..50 {
            data.create_note(&ctx, &format!("note {}", i), "")
                .await
                .unwrap();
        }
        // Let the listener catch up with every write while nobody reads.
        while let Ok(changed) =
            tokio::time::timeout(Duration::from_millis(300), rx.changed()).await
        {
            changed.unwrap();
        }
        assert_eq!(rx.borrow().as_ref().map(Vec::len), Some(50));

        // Nothing queued behind the newest snapshot.
        let mut stream = Box::pin(snapshots(rx));
        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 50);
        let pending = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
        assert!(pending.is_err(), "stale snapshots were buffered");
    }

    #[tokio::test]
    async fn test_reader_sees_each_new_snapshot() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");

        let (publish, rx) = latest_snapshot::<Note>();
        let _handle = data.subscribe_notes_for(ctx.clone(), publish);
        let mut stream = Box::pin(snapshots(rx));

        let initial = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert!(initial.is_empty());

        data.create_note(&ctx, "live", "").await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].title, "live");
    }
}
