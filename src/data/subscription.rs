//! Live collection listeners.
//!
//! A listener pushes the complete current collection once on registration and
//! again after every committed write to that collection. It follows a session
//! channel: while signed out it stays silent, and when the identity changes it
//! moves to the new user's partition.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;

use super::{load_collection, DataAccess};
use crate::db::{CollectionPath, DocumentStore};
use crate::models::{ItemKind, Note, Todo};
use crate::session::SessionContext;

/// Owns a running listener. Dropping the handle stops it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop the listener. No callback runs after this returns.
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl DataAccess {
    /// Listen to the notes of whoever `sessions` says is signed in.
    pub fn subscribe_notes<F>(
        &self,
        sessions: watch::Receiver<Option<SessionContext>>,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(Vec<Note>) + Send + Sync + 'static,
    {
        self.spawn_listener(ItemKind::Note, sessions, callback)
    }

    /// Listen to the todos of whoever `sessions` says is signed in.
    pub fn subscribe_todos<F>(
        &self,
        sessions: watch::Receiver<Option<SessionContext>>,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(Vec<Todo>) + Send + Sync + 'static,
    {
        self.spawn_listener(ItemKind::Todo, sessions, callback)
    }

    /// Listen to one fixed user's notes.
    pub fn subscribe_notes_for<F>(&self, ctx: SessionContext, callback: F) -> SubscriptionHandle
    where
        F: Fn(Vec<Note>) + Send + Sync + 'static,
    {
        let (_tx, sessions) = watch::channel(Some(ctx));
        self.subscribe_notes(sessions, callback)
    }

    /// Listen to one fixed user's todos.
    pub fn subscribe_todos_for<F>(&self, ctx: SessionContext, callback: F) -> SubscriptionHandle
    where
        F: Fn(Vec<Todo>) + Send + Sync + 'static,
    {
        let (_tx, sessions) = watch::channel(Some(ctx));
        self.subscribe_todos(sessions, callback)
    }

    fn spawn_listener<T, F>(
        &self,
        kind: ItemKind,
        sessions: watch::Receiver<Option<SessionContext>>,
        callback: F,
    ) -> SubscriptionHandle
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        let store = self.store.clone();
        let task = tokio::spawn(run_listener(store, kind, sessions, callback));
        SubscriptionHandle { task }
    }
}

async fn run_listener<T, F>(
    store: Arc<dyn DocumentStore>,
    kind: ItemKind,
    mut sessions: watch::Receiver<Option<SessionContext>>,
    callback: F,
) where
    T: DeserializeOwned + Send + 'static,
    F: Fn(Vec<T>) + Send + Sync + 'static,
{
    // Once the sender is gone the session can no longer change.
    let mut sessions_open = true;
    let mut current = sessions.borrow_and_update().clone();

    loop {
        let Some(ctx) = current.clone() else {
            if !sessions_open || sessions.changed().await.is_err() {
                return;
            }
            current = sessions.borrow_and_update().clone();
            continue;
        };

        let path = CollectionPath::for_user(&ctx.user_id, kind);
        // Subscribe before the first snapshot so no write falls in between.
        let mut feed = store.changes();
        push_snapshot(store.as_ref(), &path, &callback).await;

        loop {
            tokio::select! {
                changed = sessions.changed(), if sessions_open => {
                    if changed.is_err() {
                        sessions_open = false;
                        continue;
                    }
                    let next = sessions.borrow_and_update().clone();
                    if next != current {
                        tracing::debug!(collection = %path, "Session changed, re-subscribing");
                        current = next;
                        break;
                    }
                }
                event = feed.recv() => match event {
                    Ok(change) if change.collection == path.as_str() => {
                        push_snapshot(store.as_ref(), &path, &callback).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(collection = %path, missed, "Listener lagged, resending snapshot");
                        push_snapshot(store.as_ref(), &path, &callback).await;
                    }
                    Err(RecvError::Closed) => return,
                },
            }
        }
    }
}

async fn push_snapshot<T, F>(store: &dyn DocumentStore, path: &CollectionPath, callback: &F)
where
    T: DeserializeOwned,
    F: Fn(Vec<T>),
{
    match load_collection::<T>(store, path).await {
        Ok(items) => callback(items),
        Err(e) => tracing::warn!(collection = %path, "Failed to load snapshot: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::data::test_support::{data_access, session};
    use crate::models::{ItemKind, Note, UpdateNoteRequest};

    async fn next(rx: &mut mpsc::UnboundedReceiver<Vec<Note>>) -> Vec<Note> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("listener stopped")
    }

    async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Vec<Note>>) {
        let waited = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(waited.is_err(), "unexpected snapshot");
    }

    #[tokio::test]
    async fn test_pushes_full_collection_on_every_change() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");
        let existing = data.create_note(&ctx, "existing", "").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = data.subscribe_notes_for(ctx.clone(), move |notes| {
            let _ = tx.send(notes);
        });

        let initial = next(&mut rx).await;
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].id, existing);

        let added = data.create_note(&ctx, "added", "").await.unwrap();
        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, added);

        data.update_note(
            &ctx,
            &existing,
            &UpdateNoteRequest {
                title: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|n| n.title == "renamed"));

        data.delete(&ctx, ItemKind::Note, &added).await.unwrap();
        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_ignores_other_collections() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = data.subscribe_notes_for(ctx.clone(), move |notes| {
            let _ = tx.send(notes);
        });
        assert!(next(&mut rx).await.is_empty());

        data.create_todo(&ctx, "todo", "x").await.unwrap();
        data.create_note(&session("someone-else"), "theirs", "")
            .await
            .unwrap();

        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_follows_session_resolution() {
        let (data, _dir) = data_access().await;
        let alice = session("alice");
        data.create_note(&alice, "alice's", "").await.unwrap();

        let (session_tx, session_rx) = tokio::sync::watch::channel(None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = data.subscribe_notes(session_rx, move |notes| {
            let _ = tx.send(notes);
        });

        // Signed out: nothing is pushed, not even a guest partition.
        data.create_note(&session("guest"), "guest", "").await.unwrap();
        assert_quiet(&mut rx).await;

        session_tx.send_replace(Some(alice.clone()));
        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "alice's");

        let bob = session("bob");
        data.create_note(&bob, "bob's", "").await.unwrap();
        session_tx.send_replace(Some(bob));
        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "bob's");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_callbacks() {
        let (data, _dir) = data_access().await;
        let ctx = session("u1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = data.subscribe_notes_for(ctx.clone(), move |notes| {
            let _ = tx.send(notes);
        });
        next(&mut rx).await;
        assert!(handle.is_active());

        handle.unsubscribe();
        data.create_note(&ctx, "after", "").await.unwrap();

        // The aborted task drops the callback, which closes the channel.
        let waited = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("channel should close");
        assert!(waited.is_none());
    }
}
