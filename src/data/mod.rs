//! Data access layer for notes and todos.
//!
//! Each operation takes the caller's [`SessionContext`] and performs one
//! document-store call (or one atomic read-modify-write) in that user's
//! partition. Failures are returned as typed [`AppError`]s.

mod clock;
mod notes;
mod subscription;
mod todos;

pub use clock::Clock;
pub use subscription::SubscriptionHandle;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::db::{
    decode_document, encode_document, CollectionPath, Document, DocumentMutation, DocumentStore,
    OrderBy,
};
use crate::errors::AppError;
use crate::models::{timestamp, Item, ItemKind, UserProfile};
use crate::session::SessionContext;

/// Field every listing is ordered by, newest first.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Entry point for every note and todo operation.
#[derive(Clone)]
pub struct DataAccess {
    store: Arc<dyn DocumentStore>,
    clock: Arc<Clock>,
}

impl DataAccess {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            clock: Arc::new(Clock::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn collection(ctx: &SessionContext, kind: ItemKind) -> CollectionPath {
        CollectionPath::for_user(&ctx.user_id, kind)
    }

    /// Set the update timestamp of a note or todo to now.
    ///
    /// Content updates leave the timestamp alone; callers touch it when the
    /// edit should move the item to the top of the feed.
    pub async fn touch_updated_at(
        &self,
        ctx: &SessionContext,
        kind: ItemKind,
        id: &str,
    ) -> Result<DateTime<Utc>, AppError> {
        let clock = self.clock.clone();
        let mutation: DocumentMutation = Box::new(move |doc: &mut Document| {
            let now = clock.now();
            doc.insert(
                UPDATED_AT_FIELD.to_string(),
                Value::String(timestamp::format(&now)),
            );
            Ok(())
        });

        let data = self
            .store
            .modify(&Self::collection(ctx, kind), id, mutation)
            .await?;

        data.get(UPDATED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|raw| timestamp::parse(raw).ok())
            .ok_or_else(|| AppError::Internal(format!("{} {} lost its timestamp", kind.label(), id)))
    }

    /// Delete a note or todo. Deleting a missing item succeeds.
    pub async fn delete(
        &self,
        ctx: &SessionContext,
        kind: ItemKind,
        id: &str,
    ) -> Result<(), AppError> {
        self.store.delete(&Self::collection(ctx, kind), id).await
    }

    /// Notes and todos together, newest update first.
    pub async fn list_items(&self, ctx: &SessionContext) -> Result<Vec<Item>, AppError> {
        let notes = self.list_notes(ctx).await?;
        let todos = self.list_todos(ctx).await?;

        let mut items: Vec<Item> = notes
            .into_iter()
            .map(Item::Note)
            .chain(todos.into_iter().map(Item::Todo))
            .collect();
        items.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(items)
    }

    /// Store the profile document at `users/{uid}`.
    pub async fn save_profile(
        &self,
        ctx: &SessionContext,
        profile: &UserProfile,
    ) -> Result<(), AppError> {
        self.store
            .set(
                &CollectionPath::users(),
                ctx.user_id.as_str(),
                encode_document(profile)?,
            )
            .await
    }

    pub async fn get_profile(&self, ctx: &SessionContext) -> Result<Option<UserProfile>, AppError> {
        self.store
            .get(&CollectionPath::users(), ctx.user_id.as_str())
            .await?
            .map(decode_document)
            .transpose()
    }

    /// Profile picture URL, if the identity provider supplied one.
    pub async fn user_pic_url(&self, ctx: &SessionContext) -> Result<Option<String>, AppError> {
        Ok(self
            .get_profile(ctx)
            .await?
            .and_then(|p| p.user_pic_url)
            .filter(|url| !url.is_empty()))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        ctx: &SessionContext,
        kind: ItemKind,
    ) -> Result<Vec<T>, AppError> {
        load_collection(self.store.as_ref(), &Self::collection(ctx, kind)).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        ctx: &SessionContext,
        kind: ItemKind,
        id: &str,
    ) -> Result<Option<T>, AppError> {
        self.store
            .get(&Self::collection(ctx, kind), id)
            .await?
            .map(decode_document)
            .transpose()
    }
}

/// One query snapshot of a collection, newest update first.
pub(crate) async fn load_collection<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &CollectionPath,
) -> Result<Vec<T>, AppError> {
    store
        .query(collection, &OrderBy::desc(UPDATED_AT_FIELD))
        .await?
        .into_iter()
        .map(decode_document)
        .collect()
}
