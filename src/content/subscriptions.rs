/// Channel subscriptions
use crate::{
    content::fetch,
    db::{
        models::{from_document, to_document, Account},
        Collection, Document, DocumentStore, Filter, ObjectId, Toggled,
    },
    error::{ApiError, ApiResult},
    view::{Join, SubscribedChannelView, SubscriberView, ViewComposer, ViewQuery},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Subscription state after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub subscribed: bool,
}

pub struct SubscriptionManager {
    store: Arc<dyn DocumentStore>,
    views: Arc<ViewComposer>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn DocumentStore>, views: Arc<ViewComposer>) -> Self {
        Self { store, views }
    }

    /// Subscribe to a channel, or unsubscribe if already subscribed
    pub async fn toggle(&self, caller: &ObjectId, raw_channel_id: &str) -> ApiResult<SubscriptionState> {
        let channel_id = ObjectId::parse_param(raw_channel_id, "channel")?;
        if channel_id == *caller {
            return Err(ApiError::InvalidInput("You cannot subscribe to your own channel".to_string()));
        }

        fetch::<Account>(self.store.as_ref(), Collection::Users, &channel_id, "Channel").await?;

        let existing = Filter::all_of(vec![
            Filter::eq("subscriber", *caller),
            Filter::eq("channel", channel_id),
        ]);
        let record = to_document(&json!({ "subscriber": caller, "channel": channel_id }))?;

        let subscribed = match self.store.toggle_one(Collection::Subscriptions, &existing, record).await? {
            Toggled::Inserted(_) => true,
            Toggled::Deleted(_) => false,
        };

        tracing::info!(subscriber = %caller, channel = %channel_id, subscribed, "Subscription toggled");
        Ok(SubscriptionState { subscribed })
    }

    /// Accounts subscribed to a channel, newest first
    pub async fn subscribers(&self, raw_channel_id: &str) -> ApiResult<Vec<SubscriberView>> {
        let channel_id = ObjectId::parse_param(raw_channel_id, "channel")?;
        fetch::<Account>(self.store.as_ref(), Collection::Users, &channel_id, "Channel").await?;

        self.list(Filter::eq("channel", channel_id), "subscriber").await
    }

    /// Channels an account subscribes to, newest first
    pub async fn subscribed_channels(&self, raw_subscriber_id: &str) -> ApiResult<Vec<SubscribedChannelView>> {
        let subscriber_id = ObjectId::parse_param(raw_subscriber_id, "subscriber")?;
        fetch::<Account>(self.store.as_ref(), Collection::Users, &subscriber_id, "User").await?;

        self.list(Filter::eq("subscriber", subscriber_id), "channel").await
    }

    /// Subscriptions matching `filter` with `side` replaced by that account's
    /// public profile; records whose account is gone are skipped
    async fn list<T: DeserializeOwned>(&self, filter: Filter, side: &str) -> ApiResult<Vec<T>> {
        let query = ViewQuery::new(Collection::Subscriptions, filter).newest_first();
        let docs = self.views.compose(&query, &[Join::owner(side)]).await?;

        docs.into_iter()
            .filter(|doc: &Document| doc.get(side).is_some_and(|v| v.is_object()))
            .map(|doc| from_document(doc).map_err(ApiError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::testing::{account, memory_store, CountingStore};

    fn manager(store: &Arc<dyn DocumentStore>) -> SubscriptionManager {
        SubscriptionManager::new(Arc::clone(store), Arc::new(ViewComposer::new(Arc::clone(store))))
    }

    #[tokio::test]
    async fn test_toggle_and_list_both_sides() {
        let store = memory_store().await;
        let subs = manager(&store);
        let ana = account(&store, "ana").await;
        let bob = account(&store, "bob").await;
        let cat = account(&store, "cat").await;

        assert!(subs.toggle(&bob.id, &ana.id.to_hex()).await.unwrap().subscribed);
        assert!(subs.toggle(&cat.id, &ana.id.to_hex()).await.unwrap().subscribed);
        assert!(subs.toggle(&bob.id, &cat.id.to_hex()).await.unwrap().subscribed);

        let of_ana = subs.subscribers(&ana.id.to_hex()).await.unwrap();
        let names: Vec<_> = of_ana.iter().map(|s| s.subscriber.username.as_str()).collect();
        assert_eq!(names, vec!["cat", "bob"]);

        let of_bob = subs.subscribed_channels(&bob.id.to_hex()).await.unwrap();
        let names: Vec<_> = of_bob.iter().map(|s| s.channel.username.as_str()).collect();
        assert_eq!(names, vec!["cat", "ana"]);

        assert!(!subs.toggle(&bob.id, &ana.id.to_hex()).await.unwrap().subscribed);
        assert_eq!(subs.subscribers(&ana.id.to_hex()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_must_exist() {
        let store = memory_store().await;
        let subs = manager(&store);
        let ana = account(&store, "ana").await;

        let ghost = ObjectId::new().to_hex();
        assert!(matches!(subs.toggle(&ana.id, &ghost).await, Err(ApiError::NotFound(_))));
        assert!(matches!(subs.subscribers(&ghost).await, Err(ApiError::NotFound(_))));
        assert!(matches!(
            subs.toggle(&ana.id, &ana.id.to_hex()).await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_subscriber_is_skipped() {
        let store = memory_store().await;
        let subs = manager(&store);
        let ana = account(&store, "ana").await;
        let bob = account(&store, "bob").await;

        subs.toggle(&bob.id, &ana.id.to_hex()).await.unwrap();
        store.delete_by_id(Collection::Users, &bob.id).await.unwrap();

        assert!(subs.subscribers(&ana.id.to_hex()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_ids_never_reach_the_store() {
        let counting = Arc::new(CountingStore::default());
        let store: Arc<dyn DocumentStore> = counting.clone();
        let subs = manager(&store);

        assert!(matches!(
            subs.toggle(&ObjectId::new(), "abc").await,
            Err(ApiError::InvalidId("channel"))
        ));
        assert!(matches!(subs.subscribers("").await, Err(ApiError::InvalidId("channel"))));
        assert!(matches!(
            subs.subscribed_channels("0123").await,
            Err(ApiError::InvalidId("subscriber"))
        ));
        assert_eq!(counting.calls(), 0);
    }
}
