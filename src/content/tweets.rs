/// Short text posts
use crate::{
    auth::require_ownership,
    content::{fetch, required_text},
    db::{
        models::{from_document, to_document, Account, NewTweet, ReactionKind, Tweet},
        Collection, DocumentStore, Filter, ObjectId, UpdateOp,
    },
    error::{ApiError, ApiResult},
    view::{Join, PagePlan, TweetView, ViewComposer, ViewQuery},
};
use std::sync::Arc;

pub struct TweetManager {
    store: Arc<dyn DocumentStore>,
    views: Arc<ViewComposer>,
}

impl TweetManager {
    pub fn new(store: Arc<dyn DocumentStore>, views: Arc<ViewComposer>) -> Self {
        Self { store, views }
    }

    pub async fn create(&self, caller: &ObjectId, content: Option<&str>) -> ApiResult<Tweet> {
        let content = required_text(content, "Tweet content is required")?;

        let doc = to_document(&NewTweet { content, owner: *caller })?;
        let tweet: Tweet = from_document(self.store.create(Collection::Tweets, doc).await?)?;

        tracing::info!(tweet = %tweet.id, "Tweet created");
        Ok(tweet)
    }

    /// Newest-first tweets of one account
    pub async fn list_by_user(&self, raw_user_id: &str, page: PagePlan, viewer: Option<&ObjectId>) -> ApiResult<Vec<TweetView>> {
        let user_id = ObjectId::parse_param(raw_user_id, "user")?;
        fetch::<Account>(self.store.as_ref(), Collection::Users, &user_id, "User").await?;

        let query = ViewQuery::new(Collection::Tweets, Filter::eq("owner", user_id))
            .newest_first()
            .paged(page);

        let mut joins = vec![Join::owner("owner")];
        joins.extend(Join::reactions(ReactionKind::Tweet, viewer.copied()));

        self.views.compose_as(&query, &joins).await
    }

    pub async fn update(&self, caller: &ObjectId, raw_tweet_id: &str, content: Option<&str>) -> ApiResult<Tweet> {
        let tweet_id = ObjectId::parse_param(raw_tweet_id, "tweet")?;
        let content = required_text(content, "Tweet content is required")?;

        let tweet: Tweet = fetch(self.store.as_ref(), Collection::Tweets, &tweet_id, "Tweet").await?;
        require_ownership(&tweet.owner, caller, "edit this tweet")?;

        let updated = self
            .store
            .update_by_id(Collection::Tweets, &tweet_id, &[UpdateOp::set("content", content)])
            .await?
            .ok_or_else(|| ApiError::NotFound("Tweet not found".to_string()))?;

        Ok(from_document(updated)?)
    }

    pub async fn delete(&self, caller: &ObjectId, raw_tweet_id: &str) -> ApiResult<()> {
        let tweet_id = ObjectId::parse_param(raw_tweet_id, "tweet")?;

        let tweet: Tweet = fetch(self.store.as_ref(), Collection::Tweets, &tweet_id, "Tweet").await?;
        require_ownership(&tweet.owner, caller, "delete this tweet")?;

        self.store
            .delete_by_id(Collection::Tweets, &tweet_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Tweet not found".to_string()))?;
        self.store
            .delete_many(
                Collection::Likes,
                &Filter::all_of(vec![
                    Filter::eq("kind", ReactionKind::Tweet.as_str()),
                    Filter::eq("target", tweet_id),
                ]),
            )
            .await?;

        tracing::info!(tweet = %tweet_id, "Tweet deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::testing::{account, memory_store, CountingStore},
        view::normalize,
    };

    fn manager(store: &Arc<dyn DocumentStore>) -> TweetManager {
        TweetManager::new(Arc::clone(store), Arc::new(ViewComposer::new(Arc::clone(store))))
    }

    #[tokio::test]
    async fn test_create_and_list_newest_first() {
        let store = memory_store().await;
        let tweets = manager(&store);
        let ana = account(&store, "ana").await;
        let bob = account(&store, "bob").await;

        tweets.create(&ana.id, Some("one")).await.unwrap();
        tweets.create(&ana.id, Some("two")).await.unwrap();
        tweets.create(&bob.id, Some("other")).await.unwrap();

        let listed = tweets.list_by_user(&ana.id.to_hex(), normalize(None, None), None).await.unwrap();
        let contents: Vec<_> = listed.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "one"]);
        assert_eq!(listed[0].owner.as_ref().unwrap().full_name, "ANA");
        assert!(!listed[0].is_liked);

        let paged = tweets.list_by_user(&ana.id.to_hex(), normalize(Some("2"), Some("1")), None).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].content, "one");
    }

    #[tokio::test]
    async fn test_list_for_unknown_user() {
        let store = memory_store().await;
        let tweets = manager(&store);

        let result = tweets.list_by_user(&ObjectId::new().to_hex(), normalize(None, None), None).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert!(matches!(
            tweets.list_by_user("bogus", normalize(None, None), None).await,
            Err(ApiError::InvalidId("user"))
        ));
    }

    #[tokio::test]
    async fn test_owner_only_mutations() {
        let store = memory_store().await;
        let tweets = manager(&store);
        let ana = account(&store, "ana").await;
        let bob = account(&store, "bob").await;
        let tweet = tweets.create(&ana.id, Some("hello")).await.unwrap();
        let id = tweet.id.to_hex();

        assert!(matches!(tweets.update(&bob.id, &id, Some("hello")).await, Err(ApiError::Forbidden(_))));
        assert!(matches!(tweets.delete(&bob.id, &id).await, Err(ApiError::Forbidden(_))));
        assert!(matches!(tweets.update(&ana.id, &id, None).await, Err(ApiError::InvalidInput(_))));

        assert_eq!(tweets.update(&ana.id, &id, Some("edited")).await.unwrap().content, "edited");
        tweets.delete(&ana.id, &id).await.unwrap();
        assert!(matches!(tweets.update(&ana.id, &id, Some("x")).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_malformed_ids_never_reach_the_store() {
        let counting = Arc::new(CountingStore::default());
        let store: Arc<dyn DocumentStore> = counting.clone();
        let tweets = manager(&store);
        let caller = ObjectId::new();

        for raw in ["", "bogus", "65a1b2c3d4e5f60718293a4"] {
            assert!(matches!(
                tweets.list_by_user(raw, normalize(None, None), None).await,
                Err(ApiError::InvalidId("user"))
            ));
            assert!(matches!(
                tweets.update(&caller, raw, Some("hi")).await,
                Err(ApiError::InvalidId("tweet"))
            ));
            assert!(matches!(tweets.delete(&caller, raw).await, Err(ApiError::InvalidId("tweet"))));
        }

        assert_eq!(counting.calls(), 0);
    }
}
