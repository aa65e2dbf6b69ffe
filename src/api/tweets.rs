/// Tweet endpoints
use crate::{
    api::{comments::ContentBody, response::ApiResponse},
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    db::models::Tweet,
    error::ApiResult,
    view::{PageParams, TweetView},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/tweets", post(create_tweet))
        .route("/tweets/user/:user_id", get(user_tweets))
        .route("/tweets/:tweet_id", patch(update_tweet).delete(delete_tweet))
}

pub async fn create_tweet(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<ContentBody>,
) -> ApiResult<ApiResponse<Tweet>> {
    let tweet = ctx
        .tweet_manager
        .create(auth.account_id(), body.content.as_deref())
        .await?;

    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

pub async fn user_tweets(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthContext,
    Path(user_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Vec<TweetView>>> {
    let tweets = ctx
        .tweet_manager
        .list_by_user(&user_id, page.plan(), viewer.viewer_id().as_ref())
        .await?;

    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

pub async fn update_tweet(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(tweet_id): Path<String>,
    Json(body): Json<ContentBody>,
) -> ApiResult<ApiResponse<Tweet>> {
    let tweet = ctx
        .tweet_manager
        .update(auth.account_id(), &tweet_id, body.content.as_deref())
        .await?;

    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

pub async fn delete_tweet(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(tweet_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    ctx.tweet_manager.delete(auth.account_id(), &tweet_id).await?;
    Ok(ApiResponse::ok((), "Tweet deleted successfully"))
}
