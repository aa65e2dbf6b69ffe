/// Subscription endpoints
use crate::{
    api::response::ApiResponse,
    auth::AuthContext,
    content::SubscriptionState,
    context::AppContext,
    error::ApiResult,
    view::{SubscribedChannelView, SubscriberView},
};
use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/subscriptions/c/:channel_id", get(channel_subscribers).post(toggle_subscription))
        .route("/subscriptions/u/:subscriber_id", get(subscribed_channels))
}

pub async fn toggle_subscription(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(channel_id): Path<String>,
) -> ApiResult<ApiResponse<SubscriptionState>> {
    let state = ctx
        .subscription_manager
        .toggle(auth.account_id(), &channel_id)
        .await?;

    let message = if state.subscribed { "Subscribed" } else { "Unsubscribed" };
    Ok(ApiResponse::ok(state, message))
}

pub async fn channel_subscribers(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
) -> ApiResult<ApiResponse<Vec<SubscriberView>>> {
    let subscribers = ctx.subscription_manager.subscribers(&channel_id).await?;
    Ok(ApiResponse::ok(subscribers, "Subscribers fetched successfully"))
}

pub async fn subscribed_channels(
    State(ctx): State<AppContext>,
    Path(subscriber_id): Path<String>,
) -> ApiResult<ApiResponse<Vec<SubscribedChannelView>>> {
    let channels = ctx.subscription_manager.subscribed_channels(&subscriber_id).await?;
    Ok(ApiResponse::ok(channels, "Subscribed channels fetched successfully"))
}
