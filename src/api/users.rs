/// Account endpoints: registration, sessions, profile and channel pages
use crate::{
    account::{ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RegisterAccount, UpdateDetailsRequest},
    api::{
        middleware::{extract_refresh_cookie, with_session_cookies, without_session_cookies},
        response::ApiResponse,
        upload::UploadForm,
    },
    auth::{AuthContext, OptionalAuthContext, TokenPair},
    context::AppContext,
    error::ApiResult,
    view::{AccountView, ChannelProfile, VideoSummary},
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;

/// `upload_limit` caps the multipart routes
pub fn routes(upload_limit: usize) -> Router<AppContext> {
    let uploads = DefaultBodyLimit::max(upload_limit);

    Router::new()
        .route("/users/register", post(register).layer(uploads))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/refresh-token", post(refresh_token))
        .route("/users/change-password", post(change_password))
        .route("/users/current-user", get(current_user))
        .route("/users/update-account", patch(update_account))
        .route("/users/avatar", patch(update_avatar).layer(uploads))
        .route("/users/cover-image", patch(update_cover_image).layer(uploads))
        .route("/users/c/:username", get(channel_profile))
        .route("/users/history", get(watch_history))
}

pub async fn register(State(ctx): State<AppContext>, multipart: Multipart) -> ApiResult<ApiResponse<AccountView>> {
    let form = UploadForm::collect(multipart, &ctx.config.storage.upload_tmp_location).await?;

    let account = ctx
        .account_manager
        .register(RegisterAccount {
            full_name: form.text("fullName"),
            username: form.text("username"),
            email: form.text("email"),
            password: form.text("password"),
            avatar: form.file("avatar"),
            cover_image: form.file("coverImage"),
        })
        .await?;

    Ok(ApiResponse::created(account, "User registered successfully"))
}

pub async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> ApiResult<(CookieJar, ApiResponse<LoginResponse>)> {
    let (response, pair) = ctx.account_manager.login(&request).await?;
    let jar = with_session_cookies(jar, &pair, &ctx.config.authentication);

    Ok((jar, ApiResponse::ok(response, "User logged in successfully")))
}

pub async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    jar: CookieJar,
) -> ApiResult<(CookieJar, ApiResponse<()>)> {
    ctx.account_manager.logout(auth.account_id()).await?;

    Ok((without_session_cookies(jar), ApiResponse::ok((), "User logged out")))
}

/// The cookie wins over the body when both carry a token
pub async fn refresh_token(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<(CookieJar, ApiResponse<TokenPair>)> {
    let presented = extract_refresh_cookie(&jar)
        .or_else(|| body.and_then(|Json(request)| request.refresh_token));

    let pair = ctx.account_manager.refresh(presented.as_deref()).await?;
    let jar = with_session_cookies(jar, &pair, &ctx.config.authentication);

    Ok((jar, ApiResponse::ok(pair, "Access token refreshed")))
}

pub async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<()>> {
    ctx.account_manager.change_password(&auth.account, &request).await?;
    Ok(ApiResponse::ok((), "Password changed successfully"))
}

pub async fn current_user(auth: AuthContext) -> ApiResult<ApiResponse<AccountView>> {
    Ok(ApiResponse::ok(AccountView::from(&auth.account), "Current user fetched successfully"))
}

pub async fn update_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(request): Json<UpdateDetailsRequest>,
) -> ApiResult<ApiResponse<AccountView>> {
    let account = ctx.account_manager.update_details(&auth.account, &request).await?;
    Ok(ApiResponse::ok(account, "Account details updated successfully"))
}

pub async fn update_avatar(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Multipart,
) -> ApiResult<ApiResponse<AccountView>> {
    let form = UploadForm::collect(multipart, &ctx.config.storage.upload_tmp_location).await?;
    let account = ctx
        .account_manager
        .update_avatar(&auth.account, form.file("avatar").as_deref())
        .await?;

    Ok(ApiResponse::ok(account, "Avatar updated successfully"))
}

pub async fn update_cover_image(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Multipart,
) -> ApiResult<ApiResponse<AccountView>> {
    let form = UploadForm::collect(multipart, &ctx.config.storage.upload_tmp_location).await?;
    let account = ctx
        .account_manager
        .update_cover_image(&auth.account, form.file("coverImage").as_deref())
        .await?;

    Ok(ApiResponse::ok(account, "Cover image updated successfully"))
}

pub async fn channel_profile(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthContext,
    Path(username): Path<String>,
) -> ApiResult<ApiResponse<ChannelProfile>> {
    let profile = ctx
        .account_manager
        .channel_profile(&username, viewer.viewer_id().as_ref())
        .await?;

    Ok(ApiResponse::ok(profile, "Channel fetched successfully"))
}

pub async fn watch_history(State(ctx): State<AppContext>, auth: AuthContext) -> ApiResult<ApiResponse<Vec<VideoSummary>>> {
    let history = ctx.account_manager.watch_history(auth.account_id()).await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}
