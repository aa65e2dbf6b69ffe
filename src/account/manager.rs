/// Account manager implementation over the document store
use crate::{
    account::{
        ChangePasswordRequest, Identity, LoginRequest, LoginResponse, RegisterAccount, UpdateDetailsRequest,
    },
    auth::{PasswordHasher, SessionStore, TokenPair},
    blob_store::{delete_quietly, BlobStore},
    content::{fetch, required_text, visible_to},
    db::{
        document::ID_FIELD,
        models::{from_document, to_document, Account, NewAccount},
        Collection, DocumentStore, Filter, ObjectId, Related, UpdateOp,
    },
    error::{ApiError, ApiResult, AuthFailure},
    view::{AccountView, ChannelProfile, Join, VideoSummary, ViewComposer, ViewQuery, VIDEO_SUMMARY_FIELDS},
};
use serde::Deserialize;
use std::{path::Path, sync::Arc};
use validator::Validate;

const ALL_FIELDS_REQUIRED: &str = "All fields are required";

/// Account manager service
pub struct AccountManager {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    hasher: Arc<PasswordHasher>,
    sessions: Arc<SessionStore>,
    views: Arc<ViewComposer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchHistory {
    watch_history: Vec<VideoSummary>,
}

impl AccountManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        hasher: Arc<PasswordHasher>,
        sessions: Arc<SessionStore>,
        views: Arc<ViewComposer>,
    ) -> Self {
        Self {
            store,
            blobs,
            hasher,
            sessions,
            views,
        }
    }

    /// Create a new account
    pub async fn register(&self, request: RegisterAccount) -> ApiResult<AccountView> {
        let full_name = required_text(request.full_name.as_deref(), ALL_FIELDS_REQUIRED)?;
        let username = required_text(request.username.as_deref(), ALL_FIELDS_REQUIRED)?.to_lowercase();
        let email = required_text(request.email.as_deref(), ALL_FIELDS_REQUIRED)?.to_lowercase();
        let password = required_secret(request.password.as_deref(), ALL_FIELDS_REQUIRED)?;

        validate_identity(&username, &email)?;

        let avatar_path = request
            .avatar
            .as_deref()
            .ok_or_else(|| ApiError::InvalidInput("Avatar file is required".to_string()))?;

        let taken = Filter::Or(vec![Filter::eq("username", username.as_str()), Filter::eq("email", email.as_str())]);
        if self.store.find_one(Collection::Users, &taken).await?.is_some() {
            return Err(ApiError::Conflict("User with email or username already exists".to_string()));
        }

        let password = self.hasher.hash(&password)?;

        let avatar = self.blobs.store(avatar_path).await?.url;
        let cover_image = match request.cover_image.as_deref() {
            Some(path) => match self.blobs.store(path).await {
                Ok(stored) => Some(stored.url),
                Err(e) => {
                    delete_quietly(self.blobs.as_ref(), &avatar).await;
                    return Err(e);
                }
            },
            None => None,
        };

        let doc = to_document(&NewAccount {
            username,
            email,
            full_name,
            avatar: avatar.clone(),
            cover_image: cover_image.clone(),
            watch_history: Vec::new(),
            password,
        })?;

        // A concurrent registration may have claimed the name since the check
        let Some(created) = self
            .store
            .create_unique(Collection::Users, doc, &["username", "email"])
            .await?
        else {
            delete_quietly(self.blobs.as_ref(), &avatar).await;
            if let Some(cover) = &cover_image {
                delete_quietly(self.blobs.as_ref(), cover).await;
            }
            return Err(ApiError::Conflict("User with email or username already exists".to_string()));
        };

        let account: Account = from_document(created)?;
        tracing::info!(account = %account.id, username = %account.username, "Account registered");
        Ok(AccountView::from(&account))
    }

    /// Verify credentials and start a fresh session
    pub async fn login(&self, request: &LoginRequest) -> ApiResult<(LoginResponse, TokenPair)> {
        let username = required_text(request.username.as_deref(), "").ok();
        let email = required_text(request.email.as_deref(), "").ok();
        if username.is_none() && email.is_none() {
            return Err(ApiError::InvalidInput("Username or email is required".to_string()));
        }
        let password = required_secret(request.password.as_deref(), "Password is required")?;

        let identifiers: Vec<Filter> = username
            .map(|u| Filter::eq("username", u.to_lowercase()))
            .into_iter()
            .chain(email.map(|e| Filter::eq("email", e.to_lowercase())))
            .collect();

        let account: Account = match self.store.find_one(Collection::Users, &Filter::Or(identifiers)).await? {
            Some(doc) => from_document(doc)?,
            None => return Err(ApiError::NotFound("User does not exist".to_string())),
        };

        if !self.hasher.verify(&password, &account.password) {
            tracing::warn!(account = %account.id, "Login rejected: wrong password");
            return Err(ApiError::Unauthorized(AuthFailure::BadCredentials));
        }

        let pair = self.sessions.rotate(&account.id).await?;

        tracing::info!(account = %account.id, "Logged in");
        Ok((
            LoginResponse {
                user: AccountView::from(&account),
                access_token: pair.access_token.clone(),
                refresh_token: pair.refresh_token.clone(),
            },
            pair,
        ))
    }

    pub async fn logout(&self, account_id: &ObjectId) -> ApiResult<()> {
        self.sessions.revoke(account_id).await
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, presented: Option<&str>) -> ApiResult<TokenPair> {
        let presented = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized(AuthFailure::MissingToken))?;

        let (_, pair) = self.sessions.exchange(presented).await?;
        Ok(pair)
    }

    /// Replace the password and end the current session
    pub async fn change_password(&self, account: &Account, request: &ChangePasswordRequest) -> ApiResult<()> {
        let old_password = required_secret(request.old_password.as_deref(), "Old and new password are required")?;
        let new_password = required_secret(request.new_password.as_deref(), "Old and new password are required")?;

        if !self.hasher.verify(&old_password, &account.password) {
            return Err(ApiError::InvalidInput("Invalid old password".to_string()));
        }

        let hash = self.hasher.hash(&new_password)?;
        self.store
            .update_by_id(
                Collection::Users,
                &account.id,
                &[UpdateOp::set("password", hash), UpdateOp::Unset("refreshToken".to_string())],
            )
            .await?
            .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

        tracing::info!(account = %account.id, "Password changed");
        Ok(())
    }

    pub async fn update_details(&self, account: &Account, request: &UpdateDetailsRequest) -> ApiResult<AccountView> {
        let full_name = required_text(request.full_name.as_deref(), ALL_FIELDS_REQUIRED)?;
        let email = required_text(request.email.as_deref(), ALL_FIELDS_REQUIRED)?.to_lowercase();

        validate_identity(&account.username, &email)?;

        let taken = Filter::all_of(vec![
            Filter::eq("email", email.as_str()),
            Filter::not(Filter::id(&account.id)),
        ]);
        if self.store.find_one(Collection::Users, &taken).await?.is_some() {
            return Err(ApiError::Conflict("Email is already in use".to_string()));
        }

        let updated = self
            .store
            .update_by_id(
                Collection::Users,
                &account.id,
                &[UpdateOp::set("fullName", full_name), UpdateOp::set("email", email)],
            )
            .await?
            .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

        Ok(AccountView::from(&from_document::<Account>(updated)?))
    }

    pub async fn update_avatar(&self, account: &Account, upload: Option<&Path>) -> ApiResult<AccountView> {
        let upload = upload.ok_or_else(|| ApiError::InvalidInput("Avatar file is missing".to_string()))?;
        let updated = self.replace_image(account, "avatar", upload).await?;

        delete_quietly(self.blobs.as_ref(), &account.avatar).await;
        Ok(updated)
    }

    pub async fn update_cover_image(&self, account: &Account, upload: Option<&Path>) -> ApiResult<AccountView> {
        let upload = upload.ok_or_else(|| ApiError::InvalidInput("Cover image file is missing".to_string()))?;
        let updated = self.replace_image(account, "coverImage", upload).await?;

        if let Some(old) = &account.cover_image {
            delete_quietly(self.blobs.as_ref(), old).await;
        }
        Ok(updated)
    }

    async fn replace_image(&self, account: &Account, field: &str, upload: &Path) -> ApiResult<AccountView> {
        let url = self.blobs.store(upload).await?.url;

        match self
            .store
            .update_by_id(Collection::Users, &account.id, &[UpdateOp::set(field, url.as_str())])
            .await?
        {
            Some(updated) => Ok(AccountView::from(&from_document::<Account>(updated)?)),
            None => {
                delete_quietly(self.blobs.as_ref(), &url).await;
                Err(ApiError::NotFound("User does not exist".to_string()))
            }
        }
    }

    /// Public channel page with subscription counts
    pub async fn channel_profile(&self, raw_username: &str, viewer: Option<&ObjectId>) -> ApiResult<ChannelProfile> {
        let username = required_text(Some(raw_username), "Username is missing")?.to_lowercase();

        let subscribers = Related {
            from: Collection::Subscriptions,
            local_field: ID_FIELD.to_string(),
            foreign_field: "channel".to_string(),
            filter: Filter::All,
            as_field: "subscribersCount".to_string(),
        };
        let subscribed_to = Related {
            from: Collection::Subscriptions,
            local_field: ID_FIELD.to_string(),
            foreign_field: "subscriber".to_string(),
            filter: Filter::All,
            as_field: "channelsSubscribedToCount".to_string(),
        };
        let joins = [
            Join::Count(subscribers.clone()),
            Join::Count(subscribed_to),
            Join::ViewerFlag {
                related: Related {
                    as_field: "isSubscribed".to_string(),
                    ..subscribers
                },
                viewer_field: "subscriber".to_string(),
                viewer: viewer.copied(),
            },
        ];

        self.views
            .compose_one(&ViewQuery::new(Collection::Users, Filter::eq("username", username)), &joins)
            .await?
            .ok_or_else(|| ApiError::NotFound("Channel does not exist".to_string()))
    }

    /// Watched videos in watch order, each with its owner
    pub async fn watch_history(&self, account_id: &ObjectId) -> ApiResult<Vec<VideoSummary>> {
        let history: WatchHistory = self
            .views
            .compose_one(
                &ViewQuery::by_id(Collection::Users, account_id),
                &[Join::nested(
                    Collection::Videos,
                    "watchHistory",
                    VIDEO_SUMMARY_FIELDS,
                    vec![Join::owner("owner")],
                )
                .matching(visible_to(Some(account_id)))],
            )
            .await?
            .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

        Ok(history.watch_history)
    }

    /// Reload an account, e.g. after a mutation
    pub async fn account(&self, account_id: &ObjectId) -> ApiResult<Account> {
        fetch(self.store.as_ref(), Collection::Users, account_id, "User").await
    }
}

/// Non-blank secret, kept exactly as given
fn required_secret(value: Option<&str>, message: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidInput(message.to_string()))
}

/// Handle and email format checks
fn validate_identity(username: &str, email: &str) -> ApiResult<()> {
    let identity = Identity {
        username: username.to_string(),
        email: email.to_string(),
    };
    identity.validate().map_err(|e| {
        let message = e
            .field_errors()
            .values()
            .flat_map(|errors| errors.iter())
            .find_map(|error| error.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid account details".to_string());
        ApiError::InvalidInput(message)
    })?;

    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ApiError::InvalidInput(
            "Username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::TokenIssuer,
        config::ServerConfig,
        content::testing::{memory_store, FakeBlobStore},
        content::SubscriptionManager,
    };
    use std::path::PathBuf;

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        blobs: Arc<FakeBlobStore>,
        manager: AccountManager,
        views: Arc<ViewComposer>,
    }

    async fn fixture() -> Fixture {
        let store = memory_store().await;
        let config = ServerConfig::for_testing(PathBuf::from("/tmp/videotube-test"));
        let issuer = Arc::new(TokenIssuer::new(&config.authentication));
        let blobs = Arc::new(FakeBlobStore::default());
        let views = Arc::new(ViewComposer::new(Arc::clone(&store)));
        let manager = AccountManager::new(
            Arc::clone(&store),
            blobs.clone(),
            Arc::new(PasswordHasher::new(8, 1).unwrap()),
            Arc::new(SessionStore::new(Arc::clone(&store), issuer)),
            Arc::clone(&views),
        );
        Fixture {
            store,
            blobs,
            manager,
            views,
        }
    }

    fn registration(username: &str) -> RegisterAccount {
        RegisterAccount {
            full_name: Some("Ana Lima".to_string()),
            username: Some(username.to_string()),
            email: Some(format!("{}@Example.com", username)),
            password: Some("hunter22".to_string()),
            avatar: Some(PathBuf::from(format!("/tmp/{}-avatar.png", username.to_lowercase()))),
            cover_image: None,
        }
    }

    fn login_as(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: Some(username.to_string()),
            email: None,
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let f = fixture().await;
        let view = f.manager.register(registration("Ana")).await.unwrap();
        assert_eq!(view.username, "ana");
        assert_eq!(view.email, "ana@example.com");
        assert_eq!(view.avatar, "http://cdn.test/ana-avatar.png");

        let (response, pair) = f.manager.login(&login_as("ANA", "hunter22")).await.unwrap();
        assert_eq!(response.user.id, view.id);
        assert_eq!(response.refresh_token, pair.refresh_token);

        let stored = f.manager.account(&view.id).await.unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(pair.refresh_token.as_str()));
        assert_ne!(stored.password, "hunter22");

        let by_email = LoginRequest {
            username: None,
            email: Some("ana@example.com".to_string()),
            password: Some("hunter22".to_string()),
        };
        assert!(f.manager.login(&by_email).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let f = fixture().await;

        let mut missing = registration("ana");
        missing.full_name = Some("   ".to_string());
        assert!(matches!(f.manager.register(missing).await, Err(ApiError::InvalidInput(_))));

        let mut no_avatar = registration("ana");
        no_avatar.avatar = None;
        assert!(matches!(f.manager.register(no_avatar).await, Err(ApiError::InvalidInput(_))));

        let mut bad_email = registration("ana");
        bad_email.email = Some("not-an-email".to_string());
        assert!(matches!(f.manager.register(bad_email).await, Err(ApiError::InvalidInput(_))));

        assert!(matches!(f.manager.register(registration("a b c")).await, Err(ApiError::InvalidInput(_))));
        assert!(matches!(f.manager.register(registration("ab")).await, Err(ApiError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_register_conflicts() {
        let f = fixture().await;
        f.manager.register(registration("ana")).await.unwrap();

        assert!(matches!(f.manager.register(registration("ana")).await, Err(ApiError::Conflict(_))));

        let mut same_email = registration("other");
        same_email.email = Some("ANA@example.com".to_string());
        assert!(matches!(f.manager.register(same_email).await, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_login_failures() {
        let f = fixture().await;
        f.manager.register(registration("ana")).await.unwrap();

        assert!(matches!(
            f.manager.login(&login_as("nobody", "hunter22")).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            f.manager.login(&login_as("ana", "wrong")).await,
            Err(ApiError::Unauthorized(AuthFailure::BadCredentials))
        ));
        assert!(matches!(
            f.manager.login(&LoginRequest::default()).await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_is_single_use_and_logout_revokes() {
        let f = fixture().await;
        f.manager.register(registration("ana")).await.unwrap();
        let (_, original) = f.manager.login(&login_as("ana", "hunter22")).await.unwrap();

        let next = f.manager.refresh(Some(&original.refresh_token)).await.unwrap();
        assert_ne!(next.refresh_token, original.refresh_token);
        assert!(matches!(
            f.manager.refresh(Some(&original.refresh_token)).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            f.manager.refresh(None).await,
            Err(ApiError::Unauthorized(AuthFailure::MissingToken))
        ));

        let (response, _) = f.manager.login(&login_as("ana", "hunter22")).await.unwrap();
        f.manager.logout(&response.user.id).await.unwrap();
        assert!(matches!(
            f.manager.refresh(Some(&response.refresh_token)).await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password_ends_session() {
        let f = fixture().await;
        let view = f.manager.register(registration("ana")).await.unwrap();
        let (_, pair) = f.manager.login(&login_as("ana", "hunter22")).await.unwrap();
        let account = f.manager.account(&view.id).await.unwrap();

        let wrong = ChangePasswordRequest {
            old_password: Some("nope".to_string()),
            new_password: Some("fresh-secret".to_string()),
        };
        assert!(matches!(
            f.manager.change_password(&account, &wrong).await,
            Err(ApiError::InvalidInput(_))
        ));

        let right = ChangePasswordRequest {
            old_password: Some("hunter22".to_string()),
            new_password: Some("fresh-secret".to_string()),
        };
        f.manager.change_password(&account, &right).await.unwrap();

        assert!(f.manager.refresh(Some(&pair.refresh_token)).await.is_err());
        assert!(f.manager.login(&login_as("ana", "hunter22")).await.is_err());
        assert!(f.manager.login(&login_as("ana", "fresh-secret")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_details_and_images() {
        let f = fixture().await;
        let ana = f.manager.register(registration("ana")).await.unwrap();
        f.manager.register(registration("bob")).await.unwrap();
        let account = f.manager.account(&ana.id).await.unwrap();

        let clash = UpdateDetailsRequest {
            full_name: Some("Ana".to_string()),
            email: Some("bob@example.com".to_string()),
        };
        assert!(matches!(
            f.manager.update_details(&account, &clash).await,
            Err(ApiError::Conflict(_))
        ));

        let edit = UpdateDetailsRequest {
            full_name: Some("Ana Maria".to_string()),
            email: Some("ana.maria@example.com".to_string()),
        };
        let updated = f.manager.update_details(&account, &edit).await.unwrap();
        assert_eq!(updated.full_name, "Ana Maria");
        assert_eq!(updated.email, "ana.maria@example.com");

        let updated = f
            .manager
            .update_avatar(&account, Some(Path::new("/tmp/new-face.png")))
            .await
            .unwrap();
        assert_eq!(updated.avatar, "http://cdn.test/new-face.png");
        assert_eq!(
            *f.blobs.deleted.lock().unwrap(),
            vec!["http://cdn.test/ana-avatar.png".to_string()]
        );

        let updated = f
            .manager
            .update_cover_image(&account, Some(Path::new("/tmp/banner.png")))
            .await
            .unwrap();
        assert_eq!(updated.cover_image.as_deref(), Some("http://cdn.test/banner.png"));
        assert!(matches!(
            f.manager.update_cover_image(&account, None).await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_profile_counts() {
        let f = fixture().await;
        let ana = f.manager.register(registration("ana")).await.unwrap();
        let bob = f.manager.register(registration("bob")).await.unwrap();
        let cat = f.manager.register(registration("cat")).await.unwrap();

        let subs = SubscriptionManager::new(Arc::clone(&f.store), Arc::clone(&f.views));
        subs.toggle(&bob.id, &ana.id.to_hex()).await.unwrap();
        subs.toggle(&cat.id, &ana.id.to_hex()).await.unwrap();
        subs.toggle(&ana.id, &bob.id.to_hex()).await.unwrap();

        let seen_by_bob = f.manager.channel_profile("Ana", Some(&bob.id)).await.unwrap();
        assert_eq!(seen_by_bob.subscribers_count, 2);
        assert_eq!(seen_by_bob.channels_subscribed_to_count, 1);
        assert!(seen_by_bob.is_subscribed);

        let anonymous = f.manager.channel_profile("ana", None).await.unwrap();
        assert!(!anonymous.is_subscribed);

        let serialized = serde_json::to_value(&anonymous).unwrap();
        assert!(serialized.get("password").is_none());
        assert!(serialized.get("refreshToken").is_none());

        assert!(matches!(
            f.manager.channel_profile("nobody", None).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_history_in_order() {
        use crate::db::models::{NewVideo, Video};

        let f = fixture().await;
        let ana = f.manager.register(registration("ana")).await.unwrap();

        let mut ids = Vec::new();
        for title in ["one", "two"] {
            let doc = to_document(&NewVideo {
                video_file: "v.mp4".to_string(),
                thumbnail: "t.png".to_string(),
                title: title.to_string(),
                description: "d".to_string(),
                duration: 1,
                views: 0,
                is_published: true,
                owner: ana.id,
            })
            .unwrap();
            ids.push(from_document::<Video>(f.store.create(Collection::Videos, doc).await.unwrap()).unwrap().id);
        }
        f.store
            .update_by_id(
                Collection::Users,
                &ana.id,
                &[UpdateOp::set("watchHistory", vec![ids[1].to_hex(), ids[0].to_hex()])],
            )
            .await
            .unwrap();

        let history = f.manager.watch_history(&ana.id).await.unwrap();
        let titles: Vec<_> = history.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["two", "one"]);
        assert_eq!(history[0].owner.as_ref().unwrap().username, "ana");
    }

    #[tokio::test]
    async fn test_watch_history_hides_other_channels_drafts() {
        use crate::db::models::{NewVideo, Video};

        let f = fixture().await;
        let ana = f.manager.register(registration("ana")).await.unwrap();
        let bob = f.manager.register(registration("bob")).await.unwrap();

        let mut ids = Vec::new();
        for (title, owner, published) in [("hidden", bob.id, false), ("draft", ana.id, false), ("shown", bob.id, true)] {
            let doc = to_document(&NewVideo {
                video_file: "v.mp4".to_string(),
                thumbnail: "t.png".to_string(),
                title: title.to_string(),
                description: "d".to_string(),
                duration: 1,
                views: 0,
                is_published: published,
                owner,
            })
            .unwrap();
            ids.push(from_document::<Video>(f.store.create(Collection::Videos, doc).await.unwrap()).unwrap().id);
        }
        let history: Vec<String> = ids.iter().map(ObjectId::to_hex).collect();
        f.store
            .update_by_id(Collection::Users, &ana.id, &[UpdateOp::set("watchHistory", history)])
            .await
            .unwrap();

        let titles: Vec<_> = f
            .manager
            .watch_history(&ana.id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.title)
            .collect();
        assert_eq!(titles, vec!["draft", "shown"]);
    }
}
