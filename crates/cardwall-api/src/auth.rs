use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};
use uuid::Uuid;

use cardwall_db::Database;
use cardwall_db::models::UserRow;
use cardwall_types::api::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};
use cardwall_types::models::UserIdentity;

use crate::assets::{AssetStore, UploadLimits, resolve};
use crate::error::ApiError;
use crate::provider::AuthProvider;
use crate::service::CardService;
use crate::{db_task, parse_timestamp};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub auth: Arc<dyn AuthProvider>,
    pub assets: Arc<AssetStore>,
    pub cards: CardService,
    /// Prefix turning an asset filename into a client-facing URL.
    pub public_url: String,
    pub limits: UploadLimits,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        auth: Arc<dyn AuthProvider>,
        assets: Arc<AssetStore>,
        public_url: String,
        limits: UploadLimits,
    ) -> AppState {
        let cards = CardService::new(
            db.clone(),
            assets.clone(),
            public_url.clone(),
            limits.max_image_bytes,
        );
        Arc::new(Self {
            db,
            auth,
            assets,
            cards,
            public_url,
            limits,
        })
    }

    pub(crate) fn user_response(&self, user: &UserRow) -> UserResponse {
        UserResponse {
            id: user.id.clone(),
            login: user.login.clone(),
            email: user.email.clone(),
            profile_image: resolve(&user.profile_image, &self.public_url),
            profile_banner: resolve(&user.profile_banner, &self.public_url),
            description: user.description.clone(),
            created_at: parse_timestamp(&user.created_at),
        }
    }

    fn token_response(&self, user: &UserRow) -> Result<TokenResponse, ApiError> {
        let identity = UserIdentity {
            id: user.id.clone(),
            login: user.login.clone(),
        };
        let token = self.auth.issue_token(&identity).map_err(|e| {
            error!("Failed to issue token for {}: {}", user.id, e);
            ApiError::Internal
        })?;

        Ok(TokenResponse {
            token,
            user: self.user_response(user),
        })
    }
}

/// Load the caller's user row. A vanished user is treated as unauthenticated.
pub(crate) async fn load_user(state: &AppStateInner, user_id: &str) -> Result<UserRow, ApiError> {
    let id = user_id.to_string();
    db_task(&state.db, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(ApiError::Unauthorized)
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let login = req.login.trim().to_string();
    let email = req.email.trim().to_string();

    if login.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "login, email and password are required".into(),
        ));
    }
    if login.chars().count() < 3 || login.chars().count() > 32 {
        return Err(ApiError::Validation(
            "login must be between 3 and 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    // Hash password with Argon2id
    let password_hash = state.auth.hash_password(&req.password).map_err(|e| {
        error!("Password hashing failed: {}", e);
        ApiError::Internal
    })?;

    let user_id = Uuid::new_v4().to_string();
    let user = db_task(&state.db, move |db| {
        db.create_user(&user_id, &login, &email, &password_hash)
    })
    .await?;

    info!("Registered user {} ({})", user.login, user.id);
    Ok((StatusCode::CREATED, Json(state.token_response(&user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let login = req.login.trim().to_string();
    let email = req.email.trim().to_string();

    if (login.is_empty() && email.is_empty()) || req.password.is_empty() {
        return Err(ApiError::Validation(
            "login or email and password are required".into(),
        ));
    }

    let user = db_task(&state.db, move |db| {
        db.get_user_by_login_or_email(&login, &email)
    })
    .await?
    .ok_or(ApiError::Unauthorized)?;

    if !state.auth.verify_password(&req.password, &user.password) {
        return Err(ApiError::Unauthorized);
    }

    Ok(Json(state.token_response(&user)?))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_user(&state, &identity.id).await?;
    Ok(Json(state.user_response(&user)))
}
