use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, State},
    response::IntoResponse,
};
use tracing::{debug, info};

use cardwall_db::models::UserRow;
use cardwall_types::api::UpdateProfileRequest;
use cardwall_types::models::{AssetKind, UserIdentity};

use crate::auth::{AppState, load_user};
use crate::db_task;
use crate::error::ApiError;

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = identity.id.clone();
    db_task(&state.db, move |db| {
        db.update_user_description(&id, req.description.trim())
    })
    .await
    .map_err(|e| match e {
        ApiError::NotFound(_) => ApiError::Unauthorized,
        e => e,
    })?;

    let user = load_user(&state, &identity.id).await?;
    Ok(Json(state.user_response(&user)))
}

pub async fn upload_profile_image(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = read_image_field(multipart).await?;
    let user = replace_user_image(&state, &identity, AssetKind::Profile, bytes).await?;
    Ok(Json(state.user_response(&user)))
}

pub async fn upload_profile_banner(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = read_image_field(multipart).await?;
    let user = replace_user_image(&state, &identity, AssetKind::Banner, bytes).await?;
    Ok(Json(state.user_response(&user)))
}

async fn read_image_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                break;
            }
            return Ok(bytes);
        }
        debug!("Ignoring form field {:?}", field.name());
    }
    Err(ApiError::Validation("an image file is required".into()))
}

/// Ingest a new profile or banner image, point the user at it, then drop the image it displaced.
async fn replace_user_image(
    state: &AppState,
    identity: &UserIdentity,
    kind: AssetKind,
    bytes: Bytes,
) -> Result<UserRow, ApiError> {
    load_user(state, &identity.id).await?;

    let dimension_limit = (kind == AssetKind::Banner).then_some(state.limits.banner_max);
    let new_ref = state
        .assets
        .ingest(bytes, kind, state.limits.max_image_bytes, dimension_limit)
        .await?;

    let id = identity.id.clone();
    let stored_ref = new_ref.clone();
    let swapped = db_task(&state.db, move |db| db.swap_user_image(&id, kind, &stored_ref)).await;

    let old_ref = match swapped {
        Ok(old_ref) => old_ref,
        Err(e) => {
            state.assets.discard(&new_ref).await;
            return Err(match e {
                ApiError::NotFound(_) => ApiError::Unauthorized,
                e => e,
            });
        }
    };
    state.assets.discard(&old_ref).await;
    info!("User {} replaced {:?} image with {}", identity.login, kind, new_ref);

    load_user(state, &identity.id).await
}
