use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use cardwall_db::cards::DEFAULT_PAGE_LIMIT;
use cardwall_types::api::MessageResponse;
use cardwall_types::models::{CardFilter, UserIdentity};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::service::CardFields;

/// `?page=&limit=`. Kept as raw strings so junk values fall back to defaults instead of a 400.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    fn resolve(&self) -> (i64, i64) {
        (
            parse_positive(self.page.as_deref()).unwrap_or(1),
            parse_positive(self.limit.as_deref()).unwrap_or(DEFAULT_PAGE_LIMIT as i64),
        )
    }
}

fn parse_positive(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok()).filter(|n| *n > 0)
}

/// Multipart body of card create/update requests.
#[derive(Debug, Default)]
struct CardForm {
    title: Option<String>,
    description: Option<String>,
    text: Option<String>,
    image: Option<Bytes>,
    remove_image: bool,
}

async fn read_card_form(mut multipart: Multipart) -> Result<CardForm, ApiError> {
    let mut form = CardForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = Some(field.text().await?),
            "description" => form.description = Some(field.text().await?),
            "text" => form.text = Some(field.text().await?),
            "image" => {
                let bytes = field.bytes().await?;
                // Browsers send an empty part for an untouched file input
                if !bytes.is_empty() {
                    form.image = Some(bytes);
                }
            }
            "remove_image" => {
                form.remove_image =
                    matches!(field.text().await?.trim(), "true" | "1" | "on");
            }
            other => debug!("Ignoring unknown form field {:?}", other),
        }
    }

    Ok(form)
}

pub async fn create_card(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_card_form(multipart).await?;

    let card = state
        .cards
        .submit(
            &identity,
            form.title.unwrap_or_default(),
            form.description.unwrap_or_default(),
            form.text.unwrap_or_default(),
            form.image,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn list_cards(
    State(state): State<AppState>,
    viewer: Option<Extension<UserIdentity>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit) = query.resolve();
    let viewer = viewer.map(|Extension(v)| v);

    let page = state
        .cards
        .list(CardFilter::all(), page, limit, viewer.as_ref())
        .await?;
    Ok(Json(page))
}

pub async fn list_user_cards(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    viewer: Option<Extension<UserIdentity>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit) = query.resolve();
    let viewer = viewer.map(|Extension(v)| v);

    let page = state
        .cards
        .list(CardFilter::by_owner(user_id), page, limit, viewer.as_ref())
        .await?;
    Ok(Json(page))
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    viewer: Option<Extension<UserIdentity>>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = viewer.map(|Extension(v)| v);
    let card = state.cards.get(&card_id, viewer.as_ref()).await?;
    Ok(Json(card))
}

pub async fn update_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_card_form(multipart).await?;
    let fields = CardFields {
        title: form.title,
        description: form.description,
        text: form.text,
    };

    let card = state
        .cards
        .amend(&identity, &card_id, fields, form.image, form.remove_image)
        .await?;
    Ok(Json(card))
}

pub async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    state.cards.retract(&identity, &card_id).await?;
    Ok(Json(MessageResponse {
        message: "card deleted".into(),
    }))
}

pub async fn like_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state.cards.toggle_like(&identity, &card_id, true).await?;
    Ok(Json(card))
}

pub async fn unlike_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state.cards.toggle_like(&identity, &card_id, false).await?;
    Ok(Json(card))
}
