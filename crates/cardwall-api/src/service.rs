use std::sync::Arc;

use axum::body::Bytes;
use tracing::{info, warn};

use cardwall_db::Database;
use cardwall_db::models::{CardDetail, CardRow};
use cardwall_types::api::{CardPageResponse, CardResponse};
use cardwall_types::models::{AssetKind, CardFilter, UserIdentity};

use crate::assets::{AssetStore, resolve};
use crate::error::ApiError;
use crate::{db_task, parse_timestamp};

/// Field edits for an existing card. `None` keeps the current value.
#[derive(Debug, Default, Clone)]
pub struct CardFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub text: Option<String>,
}

/// Card workflows: ties image ingestion to card storage and shapes responses.
///
/// Any asset written during a request is deleted again if the store write that would have
/// referenced it fails.
#[derive(Clone)]
pub struct CardService {
    db: Arc<Database>,
    assets: Arc<AssetStore>,
    public_url: String,
    max_image_bytes: usize,
}

impl CardService {
    pub fn new(
        db: Arc<Database>,
        assets: Arc<AssetStore>,
        public_url: String,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            db,
            assets,
            public_url,
            max_image_bytes,
        }
    }

    pub fn project(&self, card: CardRow, is_liked: bool) -> CardResponse {
        CardResponse {
            image: resolve(&card.image, &self.public_url),
            created_at: parse_timestamp(&card.created_at),
            updated_at: parse_timestamp(&card.updated_at),
            id: card.id,
            user_id: card.user_id,
            user_name: card.user_name,
            title: card.title,
            description: card.description,
            text: card.text,
            likes: card.likes,
            is_liked,
        }
    }

    pub async fn submit(
        &self,
        owner: &UserIdentity,
        title: String,
        description: String,
        text: String,
        image: Option<Bytes>,
    ) -> Result<CardResponse, ApiError> {
        require_title(&title)?;

        let image_ref = match image {
            Some(bytes) => {
                self.assets
                    .ingest(bytes, AssetKind::Card, self.max_image_bytes, None)
                    .await?
            }
            None => String::new(),
        };

        let owner_id = owner.id.clone();
        let owner_name = owner.login.clone();
        let stored_ref = image_ref.clone();
        let created = db_task(&self.db, move |db| {
            db.create_card(&owner_id, &owner_name, &title, &description, &text, &stored_ref)
        })
        .await;

        match created {
            Ok(card) => {
                info!("Card {} submitted by {}", card.id, owner.login);
                Ok(self.project(card, false))
            }
            Err(e) => {
                self.assets.discard(&image_ref).await;
                Err(e)
            }
        }
    }

    pub async fn amend(
        &self,
        owner: &UserIdentity,
        card_id: &str,
        fields: CardFields,
        image: Option<Bytes>,
        remove_image: bool,
    ) -> Result<CardResponse, ApiError> {
        let current = self.owned_card(owner, card_id).await?.card;

        let title = fields.title.unwrap_or(current.title);
        let description = fields.description.unwrap_or(current.description);
        let text = fields.text.unwrap_or(current.text);
        require_title(&title)?;

        // None keeps whatever the card holds at write time.
        let (new_image, fresh) = match image {
            Some(bytes) => {
                let name = self
                    .assets
                    .ingest(bytes, AssetKind::Card, self.max_image_bytes, None)
                    .await?;
                (Some(name.clone()), Some(name))
            }
            None if remove_image => (Some(String::new()), None),
            None => (None, None),
        };

        let id = card_id.to_string();
        let stored_ref = new_image.clone();
        let updated = db_task(&self.db, move |db| {
            db.update_card(&id, &title, &description, &text, stored_ref.as_deref())
        })
        .await
        .map_err(card_error);

        let previous = match updated {
            Ok(previous) => previous,
            Err(e) => {
                if let Some(name) = fresh {
                    self.assets.discard(&name).await;
                }
                return Err(e);
            }
        };

        // The image the write displaced, not the one read before ingest.
        if new_image.is_some_and(|new| new != previous) {
            self.assets.discard(&previous).await;
        }

        let detail = self.load(card_id).await?;
        let is_liked = detail.is_liked_by(&owner.id);
        Ok(self.project(detail.card, is_liked))
    }

    pub async fn retract(&self, owner: &UserIdentity, card_id: &str) -> Result<(), ApiError> {
        let known_image = self.owned_card(owner, card_id).await?.card.image;

        let id = card_id.to_string();
        let deleted = db_task(&self.db, move |db| db.delete_card(&id))
            .await
            .map_err(card_error);

        match deleted {
            Ok(image) => {
                self.assets.discard(&image).await;
                info!("Card {} retracted by {}", card_id, owner.login);
                Ok(())
            }
            Err(e) => {
                // The asset goes whatever the store outcome.
                self.assets.discard(&known_image).await;
                Err(e)
            }
        }
    }

    pub async fn toggle_like(
        &self,
        viewer: &UserIdentity,
        card_id: &str,
        like: bool,
    ) -> Result<CardResponse, ApiError> {
        self.load(card_id).await?;

        let id = card_id.to_string();
        let user_id = viewer.id.clone();
        db_task(&self.db, move |db| {
            if like {
                db.like_card(&id, &user_id)
            } else {
                db.unlike_card(&id, &user_id)
            }
        })
        .await
        .map_err(card_error)?;

        let detail = self.load(card_id).await?;
        Ok(self.project(detail.card, like))
    }

    pub async fn get(
        &self,
        card_id: &str,
        viewer: Option<&UserIdentity>,
    ) -> Result<CardResponse, ApiError> {
        let detail = self.load(card_id).await?;
        let is_liked = viewer.is_some_and(|v| detail.is_liked_by(&v.id));
        Ok(self.project(detail.card, is_liked))
    }

    pub async fn list(
        &self,
        filter: CardFilter,
        page: i64,
        limit: i64,
        viewer: Option<&UserIdentity>,
    ) -> Result<CardPageResponse, ApiError> {
        let viewer_id = viewer.map(|v| v.id.clone());
        let page = db_task(&self.db, move |db| {
            db.list_cards(&filter, page, limit, viewer_id.as_deref())
        })
        .await?;

        Ok(CardPageResponse {
            cards: page
                .items
                .into_iter()
                .map(|item| self.project(item.card, item.is_liked))
                .collect(),
            page: page.page,
            total_pages: page.total_pages,
            total_cards: page.total_count,
        })
    }

    async fn load(&self, card_id: &str) -> Result<CardDetail, ApiError> {
        let id = card_id.to_string();
        db_task(&self.db, move |db| db.get_card(&id))
            .await
            .map_err(card_error)
    }

    async fn owned_card(&self, owner: &UserIdentity, card_id: &str) -> Result<CardDetail, ApiError> {
        let detail = self.load(card_id).await?;
        if detail.card.user_id != owner.id {
            warn!(
                "User {} tried to modify card {} owned by {}",
                owner.id, card_id, detail.card.user_id
            );
            return Err(ApiError::Forbidden);
        }
        Ok(detail)
    }
}

fn require_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::Validation("card title is required".into()));
    }
    Ok(())
}

fn card_error(err: ApiError) -> ApiError {
    match err {
        ApiError::NotFound(_) => ApiError::NotFound("card"),
        e => e,
    }
}
