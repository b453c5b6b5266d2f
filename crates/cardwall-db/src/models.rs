//! Database row types. These map directly to SQLite rows.
//! Distinct from cardwall-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub login: String,
    pub email: String,
    pub password: String,
    pub profile_image: String,
    pub profile_banner: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRow {
    pub id: String,
    pub user_id: String,
    /// Author login captured when the card was created.
    pub user_name: String,
    /// Asset filename, empty when the card has no image.
    pub image: String,
    pub title: String,
    pub description: String,
    pub text: String,
    pub likes: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// A card together with every user who liked it.
#[derive(Debug, Clone)]
pub struct CardDetail {
    pub card: CardRow,
    pub liked_by: Vec<String>,
}

impl CardDetail {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.liked_by.iter().any(|id| id == user_id)
    }
}

/// A card as seen by a particular viewer in a listing.
#[derive(Debug, Clone)]
pub struct ListedCard {
    pub card: CardRow,
    pub is_liked: bool,
}

#[derive(Debug, Clone)]
pub struct CardPage {
    pub items: Vec<ListedCard>,
    /// The page actually served, after clamping.
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}
