use serde::{Deserialize, Serialize};

/// The authenticated caller, as resolved by the auth gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub login: String,
}

/// Which record an uploaded image will belong to. Doubles as the filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Card,
    Profile,
    Banner,
}

impl AssetKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Profile => "profile",
            Self::Banner => "banner",
        }
    }
}

/// Which cards a listing covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFilter {
    pub owner_id: Option<String>,
}

impl CardFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
        }
    }
}
