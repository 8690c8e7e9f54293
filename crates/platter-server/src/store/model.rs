use serde::{Deserialize, Serialize};

/// Client-supplied album content. Every field is optional; an update
/// replaces all of them, so omitted fields end up cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub performer: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Stored in redb as bincode-encoded bytes and returned to clients as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub cost: Option<f64>,
}

impl Album {
    pub fn from_fields(id: String, fields: AlbumFields) -> Self {
        Self {
            id,
            title: fields.title,
            performer: fields.performer,
            cost: fields.cost,
        }
    }
}

/// A stored user. Never serialized to clients; see [`UserProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
}

/// Public view of a user, without credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: Option<String>,
    pub email: String,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// A stored purchase: bare references, no integrity checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: String,
    pub user: String,
    pub album: String,
}

/// A purchase with both references expanded. A reference whose target no
/// longer exists (or never did) expands to `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Purchase {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: Option<UserProfile>,
    pub album: Option<Album>,
}
