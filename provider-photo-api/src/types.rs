//! Photo API response types
//!
//! Only the fields the sync pipeline stores are modelled; everything else
//! in the payload is ignored.

use bridge_traits::source::{PhotoUrls, RemotePhoto};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiPhoto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub blur_hash: Option<String>,
    #[serde(default)]
    pub likes: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub alt_description: Option<String>,
    #[serde(default)]
    pub urls: Option<ApiUrls>,
    #[serde(default)]
    pub user: Option<ApiUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiUrls {
    pub raw: Option<String>,
    pub full: Option<String>,
    pub regular: Option<String>,
    pub small: Option<String>,
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiUser {
    pub username: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub errors: Vec<String>,
}

impl From<ApiPhoto> for RemotePhoto {
    fn from(photo: ApiPhoto) -> Self {
        let urls = photo.urls.unwrap_or_default();
        let user = photo.user.unwrap_or_default();

        RemotePhoto {
            id: photo.id.filter(|id| !id.trim().is_empty()),
            description: photo.description,
            alt_description: photo.alt_description,
            width: photo.width,
            height: photo.height,
            color: photo.color,
            blur_hash: photo.blur_hash,
            likes: photo.likes,
            urls: PhotoUrls {
                raw: urls.raw,
                full: urls.full,
                regular: urls.regular,
                small: urls.small,
                thumb: urls.thumb,
            },
            author_username: user.username,
            author_name: user.name,
            created_at: photo.created_at,
            updated_at: photo.updated_at,
        }
    }
}
