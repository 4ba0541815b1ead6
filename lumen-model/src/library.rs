use serde::{Deserialize, Serialize};

use crate::ids::LibraryId;

/// Kind of content a library view holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Movies,
    TvShows,
    Music,
    Books,
    HomeVideos,
    BoxSets,
    Playlists,
    #[serde(other)]
    Other,
}

impl CollectionType {
    pub fn display_name(self) -> &'static str {
        match self {
            CollectionType::Movies => "Movies",
            CollectionType::TvShows => "TV Shows",
            CollectionType::Music => "Music",
            CollectionType::Books => "Books",
            CollectionType::HomeVideos => "Home Videos",
            CollectionType::BoxSets => "Collections",
            CollectionType::Playlists => "Playlists",
            CollectionType::Other => "Other",
        }
    }
}

/// A top-level library view of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    #[serde(default)]
    pub collection_type: Option<CollectionType>,
}

impl Library {
    pub fn collection_type(&self) -> CollectionType {
        self.collection_type.unwrap_or(CollectionType::Other)
    }
}
