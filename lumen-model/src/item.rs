use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// Conversions for the server's 100ns "tick" unit
pub mod ticks {
    use std::time::Duration;

    pub const TICKS_PER_SECOND: i64 = 10_000_000;

    pub fn to_duration(ticks: i64) -> Duration {
        let ticks = ticks.max(0) as u64;
        Duration::from_nanos(ticks * 100)
    }

    pub fn from_duration(duration: Duration) -> i64 {
        i64::try_from(duration.as_nanos() / 100).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Movie,
    Series,
    Season,
    Episode,
    MusicAlbum,
    MusicArtist,
    Audio,
    Book,
    AudioBook,
    BoxSet,
    Folder,
    CollectionFolder,
    Playlist,
    #[serde(other)]
    Other,
}

impl ItemType {
    /// Name used in `IncludeItemTypes` query parameters
    pub fn as_query_value(self) -> &'static str {
        match self {
            ItemType::Movie => "Movie",
            ItemType::Series => "Series",
            ItemType::Season => "Season",
            ItemType::Episode => "Episode",
            ItemType::MusicAlbum => "MusicAlbum",
            ItemType::MusicArtist => "MusicArtist",
            ItemType::Audio => "Audio",
            ItemType::Book => "Book",
            ItemType::AudioBook => "AudioBook",
            ItemType::BoxSet => "BoxSet",
            ItemType::Folder => "Folder",
            ItemType::CollectionFolder => "CollectionFolder",
            ItemType::Playlist => "Playlist",
            ItemType::Other => "Other",
        }
    }

    pub fn is_playable(self) -> bool {
        matches!(
            self,
            ItemType::Movie
                | ItemType::Episode
                | ItemType::Audio
                | ItemType::AudioBook
        )
    }
}

/// Per-user state attached to an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserItemData {
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub playback_position_ticks: i64,
    #[serde(default)]
    pub play_count: u32,
    #[serde(default)]
    pub last_played_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaItem {
    pub id: ItemId,
    pub name: String,
    #[serde(rename = "Type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub parent_id: Option<ItemId>,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub index_number: Option<u32>,
    #[serde(default)]
    pub parent_index_number: Option<u32>,
    #[serde(default)]
    pub production_year: Option<i32>,
    #[serde(default)]
    pub run_time_ticks: Option<i64>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_data: Option<UserItemData>,
}

impl MediaItem {
    /// Item with only the required fields set
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        item_type: ItemType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            item_type,
            parent_id: None,
            series_name: None,
            index_number: None,
            parent_index_number: None,
            production_year: None,
            run_time_ticks: None,
            overview: None,
            date_created: None,
            user_data: None,
        }
    }

    pub fn runtime(&self) -> Option<std::time::Duration> {
        self.run_time_ticks.map(ticks::to_duration)
    }

    pub fn is_played(&self) -> bool {
        self.user_data.as_ref().is_some_and(|d| d.played)
    }

    pub fn is_favorite(&self) -> bool {
        self.user_data.as_ref().is_some_and(|d| d.is_favorite)
    }

    /// Fraction of the runtime already watched, if known
    pub fn progress(&self) -> Option<f32> {
        let total = self.run_time_ticks.filter(|t| *t > 0)?;
        let position = self.user_data.as_ref()?.playback_position_ticks;
        Some((position as f64 / total as f64).clamp(0.0, 1.0) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ticks_convert_to_seconds() {
        assert_eq!(
            ticks::to_duration(90 * ticks::TICKS_PER_SECOND),
            Duration::from_secs(90)
        );
        assert_eq!(ticks::from_duration(Duration::from_millis(1500)), 15_000_000);
        assert_eq!(ticks::to_duration(-5), Duration::ZERO);
    }

    #[test]
    fn parses_episode_with_user_data() {
        let raw = r#"{
            "Id": "e1",
            "Name": "Pilot",
            "Type": "Episode",
            "SeriesName": "Show",
            "IndexNumber": 1,
            "ParentIndexNumber": 1,
            "RunTimeTicks": 36000000000,
            "UserData": {"Played": false, "IsFavorite": true, "PlaybackPositionTicks": 9000000000, "PlayCount": 0}
        }"#;
        let item: MediaItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.item_type, ItemType::Episode);
        assert!(item.is_favorite());
        assert!(!item.is_played());
        assert_eq!(item.runtime(), Some(Duration::from_secs(3600)));
        let progress = item.progress().unwrap();
        assert!((progress - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_item_type_is_other() {
        let raw = r#"{"Id": "x", "Name": "Trailer", "Type": "Trailer"}"#;
        let item: MediaItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.item_type, ItemType::Other);
        assert_eq!(item.progress(), None);
    }
}
