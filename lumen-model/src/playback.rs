use serde::{Deserialize, Serialize};

use crate::ids::ItemId;
use crate::item::ticks;

/// Progress report sent while an item is playing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaybackProgress {
    pub item_id: ItemId,
    pub position_ticks: i64,
    #[serde(default)]
    pub is_paused: bool,
}

impl PlaybackProgress {
    pub fn at(item_id: ItemId, position: std::time::Duration) -> Self {
        Self {
            item_id,
            position_ticks: ticks::from_duration(position),
            is_paused: false,
        }
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.is_paused = paused;
        self
    }
}
