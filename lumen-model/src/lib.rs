//! Data models shared between the Lumen client crates and the media server
//! wire format.
#![allow(missing_docs)]

pub use ::chrono;

pub mod auth;
pub mod ids;
pub mod item;
pub mod library;
pub mod playback;
pub mod query;
pub mod server;
pub mod user;

pub use auth::{AuthenticateByName, AuthenticationResult};
pub use ids::{ItemId, LibraryId, UserId};
pub use item::{ItemType, MediaItem, UserItemData, ticks};
pub use library::{CollectionType, Library};
pub use playback::PlaybackProgress;
pub use query::{ItemQuery, QueryResult, SortOrder};
pub use server::ServerInfo;
pub use user::{User, UserPolicy};
