use std::sync::Arc;
use std::time::Duration;

use lumen_client::testing::{StubServer, StubTransport};
use lumen_client::{
    AuthRetryExecutor, ClientError, MediaRepository, MemoryCredentialStore,
    RepositoryError, SessionManager,
};
use lumen_model::{
    CollectionType, ItemId, ItemQuery, ItemType, Library, LibraryId,
    MediaItem, PlaybackProgress, UserItemData,
};
use tokio_util::sync::CancellationToken;

const URL: &str = "http://media.local:8096";

type Repository = MediaRepository<StubTransport, MemoryCredentialStore>;

fn item(id: &str, name: &str, parent: &str) -> MediaItem {
    let mut item = MediaItem::new(id, name, ItemType::Movie);
    item.parent_id = Some(ItemId::new(parent));
    item
}

fn catalog(server: &StubServer) {
    server.add_library(Library {
        id: LibraryId::new("movies"),
        name: "Movies".into(),
        collection_type: Some(CollectionType::Movies),
    });
    server.add_library(Library {
        id: LibraryId::new("shows"),
        name: "Shows".into(),
        collection_type: Some(CollectionType::TvShows),
    });
    server.add_item(item("m1", "Alien", "movies"));
    server.add_item(item("m2", "Aliens", "movies"));
    server.add_item(item("m3", "Heat", "movies"));

    let mut partial = item("m4", "Ronin", "movies");
    partial.user_data = Some(UserItemData {
        playback_position_ticks: 42_000_000,
        ..Default::default()
    });
    server.add_item(partial);

    let mut episode = MediaItem::new("e1", "Pilot", ItemType::Episode);
    episode.parent_id = Some(ItemId::new("shows"));
    server.add_item(episode);
}

async fn signed_in() -> (Arc<StubServer>, Repository) {
    let server = StubServer::new();
    server.add_account("alice", "pw");
    catalog(&server);

    let manager = Arc::new(SessionManager::new(
        Arc::new(StubTransport::new(Arc::clone(&server))),
        Arc::new(MemoryCredentialStore::new()),
    ));
    manager
        .login(URL, "alice", &"pw".into(), true)
        .await
        .unwrap();
    (server, MediaRepository::new(AuthRetryExecutor::new(manager)))
}

#[tokio::test]
async fn lists_libraries_and_their_items() {
    let (_server, repository) = signed_in().await;

    let libraries = repository.libraries().await.unwrap();
    let names: Vec<&str> = libraries.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["Movies", "Shows"]);

    let page = repository
        .library_items(&LibraryId::new("movies"), ItemQuery::new().page(1, 2))
        .await
        .unwrap();
    assert_eq!(page.total_record_count, 4);
    assert_eq!(page.start_index, 1);
    let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["m2", "m3"]);
}

#[tokio::test]
async fn search_matches_names_across_libraries() {
    let (server, repository) = signed_in().await;

    let found = repository.search("alien", 10).await.unwrap();
    let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["Alien", "Aliens"]);

    let calls = server.data_calls();
    assert!(repository.search("   ", 10).await.unwrap().is_empty());
    assert_eq!(server.data_calls(), calls);
}

#[tokio::test]
async fn latest_is_scoped_to_the_library() {
    let (_server, repository) = signed_in().await;

    let latest = repository.latest(&LibraryId::new("shows")).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id.as_str(), "e1");
}

#[tokio::test]
async fn continue_watching_lists_partially_played_items() {
    let (_server, repository) = signed_in().await;

    let resumable = repository.continue_watching().await.unwrap();
    assert_eq!(resumable.len(), 1);
    assert_eq!(resumable[0].id.as_str(), "m4");
}

#[tokio::test]
async fn watched_and_favorite_flags_round_trip_through_the_server() {
    let (server, repository) = signed_in().await;
    let id = ItemId::new("m3");

    let data = repository.mark_watched(&id).await.unwrap();
    assert!(data.played);
    assert_eq!(data.play_count, 1);
    assert!(repository.item(&id).await.unwrap().is_played());

    let data = repository.mark_unwatched(&id).await.unwrap();
    assert!(!data.played);

    assert!(repository.toggle_favorite(&id, true).await.unwrap().is_favorite);
    assert!(server.user_data(&id).unwrap().is_favorite);
    assert!(!repository.toggle_favorite(&id, false).await.unwrap().is_favorite);
}

#[tokio::test]
async fn progress_reports_reach_the_server() {
    let (server, repository) = signed_in().await;
    let progress =
        PlaybackProgress::at(ItemId::new("m1"), Duration::from_secs(90))
            .paused(true);

    repository.report_progress(&progress).await.unwrap();

    assert_eq!(server.progress_reports(), vec![progress.clone()]);
    assert_eq!(
        server
            .user_data(&ItemId::new("m1"))
            .unwrap()
            .playback_position_ticks,
        progress.position_ticks
    );
}

#[tokio::test]
async fn unknown_item_is_not_found() {
    let (_server, repository) = signed_in().await;
    let err = repository.item(&ItemId::new("missing")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound(_)));
}

#[tokio::test]
async fn expired_session_is_renewed_transparently() {
    let (server, repository) = signed_in().await;
    server.expire_all_tokens();

    let libraries = repository.libraries().await.unwrap();
    assert_eq!(libraries.len(), 2);
    assert_eq!(server.login_calls(), 2);
}

#[tokio::test]
async fn unrecoverable_expiry_reads_as_session_expired() {
    let (server, repository) = signed_in().await;
    server.set_password("alice", "rotated");
    server.expire_all_tokens();

    assert_eq!(
        repository.libraries().await.unwrap_err(),
        RepositoryError::SessionExpired
    );
    // The session is gone, so the next call asks for a sign-in
    assert_eq!(
        repository.libraries().await.unwrap_err(),
        RepositoryError::SignInRequired
    );
}

#[tokio::test]
async fn server_failures_are_reported_without_retry() {
    let (server, repository) = signed_in().await;
    server.fail_next(ClientError::from_status(503, "maintenance"));

    let err = repository.current_user().await.unwrap_err();
    assert!(matches!(err, RepositoryError::ServerFailure(msg) if msg.contains("maintenance")));
    assert_eq!(server.login_calls(), 1);

    server.fail_next(ClientError::Network("connection refused".into()));
    assert!(matches!(
        repository.current_user().await.unwrap_err(),
        RepositoryError::Unreachable(_)
    ));
}

#[tokio::test]
async fn scoped_repository_stops_on_cancel() {
    let (server, repository) = signed_in().await;
    server.set_latency(Duration::from_secs(30));

    let cancel = CancellationToken::new();
    let scoped = repository.scoped(cancel.clone());
    let call = tokio::spawn(async move { scoped.libraries().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.unwrap_err(), RepositoryError::Cancelled);

    // The unscoped original is unaffected
    server.set_latency(Duration::ZERO);
    assert!(repository.libraries().await.is_ok());
}
