//! Integration tests for multi-user collaboration

use std::sync::Arc;
use std::time::Duration;

use vista_core::{ErrorKind, NodeId, SessionId};
use vista_services::server::protocol;
use vista_services::server::MemoryTransport;
use vista_services::*;

fn config(user: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.user_name = user.to_string();
    config.server.request_timeout_ms = 1_000;
    config.sync.interval_ms = 0;
    config
}

/// A service logged in to `server` and joined to `scene_id`
async fn collaborator(server: Arc<dyn SceneServer>, user: &str, scene_id: &str) -> SceneService {
    let mut service = SceneService::with_file_system(config(user), Arc::new(MemoryFileSystem::new()));
    service.login(server).await.unwrap();
    service.load_from_server(scene_id, "team").await.unwrap();
    service
}

async fn shared_scene(server: &LoopbackServer) -> String {
    let owner = server.login("owner", None).await.unwrap();
    let document = {
        let mut service = SceneService::with_file_system(config("owner"), Arc::new(MemoryFileSystem::new()));
        service.create_in_memory("Project").unwrap();
        service.save_to_memory().unwrap()
    };
    server
        .create_scene(&owner, "team", "Project", &document)
        .await
        .unwrap()
        .scene_id
}

fn session_of(service: &SceneService) -> SessionId {
    service.collaboration().unwrap().session_id().clone()
}

#[tokio::test]
async fn test_presence_and_messages_flow() {
    let server = LoopbackServer::new();
    let scene_id = shared_scene(&server).await;
    let mut alice = collaborator(Arc::new(server.clone()), "alice", &scene_id).await;
    let mut bob = collaborator(Arc::new(server.clone()), "bob", &scene_id).await;
    let bob_session = session_of(&bob);
    let alice_session = session_of(&alice);
    assert_ne!(alice_session, bob_session);

    let selected = NodeId::new();
    {
        let collab = alice.collaboration_mut().unwrap();
        collab
            .set_camera_positions(vec![CameraPosition::new([144.96, -37.81, 300.0], 0.3, -0.5)])
            .unwrap();
        collab.set_selected_nodes([selected]).unwrap();
        collab.set_avatar(Some(Avatar::new("https://x/avatar.glb"))).unwrap();
        collab.queue_message(bob_session.clone(), "chat", "hello bob").unwrap();
    }
    alice.tick(true).await.unwrap();

    match bob.tick(true).await.unwrap() {
        SyncResult::Synced { users, received, departed, .. } => {
            assert_eq!(users, 1);
            assert_eq!(received, 1);
            assert!(departed.is_empty());
        }
        SyncResult::Deferred => panic!("forced tick was deferred"),
    }

    let collab = bob.collaboration_mut().unwrap();
    let seen = collab.user(&alice_session).unwrap();
    assert_eq!(seen.user_name, "alice");
    assert_eq!(seen.camera_positions.len(), 1);
    assert!(seen.selected_nodes.contains(&selected));
    assert!(collab.user(&bob_session).is_none());

    let messages = collab.take_received_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload, "hello bob");
    assert_eq!(messages[0].received_from_session_id, Some(alice_session));
    assert_eq!(collab.received_messages().count(), 0);
}

#[tokio::test]
async fn test_noop_tick_is_idempotent() {
    let server = LoopbackServer::new();
    let scene_id = shared_scene(&server).await;
    let mut alice = collaborator(Arc::new(server.clone()), "alice", &scene_id).await;
    let mut bob = collaborator(Arc::new(server.clone()), "bob", &scene_id).await;
    bob.tick(true).await.unwrap();

    alice.tick(false).await.unwrap();
    let users_before: Vec<UserState> = alice.collaboration().unwrap().users().cloned().collect();
    let inbox_before = alice.collaboration().unwrap().received_messages().count();

    alice.tick(false).await.unwrap();
    let users_after: Vec<UserState> = alice.collaboration().unwrap().users().cloned().collect();
    assert_eq!(users_before, users_after);
    assert_eq!(alice.collaboration().unwrap().received_messages().count(), inbox_before);
    assert_eq!(alice.collaboration().unwrap().pending_message_count(), 0);
}

#[tokio::test]
async fn test_interval_defers_unforced_ticks() {
    let server = LoopbackServer::new();
    let scene_id = shared_scene(&server).await;
    let mut service = SceneService::with_file_system(
        {
            let mut c = config("alice");
            c.sync.interval_ms = 60_000;
            c
        },
        Arc::new(MemoryFileSystem::new()),
    );
    service.login(Arc::new(server.clone())).await.unwrap();
    service.load_from_server(&scene_id, "team").await.unwrap();

    assert!(matches!(service.tick(false).await.unwrap(), SyncResult::Synced { .. }));
    assert_eq!(service.tick(false).await.unwrap(), SyncResult::Deferred);
    assert!(matches!(service.tick(true).await.unwrap(), SyncResult::Synced { .. }));
}

#[tokio::test]
async fn test_departed_users_are_reported() {
    let server = LoopbackServer::new();
    let scene_id = shared_scene(&server).await;
    let mut alice = collaborator(Arc::new(server.clone()), "alice", &scene_id).await;
    let mut bob = collaborator(Arc::new(server.clone()), "bob", &scene_id).await;
    let bob_session = session_of(&bob);

    bob.tick(true).await.unwrap();
    alice.tick(true).await.unwrap();
    assert_eq!(alice.collaboration().unwrap().user_count(), 1);

    bob.release().await.unwrap();
    match alice.tick(true).await.unwrap() {
        SyncResult::Synced { users, departed, .. } => {
            assert_eq!(users, 0);
            assert_eq!(departed, vec![bob_session]);
        }
        SyncResult::Deferred => panic!("forced tick was deferred"),
    }
}

#[tokio::test]
async fn test_failed_tick_keeps_state_and_queue() {
    let server = LoopbackServer::new();
    let scene_id = shared_scene(&server).await;
    let mut alice = collaborator(Arc::new(server.clone()), "alice", &scene_id).await;
    let mut bob = collaborator(Arc::new(server.clone()), "bob", &scene_id).await;
    let bob_session = session_of(&bob);
    bob.tick(true).await.unwrap();
    alice.tick(true).await.unwrap();

    let collab = alice.collaboration().unwrap();
    let users_before: Vec<UserState> = collab.users().cloned().collect();
    collab.queue_message(bob_session.clone(), "first", "1").unwrap();
    collab.queue_message(bob_session, "second", "2").unwrap();

    server.set_offline(true);
    let err = alice.tick(true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
    assert!(err.is_retryable());

    let collab = alice.collaboration().unwrap();
    assert_eq!(collab.state(), CollabState::Attached);
    assert_eq!(collab.pending_message_count(), 2);
    assert_eq!(collab.users().cloned().collect::<Vec<_>>(), users_before);

    server.set_offline(false);
    alice.tick(true).await.unwrap();
    bob.tick(true).await.unwrap();
    let types: Vec<String> = bob
        .collaboration_mut()
        .unwrap()
        .take_received_messages()
        .into_iter()
        .map(|m| m.message_type)
        .collect();
    assert_eq!(types, vec!["first", "second"]);
}

#[tokio::test]
async fn test_message_queued_during_tick_waits_for_next() {
    let server = LoopbackServer::new();
    let scene_id = shared_scene(&server).await;
    let mut alice = collaborator(Arc::new(server.clone()), "alice", &scene_id).await;
    let mut bob = collaborator(Arc::new(server.clone()), "bob", &scene_id).await;
    let bob_session = session_of(&bob);
    let sender = alice.collaboration().unwrap().message_sender();

    server.set_delay(Some(Duration::from_millis(100)));
    let (tick, queued_while_syncing) = tokio::join!(alice.tick(true), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let syncing = sender.tick_in_progress();
        sender.send(bob_session.clone(), "late", "").unwrap();
        syncing
    });
    tick.unwrap();
    assert!(queued_while_syncing);
    assert_eq!(sender.pending(), 1);
    server.set_delay(None);

    bob.tick(true).await.unwrap();
    assert_eq!(bob.collaboration().unwrap().received_messages().count(), 0);

    alice.tick(true).await.unwrap();
    bob.tick(true).await.unwrap();
    assert_eq!(bob.collaboration().unwrap().received_messages().count(), 1);
}

#[tokio::test]
async fn test_collaboration_over_wire_protocol() {
    let server = LoopbackServer::new();
    let scene_id = shared_scene(&server).await;

    let mut clients = Vec::new();
    for user in ["alice", "bob"] {
        let (client_end, server_end) = MemoryTransport::pair();
        tokio::spawn(protocol::serve(
            Box::new(server_end),
            Arc::new(server.clone()),
        ));
        let remote: Arc<dyn SceneServer> =
            Arc::new(WebSocketSceneServer::with_transport(Box::new(client_end)));
        clients.push(collaborator(remote, user, &scene_id).await);
    }
    let mut bob = clients.pop().unwrap();
    let mut alice = clients.pop().unwrap();
    let bob_session = session_of(&bob);

    alice
        .collaboration()
        .unwrap()
        .queue_message(bob_session, "chat", "over the wire")
        .unwrap();
    alice.tick(true).await.unwrap();
    bob.tick(true).await.unwrap();
    let messages = bob.collaboration_mut().unwrap().take_received_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload, "over the wire");

    let root = alice.root().unwrap();
    alice.edit(|tree| tree.set_name(root, "Shared")).unwrap();
    alice.save().await.unwrap();

    bob.release().await.unwrap();
    bob.load_from_server(&scene_id, "team").await.unwrap();
    assert_eq!(bob.tree().unwrap().root_node().name(), "Shared");
}
