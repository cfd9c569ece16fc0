//! End-to-end exercises of the send pipeline: conversation reuse, summary
//! overwrites, push delivery, and the offline fallback to history reads.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{Extension, extract::State};
use bytes::Bytes;
use uuid::Uuid;

use murmur_api::attachments::AttachmentStore;
use murmur_api::conversations;
use murmur_api::delivery::{Delivery, OutgoingAttachment};
use murmur_api::error::ChatError;
use murmur_api::profiles::ProfileDirectory;
use murmur_api::state::AppStateInner;
use murmur_db::Database;
use murmur_gateway::Presence;
use murmur_types::api::Claims;
use murmur_types::events::GatewayEvent;
use murmur_types::models::Profile;

struct StubBlobStore;

#[async_trait]
impl AttachmentStore for StubBlobStore {
    async fn store(&self, _data: Bytes, _content_type: &str) -> anyhow::Result<String> {
        Ok("https://blobs.test/object-1".into())
    }
}

/// Profile directory that knows every user as "user-<first 8 uuid chars>".
struct CannedProfiles;

#[async_trait]
impl ProfileDirectory for CannedProfiles {
    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        Ok(Some(Profile {
            username: format!("user-{}", &user_id.to_string()[..8]),
            profile_pic: "https://pics.test/default.png".into(),
        }))
    }
}

struct NoProfiles;

#[async_trait]
impl ProfileDirectory for NoProfiles {
    async fn profile(&self, _user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        Err(anyhow!("user service down"))
    }
}

fn setup() -> (Arc<Database>, Presence, Delivery) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let presence = Presence::new();
    let delivery = Delivery::new(db.clone(), presence.clone(), Arc::new(StubBlobStore));
    (db, presence, delivery)
}

fn claims(user: Uuid) -> Claims {
    Claims {
        sub: user,
        exp: 2_000_000_000,
    }
}

#[tokio::test]
async fn first_exchange_creates_and_reuses_one_conversation() {
    let (db, _presence, delivery) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let hi = delivery.send(a, b, "hi".into(), None).await.unwrap();
    assert_eq!(hi.sender, a);
    assert_eq!(hi.text, "hi");

    let conv = db
        .conversation_between(&a.to_string(), &b.to_string())
        .unwrap()
        .expect("conversation created on first message");
    assert_eq!(conv.last_message_text, "hi");
    assert_eq!(conv.last_message_sender, a.to_string());

    let hello = delivery.send(b, a, "hello".into(), None).await.unwrap();
    assert_eq!(hello.conversation_id, hi.conversation_id);

    let conv = db
        .conversation_between(&b.to_string(), &a.to_string())
        .unwrap()
        .unwrap();
    assert_eq!(conv.last_message_text, "hello");
    assert_eq!(conv.last_message_sender, b.to_string());

    let texts: Vec<String> = db
        .messages_for_conversation(&conv.id)
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, ["hi", "hello"]);
}

#[tokio::test]
async fn offline_recipient_still_gets_a_durable_message() {
    let (db, presence, delivery) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    assert!(presence.lookup(b).await.is_none());

    let sent = delivery.send(a, b, "you there?".into(), None).await.unwrap();

    let rows = db
        .messages_for_conversation(&sent.conversation_id.to_string())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, sent.id.to_string());
}

#[tokio::test]
async fn connected_recipient_receives_exactly_one_push() {
    let (_db, presence, delivery) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let (_conn, mut events) = presence.register(b).await;

    let sent = delivery.send(a, b, "ping".into(), None).await.unwrap();

    match events.recv().await {
        Some(GatewayEvent::NewMessage(pushed)) => assert_eq!(pushed, sent),
        other => panic!("expected NewMessage, got {:?}", other),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn attachment_only_message_is_allowed() {
    let (db, _presence, delivery) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let sent = delivery
        .send(
            a,
            b,
            String::new(),
            Some(OutgoingAttachment {
                data: Bytes::from_static(b"\x89PNG..."),
                content_type: "image/png".into(),
            }),
        )
        .await
        .unwrap();

    assert!(sent.text.is_empty());
    assert_eq!(sent.attachment_url.as_deref(), Some("https://blobs.test/object-1"));

    let rows = db
        .messages_for_conversation(&sent.conversation_id.to_string())
        .unwrap();
    assert_eq!(rows[0].attachment_url, sent.attachment_url);

    // No text and no attachment is not a message.
    let err = delivery.send(a, b, String::new(), None).await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidRequest(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_first_sends_share_one_conversation() {
    let (db, _presence, delivery) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let mut handles = Vec::new();
    for i in 0..8 {
        let delivery = delivery.clone();
        // Alternate direction so both orderings race on creation.
        let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
        handles.push(tokio::spawn(async move {
            delivery.send(from, to, format!("m{}", i), None).await
        }));
    }

    let mut conversation_ids = Vec::new();
    for handle in handles {
        let message = handle.await.unwrap().unwrap();
        conversation_ids.push(message.conversation_id);
    }

    conversation_ids.dedup();
    assert_eq!(conversation_ids.len(), 1, "all sends share one conversation");

    assert_eq!(db.conversations_for_user(&a.to_string()).unwrap().len(), 1);
    let rows = db
        .messages_for_conversation(&conversation_ids[0].to_string())
        .unwrap();
    assert_eq!(rows.len(), 8);
}

#[tokio::test]
async fn listing_shows_counterpart_not_caller() {
    let (db, _presence, delivery) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    delivery.send(a, b, "hi".into(), None).await.unwrap();

    let state = Arc::new(AppStateInner {
        db,
        delivery,
        profiles: Arc::new(CannedProfiles),
    });

    let axum::Json(listed) =
        conversations::list_conversations(State(state), Extension(claims(a)))
            .await
            .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].counterpart.user_id, b);
    assert_eq!(
        listed[0].counterpart.profile.username,
        format!("user-{}", &b.to_string()[..8])
    );
    assert_eq!(listed[0].last_message.text, "hi");
    assert_eq!(listed[0].last_message.sender, a);
}

#[tokio::test]
async fn listing_survives_profile_outage() {
    let (db, _presence, delivery) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    delivery.send(a, b, "hi".into(), None).await.unwrap();

    let state = Arc::new(AppStateInner {
        db,
        delivery,
        profiles: Arc::new(NoProfiles),
    });

    let axum::Json(listed) =
        conversations::list_conversations(State(state), Extension(claims(a)))
            .await
            .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].counterpart.user_id, b);
    assert!(listed[0].counterpart.profile.username.is_empty());
}
