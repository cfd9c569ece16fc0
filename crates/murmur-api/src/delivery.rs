use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use murmur_db::Database;
use murmur_db::models::MessageRow;
use murmur_gateway::Presence;
use murmur_types::events::GatewayEvent;
use murmur_types::models::Message;

use crate::attachments::AttachmentStore;
use crate::error::{ChatError, join_error};

/// Raw attachment bytes handed to the blob-store collaborator.
pub struct OutgoingAttachment {
    pub data: Bytes,
    pub content_type: String,
}

/// Orchestrates one send: conversation resolution, attachment upload,
/// durable append, summary overwrite, best-effort push to the recipient's
/// live channel.
#[derive(Clone)]
pub struct Delivery {
    db: Arc<Database>,
    presence: Presence,
    attachments: Arc<dyn AttachmentStore>,
}

impl Delivery {
    pub fn new(db: Arc<Database>, presence: Presence, attachments: Arc<dyn AttachmentStore>) -> Self {
        Self {
            db,
            presence,
            attachments,
        }
    }

    /// Send a direct message. The message is durable once this returns Ok;
    /// the push notification is an optimization and its failure never
    /// propagates.
    pub async fn send(
        &self,
        sender: Uuid,
        recipient: Uuid,
        text: String,
        attachment: Option<OutgoingAttachment>,
    ) -> Result<Message, ChatError> {
        if sender == recipient {
            return Err(ChatError::InvalidRequest("cannot message yourself"));
        }
        if text.is_empty() && attachment.is_none() {
            return Err(ChatError::InvalidRequest(
                "message needs text or an attachment",
            ));
        }

        // Resolve or lazily create the conversation, seeding the summary
        // for the creation case. If a racing send creates it first, the
        // winner's row comes back here.
        let db = self.db.clone();
        let conversation_id = Uuid::new_v4().to_string();
        let (sender_key, recipient_key, seed) =
            (sender.to_string(), recipient.to_string(), text.clone());
        let conversation = tokio::task::spawn_blocking(move || {
            db.find_or_create_conversation(
                &conversation_id,
                &sender_key,
                &recipient_key,
                &seed,
                &sender_key,
            )
        })
        .await
        .map_err(join_error)??;

        // Attachment failure aborts the whole send before anything is
        // appended. If the append itself fails after a successful upload,
        // the blob is orphaned; the blob store owns cleaning those up.
        let attachment_url = match attachment {
            Some(upload) => Some(
                self.attachments
                    .store(upload.data, &upload.content_type)
                    .await
                    .map_err(ChatError::Attachment)?,
            ),
            None => None,
        };

        let db = self.db.clone();
        let message_id = Uuid::new_v4().to_string();
        let (cid, sid, body, url) = (
            conversation.id.clone(),
            sender.to_string(),
            text.clone(),
            attachment_url.clone(),
        );
        let row = tokio::task::spawn_blocking(move || {
            db.insert_message(&message_id, &cid, &sid, &body, url.as_deref())
        })
        .await
        .map_err(join_error)??;

        // Last-writer-wins summary; also covers the already-seeded first
        // message, where the overwrite repeats the seed values.
        let db = self.db.clone();
        let (cid, sid, summary) = (conversation.id.clone(), sender.to_string(), text.clone());
        tokio::task::spawn_blocking(move || db.update_conversation_summary(&cid, &summary, &sid))
            .await
            .map_err(join_error)??;

        let message = message_from_row(row)?;

        // Best-effort push; the message is already durable, so a closed or
        // missing channel just means the recipient polls later.
        if let Some(channel) = self.presence.lookup(recipient).await {
            if channel.send(GatewayEvent::NewMessage(message.clone())).is_err() {
                debug!("recipient {} channel closed mid-send", recipient);
            }
        }

        Ok(message)
    }
}

pub(crate) fn message_from_row(row: MessageRow) -> anyhow::Result<Message> {
    Ok(Message {
        id: row.id.parse().context("corrupt message id")?,
        conversation_id: row
            .conversation_id
            .parse()
            .context("corrupt conversation id")?,
        sender: row.sender_id.parse().context("corrupt sender id")?,
        text: row.text,
        attachment_url: row.attachment_url,
        created_at: row
            .created_at
            .parse()
            .context("corrupt message timestamp")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct StubBlobStore;

    #[async_trait]
    impl AttachmentStore for StubBlobStore {
        async fn store(&self, _data: Bytes, _content_type: &str) -> anyhow::Result<String> {
            Ok("https://blobs.test/stub".into())
        }
    }

    struct FailingBlobStore;

    #[async_trait]
    impl AttachmentStore for FailingBlobStore {
        async fn store(&self, _data: Bytes, _content_type: &str) -> anyhow::Result<String> {
            Err(anyhow!("bucket offline"))
        }
    }

    fn delivery(attachments: Arc<dyn AttachmentStore>) -> Delivery {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Delivery::new(db, Presence::new(), attachments)
    }

    #[tokio::test]
    async fn self_messaging_is_rejected() {
        let delivery = delivery(Arc::new(StubBlobStore));
        let me = Uuid::new_v4();

        let err = delivery.send(me, me, "hi".into(), None).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn empty_message_without_attachment_is_rejected() {
        let delivery = delivery(Arc::new(StubBlobStore));

        let err = delivery
            .send(Uuid::new_v4(), Uuid::new_v4(), String::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn attachment_failure_aborts_before_append() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let delivery = Delivery::new(db.clone(), Presence::new(), Arc::new(FailingBlobStore));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let err = delivery
            .send(
                a,
                b,
                String::new(),
                Some(OutgoingAttachment {
                    data: Bytes::from_static(b"\x89PNG"),
                    content_type: "image/png".into(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Attachment(_)));

        // The conversation may exist (created before the upload), but no
        // message was persisted.
        let conv = db
            .conversation_between(&a.to_string(), &b.to_string())
            .unwrap()
            .expect("conversation resolved before the upload");
        assert!(db.messages_for_conversation(&conv.id).unwrap().is_empty());
    }
}
