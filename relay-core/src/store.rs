//! Store handle passed explicitly into every relay component.
//!
//! `PgStore` (see [`crate::db`]) is the production backend; [`MemoryStore`]
//! backs tests and the `memory` database backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::{
    Channel, Conversation, ConversationStatus, ConversationUpsert, Message, Sender,
    TenantAddress, TenantIntegration, UpsertOutcome,
};

#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Exact-match lookup of a tenant by the column(s) for this address kind.
    async fn find_tenant_by_address(
        &self,
        address: TenantAddress<'_>,
    ) -> Result<Option<TenantIntegration>, RelayError>;

    async fn get_tenant_config(&self, tenant_id: Uuid)
        -> Result<Option<TenantIntegration>, RelayError>;

    async fn find_tenant_by_token(&self, token: &str)
        -> Result<Option<TenantIntegration>, RelayError>;

    async fn update_ai_context(&self, tenant_id: Uuid, context: &str) -> Result<(), RelayError>;

    /// Find the thread for `(tenant, address_key, channel)` and refresh its
    /// last-message snapshot with status `new`, or create it.
    async fn upsert_conversation(
        &self,
        upsert: &ConversationUpsert,
    ) -> Result<UpsertOutcome, RelayError>;

    /// Read-only thread lookup; never touches the last-message snapshot.
    async fn find_conversation(
        &self,
        tenant_id: Uuid,
        address_key: &str,
        channel: Channel,
    ) -> Result<Option<Conversation>, RelayError>;

    /// Tenant-scoped: a conversation owned by another tenant is `None`.
    async fn get_conversation(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, RelayError>;

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        last_message: &str,
        status: ConversationStatus,
    ) -> Result<(), RelayError>;

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Sender,
        text: &str,
    ) -> Result<Message, RelayError>;

    /// The newest `limit` messages, returned oldest first.
    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, RelayError>;

    async fn health(&self) -> Result<String, RelayError>;

    fn name(&self) -> &str;
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
struct MemoryInner {
    tenants: Vec<TenantIntegration>,
    conversations: HashMap<Uuid, Conversation>,
    thread_index: HashMap<(Uuid, String, Channel), Uuid>,
    messages: Vec<Message>,
}

/// In-process store; every operation holds the lock for its full duration,
/// so concurrent upserts for one thread cannot create duplicates.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants(tenants: Vec<TenantIntegration>) -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                tenants,
                ..Default::default()
            }),
        }
    }

    pub async fn conversations_for(&self, tenant_id: Uuid) -> Vec<Conversation> {
        let inner = self.inner.read().await;
        let mut list: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.created_at);
        list
    }

    pub async fn messages_for(&self, conversation_id: Uuid) -> Vec<Message> {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

fn matches(value: &Option<String>, needle: &str) -> bool {
    value.as_deref() == Some(needle)
}

#[async_trait]
impl RelayStore for MemoryStore {
    async fn find_tenant_by_address(
        &self,
        address: TenantAddress<'_>,
    ) -> Result<Option<TenantIntegration>, RelayError> {
        let inner = self.inner.read().await;
        let found = match address {
            TenantAddress::Phone(phone) => inner
                .tenants
                .iter()
                .find(|t| matches(&t.phone_number, phone)),
            // Column priority mirrors the Postgres ORDER BY.
            TenantAddress::MetaId(id) => inner
                .tenants
                .iter()
                .find(|t| matches(&t.meta_page_id, id))
                .or_else(|| inner.tenants.iter().find(|t| matches(&t.whatsapp_phone_id, id)))
                .or_else(|| inner.tenants.iter().find(|t| matches(&t.meta_instagram_id, id))),
        };
        Ok(found.cloned())
    }

    async fn get_tenant_config(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantIntegration>, RelayError> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.iter().find(|t| t.tenant_id == tenant_id).cloned())
    }

    async fn find_tenant_by_token(
        &self,
        token: &str,
    ) -> Result<Option<TenantIntegration>, RelayError> {
        if token.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .iter()
            .find(|t| matches(&t.api_token, token))
            .cloned())
    }

    async fn update_ai_context(&self, tenant_id: Uuid, context: &str) -> Result<(), RelayError> {
        let mut inner = self.inner.write().await;
        match inner.tenants.iter_mut().find(|t| t.tenant_id == tenant_id) {
            Some(tenant) => {
                tenant.ai_context = Some(context.to_string());
                Ok(())
            }
            None => Err(RelayError::Other(format!("Tenant {} not found", tenant_id))),
        }
    }

    async fn upsert_conversation(
        &self,
        upsert: &ConversationUpsert,
    ) -> Result<UpsertOutcome, RelayError> {
        let mut inner = self.inner.write().await;
        let key = (upsert.tenant_id, upsert.address_key.clone(), upsert.channel);
        let now = Utc::now();

        if let Some(id) = inner.thread_index.get(&key).copied() {
            if let Some(conversation) = inner.conversations.get_mut(&id) {
                conversation.last_message = Some(upsert.seed_text.clone());
                conversation.last_message_at = now;
                conversation.status = ConversationStatus::New;
                return Ok(UpsertOutcome {
                    conversation: conversation.clone(),
                    created: false,
                });
            }
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            tenant_id: upsert.tenant_id,
            address: upsert.address.clone(),
            address_key: upsert.address_key.clone(),
            channel: upsert.channel,
            client_name: upsert.client_name.clone(),
            last_message: Some(upsert.seed_text.clone()),
            last_message_at: now,
            status: ConversationStatus::New,
            created_at: now,
        };
        inner.thread_index.insert(key, conversation.id);
        inner.conversations.insert(conversation.id, conversation.clone());
        Ok(UpsertOutcome {
            conversation,
            created: true,
        })
    }

    async fn find_conversation(
        &self,
        tenant_id: Uuid,
        address_key: &str,
        channel: Channel,
    ) -> Result<Option<Conversation>, RelayError> {
        let inner = self.inner.read().await;
        Ok(inner
            .thread_index
            .get(&(tenant_id, address_key.to_string(), channel))
            .and_then(|id| inner.conversations.get(id))
            .cloned())
    }

    async fn get_conversation(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, RelayError> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .get(&conversation_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        last_message: &str,
        status: ConversationStatus,
    ) -> Result<(), RelayError> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or(RelayError::ConversationNotFound(conversation_id))?;
        conversation.last_message = Some(last_message.to_string());
        conversation.last_message_at = Utc::now();
        conversation.status = status;
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Sender,
        text: &str,
    ) -> Result<Message, RelayError> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&conversation_id) {
            return Err(RelayError::ConversationNotFound(conversation_id));
        }
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, RelayError> {
        let inner = self.inner.read().await;
        let thread: Vec<&Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        let start = thread.len().saturating_sub(limit);
        Ok(thread[start..].iter().map(|m| (*m).clone()).collect())
    }

    async fn health(&self) -> Result<String, RelayError> {
        let inner = self.inner.read().await;
        Ok(format!(
            "memory ({} tenants, {} conversations)",
            inner.tenants.len(),
            inner.conversations.len()
        ))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::address_key;

    fn upsert_for(tenant_id: Uuid, address: &str, channel: Channel, text: &str) -> ConversationUpsert {
        ConversationUpsert {
            tenant_id,
            address: address.to_string(),
            address_key: address_key(channel, address),
            channel,
            client_name: "New Lead".to_string(),
            seed_text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn second_upsert_updates_the_same_thread() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();

        let first = store
            .upsert_conversation(&upsert_for(tenant, "+15550001111", Channel::Sms, "Hi"))
            .await
            .unwrap();
        assert!(first.created);

        store
            .touch_conversation(first.conversation.id, "reply", ConversationStatus::Replied)
            .await
            .unwrap();

        let second = store
            .upsert_conversation(&upsert_for(tenant, "5550001111", Channel::Sms, "Again"))
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.conversation.id, first.conversation.id);
        assert_eq!(second.conversation.status, ConversationStatus::New);
        assert_eq!(second.conversation.last_message.as_deref(), Some("Again"));
        assert_eq!(store.conversations_for(tenant).await.len(), 1);
    }

    #[tokio::test]
    async fn threads_are_separated_by_channel_and_tenant() {
        let store = MemoryStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let sms = store
            .upsert_conversation(&upsert_for(tenant_a, "+15550001111", Channel::Sms, "a"))
            .await
            .unwrap();
        let voice = store
            .upsert_conversation(&upsert_for(tenant_a, "+15550001111", Channel::Voice, "b"))
            .await
            .unwrap();
        let other = store
            .upsert_conversation(&upsert_for(tenant_b, "+15550001111", Channel::Sms, "c"))
            .await
            .unwrap();

        assert_ne!(sms.conversation.id, voice.conversation.id);
        assert_ne!(sms.conversation.id, other.conversation.id);
        assert!(store
            .get_conversation(tenant_b, sms.conversation.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn recent_messages_are_chronological_and_bounded() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let conv = store
            .upsert_conversation(&upsert_for(tenant, "+15550001111", Channel::Sms, "m0"))
            .await
            .unwrap()
            .conversation;

        for i in 0..7 {
            let sender = if i % 2 == 0 { Sender::User } else { Sender::Ai };
            store
                .append_message(conv.id, sender, &format!("m{}", i))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(conv.id, 3).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m4", "m5", "m6"]);
    }

    #[tokio::test]
    async fn meta_lookup_prefers_page_id_column() {
        let mut by_instagram = TenantIntegration::new(Uuid::new_v4());
        by_instagram.meta_instagram_id = Some("shared-id".to_string());
        let mut by_page = TenantIntegration::new(Uuid::new_v4());
        by_page.meta_page_id = Some("shared-id".to_string());

        let store = MemoryStore::with_tenants(vec![by_instagram, by_page.clone()]);
        let found = store
            .find_tenant_by_address(TenantAddress::MetaId("shared-id"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.tenant_id, by_page.tenant_id);
    }

    #[tokio::test]
    async fn find_conversation_leaves_the_snapshot_alone() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();

        assert!(store
            .find_conversation(tenant, "5550001111", Channel::Voice)
            .await
            .unwrap()
            .is_none());

        let created = store
            .upsert_conversation(&upsert_for(tenant, "+15550001111", Channel::Voice, "seed"))
            .await
            .unwrap()
            .conversation;
        store
            .touch_conversation(created.id, "latest", ConversationStatus::Replied)
            .await
            .unwrap();

        let found = store
            .find_conversation(tenant, &created.address_key, Channel::Voice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.last_message.as_deref(), Some("latest"));
        assert_eq!(found.status, ConversationStatus::Replied);

        assert!(store
            .find_conversation(tenant, &created.address_key, Channel::Sms)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_fails() {
        let store = MemoryStore::new();
        let err = store
            .append_message(Uuid::new_v4(), Sender::User, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ConversationNotFound(_)));
    }
}
