//! Conversation accessor: thread find-or-create and message append.

use relay_core::address::address_key;
use relay_core::models::{
    Channel, Conversation, ConversationUpsert, Message, Sender, UpsertOutcome,
};
use relay_core::{RelayError, RelayStore};
use uuid::Uuid;

use super::events::EventHub;

/// Display name given to a counterparty the first time they are seen.
pub fn display_name(channel: Channel, address: &str) -> String {
    match channel {
        Channel::Sms => "New Lead".to_string(),
        Channel::Whatsapp => {
            let digits: Vec<char> = address.chars().filter(|c| c.is_ascii_digit()).collect();
            let last4: String = digits[digits.len().saturating_sub(4)..].iter().collect();
            format!("WA User {}", last4)
        }
        Channel::Instagram => "Insta User".to_string(),
        Channel::Facebook => "Meta User".to_string(),
        Channel::Voice => "Voice Caller".to_string(),
    }
}

pub async fn find_or_create_conversation(
    store: &dyn RelayStore,
    tenant_id: Uuid,
    address: &str,
    channel: Channel,
    seed_text: &str,
) -> Result<UpsertOutcome, RelayError> {
    let upsert = ConversationUpsert {
        tenant_id,
        address: address.trim().to_string(),
        address_key: address_key(channel, address),
        channel,
        client_name: display_name(channel, address),
        seed_text: seed_text.to_string(),
    };
    let outcome = store.upsert_conversation(&upsert).await?;
    if outcome.created {
        tracing::info!(
            tenant_id = %tenant_id,
            conversation_id = %outcome.conversation.id,
            channel = %channel,
            "New conversation"
        );
    }
    Ok(outcome)
}

/// Existing thread for a counterparty, without refreshing its snapshot.
pub async fn find_conversation(
    store: &dyn RelayStore,
    tenant_id: Uuid,
    address: &str,
    channel: Channel,
) -> Result<Option<Conversation>, RelayError> {
    store
        .find_conversation(tenant_id, &address_key(channel, address), channel)
        .await
}

/// Append a message and announce it to event subscribers.
pub async fn append_message(
    store: &dyn RelayStore,
    events: &EventHub,
    conversation: &Conversation,
    sender: Sender,
    text: &str,
) -> Result<Message, RelayError> {
    let message = store.append_message(conversation.id, sender, text).await?;
    events.message_stored(conversation.tenant_id, conversation.channel, &message);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::MemoryStore;

    #[test]
    fn display_names_per_channel() {
        assert_eq!(display_name(Channel::Sms, "+15550001111"), "New Lead");
        assert_eq!(display_name(Channel::Whatsapp, "15550001111"), "WA User 1111");
        assert_eq!(display_name(Channel::Whatsapp, "12"), "WA User 12");
        assert_eq!(display_name(Channel::Instagram, "IGSID"), "Insta User");
        assert_eq!(display_name(Channel::Facebook, "PSID"), "Meta User");
        assert_eq!(display_name(Channel::Voice, "+15550001111"), "Voice Caller");
    }

    #[tokio::test]
    async fn repeated_calls_return_the_same_conversation() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();

        let first =
            find_or_create_conversation(&store, tenant_id, "+15550001111", Channel::Sms, "Hi")
                .await
                .unwrap();
        let second =
            find_or_create_conversation(&store, tenant_id, "+15550001111", Channel::Sms, "Hi")
                .await
                .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.conversation.id, second.conversation.id);
        assert_eq!(first.conversation.client_name, "New Lead");
    }

    #[tokio::test]
    async fn find_matches_formatting_variants_of_a_phone() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        assert!(find_conversation(&store, tenant_id, "+15550001111", Channel::Voice)
            .await
            .unwrap()
            .is_none());

        let created =
            find_or_create_conversation(&store, tenant_id, "+15550001111", Channel::Voice, "seed")
                .await
                .unwrap()
                .conversation;
        let found = find_conversation(&store, tenant_id, "(555) 000-1111", Channel::Voice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn append_publishes_event() {
        let store = MemoryStore::new();
        let events = EventHub::new();
        let mut rx = events.subscribe();
        let conversation = find_or_create_conversation(
            &store,
            Uuid::new_v4(),
            "15550001111",
            Channel::Whatsapp,
            "Hola",
        )
        .await
        .unwrap()
        .conversation;

        let message = append_message(&store, &events, &conversation, Sender::User, "Hola")
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.tenant_id(), conversation.tenant_id);
        assert_eq!(store.messages_for(conversation.id).await[0].id, message.id);
    }
}
