use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::RelayError;
use crate::models::{
    Channel, Conversation, ConversationStatus, ConversationUpsert, Message, Sender, TenantAddress,
    TenantIntegration, UpsertOutcome,
};
use crate::store::RelayStore;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

const TENANT_COLUMNS: &str = "tenant_id, account_sid, auth_token, phone_number, meta_page_id, \
     meta_access_token, whatsapp_phone_id, meta_instagram_id, ai_api_key, ai_context, \
     business_goal, voice_enabled, voice_id, voice_greeting, notification_phone, \
     auto_pilot_enabled, api_token";

const CONVERSATION_COLUMNS: &str = "id, tenant_id, address, address_key, channel, client_name, \
     last_message, last_message_at, status, created_at";

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create tables and indexes if they are missing.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    tenant_id: Uuid,
    address: String,
    address_key: String,
    channel: String,
    client_name: String,
    last_message: Option<String>,
    last_message_at: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = RelayError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: row.id,
            tenant_id: row.tenant_id,
            address: row.address,
            address_key: row.address_key,
            channel: row.channel.parse().map_err(RelayError::Parse)?,
            client_name: row.client_name,
            last_message: row.last_message,
            last_message_at: row.last_message_at,
            status: row.status.parse().map_err(RelayError::Parse)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    conversation: ConversationRow,
    created: bool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RelayError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender: row.sender.parse().map_err(RelayError::Parse)?,
            text: row.text,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed [`RelayStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelayStore for PgStore {
    async fn find_tenant_by_address(
        &self,
        address: TenantAddress<'_>,
    ) -> Result<Option<TenantIntegration>, RelayError> {
        let tenant = match address {
            TenantAddress::Phone(phone) => {
                sqlx::query_as::<_, TenantIntegration>(&format!(
                    "SELECT {} FROM integrations WHERE phone_number = $1 LIMIT 1",
                    TENANT_COLUMNS
                ))
                .bind(phone)
                .fetch_optional(&self.pool)
                .await?
            }
            TenantAddress::MetaId(id) => {
                sqlx::query_as::<_, TenantIntegration>(&format!(
                    r#"
                    SELECT {}
                    FROM integrations
                    WHERE meta_page_id = $1 OR whatsapp_phone_id = $1 OR meta_instagram_id = $1
                    ORDER BY CASE
                        WHEN meta_page_id = $1 THEN 0
                        WHEN whatsapp_phone_id = $1 THEN 1
                        ELSE 2
                    END
                    LIMIT 1
                    "#,
                    TENANT_COLUMNS
                ))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(tenant)
    }

    async fn get_tenant_config(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantIntegration>, RelayError> {
        let tenant = sqlx::query_as::<_, TenantIntegration>(&format!(
            "SELECT {} FROM integrations WHERE tenant_id = $1",
            TENANT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tenant)
    }

    async fn find_tenant_by_token(
        &self,
        token: &str,
    ) -> Result<Option<TenantIntegration>, RelayError> {
        if token.is_empty() {
            return Ok(None);
        }
        let tenant = sqlx::query_as::<_, TenantIntegration>(&format!(
            "SELECT {} FROM integrations WHERE api_token = $1",
            TENANT_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tenant)
    }

    async fn update_ai_context(&self, tenant_id: Uuid, context: &str) -> Result<(), RelayError> {
        let result = sqlx::query("UPDATE integrations SET ai_context = $2 WHERE tenant_id = $1")
            .bind(tenant_id)
            .bind(context)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RelayError::Other(format!("Tenant {} not found", tenant_id)));
        }
        Ok(())
    }

    async fn upsert_conversation(
        &self,
        upsert: &ConversationUpsert,
    ) -> Result<UpsertOutcome, RelayError> {
        // xmax is zero only for freshly inserted tuples.
        let row = sqlx::query_as::<_, UpsertRow>(&format!(
            r#"
            INSERT INTO conversations
                (id, tenant_id, address, address_key, channel, client_name,
                 last_message, last_message_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now(), 'new')
            ON CONFLICT (tenant_id, address_key, channel) DO UPDATE
                SET last_message = EXCLUDED.last_message,
                    last_message_at = now(),
                    status = 'new'
            RETURNING {}, (xmax = 0) AS created
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(upsert.tenant_id)
        .bind(&upsert.address)
        .bind(&upsert.address_key)
        .bind(upsert.channel.as_str())
        .bind(&upsert.client_name)
        .bind(&upsert.seed_text)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertOutcome {
            conversation: row.conversation.try_into()?,
            created: row.created,
        })
    }

    async fn find_conversation(
        &self,
        tenant_id: Uuid,
        address_key: &str,
        channel: Channel,
    ) -> Result<Option<Conversation>, RelayError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE tenant_id = $1 AND address_key = $2 AND channel = $3",
            CONVERSATION_COLUMNS
        ))
        .bind(tenant_id)
        .bind(address_key)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Conversation::try_from).transpose()
    }

    async fn get_conversation(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, RelayError> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE id = $1 AND tenant_id = $2",
            CONVERSATION_COLUMNS
        ))
        .bind(conversation_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Conversation::try_from).transpose()
    }

    async fn touch_conversation(
        &self,
        conversation_id: Uuid,
        last_message: &str,
        status: ConversationStatus,
    ) -> Result<(), RelayError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message = $2, last_message_at = now(), status = $3
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(last_message)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RelayError::ConversationNotFound(conversation_id));
        }
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Sender,
        text: &str,
    ) -> Result<Message, RelayError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, conversation_id, sender, text)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, sender, text, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender.as_str())
        .bind(text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                RelayError::ConversationNotFound(conversation_id)
            }
            other => RelayError::Database(other),
        })?;
        row.try_into()
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, RelayError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender, text, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn health(&self) -> Result<String, RelayError> {
        Ok(health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
