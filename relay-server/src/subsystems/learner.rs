//! Knowledge-base learner: fold facts from operator replies into the
//! tenant's knowledge base.

use relay_core::api::LearnRequest;
use relay_core::models::TenantIntegration;
use relay_core::{GenerationRequest, RelayError, Turn};

use crate::state::RelayState;

/// Model answer meaning the reply carried nothing new.
pub const NO_CHANGE: &str = "NO_CHANGE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnOutcome {
    Skipped(&'static str),
    Updated(bool),
}

impl LearnOutcome {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LearnOutcome::Skipped(reason) => serde_json::json!({"skipped": true, "reason": reason}),
            LearnOutcome::Updated(updated) => serde_json::json!({"success": true, "updated": updated}),
        }
    }
}

pub fn merge_prompt(knowledge_base: &str, question: &str, reply: &str) -> String {
    format!(
        "CURRENT KNOWLEDGE BASE:
\"{knowledge_base}\"

NEW INTERACTION:
User asked: \"{question}\"
Admin replied: \"{reply}\"

TASK:
Analyze the Admin's reply. Does it contain NEW factual information about the business (e.g. prices, hours, policy, location) that is NOT in the Current Knowledge Base?

If YES: Merge the new facts into the Knowledge Base. Keep it concise, organized, and professional. Return ONLY the updated Knowledge Base text.
If NO (e.g. just a greeting or confirmation): Return the string \"{NO_CHANGE}\"."
    )
}

pub async fn learn(
    state: &RelayState,
    tenant: &TenantIntegration,
    request: &LearnRequest,
) -> Result<LearnOutcome, RelayError> {
    let question = request.user_question.trim();
    let reply = request.admin_reply.trim();
    if question.is_empty() || reply.is_empty() {
        return Ok(LearnOutcome::Skipped("Missing input"));
    }

    let ai = tenant.ai_config();
    let Some(api_key) = ai.api_key.as_deref() else {
        return Ok(LearnOutcome::Skipped("No API Key"));
    };

    let prompt = merge_prompt(ai.knowledge_base.as_deref().unwrap_or(""), question, reply);
    let request = GenerationRequest {
        system_instruction: None,
        turns: vec![Turn::user(prompt)],
        max_output_tokens: state.config.ai.learner_max_output_tokens,
    };
    let merged = state.model.generate(api_key, &request).await?;
    let merged = merged.trim();

    if merged.is_empty() || merged == NO_CHANGE {
        tracing::debug!(tenant_id = %tenant.tenant_id, "No new facts in operator reply");
        return Ok(LearnOutcome::Updated(false));
    }

    state.store.update_ai_context(tenant.tenant_id, merged).await?;
    tracing::info!(tenant_id = %tenant.tenant_id, "Knowledge base updated from operator reply");
    Ok(LearnOutcome::Updated(true))
}
