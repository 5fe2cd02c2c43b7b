use relay_core::api::{RelayRequest, RelayResponse, ReplyAction};

use crate::auth::Caller;
use crate::state::RelayState;
use crate::subsystems::{gateway, learner, responder, trainer};

/// Dispatch an operator request. Everything except `Health` needs a caller.
pub async fn handle_request(
    request: RelayRequest,
    caller: Option<&Caller>,
    state: &RelayState,
) -> RelayResponse {
    let caller = match (&request, caller) {
        (RelayRequest::Health, _) => None,
        (_, Some(caller)) => Some(caller),
        (_, None) => return RelayResponse::err("Unauthorized: missing bearer token"),
    };

    match (request, caller) {
        (RelayRequest::Health, _) => match state.store.health().await {
            Ok(detail) => RelayResponse::ok(serde_json::json!({
                "status": "healthy",
                "store": state.store.name(),
                "detail": detail,
            })),
            Err(e) => RelayResponse::err(format!("Store health check failed: {}", e)),
        },
        (RelayRequest::Send(req), Some(caller)) => {
            match gateway::send_for_caller(state, caller, req).await {
                Ok(result) => RelayResponse::ok(serde_json::json!({
                    "success": true,
                    "channel": result.channel,
                    "data": result.data,
                })),
                Err(e) => RelayResponse::err(e.to_string()),
            }
        }
        (RelayRequest::Generate(req), Some(caller)) => {
            let tenant = match caller.tenant(state, req.tenant_id).await {
                Ok(t) => t,
                Err(e) => return RelayResponse::err(e.to_string()),
            };
            match responder::reply_to_conversation(
                state,
                tenant.tenant_id,
                req.conversation_id,
                req.action,
            )
            .await
            {
                Ok(outcome) if req.action == ReplyAction::Reply => {
                    RelayResponse::ok(serde_json::json!({"reply": outcome.reply}))
                }
                Ok(outcome) => RelayResponse::ok(serde_json::json!({
                    "reply": outcome.reply,
                    "handoff": outcome.handoff,
                    "sent": outcome.sent,
                    "send_error": outcome.send_error,
                })),
                Err(e) => RelayResponse::err(e.to_string()),
            }
        }
        (RelayRequest::Train(req), Some(caller)) => {
            match trainer::train(state, caller, req).await {
                Ok(outcome) => RelayResponse::ok(serde_json::json!({
                    "success": true,
                    "context": outcome.context,
                    "stored": outcome.stored,
                })),
                Err(e) => RelayResponse::err(e.to_string()),
            }
        }
        (RelayRequest::Learn(req), Some(caller)) => {
            let tenant = match caller.tenant(state, req.tenant_id).await {
                Ok(t) => t,
                Err(e) => return RelayResponse::err(e.to_string()),
            };
            match learner::learn(state, &tenant, &req).await {
                Ok(outcome) => RelayResponse::ok(outcome.to_json()),
                Err(e) => RelayResponse::err(e.to_string()),
            }
        }
        (_, None) => RelayResponse::err("Unauthorized: missing bearer token"),
    }
}
