//! Knowledge-base trainer: turn a business website into a receptionist
//! system instruction.

use relay_core::api::TrainRequest;
use relay_core::RelayError;
use regex::Regex;

use super::responder::DEFAULT_GOAL;
use crate::auth::Caller;
use crate::state::RelayState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub title: String,
    pub description: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub context: String,
    /// True when the context was written to the tenant's knowledge base.
    pub stored: bool,
}

fn first_capture(pattern: &str, html: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Heuristic text extraction. `fallback_title` is used when the page has no title.
pub fn extract_page(html: &str, fallback_title: &str, max_chars: usize) -> PageSummary {
    let title = first_capture(r"(?is)<title[^>]*>(.*?)</title>", html)
        .unwrap_or_else(|| fallback_title.to_string());
    let description = first_capture(r#"(?is)<meta\s+name="description"\s+content="(.*?)""#, html);

    let mut text = html.to_string();
    for pattern in [
        r"(?is)<script\b[^>]*>.*?</script>",
        r"(?is)<style\b[^>]*>.*?</style>",
        r"<[^>]+>",
    ] {
        if let Ok(re) = Regex::new(pattern) {
            text = re.replace_all(&text, " ").into_owned();
        }
    }
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let body = collapsed.chars().take(max_chars).collect();

    PageSummary {
        title,
        description,
        body,
    }
}

pub fn compose_context(summary: &PageSummary, url: &str, goal: &str) -> String {
    let description = summary
        .description
        .as_deref()
        .map(|d| format!("Description: {}\n", d))
        .unwrap_or_default();

    format!(
        "YOU ARE AN AI RECEPTIONIST FOR: {title}
WEBSITE: {url}

BUSINESS GOAL: {goal}

WEBSITE SUMMARY:
{description}
Extracted Content:
{body}...

INSTRUCTIONS:
1. You represent this business. Be polite, professional, and helpful.
2. Use the content above to answer questions about services, hours, and location.
3. If the user asks about something not in the text, ask them to call the business directly.
4. Your primary goal is to: {goal}.",
        title = summary.title,
        url = url,
        goal = goal,
        description = description,
        body = summary.body,
    )
}

pub async fn fetch_page(state: &RelayState, url: &str) -> Result<String, RelayError> {
    let response = state
        .http
        .get(url)
        .header(reqwest::header::USER_AGENT, &state.config.trainer.user_agent)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::Other(format!("Failed to fetch website: {}", status)));
    }
    Ok(response.text().await?)
}

pub async fn train(
    state: &RelayState,
    caller: &Caller,
    request: TrainRequest,
) -> Result<TrainOutcome, RelayError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(RelayError::Parse("Missing URL".to_string()));
    }
    let goal = request
        .goal
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or(DEFAULT_GOAL);

    // Authorise before fetching anything on the tenant's behalf.
    let tenant = match request.tenant_id {
        Some(id) => Some(caller.tenant(state, Some(id)).await?),
        None => None,
    };

    tracing::info!(url = %url, "Scanning website");
    let html = fetch_page(state, url).await?;
    let summary = extract_page(&html, url, state.config.trainer.max_body_chars);
    let context = compose_context(&summary, url, goal);

    let stored = match tenant {
        Some(tenant) => {
            state.store.update_ai_context(tenant.tenant_id, &context).await?;
            tracing::info!(tenant_id = %tenant.tenant_id, "Knowledge base replaced from website");
            true
        }
        None => false,
    };

    Ok(TrainOutcome { context, stored })
}
