//! relay-cli: operator frontend for the relay HTTP API
//!
//! # Subcommands
//! - `status`                                     : show server health
//! - `send <to> <body> [--channel] [--tenant]`    : outbound message through the gateway
//! - `reply <conversation_id> [--send] [--tenant]`: generate an AI reply
//! - `train <url> [--goal] [--tenant]`            : build a knowledge base from a website
//! - `simulate-sms <from> <to> <body>`            : post a synthetic inbound SMS webhook

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "relay-cli", version, about = "Operator CLI for the inbound message relay")]
struct Cli {
    /// Relay HTTP server URL (overrides RELAY_HTTP_URL env var)
    #[arg(long, env = "RELAY_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Tenant API token or service key
    #[arg(long, env = "RELAY_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show relay server status
    Status,

    /// Send a message through the outbound gateway
    Send {
        to: String,
        body: String,

        /// sms, facebook, instagram or whatsapp
        #[arg(long, default_value = "sms")]
        channel: String,

        /// Tenant to act for (required with the service key)
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Generate an AI reply for a conversation
    Reply {
        conversation_id: String,

        /// Also store the reply and deliver it to the counterparty
        #[arg(long)]
        send: bool,

        #[arg(long)]
        tenant: Option<String>,
    },

    /// Build a knowledge base from a business website
    Train {
        url: String,

        #[arg(long)]
        goal: Option<String>,

        /// Store the result as this tenant's knowledge base
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Post a synthetic inbound SMS to the webhook
    SimulateSms { from: String, to: String, body: String },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct OperatorResult {
    pub error: Option<String>,
    pub reply: Option<String>,
    pub context: Option<String>,
    pub sent: Option<bool>,
    pub send_error: Option<String>,
}

// ============================================================================
// Request bodies
// ============================================================================

pub fn send_body(to: &str, body: &str, channel: &str, tenant: Option<&str>) -> serde_json::Value {
    let mut value = serde_json::json!({ "to": to, "body": body, "channel": channel });
    if let Some(tenant) = tenant {
        value["tenant_id"] = serde_json::json!(tenant);
    }
    value
}

pub fn reply_body(conversation_id: &str, send: bool, tenant: Option<&str>) -> serde_json::Value {
    let action = if send { "reply_and_send" } else { "reply" };
    let mut value = serde_json::json!({ "conversation_id": conversation_id, "action": action });
    if let Some(tenant) = tenant {
        value["tenant_id"] = serde_json::json!(tenant);
    }
    value
}

pub fn train_body(url: &str, goal: Option<&str>, tenant: Option<&str>) -> serde_json::Value {
    let mut value = serde_json::json!({ "url": url });
    if let Some(goal) = goal {
        value["goal"] = serde_json::json!(goal);
    }
    if let Some(tenant) = tenant {
        value["tenant_id"] = serde_json::json!(tenant);
    }
    value
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST an operator request and return the decoded body, exiting on
/// transport, auth or application errors.
fn post_operator(
    server: &str,
    token: Option<&str>,
    route: &str,
    body: &serde_json::Value,
) -> anyhow::Result<OperatorResult> {
    let Some(token) = token else {
        anyhow::bail!("--token (or RELAY_TOKEN) is required for {}", route);
    };

    let url = format!("{}{}", server, route);
    let resp = match client(60)?.post(&url).bearer_auth(token).json(body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("relay-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    if !status.is_success() {
        eprintln!("relay-cli: server returned {}: {}", status, text);
        std::process::exit(1);
    }

    let result: OperatorResult = serde_json::from_str(&text)?;
    if let Some(error) = &result.error {
        eprintln!("relay-cli: {}", error);
        std::process::exit(1);
    }
    Ok(result)
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Relay server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:        {}", body["store"].as_str().unwrap_or("?"));
            println!("Detail:       {}", body["detail"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("relay-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("relay-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn do_simulate_sms(server: &str, from: &str, to: &str, body: &str) -> anyhow::Result<()> {
    let url = format!("{}/webhooks/sms", server);
    let resp = client(30)?
        .post(&url)
        .form(&[("From", from), ("To", to), ("Body", body)])
        .send()?;
    let status = resp.status();
    println!("HTTP {}", status);
    println!("{}", resp.text().unwrap_or_default());
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let token = cli.token.as_deref();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Send { to, body, channel, tenant } => post_operator(
            &server,
            token,
            "/send",
            &send_body(&to, &body, &channel, tenant.as_deref()),
        )
        .map(|_| println!("Sent to {} via {}", to, channel)),
        Commands::Reply { conversation_id, send, tenant } => post_operator(
            &server,
            token,
            "/generate",
            &reply_body(&conversation_id, send, tenant.as_deref()),
        )
        .map(|r| {
            println!("{}", r.reply.unwrap_or_default());
            if let Some(e) = r.send_error {
                eprintln!("relay-cli: reply stored but not delivered: {}", e);
            } else if r.sent == Some(true) {
                eprintln!("(delivered)");
            }
        }),
        Commands::Train { url, goal, tenant } => post_operator(
            &server,
            token,
            "/train",
            &train_body(&url, goal.as_deref(), tenant.as_deref()),
        )
        .map(|r| println!("{}", r.context.unwrap_or_default())),
        Commands::SimulateSms { from, to, body } => do_simulate_sms(&server, &from, &to, &body),
    };

    if let Err(e) = result {
        eprintln!("relay-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
