//! External events (inbound mail) and the ingestion ledger record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound message as yielded by an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    /// Stable id assigned by the source (e.g. the Message-ID header)
    pub external_id: String,

    /// Raw sender, either `addr@host` or `Display Name <addr@host>`
    pub sender: String,

    pub subject: String,

    #[serde(default)]
    pub body: String,

    pub received_at: DateTime<Utc>,
}

/// A processed external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub external_id: String,

    /// Ticket created for this event
    pub ticket_id: Option<i64>,

    pub processed_at: DateTime<Utc>,
}

/// Parsed sender identity; the email address is the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    /// Lowercased address
    pub email: String,

    /// Display name from the header, if any
    pub name: Option<String>,
}

impl SenderIdentity {
    /// Parse `addr@host` or `Name <addr@host>`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("sender is empty".to_string());
        }

        let (name, address) = match (raw.find('<'), raw.rfind('>')) {
            (Some(open), Some(close)) if open < close && close == raw.len() - 1 => {
                let name = raw[..open].trim().trim_matches('"').trim();
                let name = (!name.is_empty()).then(|| name.to_string());
                (name, raw[open + 1..close].trim())
            }
            (None, None) => (None, raw),
            _ => return Err(format!("unbalanced angle brackets in sender {raw:?}")),
        };

        let email = parse_address(address)?;
        Ok(Self { email, name })
    }

    /// Display name for a newly created customer.
    ///
    /// Uses the header name when present, otherwise the address's local part
    /// split on `.`, `_` and `-` and capitalized ("jane.doe" → "Jane Doe").
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        let local = self.email.split('@').next().unwrap_or_default();
        let words: Vec<String> = local
            .split(['.', '_', '-', '+'])
            .filter(|w| !w.is_empty())
            .map(capitalize)
            .collect();

        if words.is_empty() {
            self.email.clone()
        } else {
            words.join(" ")
        }
    }
}

fn parse_address(address: &str) -> Result<String, String> {
    if address.chars().any(char::is_whitespace) {
        return Err(format!("address {address:?} contains whitespace"));
    }

    let mut parts = address.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("address {address:?} must contain exactly one '@'"));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(format!("address {address:?} has an empty local part or domain"));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(format!("address {address:?} has an invalid domain"));
    }

    Ok(address.to_ascii_lowercase())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
