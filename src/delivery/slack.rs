//! Slack incoming-webhook payloads.

use serde_json::{Value, json};

use crate::session::MessageDetails;

/// Rich Block Kit payload: header, sender fields, body, timestamp footer.
pub fn format_blocks(details: &MessageDetails) -> Value {
    json!({
        "blocks": [
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": "*WhatsApp Message*" }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*From:*\n{}", details.sender_name) },
                    { "type": "mrkdwn", "text": format!("*Number:*\n{}", details.sender_number) }
                ]
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*Message:*\n{}", details.message) }
            },
            {
                "type": "context",
                "elements": [
                    {
                        "type": "mrkdwn",
                        "text": details.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
                    }
                ]
            }
        ]
    })
}

/// Minimal plain-text payload used when the block payload is rejected.
pub fn format_fallback(details: &MessageDetails) -> Value {
    json!({ "text": format!("{}: {}", details.sender_number, details.message) })
}
