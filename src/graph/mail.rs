//! Mail service - inbox listing and message actions

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::Result;
use crate::error::Error;
use super::client::{Authorized, GraphClient};

/// Accepted values for a message's `flag.flagStatus`.
pub const FLAG_STATUSES: &[&str] = &["flagged", "complete", "notFlagged"];

const MESSAGE_FIELDS: &str =
    "id,subject,from,toRecipients,receivedDateTime,importance,isRead,flag,bodyPreview";

fn message_path(id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    format!("/me/messages/{}", encoded)
}

fn recipients(addresses: &[String]) -> Value {
    addresses
        .iter()
        .map(|addr| json!({"emailAddress": {"address": addr}}))
        .collect()
}

fn text_body(content: &str) -> Value {
    json!({"contentType": "Text", "content": content})
}

#[derive(Clone)]
pub struct MailService {
    client: GraphClient,
}

impl MailService {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Inbox messages received in the last `days` days, newest first.
    pub async fn list_recent(&self, days: i64, limit: u32) -> Result<Authorized<Value>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .client
            .get(
                "/me/mailFolders/inbox/messages",
                &[
                    ("$top", limit.to_string()),
                    ("$filter", format!("receivedDateTime ge {}", cutoff)),
                    ("$orderby", "receivedDateTime desc".to_string()),
                    ("$select", MESSAGE_FIELDS.to_string()),
                ],
            )
            .await?;

        Ok(response.map(|body| body.get("value").cloned().unwrap_or_else(|| json!([]))))
    }

    pub async fn forward(&self, id: &str, to: &[String], comment: Option<&str>) -> Result<Authorized<Value>> {
        if to.is_empty() {
            return Err(Error::Tool("At least one recipient is required".to_string()));
        }

        let mut payload = json!({"toRecipients": recipients(to)});
        if let Some(comment) = comment.filter(|c| !c.is_empty()) {
            payload["comment"] = json!(comment);
        }

        let response = self.client.post(&format!("{}/forward", message_path(id)), &payload).await?;
        Ok(response.map(|_| json!({"status": "forwarded"})))
    }

    pub async fn reply(&self, id: &str, body: &str) -> Result<Authorized<Value>> {
        let payload = json!({"message": {"body": text_body(body)}});
        let response = self.client.post(&format!("{}/reply", message_path(id)), &payload).await?;
        Ok(response.map(|_| json!({"status": "replied"})))
    }

    pub async fn reply_all(&self, id: &str, body: &str) -> Result<Authorized<Value>> {
        let payload = json!({"message": {"body": text_body(body)}});
        let response = self.client.post(&format!("{}/replyAll", message_path(id)), &payload).await?;
        Ok(response.map(|_| json!({"status": "replied_all"})))
    }

    /// Reply to one person only, as a new message referencing the original subject.
    pub async fn reply_to_recipient(
        &self,
        original_id: &str,
        recipient: &str,
        body: &str,
        subject: Option<&str>,
    ) -> Result<Authorized<Value>> {
        let subject = match subject.filter(|s| !s.is_empty()) {
            Some(subject) => subject.to_string(),
            None => {
                let original = match self
                    .client
                    .get(&message_path(original_id), &[("$select", "subject".to_string())])
                    .await?
                {
                    Authorized::Done(original) => original,
                    Authorized::Pending(prompt) => return Ok(Authorized::Pending(prompt)),
                };
                let original_subject = original.get("subject").and_then(|s| s.as_str()).unwrap_or("");
                format!("Re: {}", original_subject)
            }
        };

        let payload = json!({
            "message": {
                "subject": subject,
                "body": text_body(body),
                "toRecipients": recipients(&[recipient.to_string()]),
            }
        });

        let response = self.client.post("/me/sendMail", &payload).await?;
        Ok(response.map(|_| json!({"status": "sent_to_specific_recipient"})))
    }

    pub async fn flag(&self, id: &str, status: &str) -> Result<Authorized<Value>> {
        if !FLAG_STATUSES.contains(&status) {
            return Err(Error::Tool(format!(
                "Invalid flag status '{}', expected one of {}",
                status,
                FLAG_STATUSES.join(", ")
            )));
        }

        let payload = json!({"flag": {"flagStatus": status}});
        let response = self.client.patch(&message_path(id), &payload).await?;
        let status = status.to_string();
        Ok(response.map(|_| json!({"status": status})))
    }

    pub async fn set_read(&self, id: &str, read: bool) -> Result<Authorized<Value>> {
        let response = self.client.patch(&message_path(id), &json!({"isRead": read})).await?;
        let status = if read { "marked_as_read" } else { "marked_as_unread" };
        Ok(response.map(|_| json!({"status": status})))
    }

    /// Create a top-level mail folder; returns the created folder.
    pub async fn create_folder(&self, name: &str) -> Result<Authorized<Value>> {
        if name.trim().is_empty() {
            return Err(Error::Tool("Folder name cannot be empty".to_string()));
        }
        self.client.post("/me/mailFolders", &json!({"displayName": name})).await
    }
}
