//! Mail tools - list recent mail and act on individual messages

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::graph::{MailService, FLAG_STATUSES};
use crate::Result;
use super::{int_or, optional_str, required_str, string_list, Tool, ToolOutput};

const MAX_LIST_LIMIT: i64 = 50;
const DEFAULT_LIST_LIMIT: i64 = 20;

/// List recent inbox messages
pub struct ListEmailsTool {
    mail: MailService,
    default_days: i64,
}

impl ListEmailsTool {
    pub fn new(mail: MailService, default_days: i64) -> Self {
        Self { mail, default_days }
    }
}

#[async_trait]
impl Tool for ListEmailsTool {
    fn name(&self) -> &str {
        "list_emails"
    }

    fn description(&self) -> &str {
        "List recent emails in the inbox, newest first. Returns id, subject, sender, \
         received time, importance, read state, flag and a short preview for each message."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "description": format!("How many days back to look (default {})", self.default_days)
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of messages to return (default 20, max 50)"
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let days = int_or(&params, "days", self.default_days, 1, 30);
        let limit = int_or(&params, "limit", DEFAULT_LIST_LIMIT, 1, MAX_LIST_LIMIT) as u32;

        tracing::debug!("list_emails days={} limit={}", days, limit);
        Ok(self.mail.list_recent(days, limit).await?.into())
    }
}

/// Forward a message to one or more recipients
pub struct ForwardEmailTool {
    mail: MailService,
}

impl ForwardEmailTool {
    pub fn new(mail: MailService) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for ForwardEmailTool {
    fn name(&self) -> &str {
        "forward_email"
    }

    fn description(&self) -> &str {
        "Forward an email to one or more recipients with an optional comment."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string", "description": "Id of the message to forward"},
                "to_recipients": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Email addresses to forward to"
                },
                "comment": {"type": "string", "description": "Optional note added above the forwarded message"}
            },
            "required": ["email_id", "to_recipients"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let id = required_str(&params, "email_id")?;
        let to = string_list(&params, "to_recipients")?;
        let comment = optional_str(&params, "comment");

        Ok(self.mail.forward(id, &to, comment).await?.into())
    }
}

/// Reply to the sender of a message
pub struct ReplyEmailTool {
    mail: MailService,
}

impl ReplyEmailTool {
    pub fn new(mail: MailService) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for ReplyEmailTool {
    fn name(&self) -> &str {
        "reply_email"
    }

    fn description(&self) -> &str {
        "Reply to the sender of an email."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string", "description": "Id of the message to reply to"},
                "body": {"type": "string", "description": "Reply text"}
            },
            "required": ["email_id", "body"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let id = required_str(&params, "email_id")?;
        let body = required_str(&params, "body")?;

        Ok(self.mail.reply(id, body).await?.into())
    }
}

/// Reply to the sender and every recipient of a message
pub struct ReplyAllEmailTool {
    mail: MailService,
}

impl ReplyAllEmailTool {
    pub fn new(mail: MailService) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for ReplyAllEmailTool {
    fn name(&self) -> &str {
        "reply_all_email"
    }

    fn description(&self) -> &str {
        "Reply to the sender and all recipients of an email."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string", "description": "Id of the message to reply to"},
                "body": {"type": "string", "description": "Reply text"}
            },
            "required": ["email_id", "body"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let id = required_str(&params, "email_id")?;
        let body = required_str(&params, "body")?;

        Ok(self.mail.reply_all(id, body).await?.into())
    }
}

/// Reply privately to a single person from a thread
pub struct ReplyToRecipientTool {
    mail: MailService,
}

impl ReplyToRecipientTool {
    pub fn new(mail: MailService) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for ReplyToRecipientTool {
    fn name(&self) -> &str {
        "reply_to_specific_recipient"
    }

    fn description(&self) -> &str {
        "Send a reply about an email to one specific person only. The subject defaults to \
         'Re: <original subject>'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string", "description": "Id of the original message"},
                "recipient": {"type": "string", "description": "Email address of the person to reply to"},
                "body": {"type": "string", "description": "Reply text"},
                "subject": {"type": "string", "description": "Optional subject override"}
            },
            "required": ["email_id", "recipient", "body"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let id = required_str(&params, "email_id")?;
        let recipient = required_str(&params, "recipient")?;
        let body = required_str(&params, "body")?;
        let subject = optional_str(&params, "subject");

        Ok(self.mail.reply_to_recipient(id, recipient, body, subject).await?.into())
    }
}

/// Set the follow-up flag on a message
pub struct FlagEmailTool {
    mail: MailService,
}

impl FlagEmailTool {
    pub fn new(mail: MailService) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for FlagEmailTool {
    fn name(&self) -> &str {
        "flag_email"
    }

    fn description(&self) -> &str {
        "Flag an email for follow-up, mark the flag complete, or clear it."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string", "description": "Id of the message"},
                "flag_status": {
                    "type": "string",
                    "enum": FLAG_STATUSES,
                    "description": "New flag status (default flagged)"
                }
            },
            "required": ["email_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let id = required_str(&params, "email_id")?;
        let status = optional_str(&params, "flag_status").unwrap_or("flagged");

        Ok(self.mail.flag(id, status).await?.into())
    }
}

/// Mark a message read or unread
///
/// Registered twice, once per direction, so the model picks the intent by name.
pub struct MarkEmailTool {
    mail: MailService,
    read: bool,
}

impl MarkEmailTool {
    pub fn read(mail: MailService) -> Self {
        Self { mail, read: true }
    }

    pub fn unread(mail: MailService) -> Self {
        Self { mail, read: false }
    }
}

#[async_trait]
impl Tool for MarkEmailTool {
    fn name(&self) -> &str {
        if self.read {
            "mark_email_as_read"
        } else {
            "mark_email_as_unread"
        }
    }

    fn description(&self) -> &str {
        if self.read {
            "Mark an email as read."
        } else {
            "Mark an email as unread."
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string", "description": "Id of the message"}
            },
            "required": ["email_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let id = required_str(&params, "email_id")?;
        Ok(self.mail.set_read(id, self.read).await?.into())
    }
}

/// Create a new top-level mail folder
pub struct CreateMailFolderTool {
    mail: MailService,
}

impl CreateMailFolderTool {
    pub fn new(mail: MailService) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for CreateMailFolderTool {
    fn name(&self) -> &str {
        "create_mail_folder"
    }

    fn description(&self) -> &str {
        "Create a new mail folder in the mailbox root."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "folder_name": {"type": "string", "description": "Display name of the new folder"}
            },
            "required": ["folder_name"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let name = required_str(&params, "folder_name")?;
        Ok(self.mail.create_folder(name).await?.into())
    }
}
