//! Microsoft Graph access
//!
//! [`GraphClient`] owns the HTTP plumbing and bearer injection; the mail and
//! calendar services are thin wrappers that shape requests and responses.

mod calendar;
mod client;
mod mail;

pub use calendar::CalendarService;
pub use client::{Authorized, GraphClient};
pub use mail::{MailService, FLAG_STATUSES};

#[cfg(test)]
pub(crate) use client::test_support;
