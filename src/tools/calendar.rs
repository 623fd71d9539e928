//! Calendar tools

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::graph::CalendarService;
use crate::Result;
use super::{int_or, Tool, ToolOutput};

/// List upcoming calendar events
///
/// Exposed under two names: `list_upcoming_events` for the coming week and
/// `list_calendar_events` for a wider planning window.
pub struct ListEventsTool {
    calendar: CalendarService,
    name: &'static str,
    description: &'static str,
    default_days: i64,
}

impl ListEventsTool {
    pub fn upcoming(calendar: CalendarService) -> Self {
        Self {
            calendar,
            name: "list_upcoming_events",
            description: "List calendar events in the coming days, earliest first. Use this to \
                          find existing commitments before proposing a schedule.",
            default_days: 7,
        }
    }

    pub fn calendar(calendar: CalendarService) -> Self {
        Self {
            calendar,
            name: "list_calendar_events",
            description: "List calendar events within a window of days from now, earliest first.",
            default_days: 7,
        }
    }
}

#[async_trait]
impl Tool for ListEventsTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days_ahead": {
                    "type": "integer",
                    "description": format!("How many days ahead to look (default {})", self.default_days)
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of events to return (default 25, max 50)"
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let days_ahead = int_or(&params, "days_ahead", self.default_days, 1, 60);
        let limit = int_or(&params, "limit", 25, 1, 50) as u32;

        tracing::debug!("{} days_ahead={} limit={}", self.name, days_ahead, limit);
        Ok(self.calendar.list_upcoming(days_ahead, limit).await?.into())
    }
}
