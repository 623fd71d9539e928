//! Calendar service - upcoming events

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::Result;
use super::client::{Authorized, GraphClient};

const EVENT_FIELDS: &str = "id,subject,start,end,location,organizer,attendees,isOnlineMeeting,bodyPreview";

#[derive(Clone)]
pub struct CalendarService {
    client: GraphClient,
}

impl CalendarService {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Events between now and `days_ahead` days from now, earliest first.
    pub async fn list_upcoming(&self, days_ahead: i64, limit: u32) -> Result<Authorized<Value>> {
        let now = Utc::now();
        let end = now + Duration::days(days_ahead);

        let response = self
            .client
            .get(
                "/me/calendarView",
                &[
                    ("startDateTime", now.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("endDateTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("$top", limit.to_string()),
                    ("$orderby", "start/dateTime".to_string()),
                    ("$select", EVENT_FIELDS.to_string()),
                ],
            )
            .await?;

        Ok(response.map(|body| body.get("value").cloned().unwrap_or_else(|| json!([]))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::client::test_support::graph_client;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_list_upcoming() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me/calendarView")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("$top".into(), "10".into()),
                Matcher::UrlEncoded("$orderby".into(), "start/dateTime".into()),
                Matcher::Regex("startDateTime=".into()),
                Matcher::Regex("endDateTime=".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"value": [{"id": "e1", "subject": "Standup"}]}"#)
            .create_async()
            .await;

        let (client, _dir) = graph_client(&server.url(), true);
        let result = CalendarService::new(client).list_upcoming(7, 10).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result, Authorized::Done(json!([{"id": "e1", "subject": "Standup"}])));
    }

    #[tokio::test]
    async fn test_missing_value_is_empty_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/calendarView")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let (client, _dir) = graph_client(&server.url(), true);
        let result = CalendarService::new(client).list_upcoming(7, 10).await.unwrap();
        assert_eq!(result, Authorized::Done(json!([])));
    }
}
