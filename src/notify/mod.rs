//! Project webhook notifications.
//!
//! Posts a chat-style `{"text": ...}` message to every project of a page that
//! has a webhook configured. Delivery failures are logged and never reach the
//! writer of the page.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::db::DocStore;
use crate::engine::{PageEvent, PageObserver};
use crate::errors::AppError;
use crate::models::{DocId, Page};

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

pub struct WebhookNotifier {
    store: DocStore,
    client: reqwest::Client,
    public_url: String,
}

impl WebhookNotifier {
    pub fn new(store: DocStore, public_url: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            store,
            client,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn page_url(&self, id: DocId) -> String {
        format!("{}/docs/{}", self.public_url, id)
    }

    async fn message(&self, event: PageEvent, page: &Page) -> Result<String, AppError> {
        let actor_id = match event {
            PageEvent::Created => page.author_id,
            PageEvent::Updated => page.article.editor_user_id,
        };
        let actor = self
            .store
            .find_user(actor_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| actor_id.to_string());

        let headline = match event {
            PageEvent::Created => format!("Page created by {actor}"),
            PageEvent::Updated => format!("Page edited by {actor}"),
        };
        Ok(format!(
            "{}\n\n<{}|{}>",
            headline,
            self.page_url(page.id),
            page.article.title
        ))
    }
}

#[async_trait]
impl PageObserver for WebhookNotifier {
    async fn notify(&self, event: PageEvent, page: &Page) -> Result<(), AppError> {
        let mut hooks = Vec::new();
        for project_id in &page.projects {
            if let Some(url) = self
                .store
                .find_project(*project_id)
                .await?
                .and_then(|p| p.webhook_url)
            {
                hooks.push(url);
            }
        }
        if hooks.is_empty() {
            return Ok(());
        }

        let text = self.message(event, page).await?;
        for url in hooks {
            let result = self
                .client
                .post(&url)
                .json(&WebhookMessage { text: &text })
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match result {
                Ok(_) => tracing::debug!("Webhook delivered for page {}", page.id),
                Err(e) => tracing::warn!("Webhook delivery to {} failed: {}", url, e),
            }
        }

        Ok(())
    }
}
