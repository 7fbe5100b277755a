use reqwest::Client;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::tenant::schema_name, services::children::ChildService};

pub struct NotificationService {
    pub client: Client,
    pub fcm_api_key: Option<String>,
}

impl NotificationService {
    pub fn new(fcm_api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            fcm_api_key,
        }
    }

    /// Send a push notification to a specific user's registered devices.
    pub async fn notify_user(
        &self,
        pool: &PgPool,
        tenant: &str,
        user_id: Uuid,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> anyhow::Result<()> {
        let schema = schema_name(tenant);
        let tokens: Vec<(String, String)> = sqlx::query_as(&format!(
            r#"SELECT platform, token FROM "{schema}".push_tokens WHERE user_id = $1"#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        for (platform, token) in tokens {
            match platform.as_str() {
                // APNS devices go through FCM too
                "android" | "ios" => {
                    self.send_fcm(&token, title, body, data.clone()).await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Notify every parent linked to a child. One parent's delivery failure
    /// never blocks the others.
    pub async fn notify_child_parents(
        &self,
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> anyhow::Result<()> {
        let parents = ChildService::parent_ids(pool, tenant, child_id)
            .await
            .map_err(|e| anyhow::anyhow!("parent lookup failed: {e}"))?;

        for parent_id in parents {
            if let Err(e) = self
                .notify_user(pool, tenant, parent_id, title, body, data.clone())
                .await
            {
                tracing::warn!("push to parent {parent_id} failed: {e}");
            }
        }
        Ok(())
    }

    async fn send_fcm(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> anyhow::Result<()> {
        let api_key = match &self.fcm_api_key {
            Some(k) => k,
            None => {
                tracing::debug!("FCM not configured, skipping push notification");
                return Ok(());
            }
        };

        let mut payload = json!({
            "to": token,
            "notification": {
                "title": title,
                "body": body,
            }
        });

        if let Some(d) = data {
            payload["data"] = d;
        }

        let response = self
            .client
            .post("https://fcm.googleapis.com/fcm/send")
            .header("Authorization", format!("key={}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!("FCM error {}: {}", status, text);
        }

        Ok(())
    }
}
