//! WhatsApp Business Cloud API outbound client.
//!
//! Uses the official WhatsApp Business Platform (Cloud API) for messaging.
//! Requires: Access Token + Phone Number ID from Meta Business Suite.
//! Implements the `MessageSender` seam the dispatcher and reminder engine
//! send through.

use async_trait::async_trait;
use kirana_core::config::WhatsAppConfig;
use kirana_core::error::{KiranaError, Result};
use kirana_core::traits::MessageSender;
use kirana_core::types::MessageButton;

/// WhatsApp Cloud API client.
pub struct WaClient {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WaClient {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.config.api_base, self.config.phone_number_id)
    }

    /// Verify the configured credentials by fetching the phone number
    /// record. Called once at startup; sends still go out (and fail per
    /// recipient) if this is skipped.
    pub async fn verify(&self) -> Result<()> {
        if self.config.access_token.is_empty() {
            return Err(KiranaError::Config("whatsapp access_token not configured".into()));
        }
        if self.config.phone_number_id.is_empty() {
            return Err(KiranaError::Config("whatsapp phone_number_id not configured".into()));
        }

        let url = format!("{}/{}", self.config.api_base, self.config.phone_number_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| KiranaError::Gateway(format!("whatsapp verification failed: {e}")))?;

        if response.status().is_success() {
            tracing::info!(
                "WhatsApp Business: connected (phone_id={})",
                self.config.phone_number_id
            );
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(KiranaError::Gateway(format!("whatsapp token verification failed: {text}")))
        }
    }

    /// POST a message payload and extract the gateway message id.
    async fn post_message(&self, body: serde_json::Value) -> Result<String> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| KiranaError::Gateway(format!("whatsapp request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KiranaError::Gateway(format!("whatsapp api error {status}: {error_text}")));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| KiranaError::Gateway(format!("invalid whatsapp response: {e}")))?;
        parse_message_id(&result)
    }
}

/// Pull `messages[0].id` out of a Cloud API send response.
fn parse_message_id(result: &serde_json::Value) -> Result<String> {
    result["messages"][0]["id"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| KiranaError::Gateway("whatsapp response missing message id".into()))
}

// ─── Payload builders ──────────────────────────────────────

fn text_payload(to: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": {
            "preview_url": false,
            "body": text
        }
    })
}

fn buttons_payload(to: &str, body: &str, buttons: &[MessageButton]) -> serde_json::Value {
    let buttons: Vec<serde_json::Value> = buttons
        .iter()
        .map(|b| {
            serde_json::json!({
                "type": "reply",
                "reply": { "id": b.id, "title": b.title }
            })
        })
        .collect();
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons }
        }
    })
}

fn template_payload(to: &str, template: &str, lang: &str, params: &[String]) -> serde_json::Value {
    let mut tpl = serde_json::json!({
        "name": template,
        "language": { "code": lang }
    });
    if !params.is_empty() {
        let parameters: Vec<serde_json::Value> = params
            .iter()
            .map(|p| serde_json::json!({ "type": "text", "text": p }))
            .collect();
        tpl["components"] = serde_json::json!([{ "type": "body", "parameters": parameters }]);
    }
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "template",
        "template": tpl
    })
}

fn image_payload(to: &str, image_url: &str, caption: &str) -> serde_json::Value {
    let mut image = serde_json::json!({ "link": image_url });
    if !caption.is_empty() {
        image["caption"] = serde_json::Value::String(caption.to_string());
    }
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "image",
        "image": image
    })
}

#[async_trait]
impl MessageSender for WaClient {
    async fn send_text(&self, phone: &str, text: &str) -> Result<String> {
        let id = self.post_message(text_payload(phone, text)).await?;
        tracing::debug!("whatsapp text sent: {} -> {}", id, phone);
        Ok(id)
    }

    async fn send_buttons(
        &self,
        phone: &str,
        body: &str,
        buttons: &[MessageButton],
    ) -> Result<String> {
        let id = self.post_message(buttons_payload(phone, body, buttons)).await?;
        tracing::debug!("whatsapp buttons sent: {} -> {}", id, phone);
        Ok(id)
    }

    async fn send_template(
        &self,
        phone: &str,
        template: &str,
        lang: &str,
        params: &[String],
    ) -> Result<String> {
        let id = self.post_message(template_payload(phone, template, lang, params)).await?;
        tracing::debug!("whatsapp template '{}' sent: {} -> {}", template, id, phone);
        Ok(id)
    }

    async fn send_image(&self, phone: &str, image_url: &str, caption: &str) -> Result<String> {
        let id = self.post_message(image_payload(phone, image_url, caption)).await?;
        tracing::debug!("whatsapp image sent: {} -> {}", id, phone);
        Ok(id)
    }
}
