//! Trait seams between the engine and its collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::MessageButton;

/// Outbound message gateway.
///
/// One implementation per provider (`kirana-wa` for the WhatsApp Cloud
/// API); tests substitute a mock. Every method returns the provider's
/// message id on success. The dispatcher treats any `Err` as a
/// per-recipient failure, whether the gateway rejected the message or
/// the request never got through.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, phone: &str, text: &str) -> Result<String>;

    async fn send_buttons(
        &self,
        phone: &str,
        body: &str,
        buttons: &[MessageButton],
    ) -> Result<String>;

    async fn send_template(
        &self,
        phone: &str,
        template: &str,
        lang: &str,
        params: &[String],
    ) -> Result<String>;

    async fn send_image(&self, phone: &str, image_url: &str, caption: &str) -> Result<String>;
}
