//! Shared test double for the outbound gateway.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kirana_core::error::{KiranaError, Result};
use kirana_core::traits::MessageSender;
use kirana_core::types::MessageButton;

/// One recorded outbound message.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub phone: String,
    pub kind: &'static str,
    pub body: String,
}

type SendHook = Box<dyn Fn(usize, &str) + Send + Sync>;

/// Records every send; phones in `fail_phones` error instead. The
/// optional hook fires after each successful send with the send index,
/// which lets a test pause a campaign mid-batch.
#[derive(Default)]
pub struct MockSender {
    pub sent: Mutex<Vec<SentMessage>>,
    pub fail_phones: Mutex<HashSet<String>>,
    counter: AtomicU64,
    pub on_send: Mutex<Option<SendHook>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, phone: &str) {
        self.fail_phones.lock().unwrap().insert(phone.to_string());
    }

    pub fn sent_phones(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.phone.clone()).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn record(&self, phone: &str, kind: &'static str, body: &str) -> Result<String> {
        if self.fail_phones.lock().unwrap().contains(phone) {
            return Err(KiranaError::Gateway(format!("mock gateway rejected {phone}")));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            phone: phone.to_string(),
            kind,
            body: body.to_string(),
        });
        if let Some(hook) = self.on_send.lock().unwrap().as_ref() {
            hook(n as usize, phone);
        }
        Ok(format!("wamid.mock-{n}"))
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send_text(&self, phone: &str, text: &str) -> Result<String> {
        self.record(phone, "text", text)
    }

    async fn send_buttons(
        &self,
        phone: &str,
        body: &str,
        _buttons: &[MessageButton],
    ) -> Result<String> {
        self.record(phone, "buttons", body)
    }

    async fn send_template(
        &self,
        phone: &str,
        template: &str,
        _lang: &str,
        _params: &[String],
    ) -> Result<String> {
        self.record(phone, "template", template)
    }

    async fn send_image(&self, phone: &str, image_url: &str, _caption: &str) -> Result<String> {
        self.record(phone, "image", image_url)
    }
}
