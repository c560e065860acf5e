//! Rate-limited campaign dispatch.
//!
//! `drain` processes one bounded batch of pending recipients for one
//! campaign: claim, send through the gateway, record the outcome per
//! recipient, sleep between sends to hold the configured
//! messages-per-minute ceiling. A pause or an exhausted tick budget is
//! honored between recipients; unprocessed claims go back to pending.

use std::sync::Arc;

use kirana_core::error::Result;
use kirana_core::traits::MessageSender;
use kirana_core::types::{CampaignStatus, MessageKind, MessageSpec};
use kirana_store::Store;
use tokio::time::{Duration, Instant};

/// Hard cap on recipients claimed per drain, whatever the rate says.
const MAX_BATCH: i64 = 50;

/// What one drain call did.
#[derive(Debug, Default, Clone, Copy)]
pub struct DrainOutcome {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Claims returned to pending because of a pause or the deadline.
    pub released: usize,
    pub completed: bool,
}

/// Sends one campaign's pending recipients at its configured rate.
pub struct Dispatcher {
    store: Arc<Store>,
    sender: Arc<dyn MessageSender>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, sender: Arc<dyn MessageSender>) -> Self {
        Self { store, sender }
    }

    /// Sleep between consecutive sends: ceil(60000 / rate) ms.
    fn gap_for(rate: i64) -> Duration {
        Duration::from_millis(((60_000 + rate - 1) / rate) as u64)
    }

    /// Batch cap per drain: min(50, ceil(rate * 5 / 60)), at least 1.
    fn batch_cap(rate: i64) -> usize {
        MAX_BATCH.min(((rate * 5 + 59) / 60).max(1)) as usize
    }

    /// Drain one bounded batch for `campaign_id`. No-op unless the
    /// campaign is currently sending.
    pub async fn drain(&self, campaign_id: &str, deadline: Instant) -> Result<DrainOutcome> {
        let campaign = self.store.get_campaign(campaign_id)?;
        let mut out = DrainOutcome::default();
        if campaign.status != CampaignStatus::Sending {
            return Ok(out);
        }

        let rate = campaign.effective_rate();
        let gap = Self::gap_for(rate);
        let batch = self.store.claim_pending(campaign_id, Self::batch_cap(rate))?;
        out.claimed = batch.len();
        let total = batch.len();

        let mut stopped = false;
        for (i, rcpt) in batch.into_iter().enumerate() {
            if !stopped && Instant::now() >= deadline {
                tracing::warn!(
                    "campaign {campaign_id}: tick budget exhausted, releasing remaining claims"
                );
                stopped = true;
            }
            if !stopped {
                // honor a pause requested mid-batch
                let live = self.store.get_campaign(campaign_id)?;
                if live.status != CampaignStatus::Sending {
                    tracing::info!(
                        "campaign {campaign_id}: now {}, stopping batch",
                        live.status.as_str()
                    );
                    stopped = true;
                }
            }
            if stopped {
                self.store.release_claim(rcpt.id)?;
                out.released += 1;
                continue;
            }

            match self.send_one(&campaign.message, &rcpt.phone).await {
                Ok(msg_id) => {
                    self.store.mark_sent(rcpt.id, campaign_id, &msg_id)?;
                    out.sent += 1;
                }
                Err(e) => {
                    tracing::debug!("campaign {campaign_id}: send to {} failed: {e}", rcpt.phone);
                    self.store.mark_failed(rcpt.id, campaign_id, &e.to_string())?;
                    out.failed += 1;
                }
            }

            if i + 1 < total {
                tokio::time::sleep(gap).await;
            }
        }

        // terminal check: done only when nothing is pending and no claim
        // is still live anywhere in the campaign
        if self.store.open_recipient_count(campaign_id)? == 0 {
            let live = self.store.get_campaign(campaign_id)?;
            if live.status == CampaignStatus::Sending {
                let done = self.store.transition(campaign_id, CampaignStatus::Completed)?;
                out.completed = true;
                tracing::info!(
                    "✅ campaign '{}' completed: {} sent, {} failed of {}",
                    done.name,
                    done.sent_count,
                    done.failed_count,
                    done.target_count
                );
            }
        }
        Ok(out)
    }

    /// Pick the send primitive matching the campaign's message kind.
    async fn send_one(&self, spec: &MessageSpec, phone: &str) -> Result<String> {
        match spec.kind {
            MessageKind::Text => self.sender.send_text(phone, &spec.body).await,
            MessageKind::Buttons => {
                self.sender.send_buttons(phone, &spec.body, &spec.buttons).await
            }
            MessageKind::Template => {
                self.sender
                    .send_template(phone, &spec.template_name, &spec.template_lang, &spec.template_params)
                    .await
            }
            MessageKind::Image => self.sender.send_image(phone, &spec.media_url, &spec.body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSender;
    use kirana_core::types::{AudienceTarget, Campaign, RecipientStatus};

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    fn setup(n: usize, rate: i64) -> (Arc<Store>, Arc<MockSender>, Dispatcher, Campaign) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sender = Arc::new(MockSender::new());
        let mut c = Campaign::new("launch", MessageSpec::text("new stock in"), AudienceTarget::All);
        c.rate_per_minute = rate;
        store.create_campaign(&c).unwrap();
        let phones: Vec<String> = (0..n).map(|i| format!("91770000{i:04}")).collect();
        store.enroll(&c.id, &phones).unwrap();
        store.transition(&c.id, CampaignStatus::Sending).unwrap();
        let dispatcher = Dispatcher::new(store.clone(), sender.clone());
        (store, sender, dispatcher, c)
    }

    #[test]
    fn test_gap_and_batch_formulas() {
        assert_eq!(Dispatcher::gap_for(30), Duration::from_millis(2000));
        assert_eq!(Dispatcher::gap_for(7), Duration::from_millis(8572));
        assert_eq!(Dispatcher::gap_for(60), Duration::from_millis(1000));

        assert_eq!(Dispatcher::batch_cap(30), 3);
        assert_eq!(Dispatcher::batch_cap(1), 1);
        assert_eq!(Dispatcher::batch_cap(120), 10);
        assert_eq!(Dispatcher::batch_cap(10_000), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_sends_batch_and_completes() {
        let (store, sender, dispatcher, c) = setup(3, 6000);
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.sent, 3);
        assert_eq!(out.failed, 0);
        assert!(out.completed);
        assert_eq!(sender.sent_count(), 3);

        let got = store.get_campaign(&c.id).unwrap();
        assert_eq!(got.status, CampaignStatus::Completed);
        assert!(got.completed_at.is_some());
        assert_eq!(got.sent_count, 3);

        let rows = store.list_recipients(&c.id, None, 10, 0).unwrap();
        assert!(rows.iter().all(|(r, _)| r.status == RecipientStatus::Sent));
        assert!(rows.iter().all(|(r, _)| r.wa_message_id.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_spacing() {
        // 60/min -> 1s between sends; 3 sends take at least 2s
        let (_store, _sender, dispatcher, c) = setup(3, 60);
        let t0 = Instant::now();
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.sent, 3);
        assert!(t0.elapsed() >= Duration::from_secs(2), "elapsed {:?}", t0.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_cap_leaves_remainder_pending() {
        // rate 30 -> cap 3 of the 5 enrolled
        let (store, _sender, dispatcher, c) = setup(5, 30);
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.claimed, 3);
        assert_eq!(out.sent, 3);
        assert!(!out.completed);
        assert_eq!(store.pending_recipient_count(&c.id).unwrap(), 2);
        assert_eq!(store.get_campaign(&c.id).unwrap().status, CampaignStatus::Sending);

        // next tick finishes the job
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.sent, 2);
        assert!(out.completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_recipient_failures_do_not_halt_batch() {
        let (store, sender, dispatcher, c) = setup(3, 6000);
        sender.fail_for("917700000001");
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.sent, 2);
        assert_eq!(out.failed, 1);
        assert!(out.completed);

        let got = store.get_campaign(&c.id).unwrap();
        assert_eq!(got.sent_count, 2);
        assert_eq!(got.failed_count, 1);
        assert_eq!(
            got.sent_count + got.failed_count + store.pending_recipient_count(&c.id).unwrap(),
            got.target_count
        );
        let failed = store.list_recipients(&c.id, Some(RecipientStatus::Failed), 10, 0).unwrap();
        assert!(failed[0].0.error.as_ref().unwrap().contains("mock gateway rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_mid_batch_releases_rest() {
        let (store, sender, dispatcher, c) = setup(3, 6000);
        // pause the campaign right after the first successful send
        {
            let store = store.clone();
            let id = c.id.clone();
            *sender.on_send.lock().unwrap() = Some(Box::new(move |i, _phone| {
                if i == 0 {
                    store.transition(&id, CampaignStatus::Paused).unwrap();
                }
            }));
        }
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.sent, 1);
        assert_eq!(out.released, 2);
        assert!(!out.completed);

        let got = store.get_campaign(&c.id).unwrap();
        assert_eq!(got.status, CampaignStatus::Paused);
        assert_eq!(store.pending_recipient_count(&c.id).unwrap(), 2);

        // resume, next drain finishes without re-sending the first
        store.transition(&c.id, CampaignStatus::Sending).unwrap();
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.sent, 2);
        assert!(out.completed);
        assert_eq!(sender.sent_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_sends_nothing() {
        let (store, sender, dispatcher, c) = setup(3, 6000);
        let past = Instant::now() - Duration::from_secs(1);
        let out = dispatcher.drain(&c.id, past).await.unwrap();
        assert_eq!(out.sent, 0);
        assert_eq!(out.released, out.claimed);
        assert_eq!(sender.sent_count(), 0);
        // everything went back to pending for the next tick
        assert_eq!(store.pending_recipient_count(&c.id).unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_noop_for_non_sending() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sender = Arc::new(MockSender::new());
        let c = Campaign::new("still draft", MessageSpec::text("x"), AudienceTarget::All);
        store.create_campaign(&c).unwrap();
        store.enroll(&c.id, &["917700000000".to_string()]).unwrap();

        let dispatcher = Dispatcher::new(store.clone(), sender.clone());
        let out = dispatcher.drain(&c.id, far_deadline()).await.unwrap();
        assert_eq!(out.claimed, 0);
        assert_eq!(sender.sent_count(), 0);
        assert_eq!(store.get_campaign(&c.id).unwrap().status, CampaignStatus::Draft);
    }
}
