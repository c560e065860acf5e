//! Lifecycle reminders: automated one-off messages triggered by
//! time-window conditions on carts, orders, and customers. No campaign
//! wrapper; every send is deduped by a marker written right after it
//! (cart counters, order one-shot flags, or the reminder log with a
//! cooldown window), so the next tick cannot re-fire.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kirana_core::config::ReminderConfig;
use kirana_core::error::Result;
use kirana_core::traits::MessageSender;
use kirana_core::types::{Cart, MessageButton, Order};
use kirana_store::Store;
use tokio::time::Instant;

const PAYMENT_EVENT: &str = "payment_reminder";
const WINBACK_EVENT: &str = "winback";

/// What one reminder tick sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReminderSummary {
    pub cart_sent: usize,
    pub payment_sent: usize,
    pub delivery_sent: usize,
    pub review_sent: usize,
    pub winback_sent: usize,
    pub failures: usize,
}

impl ReminderSummary {
    pub fn total_sent(&self) -> usize {
        self.cart_sent + self.payment_sent + self.delivery_sent + self.review_sent + self.winback_sent
    }
}

/// Runs the four read-then-act reminder procedures each tick. Every
/// procedure works through a bounded page of candidates; a failure on
/// one candidate is counted and the page continues.
pub struct ReminderEngine {
    store: Arc<Store>,
    sender: Arc<dyn MessageSender>,
    cfg: ReminderConfig,
}

impl ReminderEngine {
    pub fn new(store: Arc<Store>, sender: Arc<dyn MessageSender>, cfg: ReminderConfig) -> Self {
        Self { store, sender, cfg }
    }

    /// Run all procedures once. Procedure-level errors (store reads) are
    /// logged and the remaining procedures still run.
    pub async fn tick(&self, deadline: Instant) -> ReminderSummary {
        let mut s = ReminderSummary::default();
        if let Err(e) = self.cart_recovery(deadline, &mut s).await {
            tracing::warn!("cart recovery pass failed: {e}");
        }
        if let Err(e) = self.payment_reminders(deadline, &mut s).await {
            tracing::warn!("payment reminder pass failed: {e}");
        }
        if let Err(e) = self.delivery_confirmations(deadline, &mut s).await {
            tracing::warn!("delivery confirmation pass failed: {e}");
        }
        if let Err(e) = self.review_prompts(deadline, &mut s).await {
            tracing::warn!("review prompt pass failed: {e}");
        }
        if let Err(e) = self.winback(deadline, &mut s).await {
            tracing::warn!("win-back pass failed: {e}");
        }
        s
    }

    /// Small inter-send delay so lifecycle sends stay under gateway rate
    /// limits.
    async fn pace(&self) {
        if self.cfg.send_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.cfg.send_delay_ms)).await;
        }
    }

    /// Abandoned-cart recovery, up to three stepped reminders per cart.
    async fn cart_recovery(&self, deadline: Instant, s: &mut ReminderSummary) -> Result<()> {
        let now = Utc::now();
        let carts = self.store.carts_for_recovery(
            self.cfg.cart_min_value,
            self.cfg.cart_max_reminders,
            self.cfg.page_size,
        )?;
        for cart in carts {
            if Instant::now() >= deadline {
                break;
            }
            let step = cart.reminder_count + 1;
            // first reminder counts from the last cart update, later ones
            // from the previous reminder
            let anchor = cart.last_reminder_at.unwrap_or(cart.updated_at);
            if now - anchor < ChronoDuration::minutes(self.cfg.cart_delay_for(step)) {
                continue;
            }
            let outcome: Result<()> = async {
                self.sender
                    .send_text(&cart.customer_phone, &cart_reminder_text(&cart, step))
                    .await?;
                self.store.bump_cart_reminder(&cart.id, Utc::now())?;
                Ok(())
            }
            .await;
            match outcome {
                Ok(()) => s.cart_sent += 1,
                Err(e) => {
                    s.failures += 1;
                    tracing::warn!("cart {}: reminder {step} failed: {e}", cart.id);
                }
            }
            self.pace().await;
        }
        Ok(())
    }

    /// Nudge pending unpaid online orders with a live payment link,
    /// at most once per cooldown window.
    async fn payment_reminders(&self, deadline: Instant, s: &mut ReminderSummary) -> Result<()> {
        let now = Utc::now();
        let cooldown_start = now - ChronoDuration::hours(self.cfg.payment_cooldown_hours);
        let orders = self.store.payment_reminder_candidates(
            now,
            self.cfg.payment_min_age_mins,
            self.cfg.payment_max_age_hours,
            self.cfg.page_size,
        )?;
        for order in orders {
            if Instant::now() >= deadline {
                break;
            }
            if self.store.reminded_within(PAYMENT_EVENT, &order.id, cooldown_start)? {
                continue;
            }
            let outcome: Result<()> = async {
                self.sender
                    .send_text(&order.customer_phone, &payment_reminder_text(&order, now))
                    .await?;
                self.store.log_reminder(PAYMENT_EVENT, &order.id, Utc::now())?;
                Ok(())
            }
            .await;
            match outcome {
                Ok(()) => s.payment_sent += 1,
                Err(e) => {
                    s.failures += 1;
                    tracing::warn!("order {}: payment reminder failed: {e}", order.id);
                }
            }
            self.pace().await;
        }
        Ok(())
    }

    /// Yes/no delivery prompt for orders shipped a while ago, once ever.
    async fn delivery_confirmations(&self, deadline: Instant, s: &mut ReminderSummary) -> Result<()> {
        let now = Utc::now();
        let orders = self.store.shipped_unconfirmed_orders(
            now,
            self.cfg.delivery_confirm_after_days,
            self.cfg.page_size,
        )?;
        for order in orders {
            if Instant::now() >= deadline {
                break;
            }
            let outcome: Result<()> = async {
                let buttons = vec![
                    MessageButton { id: "delivered_yes".into(), title: "Yes, got it".into() },
                    MessageButton { id: "delivered_no".into(), title: "Not yet".into() },
                ];
                self.sender
                    .send_buttons(
                        &order.customer_phone,
                        &format!(
                            "Your order #{} was shipped a few days ago. Has it been delivered?",
                            order.id
                        ),
                        &buttons,
                    )
                    .await?;
                self.store.set_delivery_confirm_sent(&order.id)?;
                Ok(())
            }
            .await;
            match outcome {
                Ok(()) => s.delivery_sent += 1,
                Err(e) => {
                    s.failures += 1;
                    tracing::warn!("order {}: delivery prompt failed: {e}", order.id);
                }
            }
            self.pace().await;
        }
        Ok(())
    }

    /// Review request a few days after delivery, once ever.
    async fn review_prompts(&self, deadline: Instant, s: &mut ReminderSummary) -> Result<()> {
        let now = Utc::now();
        let orders = self.store.delivered_unreviewed_orders(
            now,
            self.cfg.review_min_days,
            self.cfg.review_max_days,
            self.cfg.page_size,
        )?;
        for order in orders {
            if Instant::now() >= deadline {
                break;
            }
            let outcome: Result<()> = async {
                self.sender
                    .send_text(
                        &order.customer_phone,
                        &format!(
                            "How was your order #{}? Reply with a rating from 1 to 5, it \
                             really helps the shop.",
                            order.id
                        ),
                    )
                    .await?;
                self.store.set_review_request_sent(&order.id)?;
                Ok(())
            }
            .await;
            match outcome {
                Ok(()) => s.review_sent += 1,
                Err(e) => {
                    s.failures += 1;
                    tracing::warn!("order {}: review prompt failed: {e}", order.id);
                }
            }
            self.pace().await;
        }
        Ok(())
    }

    /// Win-back incentive for lapsed repeat customers who still open the
    /// app, gated by a long cooldown.
    async fn winback(&self, deadline: Instant, s: &mut ReminderSummary) -> Result<()> {
        let now = Utc::now();
        let cooldown_start = now - ChronoDuration::days(self.cfg.winback_cooldown_days);
        let customers = self.store.winback_candidates(
            now,
            self.cfg.winback_min_orders,
            self.cfg.winback_min_inactive_days,
            self.cfg.winback_max_inactive_days,
            self.cfg.winback_seen_within_days,
            self.cfg.page_size,
        )?;
        for customer in customers {
            if Instant::now() >= deadline {
                break;
            }
            if self.store.reminded_within(WINBACK_EVENT, &customer.phone, cooldown_start)? {
                continue;
            }
            let outcome: Result<()> = async {
                self.sender
                    .send_text(
                        &customer.phone,
                        "We miss you! It has been a while since your last order. Use code \
                         COMEBACK10 for 10% off this week.",
                    )
                    .await?;
                self.store.log_reminder(WINBACK_EVENT, &customer.phone, Utc::now())?;
                Ok(())
            }
            .await;
            match outcome {
                Ok(()) => s.winback_sent += 1,
                Err(e) => {
                    s.failures += 1;
                    tracing::warn!("customer {}: win-back failed: {e}", customer.phone);
                }
            }
            self.pace().await;
        }
        Ok(())
    }
}

// ─── Message variants ──────────────────────────────────────

fn cart_reminder_text(cart: &Cart, step: i64) -> String {
    match step {
        1 => format!(
            "You left items worth ₹{:.0} in your cart. They sell out fast, finish your \
             order in one tap!",
            cart.total
        ),
        2 => format!(
            "Still thinking it over? Your cart (₹{:.0}) is saved and ready for checkout.",
            cart.total
        ),
        _ => format!(
            "Last call: the items in your saved cart worth ₹{:.0} will not be held much longer.",
            cart.total
        ),
    }
}

fn payment_reminder_text(order: &Order, now: DateTime<Utc>) -> String {
    format!(
        "Your order #{} is reserved but payment is pending. Pay here: {} (link valid for {}).",
        order.id,
        order.payment_link,
        link_validity(order.payment_link_expires_at, now)
    )
}

/// Rough remaining-validity estimate for the payment link.
fn link_validity(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match expires_at {
        Some(t) if t > now => {
            let mins = (t - now).num_minutes();
            if mins >= 120 {
                format!("about {} hours", mins / 60)
            } else if mins >= 60 {
                "about an hour".to_string()
            } else {
                format!("{} minutes", mins.max(1))
            }
        }
        _ => "a limited time".to_string(),
    }
}
