//! The periodic entry point. One `tick` promotes due scheduled
//! campaigns, drains in-flight ones, and runs the lifecycle reminders,
//! all inside a shared wall-clock budget. A failure in any one campaign
//! or candidate is logged and skipped; the tick always moves on, and the
//! next tick retries naturally because state was not advanced.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use kirana_core::config::{EngineConfig, ReminderConfig};
use kirana_core::error::{KiranaError, Result};
use kirana_core::traits::MessageSender;
use kirana_core::types::CampaignStatus;
use kirana_store::Store;
use tokio::time::{Duration, Instant};

use crate::audience;
use crate::dispatcher::Dispatcher;
use crate::reminders::{ReminderEngine, ReminderSummary};

/// What one orchestrator tick did.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub released_stale: usize,
    pub promoted: usize,
    pub failed_empty: usize,
    pub drained: usize,
    pub sent: usize,
    pub send_failures: usize,
    pub completed: usize,
    pub reminders: ReminderSummary,
}

impl TickSummary {
    pub fn did_work(&self) -> bool {
        self.released_stale > 0
            || self.promoted > 0
            || self.failed_empty > 0
            || self.sent > 0
            || self.send_failures > 0
            || self.completed > 0
            || self.reminders.total_sent() > 0
            || self.reminders.failures > 0
    }
}

/// Drives campaigns and reminders from a periodic trigger. Scheduler
/// agnostic: `run_loop` hosts it in-process, `kirana tick` runs a single
/// invocation for cron-style hosts.
pub struct Orchestrator {
    store: Arc<Store>,
    dispatcher: Dispatcher,
    reminders: ReminderEngine,
    cfg: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        sender: Arc<dyn MessageSender>,
        engine_cfg: EngineConfig,
        reminder_cfg: ReminderConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(store.clone(), sender.clone());
        let reminders = ReminderEngine::new(store.clone(), sender, reminder_cfg);
        Self { store, dispatcher, reminders, cfg: engine_cfg }
    }

    /// One bounded invocation of the whole engine.
    pub async fn tick(&self) -> TickSummary {
        let deadline = Instant::now() + Duration::from_secs(self.cfg.tick_budget_secs);
        let mut summary = TickSummary::default();

        // recover claims stranded by a killed invocation
        match self.store.release_stale_claims(ChronoDuration::seconds(self.cfg.stale_claim_secs)) {
            Ok(0) => {}
            Ok(n) => {
                summary.released_stale = n;
                tracing::warn!("released {n} stale recipient claims from an earlier invocation");
            }
            Err(e) => tracing::warn!("stale claim release failed: {e}"),
        }

        // promote due scheduled campaigns
        match self.store.due_scheduled(Utc::now(), self.cfg.promote_batch) {
            Ok(due) => {
                for c in due {
                    match start_campaign(&self.store, &c.id) {
                        Ok(true) => summary.promoted += 1,
                        Ok(false) => summary.failed_empty += 1,
                        Err(e) => tracing::warn!("campaign {}: promotion failed: {e}", c.id),
                    }
                }
            }
            Err(e) => tracing::warn!("scheduled campaign query failed: {e}"),
        }

        // continue in-flight campaigns
        match self.store.sending_campaigns(self.cfg.drain_batch) {
            Ok(active) => {
                for c in active {
                    match self.dispatcher.drain(&c.id, deadline).await {
                        Ok(o) => {
                            summary.drained += 1;
                            summary.sent += o.sent;
                            summary.send_failures += o.failed;
                            if o.completed {
                                summary.completed += 1;
                            }
                        }
                        Err(e) => tracing::warn!("campaign {}: drain failed: {e}", c.id),
                    }
                }
            }
            Err(e) => tracing::warn!("sending campaign query failed: {e}"),
        }

        // lifecycle reminders share whatever budget is left
        summary.reminders = self.reminders.tick(deadline).await;
        summary
    }
}

/// Enroll and start a draft or scheduled campaign: resolve the audience,
/// persist it as pending recipients, move to sending. An empty audience
/// fails the campaign instead of starting it with nothing to do.
/// Enrollment is idempotent, so re-sending an already-enrolled draft is
/// safe.
pub fn start_campaign(store: &Store, id: &str) -> Result<bool> {
    let campaign = store.get_campaign(id)?;
    if !campaign.status.is_editable() {
        return Err(KiranaError::Transition(format!(
            "campaign {id} is {} and cannot be started",
            campaign.status.as_str()
        )));
    }
    let phones = audience::resolve(store, &campaign.target)?;
    if phones.is_empty() {
        store.transition(id, CampaignStatus::Failed)?;
        tracing::warn!("campaign '{}' failed to start: resolved audience is empty", campaign.name);
        return Ok(false);
    }
    let target = store.enroll(id, &phones)?;
    store.transition(id, CampaignStatus::Sending)?;
    tracing::info!("📣 campaign '{}' started: {target} recipients", campaign.name);
    Ok(true)
}

/// Spawn-friendly periodic loop for `serve` mode.
pub async fn run_loop(orchestrator: Arc<Orchestrator>, interval_secs: u64) {
    tracing::info!("⏰ orchestrator started (tick every {interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let summary = orchestrator.tick().await;
        if summary.did_work() {
            tracing::info!(
                "tick: {} promoted, {} campaign sends ({} failed), {} completed, {} reminders",
                summary.promoted,
                summary.sent,
                summary.send_failures,
                summary.completed,
                summary.reminders.total_sent()
            );
        }
    }
}
