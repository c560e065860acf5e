//! Campaign and recipient persistence: CRUD, idempotent enrollment, the
//! status state machine, and the claim/outcome writes the dispatcher uses.

use chrono::{DateTime, Duration, Utc};
use kirana_core::error::{KiranaError, Result};
use kirana_core::types::{
    AudienceTarget, Campaign, CampaignStatus, MessageSpec, Recipient, RecipientStatus,
    truncate_error,
};
use rusqlite::{OptionalExtension, params};

use crate::{Store, fmt_opt_ts, fmt_ts, parse_opt_ts, parse_ts};

const CAMPAIGN_COLS: &str = "id, name, message_kind, message_json, target_kind, target_json, \
     status, target_count, sent_count, delivered_count, read_count, failed_count, \
     rate_per_minute, created_at, scheduled_at, started_at, completed_at";

const RECIPIENT_COLS: &str = "id, campaign_id, phone, status, wa_message_id, error, claimed_at, \
     sent_at, delivered_at, read_at, failed_at, created_at";

fn campaign_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let message_json: String = row.get(3)?;
    let target_json: String = row.get(5)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(13)?;
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        message: serde_json::from_str::<MessageSpec>(&message_json)
            .unwrap_or_else(|_| MessageSpec::text("")),
        target: serde_json::from_str::<AudienceTarget>(&target_json)
            .unwrap_or(AudienceTarget::All),
        status: CampaignStatus::parse(&status).unwrap_or(CampaignStatus::Draft),
        target_count: row.get(7)?,
        sent_count: row.get(8)?,
        delivered_count: row.get(9)?,
        read_count: row.get(10)?,
        failed_count: row.get(11)?,
        rate_per_minute: row.get(12)?,
        created_at: parse_ts(&created_at),
        scheduled_at: parse_opt_ts(row.get(14)?),
        started_at: parse_opt_ts(row.get(15)?),
        completed_at: parse_opt_ts(row.get(16)?),
    })
}

fn recipient_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(11)?;
    Ok(Recipient {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        phone: row.get(2)?,
        status: RecipientStatus::parse(&status).unwrap_or(RecipientStatus::Pending),
        wa_message_id: row.get(4)?,
        error: row.get(5)?,
        claimed_at: parse_opt_ts(row.get(6)?),
        sent_at: parse_opt_ts(row.get(7)?),
        delivered_at: parse_opt_ts(row.get(8)?),
        read_at: parse_opt_ts(row.get(9)?),
        failed_at: parse_opt_ts(row.get(10)?),
        created_at: parse_ts(&created_at),
    })
}

impl Store {
    // ── Campaign CRUD ──────────────────────────────

    /// Insert a new campaign row.
    pub fn create_campaign(&self, c: &Campaign) -> Result<()> {
        let message_json = serde_json::to_string(&c.message)
            .map_err(|e| KiranaError::Store(format!("encode message: {e}")))?;
        let target_json = serde_json::to_string(&c.target)
            .map_err(|e| KiranaError::Store(format!("encode target: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO campaigns
               (id, name, message_kind, message_json, target_kind, target_json, status,
                target_count, sent_count, delivered_count, read_count, failed_count,
                rate_per_minute, created_at, scheduled_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                c.id,
                c.name,
                c.message.kind.as_str(),
                message_json,
                c.target.kind(),
                target_json,
                c.status.as_str(),
                c.target_count,
                c.sent_count,
                c.delivered_count,
                c.read_count,
                c.failed_count,
                c.rate_per_minute,
                fmt_ts(c.created_at),
                fmt_opt_ts(c.scheduled_at),
                fmt_opt_ts(c.started_at),
                fmt_opt_ts(c.completed_at),
            ],
        )
        .map_err(|e| KiranaError::Store(format!("create campaign: {e}")))?;
        Ok(())
    }

    /// Fetch one campaign.
    pub fn get_campaign(&self, id: &str) -> Result<Campaign> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {CAMPAIGN_COLS} FROM campaigns WHERE id=?1"),
            params![id],
            campaign_from_row,
        )
        .optional()
        .map_err(|e| KiranaError::Store(format!("get campaign: {e}")))?
        .ok_or_else(|| KiranaError::NotFound(format!("campaign {id}")))
    }

    /// Paged campaign list, optionally filtered by status, newest first.
    pub fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>> {
        let conn = self.lock()?;
        let rows = match status {
            Some(s) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {CAMPAIGN_COLS} FROM campaigns WHERE status=?1 \
                         ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                    ))
                    .map_err(|e| KiranaError::Store(format!("list campaigns: {e}")))?;
                stmt.query_map(params![s.as_str(), limit, offset], campaign_from_row)
                    .map_err(|e| KiranaError::Store(format!("list campaigns: {e}")))?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {CAMPAIGN_COLS} FROM campaigns \
                         ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
                    ))
                    .map_err(|e| KiranaError::Store(format!("list campaigns: {e}")))?;
                stmt.query_map(params![limit, offset], campaign_from_row)
                    .map_err(|e| KiranaError::Store(format!("list campaigns: {e}")))?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
        };
        Ok(rows)
    }

    /// Update an editable campaign (draft or scheduled only).
    pub fn update_campaign(&self, c: &Campaign) -> Result<()> {
        let current = self.get_campaign(&c.id)?;
        if !current.status.is_editable() {
            return Err(KiranaError::Transition(format!(
                "campaign {} is {} and can no longer be edited",
                c.id,
                current.status.as_str()
            )));
        }
        if !c.status.is_editable() {
            return Err(KiranaError::Validation(
                "updates may only set draft or scheduled status".into(),
            ));
        }
        let message_json = serde_json::to_string(&c.message)
            .map_err(|e| KiranaError::Store(format!("encode message: {e}")))?;
        let target_json = serde_json::to_string(&c.target)
            .map_err(|e| KiranaError::Store(format!("encode target: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET name=?1, message_kind=?2, message_json=?3, target_kind=?4,
                target_json=?5, status=?6, rate_per_minute=?7, scheduled_at=?8
             WHERE id=?9",
            params![
                c.name,
                c.message.kind.as_str(),
                message_json,
                c.target.kind(),
                target_json,
                c.status.as_str(),
                c.rate_per_minute,
                fmt_opt_ts(c.scheduled_at),
                c.id,
            ],
        )
        .map_err(|e| KiranaError::Store(format!("update campaign: {e}")))?;
        Ok(())
    }

    /// Delete a campaign and all of its recipients.
    pub fn delete_campaign(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM campaign_recipients WHERE campaign_id=?1", params![id])
            .map_err(|e| KiranaError::Store(format!("delete recipients: {e}")))?;
        let n = conn
            .execute("DELETE FROM campaigns WHERE id=?1", params![id])
            .map_err(|e| KiranaError::Store(format!("delete campaign: {e}")))?;
        if n == 0 {
            return Err(KiranaError::NotFound(format!("campaign {id}")));
        }
        Ok(())
    }

    // ── State machine ──────────────────────────────

    /// Apply a status transition, enforcing the state machine and stamping
    /// `started_at` / `completed_at`.
    pub fn transition(&self, id: &str, to: CampaignStatus) -> Result<Campaign> {
        let current = self.get_campaign(id)?;
        if !current.status.can_transition(to) {
            return Err(KiranaError::Transition(format!(
                "campaign {id}: {} -> {}",
                current.status.as_str(),
                to.as_str()
            )));
        }
        let now = fmt_ts(Utc::now());
        {
            let conn = self.lock()?;
            match to {
                CampaignStatus::Sending => conn.execute(
                    "UPDATE campaigns SET status=?1,
                        started_at=COALESCE(started_at, ?2), completed_at=NULL
                     WHERE id=?3",
                    params![to.as_str(), now, id],
                ),
                CampaignStatus::Completed => conn.execute(
                    "UPDATE campaigns SET status=?1, completed_at=?2 WHERE id=?3",
                    params![to.as_str(), now, id],
                ),
                _ => conn.execute(
                    "UPDATE campaigns SET status=?1 WHERE id=?2",
                    params![to.as_str(), id],
                ),
            }
            .map_err(|e| KiranaError::Store(format!("transition: {e}")))?;
        }
        self.get_campaign(id)
    }

    /// Due scheduled campaigns, oldest schedule first.
    pub fn due_scheduled(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLS} FROM campaigns \
                 WHERE status='scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?1 \
                 ORDER BY scheduled_at LIMIT ?2"
            ))
            .map_err(|e| KiranaError::Store(format!("due scheduled: {e}")))?;
        let rows = stmt
            .query_map(params![fmt_ts(now), limit as i64], campaign_from_row)
            .map_err(|e| KiranaError::Store(format!("due scheduled: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Campaigns currently sending, oldest start first.
    pub fn sending_campaigns(&self, limit: usize) -> Result<Vec<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLS} FROM campaigns WHERE status='sending' \
                 ORDER BY started_at LIMIT ?1"
            ))
            .map_err(|e| KiranaError::Store(format!("sending campaigns: {e}")))?;
        let rows = stmt
            .query_map(params![limit as i64], campaign_from_row)
            .map_err(|e| KiranaError::Store(format!("sending campaigns: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ── Enrollment ─────────────────────────────────

    /// Idempotently insert pending recipient rows, then fix `target_count`
    /// from the persisted recipient count. Re-enrolling the same phone is
    /// a no-op, so calling this twice changes nothing.
    pub fn enroll(&self, campaign_id: &str, phones: &[String]) -> Result<i64> {
        let now = fmt_ts(Utc::now());
        let conn = self.lock()?;
        for phone in phones {
            conn.execute(
                "INSERT OR IGNORE INTO campaign_recipients (campaign_id, phone, status, created_at)
                 VALUES (?1, ?2, 'pending', ?3)",
                params![campaign_id, phone, now],
            )
            .map_err(|e| KiranaError::Store(format!("enroll {phone}: {e}")))?;
        }
        let target: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id=?1",
                params![campaign_id],
                |r| r.get(0),
            )
            .map_err(|e| KiranaError::Store(format!("enroll count: {e}")))?;
        conn.execute(
            "UPDATE campaigns SET target_count=?1 WHERE id=?2",
            params![target, campaign_id],
        )
        .map_err(|e| KiranaError::Store(format!("enroll target_count: {e}")))?;
        Ok(target)
    }

    // ── Recipient reads ────────────────────────────

    /// Recipients still pending (claims not included).
    pub fn pending_recipient_count(&self, campaign_id: &str) -> Result<i64> {
        self.recipient_count_where(campaign_id, "status='pending'")
    }

    /// Recipients that still need work: pending plus live claims. A
    /// campaign completes only when this reaches zero.
    pub fn open_recipient_count(&self, campaign_id: &str) -> Result<i64> {
        self.recipient_count_where(campaign_id, "status IN ('pending','sending')")
    }

    fn recipient_count_where(&self, campaign_id: &str, cond: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id=?1 AND {cond}"),
            params![campaign_id],
            |r| r.get(0),
        )
        .map_err(|e| KiranaError::Store(format!("recipient count: {e}")))
    }

    /// Per-status recipient counts for the campaign detail view.
    pub fn recipient_status_counts(&self, campaign_id: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT status, COUNT(*) FROM campaign_recipients \
                 WHERE campaign_id=?1 GROUP BY status ORDER BY status",
            )
            .map_err(|e| KiranaError::Store(format!("status counts: {e}")))?;
        let rows = stmt
            .query_map(params![campaign_id], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(|e| KiranaError::Store(format!("status counts: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Paged recipient rows joined with the customer display name.
    pub fn list_recipients(
        &self,
        campaign_id: &str,
        status: Option<RecipientStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<(Recipient, Option<String>)>> {
        let conn = self.lock()?;
        let base = "SELECT r.id, r.campaign_id, r.phone, r.status, r.wa_message_id, r.error, \
                    r.claimed_at, r.sent_at, r.delivered_at, r.read_at, r.failed_at, r.created_at, \
                    cu.name \
                    FROM campaign_recipients r LEFT JOIN customers cu ON cu.phone = r.phone \
                    WHERE r.campaign_id=?1";
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(Recipient, Option<String>)> {
            let r = recipient_from_row(row)?;
            let name: Option<String> = row.get(12)?;
            Ok((r, name.filter(|n| !n.is_empty())))
        };
        let rows = match status {
            Some(s) => {
                let mut stmt = conn
                    .prepare(&format!("{base} AND r.status=?2 ORDER BY r.id LIMIT ?3 OFFSET ?4"))
                    .map_err(|e| KiranaError::Store(format!("list recipients: {e}")))?;
                stmt.query_map(params![campaign_id, s.as_str(), limit, offset], map)
                    .map_err(|e| KiranaError::Store(format!("list recipients: {e}")))?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("{base} ORDER BY r.id LIMIT ?2 OFFSET ?3"))
                    .map_err(|e| KiranaError::Store(format!("list recipients: {e}")))?;
                stmt.query_map(params![campaign_id, limit, offset], map)
                    .map_err(|e| KiranaError::Store(format!("list recipients: {e}")))?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
        };
        Ok(rows)
    }

    // ── Claim / outcome writes ─────────────────────

    /// Atomically claim up to `limit` pending recipients (oldest enrolled
    /// first). Each row moves `pending -> sending` only if it is still
    /// pending at update time, so overlapping ticks cannot claim the same
    /// recipient twice.
    pub fn claim_pending(&self, campaign_id: &str, limit: usize) -> Result<Vec<Recipient>> {
        let now = fmt_ts(Utc::now());
        let conn = self.lock()?;
        let ids: Vec<i64> = {
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM campaign_recipients \
                     WHERE campaign_id=?1 AND status='pending' ORDER BY id LIMIT ?2",
                )
                .map_err(|e| KiranaError::Store(format!("claim select: {e}")))?;
            stmt.query_map(params![campaign_id, limit as i64], |r| r.get(0))
                .map_err(|e| KiranaError::Store(format!("claim select: {e}")))?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut claimed = Vec::new();
        for id in ids {
            let n = conn
                .execute(
                    "UPDATE campaign_recipients SET status='sending', claimed_at=?1 \
                     WHERE id=?2 AND status='pending'",
                    params![now, id],
                )
                .map_err(|e| KiranaError::Store(format!("claim update: {e}")))?;
            if n == 1 {
                claimed.push(id);
            }
        }

        let mut out = Vec::with_capacity(claimed.len());
        for id in claimed {
            let r = conn
                .query_row(
                    &format!("SELECT {RECIPIENT_COLS} FROM campaign_recipients WHERE id=?1"),
                    params![id],
                    recipient_from_row,
                )
                .map_err(|e| KiranaError::Store(format!("claim fetch: {e}")))?;
            out.push(r);
        }
        Ok(out)
    }

    /// Return one unprocessed claim to the pending pool.
    pub fn release_claim(&self, recipient_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaign_recipients SET status='pending', claimed_at=NULL \
             WHERE id=?1 AND status='sending'",
            params![recipient_id],
        )
        .map_err(|e| KiranaError::Store(format!("release claim: {e}")))?;
        Ok(())
    }

    /// Release claims left behind by a killed invocation.
    pub fn release_stale_claims(&self, older_than: Duration) -> Result<usize> {
        let cutoff = fmt_ts(Utc::now() - older_than);
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaign_recipients SET status='pending', claimed_at=NULL \
                 WHERE status='sending' AND claimed_at < ?1",
                params![cutoff],
            )
            .map_err(|e| KiranaError::Store(format!("release stale: {e}")))?;
        Ok(n)
    }

    /// Record a successful send: recipient row and campaign counter move
    /// in the same unit of work.
    pub fn mark_sent(&self, recipient_id: i64, campaign_id: &str, wa_message_id: &str) -> Result<()> {
        let now = fmt_ts(Utc::now());
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaign_recipients SET status='sent', wa_message_id=?1, sent_at=?2, \
                    error=NULL, claimed_at=NULL \
                 WHERE id=?3 AND status IN ('sending','pending')",
                params![wa_message_id, now, recipient_id],
            )
            .map_err(|e| KiranaError::Store(format!("mark sent: {e}")))?;
        if n == 1 {
            conn.execute(
                "UPDATE campaigns SET sent_count = sent_count + 1 WHERE id=?1",
                params![campaign_id],
            )
            .map_err(|e| KiranaError::Store(format!("mark sent counter: {e}")))?;
        }
        Ok(())
    }

    /// Record a failed send with a truncated gateway error.
    pub fn mark_failed(&self, recipient_id: i64, campaign_id: &str, error: &str) -> Result<()> {
        let now = fmt_ts(Utc::now());
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaign_recipients SET status='failed', error=?1, failed_at=?2, \
                    claimed_at=NULL \
                 WHERE id=?3 AND status IN ('sending','pending')",
                params![truncate_error(error), now, recipient_id],
            )
            .map_err(|e| KiranaError::Store(format!("mark failed: {e}")))?;
        if n == 1 {
            conn.execute(
                "UPDATE campaigns SET failed_count = failed_count + 1 WHERE id=?1",
                params![campaign_id],
            )
            .map_err(|e| KiranaError::Store(format!("mark failed counter: {e}")))?;
        }
        Ok(())
    }

    /// Advance a sent recipient on a delivery-status callback. The webhook
    /// surface itself lives outside this crate; this is the only write it
    /// needs. Returns false when no row matched or the advance would go
    /// backwards.
    pub fn apply_delivery_status(&self, wa_message_id: &str, to: RecipientStatus) -> Result<bool> {
        if !matches!(to, RecipientStatus::Delivered | RecipientStatus::Read) {
            return Err(KiranaError::Validation(format!(
                "delivery status must be delivered or read, got {}",
                to.as_str()
            )));
        }
        let conn = self.lock()?;
        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT id, campaign_id, status FROM campaign_recipients WHERE wa_message_id=?1",
                params![wa_message_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .map_err(|e| KiranaError::Store(format!("delivery status: {e}")))?;
        let Some((id, campaign_id, status)) = row else {
            return Ok(false);
        };
        let from = RecipientStatus::parse(&status).unwrap_or(RecipientStatus::Pending);
        if !from.can_advance(to) {
            return Ok(false);
        }
        let now = fmt_ts(Utc::now());
        match to {
            RecipientStatus::Delivered => {
                conn.execute(
                    "UPDATE campaign_recipients SET status='delivered', delivered_at=?1 WHERE id=?2",
                    params![now, id],
                )
                .map_err(|e| KiranaError::Store(format!("delivery status: {e}")))?;
                conn.execute(
                    "UPDATE campaigns SET delivered_count = delivered_count + 1 WHERE id=?1",
                    params![campaign_id],
                )
                .map_err(|e| KiranaError::Store(format!("delivery counter: {e}")))?;
            }
            RecipientStatus::Read => {
                conn.execute(
                    "UPDATE campaign_recipients SET status='read', read_at=?1 WHERE id=?2",
                    params![now, id],
                )
                .map_err(|e| KiranaError::Store(format!("read status: {e}")))?;
                conn.execute(
                    "UPDATE campaigns SET read_count = read_count + 1 WHERE id=?1",
                    params![campaign_id],
                )
                .map_err(|e| KiranaError::Store(format!("read counter: {e}")))?;
            }
            _ => unreachable!(),
        }
        Ok(true)
    }

    /// Operator re-queue: failed recipients return to pending and the
    /// failed counter is reduced by the number restored. A completed
    /// campaign goes back to sending so the orchestrator picks it up.
    pub fn requeue_failed(&self, campaign_id: &str) -> Result<i64> {
        // existence check first, for a clean 404 at the API
        let campaign = self.get_campaign(campaign_id)?;
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaign_recipients SET status='pending', error=NULL, failed_at=NULL, \
                    claimed_at=NULL \
                 WHERE campaign_id=?1 AND status='failed'",
                params![campaign_id],
            )
            .map_err(|e| KiranaError::Store(format!("requeue: {e}")))? as i64;
        if n > 0 {
            conn.execute(
                "UPDATE campaigns SET failed_count = MAX(failed_count - ?1, 0) WHERE id=?2",
                params![n, campaign_id],
            )
            .map_err(|e| KiranaError::Store(format!("requeue counter: {e}")))?;
            if campaign.status == CampaignStatus::Completed {
                conn.execute(
                    "UPDATE campaigns SET status='sending', completed_at=NULL WHERE id=?1",
                    params![campaign_id],
                )
                .map_err(|e| KiranaError::Store(format!("requeue status: {e}")))?;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kirana_core::types::{MessageButton, MessageKind};

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn draft(store: &Store, name: &str) -> Campaign {
        let c = Campaign::new(name, MessageSpec::text("diwali sale is live"), AudienceTarget::All);
        store.create_campaign(&c).unwrap();
        c
    }

    fn phones(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("91900000{i:04}")).collect()
    }

    #[test]
    fn test_campaign_crud_roundtrip() {
        let s = store();
        let mut spec = MessageSpec::text("pick a slot");
        spec.kind = MessageKind::Buttons;
        spec.buttons = vec![
            MessageButton { id: "am".into(), title: "Morning".into() },
            MessageButton { id: "pm".into(), title: "Evening".into() },
        ];
        let c = Campaign::new(
            "slot picker",
            spec.clone(),
            AudienceTarget::Labels { labels: vec!["vip".into()] },
        );
        s.create_campaign(&c).unwrap();

        let got = s.get_campaign(&c.id).unwrap();
        assert_eq!(got.name, "slot picker");
        assert_eq!(got.message, spec);
        assert_eq!(got.target, AudienceTarget::Labels { labels: vec!["vip".into()] });
        assert_eq!(got.status, CampaignStatus::Draft);

        assert!(matches!(s.get_campaign("cmp-missing"), Err(KiranaError::NotFound(_))));
    }

    #[test]
    fn test_list_filter_by_status() {
        let s = store();
        draft(&s, "a");
        draft(&s, "b");
        let c = draft(&s, "c");
        s.enroll(&c.id, &phones(1)).unwrap();
        s.transition(&c.id, CampaignStatus::Sending).unwrap();

        assert_eq!(s.list_campaigns(None, 50, 0).unwrap().len(), 3);
        assert_eq!(s.list_campaigns(Some(CampaignStatus::Draft), 50, 0).unwrap().len(), 2);
        assert_eq!(s.list_campaigns(Some(CampaignStatus::Sending), 50, 0).unwrap().len(), 1);
        assert_eq!(s.list_campaigns(None, 2, 0).unwrap().len(), 2);
    }

    #[test]
    fn test_update_only_while_editable() {
        let s = store();
        let mut c = draft(&s, "editable");
        c.name = "renamed".into();
        s.update_campaign(&c).unwrap();
        assert_eq!(s.get_campaign(&c.id).unwrap().name, "renamed");

        s.enroll(&c.id, &phones(1)).unwrap();
        s.transition(&c.id, CampaignStatus::Sending).unwrap();
        c.name = "too late".into();
        assert!(matches!(s.update_campaign(&c), Err(KiranaError::Transition(_))));
    }

    #[test]
    fn test_delete_removes_recipients() {
        let s = store();
        let c = draft(&s, "gone");
        s.enroll(&c.id, &phones(5)).unwrap();
        s.delete_campaign(&c.id).unwrap();
        assert!(s.get_campaign(&c.id).is_err());
        assert_eq!(s.pending_recipient_count(&c.id).unwrap(), 0);
        assert!(matches!(s.delete_campaign(&c.id), Err(KiranaError::NotFound(_))));
    }

    #[test]
    fn test_enrollment_is_idempotent() {
        let s = store();
        let c = draft(&s, "idem");
        let t1 = s.enroll(&c.id, &phones(10)).unwrap();
        assert_eq!(t1, 10);
        // same phones again, plus one duplicate list entry
        let mut again = phones(10);
        again.push("919000000001".into());
        let t2 = s.enroll(&c.id, &again).unwrap();
        assert_eq!(t2, 10);
        assert_eq!(s.get_campaign(&c.id).unwrap().target_count, 10);
        assert_eq!(s.pending_recipient_count(&c.id).unwrap(), 10);
    }

    #[test]
    fn test_transition_enforces_table() {
        let s = store();
        let c = draft(&s, "fsm");
        assert!(s.transition(&c.id, CampaignStatus::Completed).is_err());
        s.transition(&c.id, CampaignStatus::Sending).unwrap();
        let got = s.get_campaign(&c.id).unwrap();
        assert!(got.started_at.is_some());
        s.transition(&c.id, CampaignStatus::Paused).unwrap();
        assert!(s.transition(&c.id, CampaignStatus::Completed).is_err());
        s.transition(&c.id, CampaignStatus::Sending).unwrap();
        let done = s.transition(&c.id, CampaignStatus::Completed).unwrap();
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let s = store();
        let c = draft(&s, "claims");
        s.enroll(&c.id, &phones(4)).unwrap();

        let first = s.claim_pending(&c.id, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|r| r.status == RecipientStatus::Sending));
        assert!(first.iter().all(|r| r.claimed_at.is_some()));

        // a second (overlapping) tick only gets what is left
        let second = s.claim_pending(&c.id, 10).unwrap();
        assert_eq!(second.len(), 1);

        assert_eq!(s.pending_recipient_count(&c.id).unwrap(), 0);
        assert_eq!(s.open_recipient_count(&c.id).unwrap(), 4);
    }

    #[test]
    fn test_release_and_stale_claims() {
        let s = store();
        let c = draft(&s, "stale");
        s.enroll(&c.id, &phones(2)).unwrap();
        let claimed = s.claim_pending(&c.id, 2).unwrap();

        s.release_claim(claimed[0].id).unwrap();
        assert_eq!(s.pending_recipient_count(&c.id).unwrap(), 1);

        // nothing is stale yet
        assert_eq!(s.release_stale_claims(Duration::seconds(60)).unwrap(), 0);
        // everything claimed before "now + 1s" counts as stale
        assert_eq!(s.release_stale_claims(Duration::seconds(-1)).unwrap(), 1);
        assert_eq!(s.pending_recipient_count(&c.id).unwrap(), 2);
    }

    #[test]
    fn test_outcomes_keep_sum_invariant() {
        let s = store();
        let c = draft(&s, "sums");
        s.enroll(&c.id, &phones(3)).unwrap();
        s.transition(&c.id, CampaignStatus::Sending).unwrap();

        let claimed = s.claim_pending(&c.id, 3).unwrap();
        s.mark_sent(claimed[0].id, &c.id, "wamid.1").unwrap();
        s.mark_failed(claimed[1].id, &c.id, "recipient not on whatsapp").unwrap();
        s.release_claim(claimed[2].id).unwrap();

        let got = s.get_campaign(&c.id).unwrap();
        let pending = s.pending_recipient_count(&c.id).unwrap();
        assert_eq!(got.sent_count, 1);
        assert_eq!(got.failed_count, 1);
        assert_eq!(got.sent_count + got.failed_count + pending, got.target_count);

        // marking twice does not double-count
        s.mark_sent(claimed[0].id, &c.id, "wamid.1").unwrap();
        assert_eq!(s.get_campaign(&c.id).unwrap().sent_count, 1);
    }

    #[test]
    fn test_failed_error_is_truncated() {
        let s = store();
        let c = draft(&s, "trunc");
        s.enroll(&c.id, &phones(1)).unwrap();
        let claimed = s.claim_pending(&c.id, 1).unwrap();
        let huge = "gateway exploded ".repeat(40);
        s.mark_failed(claimed[0].id, &c.id, &huge).unwrap();
        let rows = s.list_recipients(&c.id, Some(RecipientStatus::Failed), 10, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.error.as_ref().unwrap().len(), 200);
    }

    #[test]
    fn test_delivery_status_advances_one_way() {
        let s = store();
        let c = draft(&s, "dlr");
        s.enroll(&c.id, &phones(1)).unwrap();
        let claimed = s.claim_pending(&c.id, 1).unwrap();
        s.mark_sent(claimed[0].id, &c.id, "wamid.abc").unwrap();

        assert!(s.apply_delivery_status("wamid.abc", RecipientStatus::Delivered).unwrap());
        assert!(s.apply_delivery_status("wamid.abc", RecipientStatus::Read).unwrap());
        // backwards is refused
        assert!(!s.apply_delivery_status("wamid.abc", RecipientStatus::Delivered).unwrap());
        // unknown id is a quiet no-op
        assert!(!s.apply_delivery_status("wamid.nope", RecipientStatus::Read).unwrap());

        let got = s.get_campaign(&c.id).unwrap();
        assert_eq!(got.delivered_count, 1);
        assert_eq!(got.read_count, 1);
    }

    #[test]
    fn test_requeue_failed() {
        let s = store();
        let c = draft(&s, "requeue");
        s.enroll(&c.id, &phones(2)).unwrap();
        s.transition(&c.id, CampaignStatus::Sending).unwrap();
        let claimed = s.claim_pending(&c.id, 2).unwrap();
        s.mark_sent(claimed[0].id, &c.id, "wamid.ok").unwrap();
        s.mark_failed(claimed[1].id, &c.id, "timeout").unwrap();
        s.transition(&c.id, CampaignStatus::Completed).unwrap();

        let n = s.requeue_failed(&c.id).unwrap();
        assert_eq!(n, 1);
        let got = s.get_campaign(&c.id).unwrap();
        assert_eq!(got.status, CampaignStatus::Sending);
        assert_eq!(got.failed_count, 0);
        let pending = s.pending_recipient_count(&c.id).unwrap();
        assert_eq!(got.sent_count + got.failed_count + pending, got.target_count);
    }

    #[test]
    fn test_due_scheduled_ordering_and_bound() {
        let s = store();
        let now = Utc::now();
        for i in 0..4i64 {
            let c = Campaign::scheduled(
                &format!("due-{i}"),
                MessageSpec::text("hi"),
                AudienceTarget::All,
                now - Duration::minutes(10 - i),
            );
            s.create_campaign(&c).unwrap();
        }
        let future = Campaign::scheduled(
            "not yet",
            MessageSpec::text("hi"),
            AudienceTarget::All,
            now + Duration::hours(1),
        );
        s.create_campaign(&future).unwrap();

        let due = s.due_scheduled(now, 3).unwrap();
        assert_eq!(due.len(), 3);
        assert_eq!(due[0].name, "due-0"); // oldest schedule first
        assert!(due.iter().all(|c| c.name != "not yet"));
    }
}
