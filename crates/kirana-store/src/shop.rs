//! Storefront entity persistence: customers, orders, carts, and the
//! append-only reminder log. These are the read side of the audience
//! resolver and the lifecycle reminder engine; the reminder flags and
//! counters written here are the dedupe markers that stop a reminder
//! from firing twice.

use chrono::{DateTime, Utc};
use kirana_core::error::{KiranaError, Result};
use kirana_core::types::{Cart, CartStatus, Customer, Order, OrderStatus, PaymentMethod};
use rusqlite::{OptionalExtension, params};

use crate::{Store, fmt_opt_ts, fmt_ts, parse_opt_ts, parse_ts};

const CUSTOMER_COLS: &str = "phone, name, opted_in, labels_json, segment, tier, order_count, \
     total_spent, last_order_at, last_seen_at, created_at";

const ORDER_COLS: &str = "id, customer_phone, status, payment_method, paid, payment_link, \
     payment_link_created_at, payment_link_expires_at, shipped_at, delivered_at, \
     delivery_confirm_sent, review_request_sent, total, created_at";

const CART_COLS: &str =
    "id, customer_phone, status, total, reminder_count, last_reminder_at, updated_at, created_at";

fn customer_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Customer> {
    let labels_json: String = row.get(3)?;
    let created_at: String = row.get(10)?;
    Ok(Customer {
        phone: row.get(0)?,
        name: row.get(1)?,
        opted_in: row.get::<_, i64>(2)? != 0,
        labels: serde_json::from_str(&labels_json).unwrap_or_default(),
        segment: row.get(4)?,
        tier: row.get(5)?,
        order_count: row.get(6)?,
        total_spent: row.get(7)?,
        last_order_at: parse_opt_ts(row.get(8)?),
        last_seen_at: parse_opt_ts(row.get(9)?),
        created_at: parse_ts(&created_at),
    })
}

fn order_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    let status: String = row.get(2)?;
    let method: String = row.get(3)?;
    let created_at: String = row.get(13)?;
    Ok(Order {
        id: row.get(0)?,
        customer_phone: row.get(1)?,
        status: OrderStatus::parse(&status).unwrap_or(OrderStatus::Pending),
        payment_method: PaymentMethod::parse(&method).unwrap_or(PaymentMethod::Cod),
        paid: row.get::<_, i64>(4)? != 0,
        payment_link: row.get(5)?,
        payment_link_created_at: parse_opt_ts(row.get(6)?),
        payment_link_expires_at: parse_opt_ts(row.get(7)?),
        shipped_at: parse_opt_ts(row.get(8)?),
        delivered_at: parse_opt_ts(row.get(9)?),
        delivery_confirm_sent: row.get::<_, i64>(10)? != 0,
        review_request_sent: row.get::<_, i64>(11)? != 0,
        total: row.get(12)?,
        created_at: parse_ts(&created_at),
    })
}

fn cart_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cart> {
    let status: String = row.get(2)?;
    let updated_at: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(Cart {
        id: row.get(0)?,
        customer_phone: row.get(1)?,
        status: CartStatus::parse(&status).unwrap_or(CartStatus::Active),
        total: row.get(3)?,
        reminder_count: row.get(4)?,
        last_reminder_at: parse_opt_ts(row.get(5)?),
        updated_at: parse_ts(&updated_at),
        created_at: parse_ts(&created_at),
    })
}

impl Store {
    // ── Customers ──────────────────────────────────

    /// Create or replace a customer record.
    pub fn upsert_customer(&self, c: &Customer) -> Result<()> {
        let labels_json = serde_json::to_string(&c.labels)
            .map_err(|e| KiranaError::Store(format!("encode labels: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO customers
               (phone, name, opted_in, labels_json, segment, tier, order_count, total_spent,
                last_order_at, last_seen_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(phone) DO UPDATE SET
               name=?2, opted_in=?3, labels_json=?4, segment=?5, tier=?6,
               order_count=?7, total_spent=?8, last_order_at=?9, last_seen_at=?10",
            params![
                c.phone,
                c.name,
                c.opted_in as i64,
                labels_json,
                c.segment,
                c.tier,
                c.order_count,
                c.total_spent,
                fmt_opt_ts(c.last_order_at),
                fmt_opt_ts(c.last_seen_at),
                fmt_ts(c.created_at),
            ],
        )
        .map_err(|e| KiranaError::Store(format!("upsert customer: {e}")))?;
        Ok(())
    }

    pub fn get_customer(&self, phone: &str) -> Result<Customer> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {CUSTOMER_COLS} FROM customers WHERE phone=?1"),
            params![phone],
            customer_from_row,
        )
        .optional()
        .map_err(|e| KiranaError::Store(format!("get customer: {e}")))?
        .ok_or_else(|| KiranaError::NotFound(format!("customer {phone}")))
    }

    /// All opted-in customers; the baseline filter of every audience query.
    pub fn opted_in_customers(&self) -> Result<Vec<Customer>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CUSTOMER_COLS} FROM customers WHERE opted_in=1 ORDER BY phone"
            ))
            .map_err(|e| KiranaError::Store(format!("opted-in customers: {e}")))?;
        let rows = stmt
            .query_map([], customer_from_row)
            .map_err(|e| KiranaError::Store(format!("opted-in customers: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Customers with at least `min_orders` orders whose last order fell in
    /// the inactivity window but who were seen in-app recently. The 14-day
    /// cooldown is checked separately against the reminder log.
    pub fn winback_candidates(
        &self,
        now: DateTime<Utc>,
        min_orders: i64,
        min_inactive_days: i64,
        max_inactive_days: i64,
        seen_within_days: i64,
        limit: usize,
    ) -> Result<Vec<Customer>> {
        let newest_order = fmt_ts(now - chrono::Duration::days(min_inactive_days));
        let oldest_order = fmt_ts(now - chrono::Duration::days(max_inactive_days));
        let seen_since = fmt_ts(now - chrono::Duration::days(seen_within_days));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CUSTOMER_COLS} FROM customers \
                 WHERE opted_in=1 AND order_count >= ?1 \
                   AND last_order_at IS NOT NULL \
                   AND last_order_at <= ?2 AND last_order_at >= ?3 \
                   AND last_seen_at IS NOT NULL AND last_seen_at >= ?4 \
                 ORDER BY last_order_at LIMIT ?5"
            ))
            .map_err(|e| KiranaError::Store(format!("winback candidates: {e}")))?;
        let rows = stmt
            .query_map(
                params![min_orders, newest_order, oldest_order, seen_since, limit as i64],
                customer_from_row,
            )
            .map_err(|e| KiranaError::Store(format!("winback candidates: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ── Orders ─────────────────────────────────────

    /// Create or replace an order record.
    pub fn upsert_order(&self, o: &Order) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO orders
               (id, customer_phone, status, payment_method, paid, payment_link,
                payment_link_created_at, payment_link_expires_at, shipped_at, delivered_at,
                delivery_confirm_sent, review_request_sent, total, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
               customer_phone=?2, status=?3, payment_method=?4, paid=?5, payment_link=?6,
               payment_link_created_at=?7, payment_link_expires_at=?8, shipped_at=?9,
               delivered_at=?10, delivery_confirm_sent=?11, review_request_sent=?12, total=?13",
            params![
                o.id,
                o.customer_phone,
                o.status.as_str(),
                o.payment_method.as_str(),
                o.paid as i64,
                o.payment_link,
                fmt_opt_ts(o.payment_link_created_at),
                fmt_opt_ts(o.payment_link_expires_at),
                fmt_opt_ts(o.shipped_at),
                fmt_opt_ts(o.delivered_at),
                o.delivery_confirm_sent as i64,
                o.review_request_sent as i64,
                o.total,
                fmt_ts(o.created_at),
            ],
        )
        .map_err(|e| KiranaError::Store(format!("upsert order: {e}")))?;
        Ok(())
    }

    pub fn get_order(&self, id: &str) -> Result<Order> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {ORDER_COLS} FROM orders WHERE id=?1"),
            params![id],
            order_from_row,
        )
        .optional()
        .map_err(|e| KiranaError::Store(format!("get order: {e}")))?
        .ok_or_else(|| KiranaError::NotFound(format!("order {id}")))
    }

    /// Pending unpaid online orders with a live payment link created inside
    /// the reminder window. The 2-hour cooldown is the engine's job (via
    /// the reminder log).
    pub fn payment_reminder_candidates(
        &self,
        now: DateTime<Utc>,
        min_age_mins: i64,
        max_age_hours: i64,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let newest = fmt_ts(now - chrono::Duration::minutes(min_age_mins));
        let oldest = fmt_ts(now - chrono::Duration::hours(max_age_hours));
        let now_s = fmt_ts(now);
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLS} FROM orders \
                 WHERE status='pending' AND paid=0 AND payment_method='online' \
                   AND payment_link != '' AND payment_link_created_at IS NOT NULL \
                   AND payment_link_created_at <= ?1 AND payment_link_created_at >= ?2 \
                   AND (payment_link_expires_at IS NULL OR payment_link_expires_at > ?3) \
                 ORDER BY payment_link_created_at LIMIT ?4"
            ))
            .map_err(|e| KiranaError::Store(format!("payment candidates: {e}")))?;
        let rows = stmt
            .query_map(params![newest, oldest, now_s, limit as i64], order_from_row)
            .map_err(|e| KiranaError::Store(format!("payment candidates: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Shipped orders past the confirmation delay that never got the
    /// yes/no delivery prompt.
    pub fn shipped_unconfirmed_orders(
        &self,
        now: DateTime<Utc>,
        after_days: i64,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let cutoff = fmt_ts(now - chrono::Duration::days(after_days));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLS} FROM orders \
                 WHERE status='shipped' AND shipped_at IS NOT NULL AND shipped_at <= ?1 \
                   AND delivery_confirm_sent=0 \
                 ORDER BY shipped_at LIMIT ?2"
            ))
            .map_err(|e| KiranaError::Store(format!("shipped unconfirmed: {e}")))?;
        let rows = stmt
            .query_map(params![cutoff, limit as i64], order_from_row)
            .map_err(|e| KiranaError::Store(format!("shipped unconfirmed: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// One-shot flag: delivery confirmation prompt went out.
    pub fn set_delivery_confirm_sent(&self, order_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE orders SET delivery_confirm_sent=1 WHERE id=?1",
            params![order_id],
        )
        .map_err(|e| KiranaError::Store(format!("delivery flag: {e}")))?;
        Ok(())
    }

    /// Delivered orders inside the review window without a review request.
    pub fn delivered_unreviewed_orders(
        &self,
        now: DateTime<Utc>,
        min_days: i64,
        max_days: i64,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let newest = fmt_ts(now - chrono::Duration::days(min_days));
        let oldest = fmt_ts(now - chrono::Duration::days(max_days));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLS} FROM orders \
                 WHERE status='delivered' AND delivered_at IS NOT NULL \
                   AND delivered_at <= ?1 AND delivered_at >= ?2 \
                   AND review_request_sent=0 \
                 ORDER BY delivered_at LIMIT ?3"
            ))
            .map_err(|e| KiranaError::Store(format!("delivered unreviewed: {e}")))?;
        let rows = stmt
            .query_map(params![newest, oldest, limit as i64], order_from_row)
            .map_err(|e| KiranaError::Store(format!("delivered unreviewed: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// One-shot flag: review request went out.
    pub fn set_review_request_sent(&self, order_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE orders SET review_request_sent=1 WHERE id=?1",
            params![order_id],
        )
        .map_err(|e| KiranaError::Store(format!("review flag: {e}")))?;
        Ok(())
    }

    // ── Carts ──────────────────────────────────────

    /// Create or replace a cart record.
    pub fn upsert_cart(&self, c: &Cart) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO carts
               (id, customer_phone, status, total, reminder_count, last_reminder_at,
                updated_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               customer_phone=?2, status=?3, total=?4, reminder_count=?5,
               last_reminder_at=?6, updated_at=?7",
            params![
                c.id,
                c.customer_phone,
                c.status.as_str(),
                c.total,
                c.reminder_count,
                fmt_opt_ts(c.last_reminder_at),
                fmt_ts(c.updated_at),
                fmt_ts(c.created_at),
            ],
        )
        .map_err(|e| KiranaError::Store(format!("upsert cart: {e}")))?;
        Ok(())
    }

    pub fn get_cart(&self, id: &str) -> Result<Cart> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {CART_COLS} FROM carts WHERE id=?1"),
            params![id],
            cart_from_row,
        )
        .optional()
        .map_err(|e| KiranaError::Store(format!("get cart: {e}")))?
        .ok_or_else(|| KiranaError::NotFound(format!("cart {id}")))
    }

    /// Active carts worth reminding about: above the value floor and under
    /// the reminder cap. The per-step delay check happens in the engine,
    /// where the step table lives.
    pub fn carts_for_recovery(
        &self,
        min_value: f64,
        max_reminders: i64,
        limit: usize,
    ) -> Result<Vec<Cart>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CART_COLS} FROM carts \
                 WHERE status='active' AND total >= ?1 AND reminder_count < ?2 \
                 ORDER BY updated_at LIMIT ?3"
            ))
            .map_err(|e| KiranaError::Store(format!("carts for recovery: {e}")))?;
        let rows = stmt
            .query_map(params![min_value, max_reminders, limit as i64], cart_from_row)
            .map_err(|e| KiranaError::Store(format!("carts for recovery: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Stamp a sent cart reminder: counter and timestamp move together.
    pub fn bump_cart_reminder(&self, cart_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE carts SET reminder_count = reminder_count + 1, last_reminder_at=?1 \
             WHERE id=?2",
            params![fmt_ts(at), cart_id],
        )
        .map_err(|e| KiranaError::Store(format!("bump cart reminder: {e}")))?;
        Ok(())
    }

    // ── Reminder log ───────────────────────────────

    /// Append a reminder event for cooldown-window dedupe.
    pub fn log_reminder(&self, event_type: &str, subject_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reminder_log (event_type, subject_id, sent_at) VALUES (?1, ?2, ?3)",
            params![event_type, subject_id, fmt_ts(at)],
        )
        .map_err(|e| KiranaError::Store(format!("log reminder: {e}")))?;
        Ok(())
    }

    /// Was this reminder already sent at or after `since`?
    pub fn reminded_within(
        &self,
        event_type: &str,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reminder_log \
                 WHERE event_type=?1 AND subject_id=?2 AND sent_at >= ?3",
                params![event_type, subject_id, fmt_ts(since)],
                |r| r.get(0),
            )
            .map_err(|e| KiranaError::Store(format!("reminded within: {e}")))?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn customer(phone: &str) -> Customer {
        Customer {
            phone: phone.into(),
            name: "Asha".into(),
            opted_in: true,
            labels: vec![],
            segment: String::new(),
            tier: String::new(),
            order_count: 0,
            total_spent: 0.0,
            last_order_at: None,
            last_seen_at: None,
            created_at: Utc::now(),
        }
    }

    fn order(id: &str, phone: &str) -> Order {
        Order {
            id: id.into(),
            customer_phone: phone.into(),
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::Online,
            paid: false,
            payment_link: String::new(),
            payment_link_created_at: None,
            payment_link_expires_at: None,
            shipped_at: None,
            delivered_at: None,
            delivery_confirm_sent: false,
            review_request_sent: false,
            total: 499.0,
            created_at: Utc::now(),
        }
    }

    fn cart(id: &str, phone: &str, total: f64, updated_at: DateTime<Utc>) -> Cart {
        Cart {
            id: id.into(),
            customer_phone: phone.into(),
            status: CartStatus::Active,
            total,
            reminder_count: 0,
            last_reminder_at: None,
            updated_at,
            created_at: updated_at,
        }
    }

    #[test]
    fn test_customer_roundtrip_with_labels() {
        let s = store();
        let mut c = customer("919876500001");
        c.labels = vec!["vip".into(), "wholesale".into()];
        c.segment = "repeat".into();
        s.upsert_customer(&c).unwrap();

        let got = s.get_customer("919876500001").unwrap();
        assert_eq!(got.labels, vec!["vip".to_string(), "wholesale".to_string()]);
        assert_eq!(got.segment, "repeat");

        c.opted_in = false;
        s.upsert_customer(&c).unwrap();
        assert!(s.opted_in_customers().unwrap().is_empty());
    }

    #[test]
    fn test_carts_for_recovery_bounds() {
        let s = store();
        let now = Utc::now();
        s.upsert_cart(&cart("crt-1", "p1", 300.0, now)).unwrap();
        s.upsert_cart(&cart("crt-2", "p2", 120.0, now)).unwrap(); // under floor
        let mut maxed = cart("crt-3", "p3", 900.0, now);
        maxed.reminder_count = 3;
        s.upsert_cart(&maxed).unwrap();
        let mut converted = cart("crt-4", "p4", 500.0, now);
        converted.status = CartStatus::Converted;
        s.upsert_cart(&converted).unwrap();

        let due = s.carts_for_recovery(200.0, 3, 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "crt-1");
    }

    #[test]
    fn test_bump_cart_reminder() {
        let s = store();
        let now = Utc::now();
        s.upsert_cart(&cart("crt-9", "p9", 350.0, now)).unwrap();
        s.bump_cart_reminder("crt-9", now).unwrap();
        let got = s.get_cart("crt-9").unwrap();
        assert_eq!(got.reminder_count, 1);
        assert!(got.last_reminder_at.is_some());
    }

    #[test]
    fn test_payment_candidates_window() {
        let s = store();
        let now = Utc::now();

        let mut due = order("ord-due", "p1");
        due.payment_link = "https://rzp.io/i/abc".into();
        due.payment_link_created_at = Some(now - Duration::minutes(45));
        s.upsert_order(&due).unwrap();

        let mut fresh = order("ord-fresh", "p2");
        fresh.payment_link = "https://rzp.io/i/def".into();
        fresh.payment_link_created_at = Some(now - Duration::minutes(10));
        s.upsert_order(&fresh).unwrap();

        let mut ancient = order("ord-old", "p3");
        ancient.payment_link = "https://rzp.io/i/ghi".into();
        ancient.payment_link_created_at = Some(now - Duration::hours(30));
        s.upsert_order(&ancient).unwrap();

        let mut expired = order("ord-expired", "p4");
        expired.payment_link = "https://rzp.io/i/jkl".into();
        expired.payment_link_created_at = Some(now - Duration::hours(2));
        expired.payment_link_expires_at = Some(now - Duration::minutes(5));
        s.upsert_order(&expired).unwrap();

        let mut cod = order("ord-cod", "p5");
        cod.payment_method = PaymentMethod::Cod;
        cod.payment_link = "https://rzp.io/i/mno".into();
        cod.payment_link_created_at = Some(now - Duration::hours(1));
        s.upsert_order(&cod).unwrap();

        let got = s.payment_reminder_candidates(now, 30, 24, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "ord-due");
    }

    #[test]
    fn test_shipped_unconfirmed_selection_and_flag() {
        let s = store();
        let now = Utc::now();

        let mut old = order("ord-shipped", "p1");
        old.status = OrderStatus::Shipped;
        old.shipped_at = Some(now - Duration::days(6));
        s.upsert_order(&old).unwrap();

        let mut recent = order("ord-recent", "p2");
        recent.status = OrderStatus::Shipped;
        recent.shipped_at = Some(now - Duration::days(2));
        s.upsert_order(&recent).unwrap();

        let got = s.shipped_unconfirmed_orders(now, 5, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "ord-shipped");

        s.set_delivery_confirm_sent("ord-shipped").unwrap();
        assert!(s.shipped_unconfirmed_orders(now, 5, 10).unwrap().is_empty());
    }

    #[test]
    fn test_delivered_review_window() {
        let s = store();
        let now = Utc::now();

        for (id, days) in [("ord-d2", 2), ("ord-d5", 5), ("ord-d9", 9)] {
            let mut o = order(id, "p1");
            o.status = OrderStatus::Delivered;
            o.delivered_at = Some(now - Duration::days(days));
            s.upsert_order(&o).unwrap();
        }

        let got = s.delivered_unreviewed_orders(now, 3, 7, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "ord-d5");

        s.set_review_request_sent("ord-d5").unwrap();
        assert!(s.delivered_unreviewed_orders(now, 3, 7, 10).unwrap().is_empty());
    }

    #[test]
    fn test_winback_candidates() {
        let s = store();
        let now = Utc::now();

        let mut lapsed = customer("p-lapsed");
        lapsed.order_count = 3;
        lapsed.last_order_at = Some(now - Duration::days(40));
        lapsed.last_seen_at = Some(now - Duration::days(2));
        s.upsert_customer(&lapsed).unwrap();

        let mut active = customer("p-active");
        active.order_count = 5;
        active.last_order_at = Some(now - Duration::days(3));
        active.last_seen_at = Some(now - Duration::days(1));
        s.upsert_customer(&active).unwrap();

        let mut gone = customer("p-gone");
        gone.order_count = 4;
        gone.last_order_at = Some(now - Duration::days(45));
        gone.last_seen_at = Some(now - Duration::days(20)); // not in-app lately
        s.upsert_customer(&gone).unwrap();

        let mut newbie = customer("p-new");
        newbie.order_count = 1;
        newbie.last_order_at = Some(now - Duration::days(40));
        newbie.last_seen_at = Some(now - Duration::days(1));
        s.upsert_customer(&newbie).unwrap();

        let got = s.winback_candidates(now, 2, 30, 60, 7, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].phone, "p-lapsed");
    }

    #[test]
    fn test_reminder_log_cooldown() {
        let s = store();
        let now = Utc::now();
        assert!(!s.reminded_within("payment", "ord-1", now - Duration::hours(2)).unwrap());

        s.log_reminder("payment", "ord-1", now - Duration::minutes(90)).unwrap();
        // inside the 2-hour cooldown
        assert!(s.reminded_within("payment", "ord-1", now - Duration::hours(2)).unwrap());
        // a 1-hour window misses it
        assert!(!s.reminded_within("payment", "ord-1", now - Duration::hours(1)).unwrap());
        // different subject is independent
        assert!(!s.reminded_within("payment", "ord-2", now - Duration::hours(2)).unwrap());
    }
}
