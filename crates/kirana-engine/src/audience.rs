//! Audience resolution: turn a targeting spec into a phone list (for
//! enrollment) or a count (for previews). `opted_in` is the baseline
//! filter and is applied in SQL; the rest of the predicate runs over
//! typed customer values.

use chrono::{DateTime, Duration, Utc};
use kirana_core::error::Result;
use kirana_core::types::{AudienceTarget, Customer};
use kirana_store::Store;

/// Resolve the full recipient phone list for a target.
pub fn resolve(store: &Store, target: &AudienceTarget) -> Result<Vec<String>> {
    let now = Utc::now();
    Ok(store
        .opted_in_customers()?
        .into_iter()
        .filter(|c| matches(c, target, now))
        .map(|c| c.phone)
        .collect())
}

/// Preview-only audience size; enrolls nothing.
pub fn count(store: &Store, target: &AudienceTarget) -> Result<usize> {
    Ok(resolve(store, target)?.len())
}

fn matches(c: &Customer, target: &AudienceTarget, now: DateTime<Utc>) -> bool {
    match target {
        AudienceTarget::All => true,
        // OR across the given labels
        AudienceTarget::Labels { labels } => labels.iter().any(|l| c.labels.contains(l)),
        AudienceTarget::Segment { segment } => c.segment == *segment,
        AudienceTarget::Tier { tier } => c.tier == *tier,
        // conjunction of whichever range filters are present
        AudienceTarget::Custom { min_orders, max_orders, min_spent, active_within_days } => {
            if let Some(min) = min_orders {
                if c.order_count < *min {
                    return false;
                }
            }
            if let Some(max) = max_orders {
                if c.order_count > *max {
                    return false;
                }
            }
            if let Some(min) = min_spent {
                if c.total_spent < *min {
                    return false;
                }
            }
            if let Some(days) = active_within_days {
                match c.last_seen_at {
                    Some(seen) if now - seen <= Duration::days(*days) => {}
                    _ => return false,
                }
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(phone: &str) -> Customer {
        Customer {
            phone: phone.into(),
            name: String::new(),
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

    fn seeded_store() -> Store {
        let s = Store::open_in_memory().unwrap();
        // 10 opted-in customers, 3 labeled vip with various label mixes
        for i in 0..10 {
            let mut c = customer(&format!("91880000{i:04}"));
            match i {
                0 => c.labels = vec!["vip".into()],
                1 => c.labels = vec!["vip".into(), "wholesale".into()],
                2 => c.labels = vec!["new".into(), "vip".into()],
                3 => c.labels = vec!["wholesale".into()],
                4 => c.labels = vec!["new".into()],
                _ => {}
            }
            if i < 4 {
                c.segment = "repeat".into();
            }
            if i % 2 == 0 {
                c.tier = "gold".into();
            }
            c.order_count = i as i64;
            c.total_spent = (i as f64) * 500.0;
            c.last_seen_at = Some(Utc::now() - Duration::days(i as i64 * 5));
            s.upsert_customer(&c).unwrap();
        }
        // an opted-out vip must never resolve
        let mut out = customer("918800009999");
        out.labels = vec!["vip".into()];
        out.opted_in = false;
        s.upsert_customer(&out).unwrap();
        s
    }

    #[test]
    fn test_all_respects_opt_in_baseline() {
        let s = seeded_store();
        let phones = resolve(&s, &AudienceTarget::All).unwrap();
        assert_eq!(phones.len(), 10);
        assert!(!phones.contains(&"918800009999".to_string()));
    }

    #[test]
    fn test_labels_or_semantics() {
        let s = seeded_store();
        let vips = resolve(&s, &AudienceTarget::Labels { labels: vec!["vip".into()] }).unwrap();
        assert_eq!(vips.len(), 3);

        // OR across labels: vip or wholesale
        let either = resolve(
            &s,
            &AudienceTarget::Labels { labels: vec!["vip".into(), "wholesale".into()] },
        )
        .unwrap();
        assert_eq!(either.len(), 4);

        let none = resolve(&s, &AudienceTarget::Labels { labels: vec!["ghost".into()] }).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_segment_and_tier_exact_match() {
        let s = seeded_store();
        assert_eq!(count(&s, &AudienceTarget::Segment { segment: "repeat".into() }).unwrap(), 4);
        assert_eq!(count(&s, &AudienceTarget::Tier { tier: "gold".into() }).unwrap(), 5);
        assert_eq!(count(&s, &AudienceTarget::Segment { segment: "nope".into() }).unwrap(), 0);
    }

    #[test]
    fn test_custom_filters_conjunction() {
        let s = seeded_store();
        // order_count in [3, 7]
        let t = AudienceTarget::Custom {
            min_orders: Some(3),
            max_orders: Some(7),
            min_spent: None,
            active_within_days: None,
        };
        assert_eq!(count(&s, &t).unwrap(), 5);

        // add min spend: order_count >= 3 AND spent >= 3000
        let t = AudienceTarget::Custom {
            min_orders: Some(3),
            max_orders: None,
            min_spent: Some(3000.0),
            active_within_days: None,
        };
        assert_eq!(count(&s, &t).unwrap(), 4); // i in 6..=9

        // last seen within 12 days: i*5 <= 12 -> i in 0..=2
        let t = AudienceTarget::Custom {
            min_orders: None,
            max_orders: None,
            min_spent: None,
            active_within_days: Some(12),
        };
        assert_eq!(count(&s, &t).unwrap(), 3);
    }

    #[test]
    fn test_custom_without_filters_matches_all_opted_in() {
        let s = seeded_store();
        let t = AudienceTarget::Custom {
            min_orders: None,
            max_orders: None,
            min_spent: None,
            active_within_days: None,
        };
        assert_eq!(count(&s, &t).unwrap(), 10);
    }
}
