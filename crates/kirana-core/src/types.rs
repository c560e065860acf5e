//! Core data model: campaigns, their recipients, and the storefront
//! entities (customers, orders, carts) the reminder engine reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KiranaError, Result};

/// Fallback throttle when a campaign has no usable rate configured.
pub const DEFAULT_RATE_PER_MINUTE: i64 = 30;

/// Per-recipient error strings are truncated to this length before storage.
pub const MAX_ERROR_LEN: usize = 200;

// ─── Campaign ──────────────────────────────────────────────

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "scheduled" => Some(Self::Scheduled),
            "sending" => Some(Self::Sending),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// The campaign state machine:
    ///
    /// ```text
    /// draft ------start------> sending
    /// scheduled --(due)------> sending
    /// sending ----pause------> paused
    /// paused -----resume-----> sending
    /// sending --(no pending)-> completed
    /// draft/scheduled --(empty audience)-> failed
    /// completed --(operator re-queue)----> sending
    /// ```
    pub fn can_transition(self, to: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, to),
            (Draft, Sending)
                | (Draft, Failed)
                | (Scheduled, Sending)
                | (Scheduled, Failed)
                | (Sending, Paused)
                | (Sending, Completed)
                | (Paused, Sending)
                | (Completed, Sending)
        )
    }

    /// Editable only before sending begins.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }
}

/// Message kind selects the outbound send primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Template,
    Image,
    Buttons,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Template => "template",
            Self::Image => "image",
            Self::Buttons => "buttons",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "template" => Some(Self::Template),
            "image" => Some(Self::Image),
            "buttons" => Some(Self::Buttons),
            _ => None,
        }
    }
}

/// One quick-reply button on an interactive message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageButton {
    pub id: String,
    pub title: String,
}

/// What a campaign sends: the kind plus the fields that kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSpec {
    pub kind: MessageKind,
    /// Text body, or caption for image messages.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub template_name: String,
    #[serde(default = "default_template_lang")]
    pub template_lang: String,
    #[serde(default)]
    pub template_params: Vec<String>,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub buttons: Vec<MessageButton>,
}

fn default_template_lang() -> String {
    "en".into()
}

impl MessageSpec {
    pub fn text(body: &str) -> Self {
        Self {
            kind: MessageKind::Text,
            body: body.to_string(),
            template_name: String::new(),
            template_lang: default_template_lang(),
            template_params: Vec::new(),
            media_url: String::new(),
            buttons: Vec::new(),
        }
    }

    /// Reject specs that cannot be sent. Called at campaign create/update,
    /// never during dispatch.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            MessageKind::Text => {
                if self.body.trim().is_empty() {
                    return Err(KiranaError::Validation(
                        "text campaigns need a message body".into(),
                    ));
                }
            }
            MessageKind::Template => {
                if self.template_name.trim().is_empty() {
                    return Err(KiranaError::Validation(
                        "template campaigns need a template name".into(),
                    ));
                }
            }
            MessageKind::Image => {
                if self.media_url.trim().is_empty() {
                    return Err(KiranaError::Validation(
                        "image campaigns need a media url".into(),
                    ));
                }
            }
            MessageKind::Buttons => {
                if self.body.trim().is_empty() {
                    return Err(KiranaError::Validation(
                        "button campaigns need a message body".into(),
                    ));
                }
                // Cloud API allows at most 3 reply buttons per message.
                if self.buttons.is_empty() || self.buttons.len() > 3 {
                    return Err(KiranaError::Validation(
                        "button campaigns need 1 to 3 buttons".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Who a campaign targets. Persisted as JSON in the store; business logic
/// only ever sees this typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudienceTarget {
    All,
    Labels {
        labels: Vec<String>,
    },
    Segment {
        segment: String,
    },
    Tier {
        tier: String,
    },
    Custom {
        #[serde(default)]
        min_orders: Option<i64>,
        #[serde(default)]
        max_orders: Option<i64>,
        #[serde(default)]
        min_spent: Option<f64>,
        #[serde(default)]
        active_within_days: Option<i64>,
    },
}

impl AudienceTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Labels { .. } => "labels",
            Self::Segment { .. } => "segment",
            Self::Tier { .. } => "tier",
            Self::Custom { .. } => "custom",
        }
    }
}

/// A bulk-send job targeting a computed audience with one message spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub message: MessageSpec,
    pub target: AudienceTarget,
    pub status: CampaignStatus,
    /// Fixed at enrollment from the persisted recipient count; never
    /// recomputed afterwards.
    pub target_count: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub read_count: i64,
    pub failed_count: i64,
    /// Messages-per-minute throttle. Non-positive means "use the default".
    pub rate_per_minute: i64,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Create a new draft campaign.
    pub fn new(name: &str, message: MessageSpec, target: AudienceTarget) -> Self {
        Self {
            id: format!("cmp-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            message,
            target,
            status: CampaignStatus::Draft,
            target_count: 0,
            sent_count: 0,
            delivered_count: 0,
            read_count: 0,
            failed_count: 0,
            rate_per_minute: DEFAULT_RATE_PER_MINUTE,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Create a campaign scheduled to start at `at`.
    pub fn scheduled(name: &str, message: MessageSpec, target: AudienceTarget, at: DateTime<Utc>) -> Self {
        let mut c = Self::new(name, message, target);
        c.status = CampaignStatus::Scheduled;
        c.scheduled_at = Some(at);
        c
    }

    /// The throttle actually applied by the dispatcher.
    pub fn effective_rate(&self) -> i64 {
        if self.rate_per_minute <= 0 {
            DEFAULT_RATE_PER_MINUTE
        } else {
            self.rate_per_minute
        }
    }
}

// ─── Recipient ─────────────────────────────────────────────

/// Per-recipient send lifecycle.
///
/// `Sending` is the transient claim state: a dispatcher marks a row
/// `pending -> sending` atomically before touching the gateway, so two
/// overlapping ticks can never both send to the same phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// One-directional advancement; the operator re-queue (failed -> pending)
    /// is handled explicitly by the store, not here.
    pub fn can_advance(self, to: RecipientStatus) -> bool {
        use RecipientStatus::*;
        matches!(
            (self, to),
            (Pending, Sending)
                | (Pending, Sent)
                | (Pending, Failed)
                | (Sending, Sent)
                | (Sending, Failed)
                | (Sending, Pending)
                | (Sent, Delivered)
                | (Sent, Read)
                | (Delivered, Read)
        )
    }
}

/// One (campaign, phone) pairing tracked through its own send lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: i64,
    pub campaign_id: String,
    pub phone: String,
    pub status: RecipientStatus,
    pub wa_message_id: Option<String>,
    pub error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ─── Storefront entities ───────────────────────────────────

/// A storefront customer, as read by the audience resolver and the
/// win-back reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub phone: String,
    pub name: String,
    pub opted_in: bool,
    pub labels: Vec<String>,
    pub segment: String,
    pub tier: String,
    pub order_count: i64,
    pub total_spent: f64,
    pub last_order_at: Option<DateTime<Utc>>,
    /// Last in-app activity, distinct from the last order.
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Online,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Cod => "cod",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "cod" => Some(Self::Cod),
            _ => None,
        }
    }
}

/// An order, carrying the one-shot reminder flags the lifecycle engine
/// checks and sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_phone: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub paid: bool,
    pub payment_link: String,
    pub payment_link_created_at: Option<DateTime<Utc>>,
    pub payment_link_expires_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_confirm_sent: bool,
    pub review_request_sent: bool,
    pub total: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Active,
    Converted,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Converted => "converted",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "converted" => Some(Self::Converted),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// A shopping cart with its recovery-reminder bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub customer_phone: String,
    pub status: CartStatus,
    pub total: f64,
    pub reminder_count: i64,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Truncate a gateway error for storage on the recipient row.
pub fn truncate_error(e: &str) -> String {
    if e.len() <= MAX_ERROR_LEN {
        e.to_string()
    } else {
        let mut cut = MAX_ERROR_LEN;
        while !e.is_char_boundary(cut) {
            cut -= 1;
        }
        e[..cut].to_string()
    }
}
