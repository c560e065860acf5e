//! # Kirana Core
//!
//! Shared foundation for the campaign engine: the data model
//! (campaigns, recipients, storefront entities), the error enum,
//! TOML configuration, and the `MessageSender` gateway seam.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::KiranaConfig;
pub use error::{KiranaError, Result};
pub use traits::MessageSender;
pub use types::{
    AudienceTarget, Campaign, CampaignStatus, Cart, CartStatus, Customer, MessageButton,
    MessageKind, MessageSpec, Order, OrderStatus, PaymentMethod, Recipient, RecipientStatus,
};
