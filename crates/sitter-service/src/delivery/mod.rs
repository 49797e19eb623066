//! Delivery of rendered messages to a target channel.
//!
//! - [`Delivery`] - the collaborator the broadcast scheduler talks to
//! - [`discord`] - Discord REST implementation

pub mod discord;

pub use discord::DiscordDelivery;

use crate::errors::DeliveryError;
use async_trait::async_trait;
use common::types::ChannelId;

/// Sends one message to one target.
///
/// Implementations report a target that no longer exists (or can no longer
/// be written to) as [`DeliveryError::Unreachable`]; every other failure is
/// [`DeliveryError::Failed`].
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver `text` to `target`. `wide_attention` asks the target to
    /// notify everyone rather than only the mentioned users.
    async fn deliver(
        &self,
        target: ChannelId,
        text: &str,
        wide_attention: bool,
    ) -> Result<(), DeliveryError>;
}
