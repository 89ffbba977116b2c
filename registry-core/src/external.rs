//! Narrow interfaces to external collaborators
//!
//! The registry never talks to third-party services directly; callers
//! inject a handle implementing the trait below. Only the booking flow
//! consumes it, and only to flip `payment_confirmed` — payment itself is
//! outside the lifecycle invariants.

use crate::Result;

/// Outcome of verifying an order with the payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Gateway reports the order paid
    Paid,
    /// Gateway reports the order unpaid or failed
    Unpaid,
}

/// Payment gateway capability.
///
/// Implementations wrap the real gateway client; errors should surface as
/// [`crate::Error::UpstreamUnavailable`] so callers can distinguish a
/// gateway outage from a declined payment.
pub trait PaymentGateway: Send + Sync {
    /// Verify payment status for an external order reference
    fn verify_order(&self, order_ref: &str) -> Result<PaymentOutcome>;
}
