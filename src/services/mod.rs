//! The booking, payment and loyalty core.

pub mod admin;
pub mod booking;
pub mod guard;
pub mod points;
pub mod profile;
pub mod publisher;
pub mod reconciler;
pub mod redemption;

#[cfg(test)]
pub(crate) mod fixtures;

pub use admin::AdminService;
pub use booking::{BookingReceipt, BookingService};
pub use points::PointCalculator;
pub use profile::{Profile, ProfileService};
pub use publisher::{BadgeTopics, EventPublisher, OutboundWorker};
pub use reconciler::{CallbackOutcome, PaymentCallback, PaymentReconciler};
pub use redemption::{RedemptionReceipt, RedemptionService};
