pub mod notification;
pub mod participant;
pub mod point;
pub mod redeem;
pub mod resource;
pub mod tier;
pub mod transaction;
pub mod user;

pub use notification::Notification;
pub use participant::{Participant, ParticipantStatus};
pub use point::{PointCredit, PointSource};
pub use redeem::{Platform, RedeemRecord};
pub use resource::{Resource, ResourceKind, ResourceStatus};
pub use tier::Tier;
pub use transaction::{PaymentAudit, Transaction, TransactionStatus};
pub use user::User;
