//! Capacity and eligibility checks for booking attempts.
//!
//! Everything here is a pure function over state the caller already read,
//! so the same rules run twice: once as a fast pre-check and once inside the
//! unit of work that writes the participant.

use chrono::{DateTime, Utc};

use crate::models::{Participant, ParticipantStatus, Resource, ResourceKind, ResourceStatus, Transaction};
use crate::utils::error::AppError;

/// What the caller is trying to do with the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Book,
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Closed,
    Inactive,
    FullyBooked,
    AlreadyBooked,
}

impl DenyReason {
    pub fn message(&self, kind: ResourceKind, attempt: Attempt) -> String {
        match (self, attempt) {
            (DenyReason::Closed, Attempt::Book) => {
                format!("This {} is closed and no longer accepts bookings", kind)
            }
            (DenyReason::Closed, Attempt::Modify) => {
                format!("This {} is closed and can no longer be modified", kind)
            }
            (DenyReason::Inactive, _) => format!("This {} is not open for booking", kind),
            (DenyReason::FullyBooked, _) => format!("This {} is fully booked", kind),
            (DenyReason::AlreadyBooked, _) => format!("You have already booked this {}", kind),
        }
    }

    pub fn into_error(self, kind: ResourceKind, attempt: Attempt) -> AppError {
        AppError::Conflict(self.message(kind, attempt))
    }
}

/// How an allowed booking lands on the participant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No row yet for this user.
    Fresh,
    /// Re-using a cancelled row.
    Reactivate,
    /// Re-using a pending row whose invoice is gone or expired.
    Retry,
}

/// The invoice a user is already holding for this resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInvoice {
    pub transaction_code: String,
    pub invoice_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    Allow(Admission),
    /// Not a new booking, but not an error either: hand back the invoice the
    /// user already has.
    Pending(PendingInvoice),
    Deny(DenyReason),
}

/// Rules, first match wins: closed, inactive, capacity, pending invoice,
/// already booked, otherwise allowed.
///
/// `used_slots` counts every pending or active participant. A user whose own
/// row already holds one of those slots is compared against the others only,
/// so re-polling a pending booking on a full resource still returns the
/// same invoice.
pub fn check_booking_eligibility(
    resource: &Resource,
    used_slots: i64,
    participant: Option<&Participant>,
    transaction: Option<&Transaction>,
    now: DateTime<Utc>,
) -> Eligibility {
    match resource.status {
        ResourceStatus::Closed => return Eligibility::Deny(DenyReason::Closed),
        ResourceStatus::Inactive => return Eligibility::Deny(DenyReason::Inactive),
        ResourceStatus::Active => {}
    }

    let own_slot = participant.map_or(false, |p| p.status.holds_slot());
    let used_by_others = if own_slot { used_slots - 1 } else { used_slots };
    if used_by_others >= i64::from(resource.max_participant) {
        return Eligibility::Deny(DenyReason::FullyBooked);
    }

    match participant.map(|p| p.status) {
        None => Eligibility::Allow(Admission::Fresh),
        Some(ParticipantStatus::Cancel) => Eligibility::Allow(Admission::Reactivate),
        Some(ParticipantStatus::Active) => Eligibility::Deny(DenyReason::AlreadyBooked),
        Some(ParticipantStatus::Pending) => {
            let linked = participant.and_then(|p| p.transaction_code.as_deref());
            match transaction {
                Some(txn) if Some(txn.code.as_str()) == linked && txn.is_live(now) => {
                    Eligibility::Pending(PendingInvoice {
                        transaction_code: txn.code.clone(),
                        invoice_url: txn.invoice_url.clone(),
                        expires_at: txn.expires_at,
                    })
                }
                _ => Eligibility::Allow(Admission::Retry),
            }
        }
    }
}

/// Closed resources accept no edits. Inactive ones remain editable.
pub fn check_modification(resource: &Resource) -> Result<(), AppError> {
    if resource.status == ResourceStatus::Closed {
        return Err(DenyReason::Closed.into_error(resource.kind, Attempt::Modify));
    }
    Ok(())
}
