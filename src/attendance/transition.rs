//! Pure hours-card state machine.
//!
//! ```text
//! (none) --clock_in--> OPEN --clock_out--> CLOSED --sign--> SIGNED --approve--> APPROVED
//!                                                                  \--reject---> REJECTED
//! ```
//!
//! No I/O happens here; the store feeds in the current card and persists
//! whatever comes back.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::hours_card::{HoursCard, HoursCardStatus, Phase};
use crate::model::role::Role;
use crate::model::workplace::StaffMember;

use super::error::AttendanceError;
use super::geo::Admission;

/// Who is asking. `staff_id` is resolved for workers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: u64,
    pub role: Role,
    pub employer_id: Option<u64>,
    pub staff_id: Option<u64>,
}

impl Actor {
    fn owns(&self, card: &HoursCard) -> bool {
        self.role == Role::Worker && self.staff_id == Some(card.staff_id)
    }

    fn approves_for(&self, card: &HoursCard) -> bool {
        self.role == Role::Business && self.employer_id == Some(card.business_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardAction {
    ClockOut {
        at: DateTime<Utc>,
        notes: Option<String>,
        break_minutes: u32,
    },
    Sign {
        at: DateTime<Utc>,
        signature: String,
    },
    Approve {
        at: DateTime<Utc>,
    },
    Reject {
        at: DateTime<Utc>,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rules {
    /// Shifts longer than this are flagged for manual review, never refused.
    pub long_shift_hours: f64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            long_shift_hours: 12.0,
        }
    }
}

/// Builds the record created by an admitted clock-in. Ids are assigned by
/// the store.
pub fn open_card(
    staff: &StaffMember,
    date: NaiveDate,
    at: DateTime<Utc>,
    admission: Admission,
    shift_id: Option<u64>,
    notes: Option<String>,
) -> HoursCard {
    HoursCard {
        id: 0,
        staff_id: staff.id,
        business_id: staff.business_id,
        shift_id,
        date,
        clock_in_at: Some(at),
        clock_out_at: None,
        clock_in_location: admission.location,
        clock_in_distance_meters: admission.distance_meters,
        break_minutes: 0,
        total_hours: None,
        flagged_for_review: false,
        status: HoursCardStatus::Pending,
        worker_signature: None,
        worker_signed_at: None,
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
        notes: non_blank(notes),
        revision: 0,
    }
}

/// Worked hours between clock-in and clock-out minus breaks, never negative.
pub fn worked_hours(start: DateTime<Utc>, end: DateTime<Utc>, break_minutes: u32) -> f64 {
    let seconds = (end - start).num_seconds() as f64 - f64::from(break_minutes) * 60.0;
    (seconds / 3600.0).max(0.0)
}

pub fn apply(
    card: &HoursCard,
    action: CardAction,
    actor: &Actor,
    rules: &Rules,
) -> Result<HoursCard, AttendanceError> {
    let mut next = card.clone();

    match action {
        CardAction::ClockOut {
            at,
            notes,
            break_minutes,
        } => {
            if !actor.owns(card) {
                return Err(AttendanceError::Forbidden);
            }
            if card.phase() != Phase::Open {
                return Err(AttendanceError::NotClockedIn);
            }
            let start = card.clock_in_at.ok_or(AttendanceError::NotClockedIn)?;
            if at <= start {
                return Err(AttendanceError::InvalidClockOut);
            }

            let total = worked_hours(start, at, break_minutes);
            next.clock_out_at = Some(at);
            next.break_minutes = break_minutes;
            next.total_hours = Some(total);
            next.flagged_for_review = total > rules.long_shift_hours;
            if let Some(notes) = non_blank(notes) {
                next.notes = Some(notes);
            }
        }
        CardAction::Sign { at, signature } => {
            if !actor.owns(card) {
                return Err(AttendanceError::Forbidden);
            }
            if card.phase() != Phase::Closed {
                return Err(AttendanceError::NotReadyToSign);
            }
            let signature = non_blank(Some(signature)).ok_or(AttendanceError::SignatureRequired)?;

            next.status = HoursCardStatus::Signed;
            next.worker_signature = Some(signature);
            next.worker_signed_at = Some(at);
        }
        CardAction::Approve { at } => {
            finalizable(card, actor)?;

            next.status = HoursCardStatus::Approved;
            next.approved_by = Some(actor.user_id);
            next.approved_at = Some(at);
        }
        CardAction::Reject { at, reason } => {
            finalizable(card, actor)?;
            let reason = non_blank(Some(reason)).ok_or(AttendanceError::RejectionReasonRequired)?;

            next.status = HoursCardStatus::Rejected;
            next.rejection_reason = Some(reason);
            next.approved_by = Some(actor.user_id);
            next.approved_at = Some(at);
        }
    }

    next.revision = card.revision.wrapping_add(1);
    Ok(next)
}

fn finalizable(card: &HoursCard, actor: &Actor) -> Result<(), AttendanceError> {
    if !actor.approves_for(card) {
        return Err(AttendanceError::Forbidden);
    }
    if card.status.is_final() {
        return Err(AttendanceError::AlreadyFinalized);
    }
    if card.status != HoursCardStatus::Signed {
        return Err(AttendanceError::NotAwaitingApproval);
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::hours_card::fixtures::open_card as fixture;
    use chrono::Duration;

    fn worker() -> Actor {
        Actor {
            user_id: 50,
            role: Role::Worker,
            employer_id: Some(7),
            staff_id: Some(100),
        }
    }

    fn manager() -> Actor {
        Actor {
            user_id: 10,
            role: Role::Business,
            employer_id: Some(7),
            staff_id: None,
        }
    }

    fn clock_out(card: &HoursCard, hours: i64) -> CardAction {
        CardAction::ClockOut {
            at: card.clock_in_at.unwrap() + Duration::hours(hours),
            notes: None,
            break_minutes: 0,
        }
    }

    fn sign(name: &str) -> CardAction {
        CardAction::Sign {
            at: fixture().clock_in_at.unwrap() + Duration::hours(9),
            signature: name.to_string(),
        }
    }

    fn signed_card() -> HoursCard {
        let card = fixture();
        let closed = apply(&card, clock_out(&card, 8), &worker(), &Rules::default()).unwrap();
        apply(&closed, sign("Jane Doe"), &worker(), &Rules::default()).unwrap()
    }

    fn approve() -> CardAction {
        CardAction::Approve {
            at: fixture().clock_in_at.unwrap() + Duration::days(1),
        }
    }

    fn reject(reason: &str) -> CardAction {
        CardAction::Reject {
            at: fixture().clock_in_at.unwrap() + Duration::days(1),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn open_card_records_admission() {
        let staff = StaffMember {
            id: 100,
            business_id: 7,
            user_id: Some(50),
            name: "Jane".into(),
            status: crate::model::workplace::StaffStatus::Active,
        };
        let at = fixture().clock_in_at.unwrap();
        let card = open_card(
            &staff,
            fixture().date,
            at,
            Admission {
                location: None,
                distance_meters: Some(0.0),
            },
            Some(3),
            Some("  ".into()),
        );
        assert!(card.is_open());
        assert_eq!(card.clock_in_distance_meters, Some(0.0));
        assert_eq!(card.shift_id, Some(3));
        assert_eq!(card.notes, None);
    }

    #[test]
    fn full_lifecycle_moves_forward() {
        let card = fixture();
        let rules = Rules::default();

        let closed = apply(&card, clock_out(&card, 8), &worker(), &rules).unwrap();
        assert_eq!(closed.phase(), Phase::Closed);
        assert_eq!(closed.total_hours, Some(8.0));
        assert!(!closed.flagged_for_review);
        assert_eq!(closed.revision, 1);

        let signed = apply(&closed, sign(" Jane Doe "), &worker(), &rules).unwrap();
        assert_eq!(signed.status, HoursCardStatus::Signed);
        assert_eq!(signed.worker_signature.as_deref(), Some("Jane Doe"));

        let approved = apply(&signed, approve(), &manager(), &rules).unwrap();
        assert_eq!(approved.status, HoursCardStatus::Approved);
        assert_eq!(approved.approved_by, Some(10));
    }

    #[test]
    fn clock_out_requires_an_open_card() {
        let card = fixture();
        let closed = apply(&card, clock_out(&card, 1), &worker(), &Rules::default()).unwrap();
        assert!(matches!(
            apply(&closed, clock_out(&card, 2), &worker(), &Rules::default()),
            Err(AttendanceError::NotClockedIn)
        ));
    }

    #[test]
    fn clock_out_must_follow_clock_in() {
        let card = fixture();
        assert!(matches!(
            apply(&card, clock_out(&card, 0), &worker(), &Rules::default()),
            Err(AttendanceError::InvalidClockOut)
        ));
    }

    #[test]
    fn breaks_are_subtracted_and_clamped() {
        let start = fixture().clock_in_at.unwrap();
        assert_eq!(worked_hours(start, start + Duration::hours(8), 30), 7.5);
        assert_eq!(worked_hours(start, start + Duration::minutes(10), 60), 0.0);
    }

    #[test]
    fn long_shifts_are_flagged_not_refused() {
        let card = fixture();
        let closed = apply(&card, clock_out(&card, 14), &worker(), &Rules::default()).unwrap();
        assert!(closed.flagged_for_review);
        assert_eq!(closed.total_hours, Some(14.0));
    }

    #[test]
    fn only_the_owning_worker_may_clock_out_or_sign() {
        let card = fixture();
        let colleague = Actor {
            staff_id: Some(101),
            ..worker()
        };
        assert!(matches!(
            apply(&card, clock_out(&card, 8), &colleague, &Rules::default()),
            Err(AttendanceError::Forbidden)
        ));
        assert!(matches!(
            apply(&card, clock_out(&card, 8), &manager(), &Rules::default()),
            Err(AttendanceError::Forbidden)
        ));
    }

    #[test]
    fn signing_needs_a_closed_pending_card_and_a_name() {
        let card = fixture();
        assert!(matches!(
            apply(&card, sign("Jane Doe"), &worker(), &Rules::default()),
            Err(AttendanceError::NotReadyToSign)
        ));

        let closed = apply(&card, clock_out(&card, 8), &worker(), &Rules::default()).unwrap();
        assert!(matches!(
            apply(&closed, sign("   "), &worker(), &Rules::default()),
            Err(AttendanceError::SignatureRequired)
        ));

        let signed = signed_card();
        assert!(matches!(
            apply(&signed, sign("Jane Doe"), &worker(), &Rules::default()),
            Err(AttendanceError::NotReadyToSign)
        ));
    }

    #[test]
    fn approval_needs_a_signed_card() {
        let card = fixture();
        assert!(matches!(
            apply(&card, approve(), &manager(), &Rules::default()),
            Err(AttendanceError::NotAwaitingApproval)
        ));
    }

    #[test]
    fn approval_is_limited_to_the_employer() {
        let other_business = Actor {
            employer_id: Some(8),
            ..manager()
        };
        assert!(matches!(
            apply(&signed_card(), approve(), &other_business, &Rules::default()),
            Err(AttendanceError::Forbidden)
        ));
        assert!(matches!(
            apply(&signed_card(), approve(), &worker(), &Rules::default()),
            Err(AttendanceError::Forbidden)
        ));
    }

    #[test]
    fn rejection_needs_a_reason() {
        assert!(matches!(
            apply(&signed_card(), reject(""), &manager(), &Rules::default()),
            Err(AttendanceError::RejectionReasonRequired)
        ));
        let rejected = apply(&signed_card(), reject("wrong hours"), &manager(), &Rules::default()).unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong hours"));
    }

    #[test]
    fn finalized_cards_never_move_again() {
        let rules = Rules::default();
        let approved = apply(&signed_card(), approve(), &manager(), &rules).unwrap();
        let rejected = apply(&signed_card(), reject("wrong hours"), &manager(), &rules).unwrap();

        for final_card in [&approved, &rejected] {
            let actions = [
                approve(),
                reject("again"),
                clock_out(final_card, 10),
                sign("Jane Doe"),
            ];
            for action in actions {
                let actor = match action {
                    CardAction::Approve { .. } | CardAction::Reject { .. } => manager(),
                    _ => worker(),
                };
                let result = apply(final_card, action.clone(), &actor, &rules);
                assert!(result.is_err(), "{action:?} moved a finalized card");
                if matches!(action, CardAction::Approve { .. } | CardAction::Reject { .. }) {
                    assert!(matches!(result, Err(AttendanceError::AlreadyFinalized)));
                }
            }
        }
    }
}
