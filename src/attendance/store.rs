//! Serialized, revision-checked persistence of hours card transitions.
//!
//! Every mutation runs read → decide → conditional write under a per-key lock.
//! The request deadline covers reading and deciding; once the write starts it
//! runs to completion and a successful write is always announced on the
//! event bus. Fan-out happens elsewhere and is never awaited here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::model::hours_card::{GeoPoint, HoursCard};
use crate::model::role::Role;
use crate::model::workplace::StaffMember;
use crate::realtime::events::{ChangeEvent, EventBus};
use crate::store::{AttendanceRepository, StoreError};
use crate::utils::clock::Clock;
use crate::utils::keyed_lock::KeyedLocks;

use super::error::AttendanceError;
use super::geo;
use super::transition::{self, Actor, CardAction, Rules};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    /// Clock-in, clock-out and sign for one worker's business-local day.
    Day(u64, NaiveDate),
    /// Approve / reject of one card.
    Card(u64),
}

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub request_timeout: Duration,
    pub rules: Rules,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            rules: Rules::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClockInRequest {
    pub location: Option<GeoPoint>,
    pub shift_id: Option<u64>,
    pub notes: Option<String>,
}

/// The worker's open card plus its live duration by the server clock.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OpenCardView {
    pub record: HoursCard,
    #[schema(example = 3.25)]
    pub hours_so_far: f64,
}

/// A decided transition waiting to be written, still holding its lock.
struct PendingWrite {
    _guard: OwnedMutexGuard<()>,
    user_id: u64,
    current: HoursCard,
    next: HoursCard,
    recipients: Vec<u64>,
}

fn recipients(worker: Option<u64>, approver: Option<u64>) -> Vec<u64> {
    let mut recipients: Vec<u64> = worker.into_iter().chain(approver).collect();
    recipients.dedup();
    recipients
}

pub struct AttendanceStore {
    repo: Arc<dyn AttendanceRepository>,
    locks: KeyedLocks<LockKey>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    settings: StoreSettings,
}

impl AttendanceStore {
    pub fn new(
        repo: Arc<dyn AttendanceRepository>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            repo,
            locks: KeyedLocks::new(),
            bus,
            clock,
            settings,
        }
    }

    pub fn repository(&self) -> &Arc<dyn AttendanceRepository> {
        &self.repo
    }

    pub async fn clock_in(&self, actor: &Actor, req: ClockInRequest) -> Result<HoursCard, AttendanceError> {
        let (_guard, draft, recipients) = self
            .bounded(async {
                let staff = self.worker(actor).await?;
                let workplace = self
                    .repo
                    .workplace(staff.business_id)
                    .await?
                    .ok_or(AttendanceError::WorkplaceNotConfigured)?;

                let now = self.clock.now();
                let date = workplace.local_date(now);
                let guard = self.locks.lock(LockKey::Day(staff.id, date)).await;

                if let Some(existing) = self.repo.card_for_day(staff.id, date).await? {
                    let err = if existing.is_open() {
                        AttendanceError::AlreadyClockedIn
                    } else {
                        AttendanceError::DayAlreadyRecorded
                    };
                    debug!(staff_id = staff.id, %date, card_id = existing.id, "Clock-in refused: {}", err);
                    return Err(err);
                }

                let admission = geo::admit(&workplace, req.location).inspect_err(|e| {
                    debug!(staff_id = staff.id, business_id = workplace.business_id, "Clock-in refused: {}", e);
                })?;

                let draft = transition::open_card(&staff, date, now, admission, req.shift_id, req.notes);
                let recipients = recipients(staff.user_id, Some(workplace.owner_user_id));
                Ok((guard, draft, recipients))
            })
            .await?;

        // past the deadline: a started write always finishes and is announced
        let card = self.repo.insert_card(draft).await.map_err(|e| match e {
            StoreError::Duplicate => AttendanceError::AlreadyClockedIn,
            other => other.into(),
        })?;

        info!(
            card_id = card.id,
            staff_id = card.staff_id,
            date = %card.date,
            distance_meters = ?card.clock_in_distance_meters,
            "Clocked in"
        );
        self.announce(&card, recipients);
        Ok(card)
    }

    pub async fn clock_out(
        &self,
        actor: &Actor,
        card_id: u64,
        notes: Option<String>,
        break_minutes: u32,
    ) -> Result<HoursCard, AttendanceError> {
        let pending = self
            .bounded(async {
                let actor = self.worker_actor(actor).await?;
                let key = self.day_of(card_id).await?;
                self.prepare(key, card_id, &actor, |at| CardAction::ClockOut {
                    at,
                    notes,
                    break_minutes,
                })
                .await
            })
            .await?;
        self.commit(pending).await
    }

    pub async fn sign(&self, actor: &Actor, card_id: u64, signature: String) -> Result<HoursCard, AttendanceError> {
        let pending = self
            .bounded(async {
                let actor = self.worker_actor(actor).await?;
                let key = self.day_of(card_id).await?;
                self.prepare(key, card_id, &actor, |at| CardAction::Sign { at, signature })
                    .await
            })
            .await?;
        self.commit(pending).await
    }

    pub async fn approve(&self, actor: &Actor, card_id: u64) -> Result<HoursCard, AttendanceError> {
        let pending = self
            .bounded(self.prepare(LockKey::Card(card_id), card_id, actor, |at| CardAction::Approve { at }))
            .await?;
        self.commit(pending).await
    }

    pub async fn reject(&self, actor: &Actor, card_id: u64, reason: String) -> Result<HoursCard, AttendanceError> {
        let pending = self
            .bounded(self.prepare(LockKey::Card(card_id), card_id, actor, |at| {
                CardAction::Reject { at, reason }
            }))
            .await?;
        self.commit(pending).await
    }

    /// The worker's currently open card, if any.
    pub async fn open_card_for(&self, actor: &Actor) -> Result<Option<OpenCardView>, AttendanceError> {
        self.bounded(async {
            let staff = self.worker(actor).await?;
            let now = self.clock.now();
            Ok(self
                .repo
                .latest_open_card(staff.id)
                .await?
                .map(|record| OpenCardView {
                    hours_so_far: record.hours_so_far(now),
                    record,
                }))
        })
        .await
    }

    /// Staff record behind a worker identity. Unlinked or inactive staff may
    /// not touch attendance.
    pub async fn worker(&self, actor: &Actor) -> Result<StaffMember, AttendanceError> {
        if actor.role != Role::Worker {
            return Err(AttendanceError::Forbidden);
        }
        match self.repo.staff_for_user(actor.user_id).await? {
            Some(staff) if staff.is_active() => Ok(staff),
            Some(staff) => {
                debug!(user_id = actor.user_id, staff_id = staff.id, status = %staff.status, "Inactive staff refused");
                Err(AttendanceError::Forbidden)
            }
            None => Err(AttendanceError::Forbidden),
        }
    }

    async fn worker_actor(&self, actor: &Actor) -> Result<Actor, AttendanceError> {
        let staff = self.worker(actor).await?;
        Ok(Actor {
            staff_id: Some(staff.id),
            ..*actor
        })
    }

    /// Lock key for the worker-side actions on a card. Clock-out and sign
    /// share the day key with clock-in.
    async fn day_of(&self, card_id: u64) -> Result<LockKey, AttendanceError> {
        let peek = self.repo.card(card_id).await?.ok_or(AttendanceError::NotFound)?;
        Ok(LockKey::Day(peek.staff_id, peek.date))
    }

    /// Takes the lock, re-reads the card and decides the next state. Nothing
    /// is written yet, so dropping this future leaves the card untouched.
    async fn prepare(
        &self,
        key: LockKey,
        card_id: u64,
        actor: &Actor,
        action: impl FnOnce(DateTime<Utc>) -> CardAction,
    ) -> Result<PendingWrite, AttendanceError> {
        let guard = self.locks.lock(key).await;
        let current = self.repo.card(card_id).await?.ok_or(AttendanceError::NotFound)?;
        let action = action(self.clock.now());
        let next = transition::apply(&current, action, actor, &self.settings.rules).inspect_err(|e| {
            debug!(card_id, user_id = actor.user_id, status = %current.status, "Transition refused: {}", e);
        })?;
        let recipients = self.recipients_of(&next).await;

        Ok(PendingWrite {
            _guard: guard,
            user_id: actor.user_id,
            current,
            next,
            recipients,
        })
    }

    /// Conditional write followed by the announcement. Runs outside the
    /// request deadline so a write is never left half reported.
    async fn commit(&self, pending: PendingWrite) -> Result<HoursCard, AttendanceError> {
        let PendingWrite {
            _guard,
            user_id,
            current,
            next,
            recipients,
        } = pending;

        self.repo.update_card(&next, current.revision).await?;

        info!(
            card_id = next.id,
            user_id,
            from = %current.status,
            to = %next.status,
            total_hours = ?next.total_hours,
            flagged = next.flagged_for_review,
            "Hours card updated"
        );
        if next.flagged_for_review && !current.flagged_for_review {
            warn!(card_id = next.id, total_hours = ?next.total_hours, "Shift flagged for review");
        }

        self.announce(&next, recipients);
        Ok(next)
    }

    async fn recipients_of(&self, card: &HoursCard) -> Vec<u64> {
        let worker = match self.repo.staff(card.staff_id).await {
            Ok(staff) => staff.and_then(|s| s.user_id),
            Err(e) => {
                warn!(card_id = card.id, "Could not resolve worker for push: {}", e);
                None
            }
        };
        let approver = match self.repo.workplace(card.business_id).await {
            Ok(workplace) => workplace.map(|w| w.owner_user_id),
            Err(e) => {
                warn!(card_id = card.id, "Could not resolve approver for push: {}", e);
                None
            }
        };
        recipients(worker, approver)
    }

    fn announce(&self, card: &HoursCard, recipients: Vec<u64>) {
        self.bus.publish(ChangeEvent::Attendance {
            record: card.clone(),
            recipients,
        });
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T, AttendanceError>>) -> Result<T, AttendanceError> {
        match tokio::time::timeout(self.settings.request_timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.settings.request_timeout, "Attendance operation timed out");
                Err(AttendanceError::Timeout)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::model::workplace::{StaffStatus, Workplace};
    use crate::store::MemoryStore;
    use crate::utils::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    pub const SITE: GeoPoint = GeoPoint {
        latitude: 51.5007,
        longitude: -0.1246,
    };
    pub const OWNER: u64 = 70;
    pub const WORKER_USER: u64 = 1000;

    pub struct Harness {
        pub repo: Arc<MemoryStore>,
        pub clock: Arc<ManualClock>,
        pub bus: EventBus,
        pub store: Arc<AttendanceStore>,
    }

    pub fn worker() -> Actor {
        Actor {
            user_id: WORKER_USER,
            role: Role::Worker,
            employer_id: Some(7),
            staff_id: None,
        }
    }

    pub fn owner() -> Actor {
        Actor {
            user_id: OWNER,
            role: Role::Business,
            employer_id: Some(7),
            staff_id: None,
        }
    }

    pub fn harness() -> Harness {
        let repo = Arc::new(MemoryStore::new());
        repo.put_workplace(Workplace {
            business_id: 7,
            owner_user_id: OWNER,
            name: "Westminster Cafe".into(),
            workplace_latitude: Some(SITE.latitude),
            workplace_longitude: Some(SITE.longitude),
            clock_in_radius_meters: 100.0,
            require_location_for_clock_in: true,
            utc_offset_minutes: 0,
        });
        repo.put_staff(StaffMember {
            id: 100,
            business_id: 7,
            user_id: Some(WORKER_USER),
            name: "Jane Doe".into(),
            status: StaffStatus::Active,
        });

        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap()));
        let bus = EventBus::new(64);
        let store = Arc::new(AttendanceStore::new(
            repo.clone(),
            bus.clone(),
            clock.clone(),
            StoreSettings::default(),
        ));
        Harness {
            repo,
            clock,
            bus,
            store,
        }
    }

    pub fn at_site() -> ClockInRequest {
        ClockInRequest {
            location: Some(SITE),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::model::hours_card::HoursCardStatus;
    use crate::model::workplace::{StaffStatus, Workplace};
    use crate::store::{CardFilter, MemoryStore, WorkerSummary};
    use chrono::Duration as Span;

    #[tokio::test]
    async fn full_day_ends_rejected_and_stays_final() {
        let h = harness();
        let mut events = h.bus.subscribe();

        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        assert_eq!(card.status, HoursCardStatus::Pending);
        assert_eq!(card.clock_in_distance_meters, Some(0.0));

        h.clock.advance(Span::hours(8));
        let card = h.store.clock_out(&worker(), card.id, None, 0).await.unwrap();
        assert!((card.total_hours.unwrap() - 8.0).abs() < 1e-9);
        assert!(!card.flagged_for_review);

        let card = h.store.sign(&worker(), card.id, "Jane Doe".into()).await.unwrap();
        assert_eq!(card.status, HoursCardStatus::Signed);

        let card = h.store.reject(&owner(), card.id, "wrong hours".into()).await.unwrap();
        assert_eq!(card.status, HoursCardStatus::Rejected);
        assert_eq!(card.rejection_reason.as_deref(), Some("wrong hours"));

        assert!(matches!(
            h.store.approve(&owner(), card.id).await,
            Err(AttendanceError::AlreadyFinalized)
        ));

        let mut seen = Vec::new();
        while let Ok(ChangeEvent::Attendance { record, recipients }) = events.try_recv() {
            assert_eq!(recipients, vec![WORKER_USER, OWNER]);
            seen.push(record.status);
        }
        assert_eq!(
            seen,
            vec![
                HoursCardStatus::Pending,
                HoursCardStatus::Pending,
                HoursCardStatus::Signed,
                HoursCardStatus::Rejected
            ]
        );
    }

    #[tokio::test]
    async fn missing_location_creates_nothing() {
        let h = harness();
        let err = h
            .store
            .clock_in(&worker(), ClockInRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::LocationRequired));
        assert!(h.store.open_card_for(&worker()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_clock_in_on_the_same_day() {
        let h = harness();
        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        assert!(matches!(
            h.store.clock_in(&worker(), at_site()).await,
            Err(AttendanceError::AlreadyClockedIn)
        ));

        h.clock.advance(Span::hours(1));
        h.store.clock_out(&worker(), card.id, None, 0).await.unwrap();
        assert!(matches!(
            h.store.clock_in(&worker(), at_site()).await,
            Err(AttendanceError::DayAlreadyRecorded)
        ));

        h.clock.advance(Span::days(1));
        assert!(h.store.clock_in(&worker(), at_site()).await.is_ok());
    }

    #[tokio::test]
    async fn open_card_reports_server_side_hours() {
        let h = harness();
        h.store.clock_in(&worker(), at_site()).await.unwrap();
        h.clock.advance(Span::minutes(195));
        let view = h.store.open_card_for(&worker()).await.unwrap().unwrap();
        assert_eq!(view.hours_so_far, 3.25);
    }

    #[tokio::test]
    async fn long_shift_is_flagged_not_refused() {
        let h = harness();
        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        h.clock.advance(Span::hours(13));
        let card = h.store.clock_out(&worker(), card.id, None, 30).await.unwrap();
        assert_eq!(card.total_hours, Some(12.5));
        assert!(card.flagged_for_review);
    }

    #[tokio::test]
    async fn inactive_staff_cannot_clock_in() {
        let h = harness();
        h.repo.put_staff(StaffMember {
            id: 100,
            business_id: 7,
            user_id: Some(WORKER_USER),
            name: "Jane Doe".into(),
            status: StaffStatus::Terminated,
        });
        assert!(matches!(
            h.store.clock_in(&worker(), at_site()).await,
            Err(AttendanceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn other_employer_cannot_approve() {
        let h = harness();
        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        h.clock.advance(Span::hours(2));
        h.store.clock_out(&worker(), card.id, None, 0).await.unwrap();
        h.store.sign(&worker(), card.id, "Jane".into()).await.unwrap();

        let stranger = Actor {
            employer_id: Some(8),
            ..owner()
        };
        assert!(matches!(
            h.store.approve(&stranger, card.id).await,
            Err(AttendanceError::Forbidden)
        ));
        assert!(h.store.approve(&owner(), card.id).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_workplace_refuses_clock_in() {
        let h = harness();
        h.repo.put_workplace(Workplace {
            business_id: 7,
            owner_user_id: OWNER,
            name: "Nowhere".into(),
            workplace_latitude: None,
            workplace_longitude: None,
            clock_in_radius_meters: 100.0,
            require_location_for_clock_in: true,
            utc_offset_minutes: 0,
        });
        assert!(matches!(
            h.store.clock_in(&worker(), at_site()).await,
            Err(AttendanceError::WorkplaceNotConfigured)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_clock_ins_create_one_card() {
        let h = harness();
        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let store = h.store.clone();
                tokio::spawn(async move { store.clock_in(&worker(), at_site()).await })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, AttendanceError::AlreadyClockedIn)),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_approve_and_reject_finalize_once() {
        let h = harness();
        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        h.clock.advance(Span::hours(8));
        h.store.clock_out(&worker(), card.id, None, 0).await.unwrap();
        h.store.sign(&worker(), card.id, "Jane Doe".into()).await.unwrap();

        let approve = {
            let store = h.store.clone();
            tokio::spawn(async move { store.approve(&owner(), card.id).await })
        };
        let reject = {
            let store = h.store.clone();
            tokio::spawn(async move { store.reject(&owner(), card.id, "no".into()).await })
        };
        let outcomes = [approve.await.unwrap(), reject.await.unwrap()];

        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for outcome in outcomes.iter().filter_map(|r| r.as_ref().err()) {
            assert!(outcome.is_state_conflict());
        }
        let stored = h.repo.card(card.id).await.unwrap().unwrap();
        assert!(stored.status.is_final());
        assert_eq!(stored.revision, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operations_time_out() {
        let h = harness();
        let store = AttendanceStore::new(
            h.repo.clone(),
            h.bus.clone(),
            h.clock.clone(),
            StoreSettings {
                request_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let card = store.clock_in(&worker(), at_site()).await.unwrap();

        // hold the card's lock so the approval cannot proceed
        let _held = store.locks.lock(LockKey::Card(card.id)).await;
        assert!(matches!(
            store.approve(&owner(), card.id).await,
            Err(AttendanceError::Timeout)
        ));
    }

    /// Memory store whose staff lookups and card writes can be slowed down.
    struct Sluggish {
        inner: Arc<MemoryStore>,
        lookup_delay: Duration,
        write_delay: Duration,
    }

    #[async_trait::async_trait]
    impl AttendanceRepository for Sluggish {
        async fn staff_for_user(&self, user_id: u64) -> Result<Option<StaffMember>, StoreError> {
            self.inner.staff_for_user(user_id).await
        }
        async fn staff(&self, staff_id: u64) -> Result<Option<StaffMember>, StoreError> {
            tokio::time::sleep(self.lookup_delay).await;
            self.inner.staff(staff_id).await
        }
        async fn workplace(&self, business_id: u64) -> Result<Option<Workplace>, StoreError> {
            self.inner.workplace(business_id).await
        }
        async fn card(&self, id: u64) -> Result<Option<HoursCard>, StoreError> {
            self.inner.card(id).await
        }
        async fn card_for_day(&self, staff_id: u64, date: NaiveDate) -> Result<Option<HoursCard>, StoreError> {
            self.inner.card_for_day(staff_id, date).await
        }
        async fn latest_open_card(&self, staff_id: u64) -> Result<Option<HoursCard>, StoreError> {
            self.inner.latest_open_card(staff_id).await
        }
        async fn insert_card(&self, card: HoursCard) -> Result<HoursCard, StoreError> {
            self.inner.insert_card(card).await
        }
        async fn update_card(&self, card: &HoursCard, expected_revision: u32) -> Result<(), StoreError> {
            tokio::time::sleep(self.write_delay).await;
            self.inner.update_card(card, expected_revision).await
        }
        async fn list_cards(&self, filter: &CardFilter) -> Result<(Vec<HoursCard>, i64), StoreError> {
            self.inner.list_cards(filter).await
        }
        async fn summaries(&self, business_id: u64, staff_id: Option<u64>) -> Result<Vec<WorkerSummary>, StoreError> {
            self.inner.summaries(business_id, staff_id).await
        }
    }

    /// A signed card plus a store over `Sluggish` with a 100 ms deadline.
    async fn signed_card_behind(lookup_delay: Duration, write_delay: Duration) -> (Harness, AttendanceStore, u64) {
        let h = harness();
        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        h.clock.advance(Span::hours(8));
        h.store.clock_out(&worker(), card.id, None, 0).await.unwrap();
        h.store.sign(&worker(), card.id, "Jane Doe".into()).await.unwrap();

        let slow = Arc::new(Sluggish {
            inner: h.repo.clone(),
            lookup_delay,
            write_delay,
        });
        let store = AttendanceStore::new(
            slow,
            h.bus.clone(),
            h.clock.clone(),
            StoreSettings {
                request_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );
        (h, store, card.id)
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_before_the_write_leaves_the_card_untouched() {
        let (h, store, id) = signed_card_behind(Duration::from_millis(200), Duration::ZERO).await;
        let mut events = h.bus.subscribe();

        assert!(matches!(store.approve(&owner(), id).await, Err(AttendanceError::Timeout)));

        let stored = h.repo.card(id).await.unwrap().unwrap();
        assert_eq!(stored.status, HoursCardStatus::Signed);
        assert!(events.try_recv().is_err());

        // nothing half done, so a retry on a healthy store goes through
        assert_eq!(h.store.approve(&owner(), id).await.unwrap().status, HoursCardStatus::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn started_write_completes_and_is_announced_past_the_deadline() {
        let (h, store, id) = signed_card_behind(Duration::ZERO, Duration::from_millis(200)).await;
        let mut events = h.bus.subscribe();

        let card = store.approve(&owner(), id).await.unwrap();
        assert_eq!(card.status, HoursCardStatus::Approved);
        assert_eq!(h.repo.card(id).await.unwrap().unwrap().status, HoursCardStatus::Approved);

        match events.try_recv() {
            Ok(ChangeEvent::Attendance { record, recipients }) => {
                assert_eq!(record.status, HoursCardStatus::Approved);
                assert_eq!(recipients, vec![WORKER_USER, OWNER]);
            }
            other => panic!("expected an attendance event, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_clock_outs_close_the_card_once() {
        let h = harness();
        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        h.clock.advance(Span::hours(8));

        let attempts: Vec<_> = (0..4)
            .map(|_| {
                let store = h.store.clone();
                tokio::spawn(async move { store.clock_out(&worker(), card.id, None, 0).await })
            })
            .collect();

        let mut closed = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => closed += 1,
                Err(e) => assert!(matches!(e, AttendanceError::NotClockedIn), "{e:?}"),
            }
        }
        assert_eq!(closed, 1);
        assert_eq!(h.repo.card(card.id).await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn clock_out_and_sign_are_serialized_per_day() {
        let h = harness();
        let card = h.store.clock_in(&worker(), at_site()).await.unwrap();
        h.clock.advance(Span::hours(8));

        let sign = {
            let store = h.store.clone();
            tokio::spawn(async move { store.sign(&worker(), card.id, "Jane Doe".into()).await })
        };
        let clock_out = {
            let store = h.store.clone();
            tokio::spawn(async move { store.clock_out(&worker(), card.id, None, 0).await })
        };
        let signed = sign.await.unwrap();
        let closed = clock_out.await.unwrap();

        // the clock-out always lands; the signature either follows it or is
        // refused because the card was still open, never a lost race
        assert!(closed.is_ok());
        let stored = h.repo.card(card.id).await.unwrap().unwrap();
        match signed {
            Ok(_) => {
                assert_eq!(stored.status, HoursCardStatus::Signed);
                assert_eq!(stored.revision, 2);
            }
            Err(e) => {
                assert!(matches!(e, AttendanceError::NotReadyToSign), "{e:?}");
                assert_eq!(stored.status, HoursCardStatus::Pending);
                assert_eq!(stored.revision, 1);
            }
        }
    }
}
