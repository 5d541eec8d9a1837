use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::hours_card::HoursCard;
use crate::model::role::Role;
use crate::store::{CardFilter, WorkerSummary};

use super::error::AttendanceError;
use super::store::{AttendanceStore, ClockInRequest, OpenCardView};
use super::transition::Actor;

#[derive(Debug, Serialize, ToSchema)]
pub struct CardPage {
    pub data: Vec<HoursCard>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 20)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

/// Role-gated entry point to the hours card lifecycle.
///
/// Workers clock in, clock out and sign their own cards; a business approves
/// or rejects cards of its own staff. Reads are scoped to the caller and take
/// no lock.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    store: Arc<AttendanceStore>,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<AttendanceStore>) -> Self {
        Self { store }
    }

    pub async fn clock_in(&self, actor: &Actor, req: ClockInRequest) -> Result<HoursCard, AttendanceError> {
        require(actor, Role::Worker)?;
        self.store.clock_in(actor, req).await
    }

    pub async fn clock_out(
        &self,
        actor: &Actor,
        card_id: u64,
        notes: Option<String>,
        break_minutes: u32,
    ) -> Result<HoursCard, AttendanceError> {
        require(actor, Role::Worker)?;
        self.store.clock_out(actor, card_id, notes, break_minutes).await
    }

    pub async fn sign(&self, actor: &Actor, card_id: u64, signature: String) -> Result<HoursCard, AttendanceError> {
        require(actor, Role::Worker)?;
        self.store.sign(actor, card_id, signature).await
    }

    pub async fn approve(&self, actor: &Actor, card_id: u64) -> Result<HoursCard, AttendanceError> {
        require(actor, Role::Business)?;
        self.store.approve(actor, card_id).await
    }

    pub async fn reject(&self, actor: &Actor, card_id: u64, reason: String) -> Result<HoursCard, AttendanceError> {
        require(actor, Role::Business)?;
        self.store.reject(actor, card_id, reason).await
    }

    pub async fn open_card(&self, actor: &Actor) -> Result<Option<OpenCardView>, AttendanceError> {
        require(actor, Role::Worker)?;
        self.store.open_card_for(actor).await
    }

    pub async fn list_cards(&self, actor: &Actor, mut filter: CardFilter) -> Result<CardPage, AttendanceError> {
        match actor.role {
            Role::Business => filter.business_id = Some(employer(actor)?),
            Role::Worker => {
                let staff = self.store.worker(actor).await?;
                filter.business_id = Some(staff.business_id);
                filter.staff_id = Some(staff.id);
            }
        }

        let (data, total) = self.store.repository().list_cards(&filter).await?;
        Ok(CardPage {
            data,
            page: filter.page(),
            per_page: filter.per_page(),
            total,
        })
    }

    pub async fn card(&self, actor: &Actor, card_id: u64) -> Result<HoursCard, AttendanceError> {
        let card = self
            .store
            .repository()
            .card(card_id)
            .await?
            .ok_or(AttendanceError::NotFound)?;

        let visible = match actor.role {
            Role::Business => employer(actor)? == card.business_id,
            Role::Worker => self.store.worker(actor).await?.id == card.staff_id,
        };
        if visible {
            Ok(card)
        } else {
            Err(AttendanceError::Forbidden)
        }
    }

    /// Per-worker dashboard totals. A worker only ever sees their own row.
    pub async fn summaries(&self, actor: &Actor, staff_id: Option<u64>) -> Result<Vec<WorkerSummary>, AttendanceError> {
        let repo = self.store.repository();
        let rows = match actor.role {
            Role::Business => repo.summaries(employer(actor)?, staff_id).await?,
            Role::Worker => {
                let staff = self.store.worker(actor).await?;
                repo.summaries(staff.business_id, Some(staff.id)).await?
            }
        };
        Ok(rows)
    }
}

fn require(actor: &Actor, role: Role) -> Result<(), AttendanceError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(AttendanceError::Forbidden)
    }
}

fn employer(actor: &Actor) -> Result<u64, AttendanceError> {
    actor.employer_id.ok_or(AttendanceError::Forbidden)
}
