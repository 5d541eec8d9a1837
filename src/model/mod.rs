pub mod counts;
pub mod hours_card;
pub mod role;
pub mod workplace;
