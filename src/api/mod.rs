pub mod attendance;
pub mod hours_cards;
pub mod notifications;
