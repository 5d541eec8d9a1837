pub mod error;
pub mod geo;
pub mod store;
pub mod transition;
pub mod workflow;

pub use error::AttendanceError;
pub use store::{AttendanceStore, StoreSettings};
pub use transition::{Actor, Rules};
pub use workflow::ApprovalWorkflow;
