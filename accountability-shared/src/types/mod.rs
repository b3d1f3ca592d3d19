pub mod event;
pub mod ids;

pub use event::Event;
pub use ids::{PartnershipId, UserId};
