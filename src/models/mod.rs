pub mod availability;
pub mod booking_state;
pub mod conversation;
pub mod reservation;
pub mod service;
pub mod time_format;

pub use availability::{AvailabilitySlot, OpeningHours, OpeningWindow};
pub use booking_state::{BookingData, BookingState, BookingStatus, ConversationMessage, Field};
pub use conversation::Conversation;
pub use reservation::{Reservation, ReservationStatus};
pub use service::ServiceCatalog;
