pub mod availability;
pub mod controller;
pub mod conversation;
pub mod extraction;
pub mod messaging;
pub mod scheduling;
