//! Domain services — business rules over the repository layer.
//!
//! Services validate, orchestrate transactions, and return
//! formatting-free data; all presentation lives in the platform
//! adapters.

pub mod budget;
pub mod notification;
pub mod project;
pub mod report;
pub mod roles;
pub mod stage;
