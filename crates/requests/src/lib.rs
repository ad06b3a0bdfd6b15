//! `flowrack-requests`: the material request lifecycle.
//!
//! A request moves forward only:
//! `pending → approved → collecting → delivered → returned`, with `cancelled`
//! reachable from `pending` or `approved`. Every transition is a pure function
//! from the current request (and its items) to a [`RequestTransition`] that the
//! storage layer persists atomically, guarded by the status it was computed from.

pub mod availability;
pub mod number;
pub mod request;
pub mod status;
pub mod transition;

pub use availability::{AvailabilityReport, ItemAvailability, ItemReconciliation, reconcile};
pub use number::{REQUEST_NUMBER_PREFIX, generate_request_number, is_valid_request_number};
pub use request::{
    NewRequest, NewRequestItem, Request, RequestFilter, RequestItem, parse_requested_date,
    parse_requested_time,
};
pub use status::RequestStatus;
pub use transition::{DeliveryWeight, ItemApproval, MovementPolicy, RequestTransition, ReturnWeight};
