//! Event queue and its delivery to the ingestion endpoint.
mod interactor;
mod storage;

pub use storage::{DefaultEventStorage, EventQueueSnapshot, EventStorage, LockedEventStorage};

pub(crate) use interactor::EventInteractor;
