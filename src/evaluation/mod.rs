//! Evaluation cache and its synchronization with the remote service.
mod interactor;
mod storage;

pub use interactor::FetchOutcome;
pub use storage::EvaluationSnapshot;

pub(crate) use interactor::EvaluationInteractor;
pub(crate) use storage::EvaluationStorage;

#[cfg(test)]
pub(crate) use storage::tests;
