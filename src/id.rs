use uuid::Uuid;

/// Generates ids for events, listeners and mutex owners. Ids must be unique per process.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_ids {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::IdGenerator;

    /// Deterministic `prefix-N` ids.
    #[derive(Debug)]
    pub(crate) struct SequentialIds {
        prefix: &'static str,
        next: AtomicU64,
    }

    impl SequentialIds {
        pub(crate) fn new(prefix: &'static str) -> SequentialIds {
            SequentialIds {
                prefix,
                next: AtomicU64::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIds {
        fn new_id(&self) -> String {
            format!("{}-{}", self.prefix, self.next.fetch_add(1, Ordering::SeqCst))
        }
    }
}
