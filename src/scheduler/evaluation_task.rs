use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::{
    context::Context,
    retry::{RetryPolicy, RetryState},
};

/// Polls evaluations until `stop` flips.
///
/// Waits `polling_interval` before the first fetch. A failed fetch is retried after the policy's
/// delay until the budget is spent, then polling falls back to the regular interval.
pub(super) async fn run(
    context: Arc<Context>,
    polling_interval: Duration,
    retry: RetryPolicy,
    mut stop: watch::Receiver<bool>,
) {
    let mut retries = RetryState::new(retry);
    let mut delay = polling_interval;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => return,
        }

        delay = match context.fetch_evaluations(None).await {
            Ok(_) => {
                retries.on_success();
                polling_interval
            }
            Err(_) => match retries.on_failure() {
                Some(delay) => {
                    log::debug!(target: "flagsync", retry = retries.retries(); "retrying evaluation fetch in {delay:?}");
                    delay
                }
                None => polling_interval,
            },
        };

        if *stop.borrow() {
            return;
        }
    }
}
