use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{watch, Notify},
    time::Instant,
};

use crate::context::Context;

/// Flushes the event queue until `stop` flips.
///
/// `event_added` wakes the task for a threshold check. The flush timer forces a send and is
/// restarted whenever the timer fires or a batch goes out.
pub(super) async fn run(
    context: Arc<Context>,
    flush_interval: Duration,
    event_added: Arc<Notify>,
    mut stop: watch::Receiver<bool>,
) {
    let mut deadline = Instant::now() + flush_interval;
    loop {
        let force = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => true,
            _ = event_added.notified() => false,
            _ = stop.changed() => return,
        };

        let sent = match context.events.send_events(force).await {
            Ok(sent) => sent,
            Err(err) => {
                log::warn!(target: "flagsync", "failed to send events: {err}");
                false
            }
        };
        if force || sent {
            deadline = Instant::now() + flush_interval;
        }

        if *stop.borrow() {
            return;
        }
    }
}
