//! Background tasks that poll evaluations and flush events.
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{
    runtime::Handle,
    sync::{watch, Notify},
};

use crate::{
    config::ClientConfig,
    context::Context,
    listener::ListenerId,
    retry::{Backoff, RetryPolicy},
    Error, Result,
};

mod evaluation_task;
mod event_task;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SchedulerConfig {
    pub polling_interval: Duration,
    pub polling_retry: RetryPolicy,
    pub events_flush_interval: Duration,
}

impl SchedulerConfig {
    pub(crate) fn new(config: &ClientConfig) -> SchedulerConfig {
        SchedulerConfig {
            polling_interval: config.polling_interval,
            polling_retry: RetryPolicy {
                max_retries: config.polling_max_retries,
                backoff: Backoff::Constant(config.polling_retry_interval),
            },
            events_flush_interval: config.events_flush_interval,
        }
    }
}

struct Running {
    /// Flipped to `true` on stop. Dropping it stops the tasks as well.
    stop: watch::Sender<bool>,
    event_added_listener: ListenerId,
}

/// Owns the evaluation polling task and the event flush task.
///
/// Stopping cancels pending waits. A request that is already in flight completes, but nothing
/// is scheduled after it.
pub(crate) struct Scheduler {
    context: Arc<Context>,
    config: SchedulerConfig,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub(crate) fn new(context: Arc<Context>, config: SchedulerConfig) -> Scheduler {
        Scheduler {
            context,
            config,
            running: Mutex::new(None),
        }
    }

    /// Spawn both tasks on the current Tokio runtime. Does nothing if already running.
    pub(crate) fn start(&self) -> Result<()> {
        let mut running = self.lock();
        if running.is_some() {
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| {
            Error::IllegalState("scheduler must be started within a Tokio runtime".to_owned())
        })?;

        let (stop, stop_receiver) = watch::channel(false);
        let event_added = Arc::new(Notify::new());
        let event_added_listener = {
            let event_added = event_added.clone();
            self.context
                .events
                .add_event_added_listener(Arc::new(move || event_added.notify_one()))
        };

        runtime.spawn(evaluation_task::run(
            self.context.clone(),
            self.config.polling_interval,
            self.config.polling_retry,
            stop_receiver.clone(),
        ));
        runtime.spawn(event_task::run(
            self.context.clone(),
            self.config.events_flush_interval,
            event_added,
            stop_receiver,
        ));

        log::debug!(target: "flagsync", "scheduler started");
        *running = Some(Running {
            stop,
            event_added_listener,
        });
        Ok(())
    }

    /// Does nothing if not running.
    pub(crate) fn stop(&self) {
        let Some(running) = self.lock().take() else {
            return;
        };
        running.stop.send_replace(true);
        self.context
            .events
            .remove_event_added_listener(&running.event_added_listener);
        log::debug!(target: "flagsync", "scheduler stopped");
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::time::Instant;

    use super::{Scheduler, SchedulerConfig};
    use crate::{
        context::Context,
        id::test_ids::SequentialIds,
        model::User,
        transport::{fake::json_response, Transport, TransportRequest, TransportResponse},
        ClientConfig, Error, Result,
    };

    /// Records when each endpoint was called, in whole seconds since creation.
    struct TimedTransport {
        started: Instant,
        evaluations_available: bool,
        calls: Mutex<Vec<(&'static str, u64)>>,
    }

    impl TimedTransport {
        fn new(evaluations_available: bool) -> Arc<TimedTransport> {
            Arc::new(TimedTransport {
                started: Instant::now(),
                evaluations_available,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls_to(&self, endpoint: &str) -> Vec<u64> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(called, _)| *called == endpoint)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for TimedTransport {
        async fn post(&self, request: TransportRequest) -> Result<TransportResponse> {
            let at = self.started.elapsed().as_secs();
            if request.url.ends_with("/get_evaluations") {
                self.calls.lock().unwrap().push(("get_evaluations", at));
                if !self.evaluations_available {
                    return Err(Error::Network {
                        message: "unreachable".to_owned(),
                    });
                }
                Ok(json_response(
                    200,
                    json!({ "evaluations": {}, "userEvaluationsId": format!("t{at}") }),
                ))
            } else {
                self.calls.lock().unwrap().push(("register_events", at));
                Ok(json_response(200, json!({ "errors": {} })))
            }
        }
    }

    fn scheduler(transport: Arc<TimedTransport>) -> Scheduler {
        let config = ClientConfig::new(
            "api-key",
            "https://api.example.com",
            "web",
            User::new("user"),
        )
        .transport(transport)
        .id_generator(Arc::new(SequentialIds::new("id")))
        .polling_interval(Duration::from_secs(120))
        .polling_retry_interval(Duration::from_secs(60))
        .polling_max_retries(5)
        .events_flush_interval(Duration::from_secs(30))
        .events_max_batch_size(3);
        Scheduler::new(
            Arc::new(Context::new(&config)),
            SchedulerConfig::new(&config),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_failed_polls_then_falls_back_to_interval() {
        let transport = TimedTransport::new(false);
        let scheduler = scheduler(transport.clone());

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        scheduler.stop();

        assert_eq!(
            transport.calls_to("get_evaluations"),
            [120, 180, 240, 300, 360, 420, 540]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn polls_at_interval_after_success() {
        let transport = TimedTransport::new(true);
        let scheduler = scheduler(transport.clone());

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(370)).await;

        assert_eq!(transport.calls_to("get_evaluations"), [120, 240, 360]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_polls() {
        let transport = TimedTransport::new(true);
        let scheduler = scheduler(transport.clone());

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_secs(130)).await;
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
        tokio::time::sleep(Duration::from_secs(1_000)).await;

        assert_eq!(transport.calls_to("get_evaluations"), [120]);
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_when_queue_reaches_threshold() {
        let transport = TimedTransport::new(true);
        let scheduler = scheduler(transport.clone());
        scheduler.start().unwrap();
        let user = User::new("user");

        tokio::time::sleep(Duration::from_secs(5)).await;
        for goal in ["a", "b"] {
            scheduler.context.events.track_goal_event(&user, goal, 1.0).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(transport.calls_to("register_events").is_empty());

        scheduler.context.events.track_goal_event(&user, "c", 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(transport.calls_to("register_events"), [6]);
        assert!(scheduler.context.events.queued_events().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_interval_and_restarts_timer_after_send() {
        let transport = TimedTransport::new(true);
        let scheduler = scheduler(transport.clone());
        scheduler.start().unwrap();
        let user = User::new("user");

        scheduler.context.events.track_goal_event(&user, "a", 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(transport.calls_to("register_events").is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.calls_to("register_events"), [30]);

        // Threshold flush at 40 moves the next forced flush to 70.
        tokio::time::sleep(Duration::from_secs(9)).await;
        for goal in ["b", "c", "d"] {
            scheduler.context.events.track_goal_event(&user, goal, 1.0).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(25)).await;
        scheduler.context.events.track_goal_event(&user, "e", 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(transport.calls_to("register_events"), [30, 40, 70]);
    }

    #[test]
    fn start_requires_runtime() {
        let scheduler = scheduler(Arc::new(TimedTransport {
            started: Instant::now(),
            evaluations_available: true,
            calls: Mutex::new(Vec::new()),
        }));

        let err = scheduler.start().unwrap_err();

        assert!(matches!(err, Error::IllegalState(_)));
        assert!(!scheduler.is_running());
    }
}
