//! Orchestration of the evaluation path
//!
//! Ingest writes samples into the shared window at any time. Once per period
//! the watcher closes the period, evaluates it, commits the resulting state
//! and, if the state changed, hands the transition to the notifier. Ticks
//! never overlap, and the state is committed before any notification is
//! attempted.

use crate::aggregator::SampleWindow;
use crate::alerts::{
    AlarmStateMachine, AlarmStateStore, Delivery, FileStateStore, LogChannel,
    NotificationChannel, Notifier, SlackWebhookChannel,
};
use crate::config::{ChannelKind, Config, SinkKind};
use crate::error::{AlertError, ConfigError};
use crate::evaluator::WindowedEvaluator;
use crate::events::{AlarmState, EvaluationResult, Timestamp, TransitionEvent};
use crate::ingest::SampleIngest;
use crate::metrics::{EmfMetricsSink, MetricsSink, NoopMetricsSink};
use chrono::Utc;
use log::{debug, error, info};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Outcome of one evaluation tick
#[derive(Debug)]
pub struct TickReport {
    pub period_end: Timestamp,
    pub result: EvaluationResult,
    /// Committed state after the tick
    pub state: AlarmState,
    pub transition: Option<TransitionEvent>,
    /// Set only when a transition was handed to the notifier
    pub notification: Option<Result<Delivery, AlertError>>,
}

/// Owns the evaluation path: window, evaluator, state machine and notifier
pub struct Watcher {
    window: Arc<Mutex<SampleWindow>>,
    ingest: SampleIngest,
    evaluator: WindowedEvaluator,
    state_machine: AlarmStateMachine,
    notifier: Notifier,
}

impl Watcher {
    /// Build every component from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the evaluator settings are invalid, the
    /// metrics output cannot be opened or the notification channel cannot
    /// be built.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let sink: Arc<dyn MetricsSink> = match config.metrics.sink {
            SinkKind::Emf => match &config.metrics.output {
                Some(path) => {
                    let file = OpenOptions::new().create(true).append(true).open(path)?;
                    Arc::new(EmfMetricsSink::new(Box::new(file)))
                }
                None => Arc::new(EmfMetricsSink::stdout()),
            },
            SinkKind::None => Arc::new(NoopMetricsSink),
        };

        let channel: Arc<dyn NotificationChannel> = match config.notifications.channel {
            ChannelKind::Slack => {
                let url = config.notifications.webhook_url.clone().ok_or_else(|| {
                    ConfigError::ValidationError("slack channel has no webhook URL".to_string())
                })?;
                let channel = SlackWebhookChannel::new(url, config.notifications.timeout())
                    .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
                Arc::new(channel)
            }
            ChannelKind::Log => Arc::new(LogChannel),
        };

        let store = config.alarm.state_file.as_ref().map(|path| {
            Box::new(FileStateStore::new(path, config.alarm.name.clone()))
                as Box<dyn AlarmStateStore>
        });

        Self::with_components(config, sink, channel, store)
    }

    /// Build the watcher around caller-supplied sink, channel and store
    pub fn with_components(
        config: &Config,
        sink: Arc<dyn MetricsSink>,
        channel: Arc<dyn NotificationChannel>,
        store: Option<Box<dyn AlarmStateStore>>,
    ) -> Result<Self, ConfigError> {
        let evaluator = WindowedEvaluator::new(config.alarm.evaluator_config())?;

        let window = Arc::new(Mutex::new(SampleWindow::new(
            evaluator.config().period(),
            evaluator.config().window_span(),
            config.ingest.max_buffered_samples,
        )));

        let ingest = SampleIngest::new(
            window.clone(),
            sink,
            config.metric.clone(),
            config.metrics.timeout(),
        );

        let state_machine = match store {
            Some(store) => AlarmStateMachine::with_store(config.alarm.name.clone(), store),
            None => AlarmStateMachine::new(config.alarm.name.clone()),
        };

        Ok(Self {
            window,
            ingest,
            evaluator,
            state_machine,
            notifier: Notifier::new(channel, config.notifications.timeout()),
        })
    }

    /// Handle for feeding samples; clone freely across tasks
    pub fn ingest_handle(&self) -> SampleIngest {
        self.ingest.clone()
    }

    pub fn state(&self) -> AlarmState {
        self.state_machine.state()
    }

    /// Run one tick for the period ending now
    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick for the period ending at `period_end`
    pub async fn tick_at(&mut self, period_end: Timestamp) -> TickReport {
        let values = {
            let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            window.close_period(period_end)
        };

        let result = self.evaluator.evaluate_period(&values);
        debug!(
            "Tick at {}: {} samples, {}",
            period_end,
            values.len(),
            result.reason
        );

        let transition = self.state_machine.apply(&result, period_end);

        let notification = match &transition {
            Some(event) => {
                let outcome = self.notifier.notify(event).await;
                if let Err(e) = &outcome {
                    error!("Failed to deliver notification for {}: {}", event.context, e);
                }
                Some(outcome)
            }
            None => None,
        };

        TickReport {
            period_end,
            result,
            state: self.state_machine.state(),
            transition,
            notification,
        }
    }

    /// Tick once per period until `shutdown` flips to `true`
    ///
    /// The first tick fires one period after start. A tick that overruns
    /// delays the next one instead of letting them pile up.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.evaluator.config().period_length;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Evaluating alarm '{}' every {:?}, starting in state {}",
            self.state_machine.alarm_name(),
            period,
            self.state()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Evaluation loop shutting down in state {}", self.state());
                        break;
                    }
                }
            }
        }
    }
}
