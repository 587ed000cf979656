/// Alarm state tracking and notification delivery
pub mod channels;
pub mod notifier;
pub mod state_machine;
pub mod state_store;

pub use channels::{LogChannel, MockChannel, NotificationChannel, SlackWebhookChannel};
pub use notifier::{message_for, Delivery, Notifier};
pub use state_machine::AlarmStateMachine;
pub use state_store::{AlarmStateStore, FileStateStore};
