pub mod settings;

pub use settings::{
    AlarmConfig, ChannelKind, Config, IngestConfig, MetricsConfig, NotificationConfig, SinkKind,
};
