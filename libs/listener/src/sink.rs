use relay_api::Record;

/// Получатель декодированных записей. Один вызов на запись,
/// синхронно, без буферизации.
pub trait RecordSink: Send + Sync {
    fn accept(&self, channel: &str, record: &Record);
}

/// Одно structured `info` событие на запись.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn accept(&self, channel: &str, record: &Record) {
        tracing::info!(
            channel,
            name = %record.name(),
            email = %record.email(),
            "{record}"
        );
    }
}
