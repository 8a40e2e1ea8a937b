use super::{StoreError, TimeSeriesStore};
use plantmon_sensor_data::LogRecord;
use std::sync::RwLock;

/// Non-durable store, also used as the read index of [`super::FileStore`].
#[derive(Default)]
pub(crate) struct MemoryStore {
    records: RwLock<Vec<LogRecord>>,
}

impl MemoryStore {
    pub(crate) fn from_records(records: Vec<LogRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().map_err(|_| StoreError::Poisoned)?.len())
    }
}

impl TimeSeriesStore for MemoryStore {
    fn append(&self, record: LogRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(record);
        Ok(())
    }

    fn records(&self) -> Result<Vec<LogRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }
}
