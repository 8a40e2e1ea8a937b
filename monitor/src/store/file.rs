use super::{MemoryStore, StoreError, TimeSeriesStore};
use plantmon_sensor_data::LogRecord;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    path::Path,
    sync::Mutex,
};
use tracing::{debug, error, info, warn};

/// Durable store: an append-only file of COBS framed postcard records.
///
/// The whole file is read into an in-memory index on open; queries are served
/// from the index.
pub(crate) struct FileStore {
    file: Mutex<File>,
    index: MemoryStore,
}

impl FileStore {
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        // Terminate a frame torn by a crash mid-write so the next record
        // starts on a frame boundary
        if contents.last().is_some_and(|b| *b != 0) {
            warn!("Store {} ends with an incomplete record", path.display());
            file.write_all(&[0])?;
            file.sync_data()?;
        }

        let records = decode_frames(&mut contents);
        info!("Loaded {} records from {}", records.len(), path.display());

        Ok(Self {
            file: Mutex::new(file),
            index: MemoryStore::from_records(records),
        })
    }

    /// Reads every record of a store file without opening it for writing.
    pub(crate) fn read_records(path: &Path) -> Result<Vec<LogRecord>, StoreError> {
        let mut contents = Vec::new();
        File::open(path)?.read_to_end(&mut contents)?;
        Ok(decode_frames(&mut contents))
    }
}

impl TimeSeriesStore for FileStore {
    fn append(&self, record: LogRecord) -> Result<(), StoreError> {
        let frame = postcard::to_stdvec_cobs(&record)?;

        {
            let mut file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
            append_frame(&mut *file, &frame)?;
        }
        debug!("Appended record at {}", record.timestamp_millis);

        self.index.append(record)
    }

    fn records(&self) -> Result<Vec<LogRecord>, StoreError> {
        self.index.records()
    }
}

/// Log file a frame can be appended to and rolled back from.
trait FrameLog: Write {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl FrameLog for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Writes and syncs a whole frame. On failure the log is cut back to its
/// previous length so the next frame still starts on a boundary.
fn append_frame<L: FrameLog>(log: &mut L, frame: &[u8]) -> io::Result<()> {
    let len = log.len()?;

    let result = log.write_all(frame).and_then(|()| log.sync());
    if result.is_err() {
        if let Err(e) = log.truncate(len).and_then(|()| log.sync()) {
            error!("Failed to remove partially written record: {e}");
        }
    }

    result
}

fn decode_frames(contents: &mut [u8]) -> Vec<LogRecord> {
    let mut records = Vec::new();

    for frame in contents.split_inclusive_mut(|b| *b == 0) {
        match frame {
            // Empty frame
            [0] => continue,
            [.., 0] => match postcard::from_bytes_cobs::<LogRecord>(frame) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping undecodable record: {e}"),
            },
            _ => warn!("Skipping incomplete record of {} bytes", frame.len()),
        }
    }

    records
}
