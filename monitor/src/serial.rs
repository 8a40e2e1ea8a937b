use std::time::Duration;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, trace};

/// Asks the sensor array for one reading of every channel.
const QUERY_COMMAND: &[u8] = b"q";

const FLUSH_TIMEOUT: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub(crate) enum LinkError {
    #[error("Timeout waiting for a response")]
    Timeout,

    #[error("Serial device closed")]
    Closed,

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Query/response link to the sensor array.
pub(crate) struct SerialLink<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    timeout: Duration,
}

impl SerialLink<SerialStream> {
    pub(crate) fn open(port: &str, baud: u32, timeout: Duration) -> Result<Self, LinkError> {
        let stream = tokio_serial::new(port, baud)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {port} with error {e}");
                LinkError::Io(e.into())
            })?;

        Ok(Self::new(stream, timeout))
    }
}

impl<S: AsyncRead + AsyncWrite> SerialLink<S> {
    pub(crate) fn new(stream: S, timeout: Duration) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let reader = BufReader::new(reader);

        Self {
            reader,
            writer,
            timeout,
        }
    }

    /// Sends the query command and returns the response line with the line
    /// terminator removed. An empty string means the device answered with an
    /// empty line.
    pub(crate) async fn query(&mut self) -> Result<String, LinkError> {
        let flushed = self.flush().await?;
        if flushed > 0 {
            debug!("Discarded {flushed} stale bytes before query");
        }

        self.writer.write_all(QUERY_COMMAND).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        match tokio::time::timeout(self.timeout, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(LinkError::Closed),
            Ok(Ok(n)) => {
                trace!("Received {n} bytes: {line:?}");
                Ok(line.trim().to_owned())
            }
            Ok(Err(e)) => Err(LinkError::Io(e)),
            Err(_) => Err(LinkError::Timeout),
        }
    }

    async fn flush(&mut self) -> Result<usize, LinkError> {
        let mut count: usize = 0;

        loop {
            match tokio::time::timeout(FLUSH_TIMEOUT, self.reader.read_u8()).await {
                Ok(Ok(_)) => {
                    count = count.saturating_add(1);
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(LinkError::Closed);
                }
                Ok(Err(e)) => {
                    return Err(LinkError::Io(e));
                }
                Err(_) => {
                    break;
                }
            }
        }

        Ok(count)
    }
}
