use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Framed};
use tracing::{debug, warn};

use super::{SerialConfig, Transport};
use crate::error::{StageError, StageResult};

const MAX_LINE_LENGTH: usize = 256;

/// Serial port framed on `\n`. Replies end in `\r\n`; the `\r` is left for
/// the decoder to trim.
pub struct SerialTransport {
    framed: Framed<SerialStream, AnyDelimiterCodec>,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> StageResult<Self> {
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Software)
            .timeout(config.read_timeout())
            .open_native_async()
            .map_err(|source| StageError::Connection {
                port: config.port.clone(),
                source,
            })?;

        debug!(
            "Opened serial port {} at {} baud",
            config.port, config.baud_rate
        );

        let codec = AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\r\n".to_vec(),
            MAX_LINE_LENGTH,
        );

        Ok(Self {
            framed: Framed::new(port, codec),
        })
    }
}

#[async_trait::async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let port = self.framed.get_mut();
        port.write_all(bytes).await?;
        port.flush().await
    }

    async fn read_line(&mut self, wait: Duration) -> std::io::Result<String> {
        match timeout(wait, self.framed.next()).await {
            Err(_) => Ok(String::new()),
            Ok(Some(Ok(chunk))) => Ok(String::from_utf8_lossy(&chunk).into_owned()),
            Ok(Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded))) => {
                warn!("Discarding overlong line from controller");
                Ok(String::new())
            }
            Ok(Some(Err(AnyDelimiterCodecError::Io(e)))) => Err(e),
            Ok(None) => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial port closed",
            )),
        }
    }

    async fn discard_input(&mut self) -> std::io::Result<()> {
        self.framed.read_buffer_mut().clear();
        self.framed
            .get_ref()
            .clear(ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}
