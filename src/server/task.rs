use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::common::frame::{Frame, FramedReader};
use crate::data::DataArea;
use crate::error::RequestError;
use crate::server::engine;

/// Serves a single connection: reads frames, runs them through the engine,
/// and writes the framed responses back
pub(crate) struct SessionTask<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    io: T,
    area: Arc<DataArea>,
    reader: FramedReader,
    shutdown: tokio::sync::broadcast::Receiver<()>,
}

impl<T> SessionTask<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        io: T,
        area: Arc<DataArea>,
        shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Self {
        Self {
            io,
            area,
            reader: FramedReader::new(),
            shutdown,
        }
    }

    pub(crate) async fn run(&mut self) -> Result<(), RequestError> {
        loop {
            self.run_one().await?;
        }
    }

    async fn run_one(&mut self) -> Result<(), RequestError> {
        tokio::select! {
            frame = self.reader.next_frame(&mut self.io) => {
                self.reply(frame?).await
            }
            _ = self.shutdown.recv() => {
                Err(RequestError::Shutdown)
            }
        }
    }

    async fn reply(&mut self, frame: Frame) -> Result<(), RequestError> {
        match engine::process(frame.payload(), &self.area) {
            None => {
                // nothing to echo a response under, so the frame is dropped
                tracing::warn!("received a frame with an empty PDU");
                Ok(())
            }
            Some(pdu) => {
                let response = frame.header.reply_frame(&pdu);
                self.io.write_all(&response).await?;
                Ok(())
            }
        }
    }
}
