//! Re-emits request frames, unmodified, to the downstream output.
//!
//! Workers push frames into a channel; a single writer task owns the
//! output and encodes each frame as a hex line with [`HexLineCodec`], so a
//! downstream consumer can parse it the same way the input was parsed.

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::error;

use crate::codec::HexLineCodec;
use crate::error::ReplayError;
use crate::frame::Frame;

/// Cloneable handle used by workers to emit request frames.
#[derive(Debug, Clone)]
pub struct Passthrough {
    tx: mpsc::Sender<Frame>,
}

impl Passthrough {
    /// Spawn the writer task. It finishes once every handle is dropped,
    /// returning the number of frames written.
    pub fn spawn<W>(writer: W, capacity: usize) -> (Self, JoinHandle<Result<u64, ReplayError>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Frame>(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, HexLineCodec::new());
            let mut written = 0u64;
            while let Some(frame) = rx.recv().await {
                // `send` flushes, so each request reaches the consumer promptly.
                if let Err(e) = sink.send(frame).await {
                    error!("passthrough write error: {e}");
                    return Err(e);
                }
                written += 1;
            }
            sink.close().await?;
            Ok(written)
        });

        (Self { tx }, handle)
    }

    /// Queue a request frame for output.
    pub async fn emit(&self, frame: Frame) -> Result<(), ReplayError> {
        self.tx.send(frame).await?;
        Ok(())
    }
}
