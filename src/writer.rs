//! Dedicated writer task for outbound frames.
//!
//! All writes to the socket go through one task fed by an mpsc channel.
//! Frames are written whole and in queue order, so callers on any thread
//! can send without interleaving bytes of different frames.
//!
//! # Architecture
//!
//! ```text
//! Game thread ─┐
//! Handlers    ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► TcpStream
//! Scheduler   ─┘
//! ```
//!
//! Frames that are ready together are batched into one `write_vectored`
//! call. Senders never wait: when the pending count reaches the limit,
//! `try_send` fails with [`NetError::QueueFull`].

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{NetError, Result};
use crate::protocol::{encode_header, MessageKind, FRAME_HEADER_SIZE, LENGTH_PREFIX_SIZE};

/// Default maximum frames queued but not yet written.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames gathered into one write.
const MAX_BATCH_SIZE: usize = 64;

/// A frame with its header already encoded.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    header: [u8; FRAME_HEADER_SIZE],
    payload: Bytes,
}

impl OutboundFrame {
    /// Encode the header for `payload`. Size limits are checked by the caller.
    #[inline]
    pub fn new(kind: MessageKind, payload: Bytes) -> Self {
        Self {
            header: encode_header(kind, payload.len()),
            payload,
        }
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_byte(self.header[LENGTH_PREFIX_SIZE])
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes this frame occupies on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    fn parts(&self) -> [&[u8]; 2] {
        [&self.header[..], &self.payload[..]]
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Frames queued but not yet written before `try_send` starts failing.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing frames on the writer task.
///
/// Cheap to clone. The task exits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    /// Frames accepted but not yet written.
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundFrame>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
        }
    }

    /// Queue a frame without waiting.
    ///
    /// # Errors
    ///
    /// - [`NetError::QueueFull`] when the pending limit or channel capacity is reached
    /// - [`NetError::ConnectionClosed`] when the writer task has exited
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(NetError::QueueFull);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => NetError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => NetError::ConnectionClosed,
            }
        })
    }

    /// Frames accepted but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether `try_send` would currently fail with `QueueFull`.
    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.pending_count() >= self.max_pending
    }

    /// Whether the writer task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task on the current runtime.
///
/// The returned `JoinHandle` resolves when every [`WriterHandle`] has been
/// dropped (`Ok`) or a write fails (`Err`).
pub fn spawn_writer_task<W>(writer: W, config: &WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_frames);
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let count = batch.len();
        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("Writer failed with {} frames in flight: {}", count, e);
            return Err(e);
        }
        tracing::trace!("Wrote {} frames", count);

        pending.fetch_sub(count, Ordering::Release);
        batch.clear();
    }

    tracing::debug!("Writer channel closed, shutting down");
    let _ = writer.shutdown().await;
    Ok(())
}

/// Write every byte of `batch`, continuing after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut written = 0;

    while written < total {
        let slices = remaining_slices(batch, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(NetError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "socket accepted 0 bytes",
            )));
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// Slices covering everything after the first `skip` bytes of `batch`.
fn remaining_slices(batch: &[OutboundFrame], mut skip: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    for part in batch.iter().flat_map(OutboundFrame::parts) {
        if skip >= part.len() {
            skip -= part.len();
            continue;
        }
        slices.push(IoSlice::new(&part[skip..]));
        skip = 0;
    }
    slices
}
