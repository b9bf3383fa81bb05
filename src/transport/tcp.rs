//! TCP transport.
//!
//! Socket I/O runs on a background tokio runtime; game code only sees
//! queues. The read loop decodes frames and appends their payloads to one
//! queue per message kind. [`Transport::pump`], called once per tick on the
//! game thread, drains those queues and publishes the payloads on the
//! transport's buses:
//!
//! ```text
//! TcpStream ─► read loop ─► FrameBuffer ─► text queue ───┐
//!                                        └► binary queue ─┼─► pump() ─► buses
//!                                           event queue ──┘
//! ```
//!
//! Writes go through the writer task (see [`crate::writer`]), so `send` is
//! safe from any thread and never blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::bus::CommandBus;
use crate::config::{TransportConfig, WriterConfig};
use crate::dispatch::FrameSink;
use crate::error::{NetError, Result};
use crate::protocol::{check_payload_size, Frame, FrameBuffer, MessageKind};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Connection state change, delivered through [`Transport::pump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    /// Closed by either side, or torn down after a framing error.
    Disconnected,
    /// The connection attempt failed. There is no automatic retry.
    Failed(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the game thread and the I/O tasks.
#[derive(Default)]
struct Shared {
    text: Mutex<VecDeque<Bytes>>,
    binary: Mutex<VecDeque<Bytes>>,
    events: Mutex<VecDeque<ConnectionEvent>>,
    connected: AtomicBool,
    /// Bumped on every connect and disconnect; tasks of an older
    /// connection compare against it and stand down.
    generation: AtomicU64,
    /// Also guards connection state changes: generation bumps, `connected`
    /// flips and reader installs happen while this lock is held.
    writer: Mutex<Option<WriterHandle>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn push_event(&self, event: ConnectionEvent) {
        lock(&self.events).push_back(event);
    }

    fn enqueue(&self, frames: Vec<Frame>) {
        if frames.is_empty() {
            return;
        }
        let mut text = lock(&self.text);
        let mut binary = lock(&self.binary);
        for frame in frames {
            match frame.kind {
                MessageKind::Text => text.push_back(frame.payload),
                MessageKind::Binary => binary.push_back(frame.payload),
                MessageKind::Unknown => {}
            }
        }
    }

    /// Called by I/O tasks when their connection ends.
    fn connection_lost(&self, generation: u64) {
        let mut writer = lock(&self.writer);
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        writer.take();
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        self.push_event(ConnectionEvent::Disconnected);
    }

    /// Tear down the current connection, if any. Idempotent.
    fn close(&self) {
        let mut writer = lock(&self.writer);
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        // Dropping the last handle stops the writer task, which closes the socket.
        writer.take();
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::info!("Disconnected");
            self.push_event(ConnectionEvent::Disconnected);
        }
    }
}

/// Cloneable, thread-safe sending side of a [`Transport`].
#[derive(Clone)]
pub struct FrameSender {
    shared: Arc<Shared>,
    max_message_size: u32,
}

impl FrameSender {
    /// Queue one frame. Returns `false` if it was dropped.
    ///
    /// Never fails loudly: sending while disconnected, oversized payloads
    /// and a full write queue are logged and the frame is discarded.
    pub fn send(&self, kind: MessageKind, payload: Bytes) -> bool {
        if kind == MessageKind::Unknown {
            tracing::warn!("Refusing to send a frame of unknown kind");
            return false;
        }
        if !self.shared.connected.load(Ordering::Acquire) {
            tracing::warn!(
                "Not connected, dropping {:?} frame of {} bytes",
                kind,
                payload.len()
            );
            return false;
        }
        if let Err(e) = check_payload_size(payload.len(), self.max_message_size) {
            tracing::error!("Dropping outbound {:?} frame: {}", kind, e);
            return false;
        }

        let guard = lock(&self.shared.writer);
        let Some(writer) = guard.as_ref() else {
            tracing::warn!("Writer gone, dropping {:?} frame", kind);
            return false;
        };
        match writer.try_send(OutboundFrame::new(kind, payload)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping outbound {:?} frame: {}", kind, e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

impl FrameSink for FrameSender {
    fn send_frame(&self, kind: MessageKind, payload: Bytes) {
        self.send(kind, payload);
    }
}

/// One persistent connection to the game server.
pub struct Transport {
    shared: Arc<Shared>,
    sender: FrameSender,
    /// Present when the transport built its own runtime.
    runtime: Option<Runtime>,
    handle: Handle,
    config: TransportConfig,
    writer_config: WriterConfig,
    text_bus: CommandBus<Bytes>,
    binary_bus: CommandBus<Bytes>,
    connection_events: CommandBus<ConnectionEvent>,
    text_scratch: VecDeque<Bytes>,
    binary_scratch: VecDeque<Bytes>,
    event_scratch: VecDeque<ConnectionEvent>,
}

impl Transport {
    /// Create a transport with its own single-worker I/O runtime.
    pub fn new(config: TransportConfig, writer_config: WriterConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tickwire-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        let mut transport = Self::with_handle(config, writer_config, handle);
        transport.runtime = Some(runtime);
        Ok(transport)
    }

    /// Create a transport that runs its I/O on an existing runtime.
    pub fn with_handle(config: TransportConfig, writer_config: WriterConfig, handle: Handle) -> Self {
        let shared = Arc::new(Shared::default());
        let sender = FrameSender {
            shared: shared.clone(),
            max_message_size: config.max_message_size,
        };
        Self {
            shared,
            sender,
            runtime: None,
            handle,
            config,
            writer_config,
            text_bus: CommandBus::new(),
            binary_bus: CommandBus::new(),
            connection_events: CommandBus::new(),
            text_scratch: VecDeque::new(),
            binary_scratch: VecDeque::new(),
            event_scratch: VecDeque::new(),
        }
    }

    /// Start connecting in the background.
    ///
    /// The outcome arrives as a [`ConnectionEvent`] on the next `pump`.
    pub fn connect(&self, host: impl Into<String>, port: u16) {
        let host = host.into();
        let shared = self.shared.clone();
        let handle = self.handle.clone();
        let config = self.config.clone();
        let writer_config = self.writer_config.clone();
        self.handle.spawn(async move {
            // Failures are already logged and reported as events.
            let _ = open_connection(shared, handle, host, port, config, writer_config).await;
        });
    }

    /// Connect and wait for the outcome.
    ///
    /// The connect itself runs as a task on the transport's runtime, so the
    /// socket is registered with that runtime's reactor whichever runtime
    /// polls this future.
    pub async fn connect_async(&self, host: &str, port: u16) -> Result<()> {
        self.handle
            .spawn(open_connection(
                self.shared.clone(),
                self.handle.clone(),
                host.to_string(),
                port,
                self.config.clone(),
                self.writer_config.clone(),
            ))
            .await
            .map_err(|e| NetError::Io(std::io::Error::other(e)))?
    }

    /// Queue a frame for writing. See [`FrameSender::send`].
    pub fn send(&self, kind: MessageKind, payload: Bytes) -> bool {
        self.sender.send(kind, payload)
    }

    /// A cloneable sender for use outside the game thread.
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Deliver everything received since the last call.
    ///
    /// Connection events first, then all text payloads, then all binary
    /// payloads, each in arrival order. Returns the number of items delivered.
    pub fn pump(&mut self) -> usize {
        std::mem::swap(&mut *lock(&self.shared.events), &mut self.event_scratch);
        std::mem::swap(&mut *lock(&self.shared.text), &mut self.text_scratch);
        std::mem::swap(&mut *lock(&self.shared.binary), &mut self.binary_scratch);

        let delivered =
            self.event_scratch.len() + self.text_scratch.len() + self.binary_scratch.len();

        for event in self.event_scratch.drain(..) {
            self.connection_events.publish(&event);
        }
        for payload in self.text_scratch.drain(..) {
            self.text_bus.publish(&payload);
        }
        for payload in self.binary_scratch.drain(..) {
            self.binary_bus.publish(&payload);
        }

        if delivered > 0 {
            tracing::trace!("Pumped {} inbound items", delivered);
        }
        delivered
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.shared.close();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Frames queued on the writer but not yet written.
    pub fn pending_frames(&self) -> usize {
        lock(&self.shared.writer)
            .as_ref()
            .map_or(0, WriterHandle::pending_count)
    }

    /// Raw text payloads, published by `pump`.
    pub fn text_bus(&self) -> &CommandBus<Bytes> {
        &self.text_bus
    }

    /// Raw binary payloads, published by `pump`.
    pub fn binary_bus(&self) -> &CommandBus<Bytes> {
        &self.binary_bus
    }

    pub fn connection_events(&self) -> &CommandBus<ConnectionEvent> {
        &self.connection_events
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn open_connection(
    shared: Arc<Shared>,
    handle: Handle,
    host: String,
    port: u16,
    config: TransportConfig,
    writer_config: WriterConfig,
) -> Result<()> {
    let generation = {
        let _state = lock(&shared.writer);
        if shared.connected.load(Ordering::Acquire) {
            tracing::warn!("Already connected, ignoring connect to {}:{}", host, port);
            return Ok(());
        }
        shared.generation.fetch_add(1, Ordering::AcqRel) + 1
    };

    tracing::debug!("Connecting to {}:{}", host, port);
    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Connection to {}:{} failed: {}", host, port, e);
            shared.push_event(ConnectionEvent::Failed(e.to_string()));
            return Err(NetError::Io(e));
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!("Could not set TCP_NODELAY: {}", e);
    }

    let (read_half, write_half) = stream.into_split();
    let (writer, writer_task) = {
        let _guard = handle.enter();
        spawn_writer_task(write_half, &writer_config)
    };

    {
        let mut slot = lock(&shared.writer);
        if shared.generation.load(Ordering::Acquire) != generation {
            // Dropping both halves here closes the socket.
            tracing::debug!("Connect to {}:{} superseded, closing", host, port);
            return Err(NetError::ConnectionClosed);
        }
        *slot = Some(writer);
        *lock(&shared.reader) = Some(handle.spawn(read_loop(
            shared.clone(),
            generation,
            read_half,
            config.max_message_size,
            config.read_buffer_size,
        )));
        shared.connected.store(true, Ordering::Release);
        shared.push_event(ConnectionEvent::Connected);
    }
    tracing::info!("Connected to {}:{}", host, port);

    let monitor = shared.clone();
    handle.spawn(async move {
        if let Ok(Err(_)) = writer_task.await {
            monitor.connection_lost(generation);
        }
    });
    Ok(())
}

/// Read until the peer closes, a read fails or the stream breaks framing.
async fn read_loop<R>(
    shared: Arc<Shared>,
    generation: u64,
    mut reader: R,
    max_message_size: u32,
    read_buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let read_buffer_size = read_buffer_size.max(1);
    let mut frames = FrameBuffer::with_capacity_and_max_length(read_buffer_size, max_message_size);
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                if frames.has_partial_frame() {
                    tracing::error!(
                        "Connection closed mid-frame, discarding {} buffered bytes",
                        frames.len()
                    );
                } else {
                    tracing::info!("Connection closed by peer");
                }
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Read failed: {}", e);
                break;
            }
        };

        let mut batch = Vec::new();
        let result = frames.push_into(&buf[..n], &mut batch);
        // Frames ahead of a bad prefix are still delivered.
        shared.enqueue(batch);
        if let Err(e) = result {
            tracing::error!("Closing connection: {}", e);
            break;
        }
    }

    shared.connection_lost(generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_frame;
    use std::io::Read;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt};

    fn connected_shared() -> Arc<Shared> {
        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::Release);
        shared
    }

    fn test_transport() -> Transport {
        Transport::with_handle(
            TransportConfig::default(),
            WriterConfig::default(),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_read_loop_queues_by_kind() {
        let shared = connected_shared();
        let (mut client, server) = duplex(1024);

        client
            .write_all(&encode_frame(MessageKind::Binary, &[0, 1]).unwrap())
            .await
            .unwrap();
        client
            .write_all(&encode_frame(MessageKind::Text, b"S_PONG").unwrap())
            .await
            .unwrap();
        drop(client);

        read_loop(shared.clone(), 0, server, 1024, 3).await;

        assert_eq!(lock(&shared.text).len(), 1);
        assert_eq!(lock(&shared.binary).len(), 1);
        assert!(!shared.connected.load(Ordering::Acquire));
        assert_eq!(
            lock(&shared.events).pop_front(),
            Some(ConnectionEvent::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_read_loop_stops_on_zero_length() {
        let shared = connected_shared();
        let (mut client, server) = duplex(1024);

        client.write_all(&[0, 0, 0, 0]).await.unwrap();
        client
            .write_all(&encode_frame(MessageKind::Text, b"S_PONG").unwrap())
            .await
            .unwrap();

        // returns without waiting for EOF
        read_loop(shared.clone(), 0, server, 1024, 64).await;

        assert!(lock(&shared.text).is_empty());
        assert!(!shared.connected.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_read_loop_delivers_frames_ahead_of_bad_prefix() {
        let shared = connected_shared();
        let (mut client, server) = duplex(1024);

        // one write, so both land in the same read
        let mut burst = encode_frame(MessageKind::Text, b"S_PONG").unwrap();
        burst.extend_from_slice(&[0, 0, 0, 0]);
        client.write_all(&burst).await.unwrap();

        read_loop(shared.clone(), 0, server, 1024, 1024).await;

        assert_eq!(lock(&shared.text).pop_front().as_deref(), Some(&b"S_PONG"[..]));
        assert!(!shared.connected.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_stale_generation_is_ignored() {
        let shared = connected_shared();
        shared.generation.store(5, Ordering::Release);
        let (client, server) = duplex(64);
        drop(client);

        read_loop(shared.clone(), 4, server, 1024, 64).await;

        assert!(shared.connected.load(Ordering::Acquire));
        assert!(lock(&shared.events).is_empty());
    }

    #[tokio::test]
    async fn test_pump_delivers_text_before_binary() {
        let mut transport = test_transport();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        transport
            .text_bus()
            .subscribe_fn(move |p: &Bytes| l.lock().unwrap().push(format!("text:{}", p.len())));
        let l = log.clone();
        transport
            .binary_bus()
            .subscribe_fn(move |p: &Bytes| l.lock().unwrap().push(format!("binary:{}", p.len())));

        transport.shared.enqueue(vec![
            Frame::from_parts(MessageKind::Binary, &[0, 1]),
            Frame::from_parts(MessageKind::Text, b"a"),
            Frame::from_parts(MessageKind::Binary, &[0, 2, 3]),
            Frame::from_parts(MessageKind::Text, b"bb"),
        ]);

        assert_eq!(transport.pump(), 4);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["text:1", "text:2", "binary:2", "binary:3"]
        );
        assert_eq!(transport.pump(), 0);
    }

    #[tokio::test]
    async fn test_pump_delivers_events_first() {
        let mut transport = test_transport();
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        transport
            .connection_events()
            .subscribe_fn(move |ev: &ConnectionEvent| e.lock().unwrap().push(ev.clone()));

        transport.shared.push_event(ConnectionEvent::Failed("refused".into()));
        transport.pump();

        assert_eq!(
            *events.lock().unwrap(),
            vec![ConnectionEvent::Failed("refused".into())]
        );
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let transport = test_transport();
        assert!(!transport.is_connected());
        assert!(!transport.send(MessageKind::Text, Bytes::from_static(b"C_PING")));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut transport = test_transport();
        transport.shared.connected.store(true, Ordering::Release);

        transport.disconnect();
        transport.disconnect();

        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        transport
            .connection_events()
            .subscribe_fn(move |_: &ConnectionEvent| *c.lock().unwrap() += 1);
        transport.pump();

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_leaves_transport_usable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = test_transport();
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        transport
            .connection_events()
            .subscribe_fn(move |ev: &ConnectionEvent| e.lock().unwrap().push(ev.clone()));

        // let the connect task reach its socket await, then cancel it
        transport.connect("127.0.0.1", port);
        tokio::task::yield_now().await;
        transport.disconnect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.pump();

        assert!(!transport.is_connected());
        let seen = events.lock().unwrap().clone();
        assert!(
            seen.is_empty() || seen == [ConnectionEvent::Connected, ConnectionEvent::Disconnected],
            "unexpected events {:?}",
            seen
        );

        transport.connect_async("127.0.0.1", port).await.unwrap();
        assert!(transport.is_connected());
        assert!(transport.send(MessageKind::Text, Bytes::from_static(b"C_PING")));
    }

    #[tokio::test]
    async fn test_connect_async_from_foreign_runtime() {
        let io = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let transport = Transport::with_handle(
            TransportConfig::default(),
            WriterConfig::default(),
            io.handle().clone(),
        );
        transport.connect_async("127.0.0.1", port).await.unwrap();
        let (mut server, _) = listener.accept().unwrap();

        assert!(transport.send(MessageKind::Text, Bytes::from_static(b"C_PING")));
        let buf = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 11];
            server.read_exact(&mut buf).map(|_| buf)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&buf, b"\x00\x00\x00\x07\x01C_PING");

        drop(transport);
        io.shutdown_background();
    }
}
