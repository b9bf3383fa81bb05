//! Integration tests for tickwire.
//!
//! These tests drive the public API across module boundaries: raw bytes
//! through the frame buffer into the dispatcher, and full clients talking
//! to a loopback TCP server.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use tickwire::codec::MsgPackCodec;
use tickwire::command::{
    build_envelope, BinaryCommand, BinaryEnvelope, Command, CommandMessage, CommandPayload,
    TextCommand, TextPayload,
};
use tickwire::config::{TransportConfig, WriterConfig};
use tickwire::dispatch::{
    BinaryHandler, CommandHandler, DispatchOutcome, Dispatcher, EnvelopeHandler, HandlerContext,
    HandlerResult, TextHandler,
};
use tickwire::protocol::{encode_frame, FrameBuffer, MessageKind};
use tickwire::sync::{EntityTrait, TraitContext};
use tickwire::transport::{ConnectionEvent, Transport};
use tickwire::Client;

/// Feed bytes one at a time and convert every frame into a command.
fn decode_commands(bytes: &[u8]) -> Vec<CommandMessage> {
    let mut buffer = FrameBuffer::new();
    let mut out = Vec::new();
    for byte in bytes {
        for frame in buffer.push(std::slice::from_ref(byte)).unwrap() {
            let message = match frame.kind {
                MessageKind::Text => Command::from_text_frame(&frame.payload).unwrap(),
                MessageKind::Binary => Command::from_binary_frame(frame.payload).unwrap(),
                MessageKind::Unknown => unreachable!("frame buffer drops unknown kinds"),
            };
            out.push(message);
        }
    }
    out
}

fn offline_transport() -> Transport {
    Transport::with_handle(
        TransportConfig::default(),
        WriterConfig::default(),
        Handle::current(),
    )
}

async fn tick_until(client: &mut Client, mut done: impl FnMut(&Client) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(client) {
        assert!(Instant::now() < deadline, "timed out waiting for client");
        client.tick(0.016);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn pump_until(transport: &mut Transport, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for transport");
        transport.pump();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Unknown text command name decodes to `UNKNOWN` and is not dispatched.
#[test]
fn test_unknown_text_command_end_to_end() {
    let bytes = [0x00, 0x00, 0x00, 0x06, 0x01, b'C', b'_', b'A', b'B', b'C'];

    let messages = decode_commands(&bytes);
    assert_eq!(messages.len(), 1);
    let (command, payload) = &messages[0];
    assert_eq!(*command, Command::Text(TextCommand::Unknown));
    assert!(payload.as_text().unwrap().is_empty());

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut dispatcher = Dispatcher::new("inbound");
    dispatcher.register_text(TextCommand::Ping, move || {
        let c = c.clone();
        TextHandler::new(move |_: &TextPayload, _: &mut HandlerContext<'_>| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });

    assert_eq!(
        dispatcher.dispatch(*command, payload),
        DispatchOutcome::Unhandled
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// `C_ABC` off the socket reaches the inbound bus as `(UNKNOWN, [])` and
/// is dropped by the dispatcher.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_text_command_reaches_inbound_bus() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut client = Client::builder()
        .runtime(Handle::current())
        .port(port)
        .build()
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    client
        .inbound_bus()
        .subscribe_fn(move |message: &CommandMessage| s.lock().unwrap().push(message.clone()));

    client.connect_async().await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();
    server
        .write_all(&[0x00, 0x00, 0x00, 0x06, 0x01, b'C', b'_', b'A', b'B', b'C'])
        .await
        .unwrap();

    tick_until(&mut client, |_| !seen.lock().unwrap().is_empty()).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(
            Command::Text(TextCommand::Unknown),
            CommandPayload::empty_text()
        )]
    );
    assert_eq!(client.inbound_stats().unhandled, 1);
    assert_eq!(client.inbound_stats().handled, 0);
}

/// Binary code 0x0005 with an empty envelope reaches its handler once.
#[test]
fn test_binary_envelope_end_to_end() {
    let bytes = [
        0x00, 0x00, 0x00, 0x0B, 0x02, // length 11, binary
        0x00, 0x05, // command
        0x00, 0x00, 0x00, 0x04, // frame length
        0x00, 0x00, 0x00, 0x00, // inner length
    ];

    let messages = decode_commands(&bytes);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, Command::Binary(BinaryCommand(5)));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let mut dispatcher = Dispatcher::new("inbound");
    dispatcher.register_binary(BinaryCommand(5), move || {
        let s = s.clone();
        EnvelopeHandler::new(move |env: &BinaryEnvelope, _: &mut HandlerContext<'_>| {
            s.lock().unwrap().push(env.inner.len());
            Ok(())
        })
    });

    assert_eq!(
        dispatcher.dispatch_message(&messages[0]),
        DispatchOutcome::Handled
    );
    assert_eq!(*seen.lock().unwrap(), vec![0]);
}

#[test]
fn test_mixed_stream_keeps_order_per_kind() {
    #[derive(serde::Serialize)]
    struct Snapshot {
        tick: u64,
    }

    let inner = MsgPackCodec::encode(&Snapshot { tick: 12 }).unwrap();
    let mut bytes = encode_frame(MessageKind::Text, b"S_CONNECT_PASS").unwrap();
    bytes.extend(encode_frame(MessageKind::Binary, &build_envelope(BinaryCommand::WORLD_SNAPSHOT, &inner)).unwrap());
    // unknown kind in the middle is skipped
    bytes.extend([0x00, 0x00, 0x00, 0x02, 0x09, 0xFF]);
    bytes.extend(encode_frame(MessageKind::Text, b"S_LOGIN_PASS|77").unwrap());

    let commands: Vec<Command> = decode_commands(&bytes).into_iter().map(|(c, _)| c).collect();

    assert_eq!(
        commands,
        vec![
            TextCommand::ConnectPass.into(),
            BinaryCommand::WORLD_SNAPSHOT.into(),
            TextCommand::LoginPass.into(),
        ]
    );
}

/// A panicking handler does not affect later messages.
#[test]
fn test_dispatch_isolation() {
    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    impl CommandHandler for Flaky {
        fn handle(&mut self, payload: &CommandPayload, _: &mut HandlerContext<'_>) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if payload.as_binary().map_or(0, |p| p.len()) > 2 {
                panic!("malformed body");
            }
            Ok(())
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut dispatcher = Dispatcher::new("inbound");
    dispatcher.register_binary(BinaryCommand::ENTITY_LIST, move || Flaky { calls: c.clone() });

    let messages = decode_commands(
        &[
            encode_frame(MessageKind::Binary, &[0x00, 0x02, 0xFF]).unwrap(),
            encode_frame(MessageKind::Binary, &[0x00, 0x02]).unwrap(),
        ]
        .concat(),
    );

    let outcomes: Vec<DispatchOutcome> = messages
        .iter()
        .map(|m| dispatcher.dispatch_message(m))
        .collect();

    assert_eq!(
        outcomes,
        vec![DispatchOutcome::Failed, DispatchOutcome::Handled]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_raw_binary_handler_sees_code() {
    let mut dispatcher = Dispatcher::new("inbound");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    dispatcher.register_binary(BinaryCommand::ENTITY_DESPAWN, move || {
        let s = s.clone();
        BinaryHandler::new(move |body: &tickwire::command::BinaryPayload, _: &mut HandlerContext<'_>| {
            s.lock().unwrap().extend_from_slice(body.as_bytes());
            Ok(())
        })
    });

    let messages = decode_commands(&encode_frame(MessageKind::Binary, &[0x00, 0x03, 0x2A]).unwrap());
    dispatcher.dispatch_message(&messages[0]);

    assert_eq!(*seen.lock().unwrap(), vec![0x00, 0x03, 0x2A]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transport_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut transport = offline_transport();
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    transport
        .text_bus()
        .subscribe_fn(move |p: &Bytes| l.lock().unwrap().push(format!("text {}", String::from_utf8_lossy(p))));
    let l = log.clone();
    transport
        .binary_bus()
        .subscribe_fn(move |p: &Bytes| l.lock().unwrap().push(format!("binary {}", p.len())));
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    transport
        .connection_events()
        .subscribe_fn(move |ev: &ConnectionEvent| e.lock().unwrap().push(ev.clone()));

    transport.connect_async("127.0.0.1", port).await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();
    assert!(transport.is_connected());

    // binary arrives first on the wire, text is still delivered first
    let mut burst = encode_frame(MessageKind::Binary, &[0x00, 0x01, 0x02]).unwrap();
    burst.extend(encode_frame(MessageKind::Text, b"S_PONG").unwrap());
    server.write_all(&burst).await.unwrap();

    pump_until(&mut transport, || log.lock().unwrap().len() == 2).await;
    assert_eq!(*log.lock().unwrap(), vec!["text S_PONG", "binary 3"]);

    assert!(transport.send(MessageKind::Text, Bytes::from_static(b"C_PING")));
    let mut buf = [0u8; 11];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"\x00\x00\x00\x07\x01C_PING");

    // zero length prefix is fatal
    server.write_all(&[0, 0, 0, 0]).await.unwrap();
    pump_until(&mut transport, || {
        events.lock().unwrap().contains(&ConnectionEvent::Disconnected)
    })
    .await;

    assert!(!transport.is_connected());
    assert_eq!(events.lock().unwrap()[0], ConnectionEvent::Connected);
    assert!(!transport.send(MessageKind::Text, Bytes::from_static(b"C_PING")));
}

#[tokio::test]
async fn test_connect_failure_reports_event() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut transport = offline_transport();
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    transport
        .connection_events()
        .subscribe_fn(move |ev: &ConnectionEvent| e.lock().unwrap().push(ev.clone()));

    assert!(transport.connect_async("127.0.0.1", port).await.is_err());
    transport.pump();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ConnectionEvent::Failed(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_login_flow() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let logged_in = Arc::new(AtomicUsize::new(0));
    let flag = logged_in.clone();
    let mut client = Client::builder()
        .runtime(Handle::current())
        .port(port)
        .on_text(
            TextCommand::ConnectPass,
            |_: &TextPayload, ctx: &mut HandlerContext<'_>| {
                ctx.raise(TextCommand::Login, TextPayload::from_fields(["alice", "pw"]));
                Ok(())
            },
        )
        .on_text(
            TextCommand::LoginPass,
            move |_: &TextPayload, _: &mut HandlerContext<'_>| {
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .build()
        .unwrap();

    client.connect_async().await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    client.request(TextCommand::Connect, TextPayload::default());
    let mut buf = vec![0u8; 5 + "C_CONNECT".len()];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[5..], b"C_CONNECT");

    server
        .write_all(&encode_frame(MessageKind::Text, b"S_CONNECT_PASS").unwrap())
        .await
        .unwrap();

    let expected = b"C_LOGIN|alice|pw";
    let mut buf = vec![0u8; 5 + expected.len()];
    {
        let read = server.read_exact(&mut buf);
        tokio::pin!(read);
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            client.tick(0.016);
            tokio::select! {
                result = &mut read => {
                    result.unwrap();
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(5)) => {
                    assert!(Instant::now() < deadline, "login request never arrived");
                }
            }
        }
    }
    assert_eq!(&buf[..5], &[0, 0, 0, expected.len() as u8 + 1, 1]);
    assert_eq!(&buf[5..], expected);

    server
        .write_all(&encode_frame(MessageKind::Text, b"S_LOGIN_PASS|1").unwrap())
        .await
        .unwrap();
    tick_until(&mut client, |_| logged_in.load(Ordering::SeqCst) == 1).await;
    assert_eq!(client.inbound_stats().handled, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trait_sync_reaches_server() {
    struct Ammo(u16);

    impl EntityTrait for Ammo {
        fn name(&self) -> &str {
            "ammo"
        }

        fn update(&mut self, ctx: &mut TraitContext) {
            self.0 -= 1;
            ctx.request_sync();
        }

        fn write_sync(&self, out: &mut BytesMut) -> tickwire::Result<()> {
            out.put_u16(self.0);
            Ok(())
        }
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = Client::builder()
        .runtime(Handle::current())
        .port(port)
        .build()
        .unwrap();
    client.connect_async().await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    client.scheduler().register(0x0000_00AB, Ammo(10));
    client.tick(0.016);

    let mut buf = [0u8; 13];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(
        buf,
        [0, 0, 0, 9, 2, 0x01, 0x05, 0, 0, 0, 0xAB, 0x00, 0x09]
    );
}

/// Owned runtime driven from a plain thread, as a game loop would.
#[test]
fn test_owned_runtime_from_game_thread() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut transport = Transport::new(TransportConfig::default(), WriterConfig::default()).unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let r = received.clone();
    transport
        .text_bus()
        .subscribe_fn(move |p: &Bytes| r.lock().unwrap().push(p.clone()));

    transport.connect("127.0.0.1", port);
    let (mut server, _) = listener.accept().unwrap();
    server
        .write_all(&encode_frame(MessageKind::Text, b"S_KICK|afk").unwrap())
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while received.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "frame never delivered");
        transport.pump();
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(&received.lock().unwrap()[0][..], b"S_KICK|afk");

    transport.disconnect();
    transport.disconnect();
    drop(transport);

    let mut rest = Vec::new();
    server.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}
