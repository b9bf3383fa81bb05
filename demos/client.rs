//! Headless game client - connect, log in, and stream a moving entity.
//!
//! This example demonstrates:
//! - Building a client with inbound handlers and a connection listener
//! - Raising a follow-up request from a handler (connect → login)
//! - Registering an entity trait whose state is synced with MsgPack
//! - Driving everything from a fixed-rate game loop
//!
//! ```text
//! RUST_LOG=tickwire=debug cargo run --example client -- 127.0.0.1 7000
//! ```

use std::time::{Duration, Instant};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tickwire::codec::MsgPackCodec;
use tickwire::command::{BinaryCommand, EntityId, RequestShape, TextCommand, TextPayload};
use tickwire::dispatch::HandlerContext;
use tickwire::sync::{EntityTrait, TraitContext};
use tickwire::transport::ConnectionEvent;
use tickwire::Client;

const TICK_RATE: f32 = 30.0;
const PLAYER: EntityId = 1;

#[derive(Deserialize, Debug)]
struct WorldSnapshot {
    tick: u64,
    entities: Vec<EntityId>,
}

#[derive(Serialize)]
struct PositionState {
    x: f32,
    z: f32,
}

/// Walks in a circle and syncs every third tick.
struct Wander {
    angle: f32,
    state: PositionState,
}

impl EntityTrait for Wander {
    fn name(&self) -> &str {
        "position"
    }

    fn update_frequency(&self) -> u32 {
        3
    }

    fn update(&mut self, ctx: &mut TraitContext) {
        self.angle += ctx.delta();
        self.state.x = self.angle.cos() * 5.0;
        self.state.z = self.angle.sin() * 5.0;
        ctx.request_sync();
    }

    fn write_sync(&self, out: &mut BytesMut) -> tickwire::Result<()> {
        MsgPackCodec::encode_into(&self.state, out)
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true))
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(7000);

    let mut client = Client::builder()
        .host(host)
        .port(port)
        .on_connection(|event: &ConnectionEvent| info!("Connection: {:?}", event))
        .on_text(
            TextCommand::ConnectPass,
            |_: &TextPayload, ctx: &mut HandlerContext<'_>| {
                ctx.raise(TextCommand::Login, TextPayload::from_fields(["demo", "demo"]));
                Ok(())
            },
        )
        .on_text(
            TextCommand::LoginPass,
            |fields: &TextPayload, ctx: &mut HandlerContext<'_>| {
                info!("Logged in, session {:?}", fields.get(0));
                ctx.raise(BinaryCommand::WORLD_REQUEST, RequestShape::Empty);
                Ok(())
            },
        )
        .on_message(
            BinaryCommand::WORLD_SNAPSHOT,
            |snapshot: WorldSnapshot, _: &mut HandlerContext<'_>| {
                info!(
                    "World at tick {} with {} entities",
                    snapshot.tick,
                    snapshot.entities.len()
                );
                Ok(())
            },
        )
        .build()?;

    client.scheduler().register(
        PLAYER,
        Wander {
            angle: 0.0,
            state: PositionState { x: 0.0, z: 0.0 },
        },
    );

    client.connect();

    let frame = Duration::from_secs_f32(1.0 / TICK_RATE);
    let mut last = Instant::now();
    let mut greeted = false;
    for _ in 0..(TICK_RATE as usize * 10) {
        std::thread::sleep(frame);
        let now = Instant::now();
        client.tick(now.duration_since(last).as_secs_f32());
        last = now;

        if !greeted && client.is_connected() {
            client.request(TextCommand::Connect, TextPayload::default());
            greeted = true;
        }
    }

    client.disconnect();
    info!(
        "Done: inbound {:?}, outbound {:?}",
        client.inbound_stats(),
        client.outbound_stats()
    );
    Ok(())
}
