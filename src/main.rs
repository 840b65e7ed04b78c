//! Headless draw viewer: receives draw commands and logs what would be rendered
//!
//! Run with: cargo run --features cli --bin draw-cli -- [--demo] [--dump]
//!
//! Environment: DRAW_HOST, DRAW_PORT, DRAW_FILTER (comma separated set name
//! prefixes that start visible), RUST_LOG.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use vis_draw::core::{
    encode_into, AgentAnnotation, AgentRef, Annotation, AnnotationCommand, Command, DrawingRegistry,
    NameFilter, Rgb, Rgba, Roster, SetListChange, Shape, Team,
};
use vis_draw::{DrawReceiver, ReceiverConfig};

/// Render tick of the headless viewer
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vis_draw=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let start_time = Instant::now();
    let dump = std::env::args().any(|arg| arg == "--dump");
    let demo = std::env::args().any(|arg| arg == "--demo");

    let config = ReceiverConfig::from_env();
    let name_filter = std::env::var("DRAW_FILTER")
        .map(|list| NameFilter::parse(&list))
        .unwrap_or_default();

    let registry = Arc::new(DrawingRegistry::with_filter(name_filter));
    registry.subscribe(Box::new(|change: &SetListChange| {
        let shapes: Vec<&str> = change.shape_sets.iter().map(|s| s.name.as_str()).collect();
        let annotations: Vec<&str> = change.annotation_sets.iter().map(|s| s.name.as_str()).collect();
        info!(?shapes, ?annotations, "Drawing sets changed");
    }));

    let world = Arc::new(Roster::open());
    let mut receiver = DrawReceiver::start(&config, registry.clone(), world.clone());

    if demo {
        match receiver.local_addr() {
            Some(addr) => {
                let target = std::net::SocketAddr::from(([127, 0, 0, 1], addr.port()));
                let sent = send_demo(target)?;
                info!(%target, bytes = sent, "Demo drawings sent");
            }
            None => warn!("Receiver disabled, demo not sent"),
        }
    }

    let mut frame_interval = tokio::time::interval(FRAME_INTERVAL);
    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    let mut last_packets = 0u64;

    info!(state = ?receiver.state(), "Waiting for draw commands...");

    loop {
        tokio::select! {
            _ = frame_interval.tick() => {
                registry.update();
            }
            _ = stats_interval.tick() => {
                let stats = receiver.stats();
                let shapes: usize = registry.visible_shape_sets().iter().map(|s| s.front_len()).sum();
                let annotations: usize = registry.visible_annotation_sets().iter().map(|s| s.front_len()).sum();
                info!(
                    uptime = format!("{:.0}s", start_time.elapsed().as_secs_f64()),
                    shape_sets = registry.shape_set_count(),
                    shapes,
                    annotations,
                    agent_labels = registry.agent_annotations().len(),
                    selected = ?world.selected(),
                    packets = stats.packets,
                    commands = stats.commands,
                    decode_errors = stats.decode_errors,
                    "/sec" = format!("{:.1}", (stats.packets - last_packets) as f64 / 5.0),
                    "stats"
                );
                last_packets = stats.packets;
                if dump {
                    dump_frame(&registry)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    receiver.stop();
    Ok(())
}

/// Log the visible front buffers as JSON
fn dump_frame(registry: &DrawingRegistry) -> Result<(), serde_json::Error> {
    let shapes: Vec<_> = registry
        .visible_shape_sets()
        .iter()
        .map(|set| serde_json::json!({ "set": set.name(), "items": set.front_snapshot() }))
        .collect();
    let annotations: Vec<_> = registry
        .visible_annotation_sets()
        .iter()
        .map(|set| serde_json::json!({ "set": set.name(), "items": set.front_snapshot() }))
        .collect();
    let frame = serde_json::json!({
        "shapes": shapes,
        "annotations": annotations,
        "agents": registry.agent_annotations(),
    });
    info!(frame = %serde_json::to_string(&frame)?, "dump");
    Ok(())
}

/// One datagram with a sample of every shape kind, published under "demo."
fn send_demo(target: std::net::SocketAddr) -> Result<usize, Box<dyn std::error::Error>> {
    let red = Rgb::from_bytes([255, 0, 0]);
    let blue = Rgb::from_bytes([0, 0, 255]);
    let agent = AgentRef { team: Team::Left, number: 1 };
    let commands = [
        Command::DrawShape(Shape::Circle { center: [0.0, 0.0], radius: 1.0, thickness: 2.0, color: red, set: "demo.circles".into() }),
        Command::DrawShape(Shape::Line { a: [-5.0, 0.0, 0.0], b: [5.0, 0.0, 0.0], thickness: 1.0, color: blue, set: "demo.lines".into() }),
        Command::DrawShape(Shape::Point { pos: [1.0, 1.0, 0.0], size: 4.0, color: red, set: "demo.points".into() }),
        Command::DrawShape(Shape::Sphere { pos: [0.0, 0.0, 0.5], radius: 0.25, color: blue, set: "demo.spheres".into() }),
        Command::DrawShape(Shape::Polygon {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            color: Rgba::from_bytes([0, 255, 0, 128]),
            set: "demo.polygons".into(),
        }),
        Command::DrawAnnotation(AnnotationCommand::Standard(Annotation {
            text: "center".into(),
            pos: [0.0, 0.0, 1.0],
            color: red,
            set: "demo.text".into(),
        })),
        Command::DrawAnnotation(AnnotationCommand::AgentSet(AgentAnnotation { agent, text: "demo".into(), color: blue })),
        Command::SelectAgent(agent),
        Command::SetSwap { prefix: "demo.".into() },
    ];

    let mut datagram = Vec::new();
    for cmd in &commands {
        encode_into(&mut datagram, cmd)?;
    }
    let socket = std::net::UdpSocket::bind("127.0.0.1:0")?;
    Ok(socket.send_to(&datagram, target)?)
}
