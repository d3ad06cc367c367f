// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless run of the animated module.
//!
//! Builds a fade-and-slide graph, starts a frames animation and a decay,
//! then pumps a manual frame signal until the module goes idle, flushing
//! the batched view queue into an in-memory view registry every frame.
//!
//! Usage: `animated_demo [settings.ron]`

use ordoplay_animated_module::driver::{DriverId, EndCallback};
use ordoplay_animated_module::graph::{NodeTag, PropMap, PropValue, ViewTag};
use ordoplay_animated_module::{
    AnimatedConfig, AnimatedModule, BatchedViewQueue, BridgeState, FrameScheduler,
    ManualFrameSignal, ViewRegistry,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const VIEW: ViewTag = ViewTag(1);
const MAX_FRAMES: u64 = 600;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("ordoplay_animated_module=debug".parse()?)
        .add_directive("animated_demo=debug".parse()?);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting animated demo v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading settings");
            AnimatedConfig::load(&path)?
        }
        None => AnimatedConfig::default(),
    };

    let signal = ManualFrameSignal::new();
    let queue = Arc::new(BatchedViewQueue::new());
    let scheduler = FrameScheduler::new(signal.clone());
    let module = AnimatedModule::new(config.clone(), scheduler, queue.clone());

    let mut views = ViewRegistry::new();
    let mut authored = PropMap::new();
    authored.insert("opacity".to_string(), PropValue::Number(1.0));
    authored.insert("transform".to_string(), PropValue::List(Vec::new()));
    views.create_view(VIEW, authored);

    build_graph(&module)?;

    let (fade_end, mut fade_done) = EndCallback::channel();
    let fade: Vec<f64> = (0..=30).map(|i| f64::from(i) / 30.0).collect();
    module.start_animating_node(
        DriverId(1),
        NodeTag(1),
        json!({ "type": "frames", "frames": fade, "toValue": 1.0 }),
        fade_end,
    )?;
    module.start_animating_node(
        DriverId(2),
        NodeTag(5),
        json!({ "type": "decay", "velocity": 0.5, "deceleration": 0.997 }),
        EndCallback::new(|end| tracing::info!(finished = end.finished, "slide settled")),
    )?;

    let frame_nanos = (config.frame_duration_ms * 1_000_000.0) as u64;
    let mut frame_time = 0u64;
    let mut frames = 0u64;
    while module.state() != BridgeState::Idle && frames < MAX_FRAMES {
        signal.fire(frame_time);
        queue.flush(&mut views);
        frame_time += frame_nanos;
        frames += 1;

        if let Some(props) = views.props(VIEW) {
            tracing::debug!(frame = frames, ?props, "view state");
        }
    }

    if let Ok(end) = fade_done.try_recv() {
        tracing::info!(finished = end.finished, "fade ended");
    }

    module.disconnect_animated_node_from_view(NodeTag(4), VIEW)?;
    queue.flush(&mut views);
    tracing::info!(frames, props = ?views.props(VIEW), "demo finished, view restored");
    Ok(())
}

/// `opacity <- interpolate(progress)`, `transform: [translateX <- base + slide, scale 1]`
fn build_graph(module: &AnimatedModule) -> ordoplay_animated_module::Result<()> {
    module.create_animated_node(NodeTag(1), json!({ "type": "value", "value": 0.0 }))?;
    module.create_animated_node(
        NodeTag(2),
        json!({
            "type": "interpolation",
            "inputRange": [0.0, 1.0],
            "outputRange": [0.0, 1.0],
            "extrapolateRight": "clamp",
        }),
    )?;
    module.create_animated_node(NodeTag(5), json!({ "type": "value", "value": 0.0 }))?;
    module.create_animated_node(NodeTag(6), json!({ "type": "value", "value": 20.0 }))?;
    module.create_animated_node(NodeTag(7), json!({ "type": "addition", "input": [6, 5] }))?;
    module.create_animated_node(
        NodeTag(8),
        json!({
            "type": "transform",
            "transforms": [
                { "type": "animated", "property": "translateX", "nodeTag": 7 },
                { "type": "static", "property": "scale", "value": 1.0 },
            ],
        }),
    )?;
    module.create_animated_node(
        NodeTag(3),
        json!({ "type": "style", "style": { "opacity": 2, "transform": 8 } }),
    )?;
    module.create_animated_node(NodeTag(4), json!({ "type": "props", "props": { "style": 3 } }))?;

    module.connect_animated_nodes(NodeTag(1), NodeTag(2))?;
    module.connect_animated_nodes(NodeTag(5), NodeTag(7))?;
    module.connect_animated_nodes(NodeTag(6), NodeTag(7))?;
    module.connect_animated_nodes(NodeTag(2), NodeTag(3))?;
    module.connect_animated_nodes(NodeTag(7), NodeTag(8))?;
    module.connect_animated_nodes(NodeTag(8), NodeTag(3))?;
    module.connect_animated_nodes(NodeTag(3), NodeTag(4))?;
    module.connect_animated_node_to_view(NodeTag(4), VIEW)?;
    Ok(())
}
