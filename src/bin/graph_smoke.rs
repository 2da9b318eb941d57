//! Smoke run against a real device: build a camera graph, walk it, take a
//! picture and save a screenshot.
//!
//! Usage: `graph_smoke <device-udid> [app-package]`
//!
//! Besides the console output, every action executed on the device is
//! written to `<timestamp>_<device>_gtl.log` in the working directory.

use anyhow::{bail, Context as _};
use chrono::{Local, Utc};
use std::fs::File;
use std::sync::{Arc, Mutex};
use tracing::{info, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer};
use ui_state_graph::{compose_clicks, Action, AppGraph, GraphBuilder, GraphConfig, GraphDefinition, State, UiDriver};

const CAMERA_PACKAGE: &str = "com.google.android.GoogleCamera";

const TAKE_PHOTO: &str = r#"//android.widget.ImageButton[@content-desc="Take photo"]"#;
const CAMERA_TAB: &str = r#"//android.widget.TextView[@content-desc="Camera"]"#;
const VIDEO_TAB: &str = r#"//android.widget.TextView[@content-desc="Video"]"#;
const START_VIDEO: &str = r#"//android.widget.ImageButton[@content-desc="Start video"]"#;
const SETTINGS_TITLE: &str = r#"//android.widget.TextView[@text="Camera settings"]"#;
const SETTINGS_GENERAL: &str = r#"//android.widget.TextView[@resource-id="android:id/title" and @text="General"]"#;
const TO_VIDEO: &str = r#"//android.widget.TextView[@content-desc="Switch to Video Camera"]"#;
const TO_PHOTO: &str = r#"//android.widget.TextView[@content-desc="Switch to Camera Mode"]"#;
const OPEN_SETTINGS: [&str; 2] = [
    r#"//android.widget.ImageView[@content-desc="Camera settings"]"#,
    r#"//android.widget.Button[@content-desc="Open settings"]"#,
];
const SHUTTER: &str = r#"//android.widget.ImageButton[@resource-id="com.google.android.GoogleCamera:id/shutter_button"]"#;

fn camera_graph() -> anyhow::Result<Arc<GraphDefinition>> {
    let mut b = GraphBuilder::new("google_camera");
    let photo = b.state(State::simple("photo", &[TAKE_PHOTO, CAMERA_TAB]).initial());
    let video = b.state(State::simple("video", &[VIDEO_TAB, START_VIDEO]));
    let settings = b.state(State::simple("settings", &[SETTINGS_TITLE, SETTINGS_GENERAL]).parent(photo));
    b.transition(photo, video, compose_clicks(&[TO_VIDEO]));
    b.transition(video, photo, compose_clicks(&[TO_PHOTO]));
    b.transition(photo, settings, compose_clicks(&OPEN_SETTINGS));
    b.transition(video, settings, compose_clicks(&OPEN_SETTINGS));
    Ok(b.build()?)
}

/// Console output filtered by `RUST_LOG`, plus the device's ground-truth log
/// file receiving only `ground_truth` records.
fn init_logging(device: &str) -> anyhow::Result<String> {
    let path = format!("{}_{}_gtl.log", Local::now().format("%Y-%m-%d_%H-%M-%S"), device);
    let file = File::create(&path).with_context(|| format!("creating {}", path))?;

    let console = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console))
        .with(ground_truth_layer(Mutex::new(file)))
        .init();
    Ok(path)
}

fn ground_truth_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(Targets::new().with_target("ground_truth", Level::INFO))
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(device) = args.next() else {
        bail!("usage: graph_smoke <device-udid> [app-package]");
    };
    let package = args.next().unwrap_or_else(|| CAMERA_PACKAGE.to_string());

    let gtl_path = init_logging(&device)?;
    info!(path = %gtl_path, "ground-truth log");

    let config = GraphConfig::from_env();
    let definition = camera_graph().context("camera graph definition")?;
    info!(
        states = definition.state_count(),
        transitions = definition.transitions().len(),
        "graph ready"
    );

    let mut graph = AppGraph::connect(Arc::clone(&definition), &device, &package, &config)
        .with_context(|| format!("connecting to {} on {}", package, config.appium_server))?;

    for target in ["video", "settings", "photo"] {
        graph.go_to_state(target, &Default::default())?;
        info!(state = graph.current_state_name(), "reached");
    }

    let photo = graph.current_state();
    graph.run_action(Action::new("take_picture", photo, |driver, _| {
        driver.click(SHUTTER)?;
        Ok(())
    }))?;

    let png = graph.driver().screenshot()?;
    let path = format!(
        "{}-{}-{}.png",
        Utc::now().format("%Y%m%d%H%M%S"),
        device,
        uuid::Uuid::new_v4()
    );
    std::fs::write(&path, png).with_context(|| format!("writing {}", path))?;
    info!(%path, "screenshot saved");
    Ok(())
}
