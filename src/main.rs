//! # Comic Frame Application Entry Point
//!
//! Each process is one activation of the frame: wake, fetch, render, show the
//! battery, then sleep. On the device the next activation starts from reset;
//! on a desktop the host platform re-executes this binary after the interval.
//!
//! Flags:
//! - `--config <path>`: configuration file (default `frame-config.toml`)
//! - `--stdout`: print an ASCII preview instead of writing the PGM file
//! - `--preview <file>`: render a local packed image and exit
//! - `--once`: run a single cycle and exit instead of sleeping

// Test modules
#[cfg(test)]
mod tests;

use std::env;
use std::fs;

use anyhow::Context;
use comic_frame_lib::battery::HostBattery;
use comic_frame_lib::config::{Config, CONFIG_FILE};
use comic_frame_lib::cycle::CycleController;
use comic_frame_lib::fetcher::HttpTransport;
use comic_frame_lib::network::TcpProbe;
use comic_frame_lib::panel::{HostPanel, PanelOutput};
use comic_frame_lib::platform::HostPlatform;
use comic_frame_lib::renderer;

/// Terminal width of the ASCII preview
const PREVIEW_COLUMNS: u32 = 100;

/// Value following `flag` on the command line
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn host_panel(config: &Config, ascii: bool) -> anyhow::Result<HostPanel> {
    let output = if ascii {
        PanelOutput::Ascii {
            columns: PREVIEW_COLUMNS,
        }
    } else {
        PanelOutput::Pgm(config.output.pgm_path.clone())
    };
    let panel = HostPanel::new(config.panel.width, config.panel.height, output)?;
    Ok(panel)
}

/// Development mode: push a local file through the renderer
fn preview(config: &Config, path: &str, ascii: bool) -> anyhow::Result<()> {
    let payload = fs::read(path).with_context(|| format!("reading {}", path))?;
    let expected = (config.panel.width as usize * config.panel.height as usize) / 2;
    if payload.len() != expected {
        log::warn!(
            "{} holds {} bytes, a full frame is {}",
            path,
            payload.len(),
            expected
        );
    }

    let mut panel = host_panel(config, ascii)?;
    renderer::render_frame(&mut panel, &payload)?;
    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let ascii = args.iter().any(|arg| arg == "--stdout");
    let run_once = args.iter().any(|arg| arg == "--once");
    let config_path = flag_value(&args, "--config").unwrap_or_else(|| CONFIG_FILE.to_string());
    let config = Config::load_from_path(&config_path);

    if let Some(path) = flag_value(&args, "--preview") {
        return preview(&config, &path, ascii);
    }

    let link = TcpProbe::for_url(&config.endpoint.url)?;
    let transport = HttpTransport::new(&config.fetch)?;
    let panel = host_panel(&config, ascii)?;
    let battery = HostBattery::from_config(&config.battery);
    let platform = HostPlatform::from_env();

    let mut controller = CycleController::new(config, link, transport, panel, battery, platform);

    // Single-threaded: one logical task per activation
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = rt.block_on(controller.run_cycle());
    drop(rt);

    if run_once {
        let report = outcome?;
        log::info!("Single cycle finished: {:?}", report);
        return Ok(());
    }

    controller.suspend(&outcome)
}
