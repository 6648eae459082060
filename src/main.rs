mod camera;
mod config;
mod controller;
mod error;
mod ticker;
mod ui;
mod video;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use eframe::egui;
use parking_lot::Mutex;

use camera::probe::Prober;
use config::{Args, Settings};
use controller::Controller;
use video::record::GstWriterFactory;
use video::{GstCapture, GstProbe};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = Settings::from_args(&args)?;

    // 1. 初始化 GStreamer
    gstreamer::init().context("GStreamer init failed")?;

    // 2. 探测线程池（网络摄像头连接可能要几秒）
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let prober = Prober::new(
        runtime.handle().clone(),
        Arc::new(GstProbe::new(settings.probe_timeout)),
    );

    // 3. 创建共享显示状态
    let display = Arc::new(Mutex::new(ui::DisplayState::default()));
    let controller = Controller::new(
        &settings,
        Box::new(GstCapture::new(settings.open_timeout)),
        Box::new(GstWriterFactory),
        prober,
        Box::new(ui::DisplaySink::new(Arc::clone(&display))),
    );

    // 4. 运行 egui
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 720.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Camera Viewer",
        options,
        Box::new(move |_cc| {
            Ok(Box::new(ui::CameraApp::new(controller, display, settings)))
        }),
    )
    .map_err(|e| anyhow!("{e}"))?;

    // 未完成的探测不再等待
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
