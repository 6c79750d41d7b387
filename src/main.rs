use anyhow::Result;
use eframe::egui;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use gesture_capture::camera_controller::{CameraController, FrameSource};
use gesture_capture::config::Config;
use gesture_capture::estimator::SimulatedEstimator;
use gesture_capture::ui::HandCaptureApp;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting gesture capture kiosk");

    // Load configuration
    let config = Config::load()?;
    config.create_directories()?;
    info!(
        "Configuration loaded: {}x{} display, {:?} estimator",
        config.display.width, config.display.height, config.estimator.backend
    );

    // Initialize camera
    let camera: Arc<dyn FrameSource> = if cfg!(feature = "camera") {
        match CameraController::new(config.camera.width, config.camera.height) {
            Ok(camera) => Arc::new(camera),
            Err(e) => {
                log::warn!("Camera initialization failed: {}. Using test pattern.", e);
                Arc::new(CameraController::test_pattern(config.camera.width, config.camera.height))
            }
        }
    } else {
        Arc::new(CameraController::test_pattern(config.camera.width, config.camera.height))
    };

    let simulator = SimulatedEstimator::new(Duration::from_millis(800));

    let width = config.display.width as f32;
    let height = config.display.height as f32;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([width, height])
            .with_min_inner_size([width, height])
            .with_decorations(!config.display.fullscreen)
            .with_fullscreen(config.display.fullscreen),
        ..Default::default()
    };

    info!("Launching GUI application...");

    eframe::run_native(
        "Gesture Capture",
        options,
        Box::new(move |cc| {
            setup_touch_style(&cc.egui_ctx);
            Box::new(HandCaptureApp::new(config, camera, simulator))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}

fn setup_touch_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    // Larger UI elements for touch interaction
    style.spacing.button_padding = egui::vec2(16.0, 12.0);
    style.spacing.item_spacing = egui::vec2(12.0, 8.0);

    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(18.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(16.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Heading,
        egui::FontId::new(24.0, egui::FontFamily::Proportional),
    );

    ctx.set_style(style);
}
