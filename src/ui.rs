use std::sync::Arc;
use std::time::{Duration, Instant};
use eframe::egui;
use image::imageops;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::camera_controller::FrameSource;
use crate::config::Config;
use crate::controller::{CaptureCallbacks, CaptureController, CaptureHandle, SessionOutcome};
use crate::estimator::{create_loader, SimulatedEstimator};
use crate::landmarks::draw_hand_overlay;
use crate::pose::POSE_COUNT;
use crate::session::{CaptureView, Phase};
use crate::snapshot::CapturedImage;
use crate::storage::PhotoStore;

// ============================================================================
// CONSTANTS FOR UI STYLING - Easy to modify
// ============================================================================
const UI_PADDING: f32 = 20.0;
const POSE_BADGE_RADIUS: f32 = 32.0;
const ACTION_BUTTON_RADIUS: f32 = 60.0;
const PREVIEW_INTERVAL: Duration = Duration::from_millis(33);
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(3);
const ACCENT: egui::Color32 = egui::Color32::from_rgb(1, 149, 159);
const CONFIRMED: egui::Color32 = egui::Color32::from_rgb(40, 160, 70);

// ============================================================================
// MAIN APP STRUCT
// ============================================================================

pub struct HandCaptureApp {
    config: Config,

    // Camera and gesture input
    camera: Arc<dyn FrameSource>,
    simulator: SimulatedEstimator,

    // Running capture session
    session: Option<CaptureHandle>,
    session_task: Option<JoinHandle<SessionOutcome>>,
    exiting: bool,

    // Textures
    pub camera_texture: Option<egui::TextureHandle>,
    pub captured_texture: Option<egui::TextureHandle>,
    pub captured_source: Option<CapturedImage>,
    last_camera_update: Option<Instant>,

    // Accepted photos
    store: PhotoStore,
    status_sender: mpsc::UnboundedSender<String>,
    status_receiver: mpsc::UnboundedReceiver<String>,
    status_message: Option<(String, Instant)>,
}

// ============================================================================
// INITIALIZATION
// ============================================================================

impl HandCaptureApp {
    pub fn new(config: Config, camera: Arc<dyn FrameSource>, simulator: SimulatedEstimator) -> Self {
        let (status_sender, status_receiver) = mpsc::unbounded_channel();
        let store = PhotoStore::new(config.paths.output_dir.clone());

        let mut app = Self {
            config,
            camera,
            simulator,
            session: None,
            session_task: None,
            exiting: false,
            camera_texture: None,
            captured_texture: None,
            captured_source: None,
            last_camera_update: None,
            store,
            status_sender,
            status_receiver,
            status_message: None,
        };
        app.start_session();
        app
    }

    /// Begin a fresh gesture capture session
    fn start_session(&mut self) {
        let loader = match create_loader(&self.config.estimator, &self.simulator) {
            Ok(loader) => loader,
            Err(e) => {
                log::error!("Cannot create hand estimator: {:#}", e);
                self.show_message(format!("Estimator error: {}", e));
                return;
            }
        };

        let store = self.store.clone();
        let on_capture_status = self.status_sender.clone();
        let callbacks = CaptureCallbacks::new(
            move |image| {
                let message = match store.store(&image) {
                    Ok(path) => format!("✓ Photo saved to {}", path.display()),
                    Err(e) => {
                        log::error!("Failed to store photo: {:#}", e);
                        format!("Saving photo failed: {}", e)
                    }
                };
                let _ = on_capture_status.send(message);
            },
            || log::debug!("Capture dialog closed"),
        );

        let (controller, handle) =
            CaptureController::new(&self.config, Arc::clone(&self.camera), loader, callbacks);
        self.session_task = Some(controller.spawn());
        self.session = Some(handle);
        self.captured_source = None;
        let _ = self.simulator.try_set_fingers(None);
    }

    fn show_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }
}

impl Drop for HandCaptureApp {
    fn drop(&mut self) {
        // Make sure no timer or inference outlives the window
        if let Some(task) = self.session_task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for HandCaptureApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_keyboard(ctx);

        while let Ok(message) = self.status_receiver.try_recv() {
            self.show_message(message);
        }

        // Kiosk mode: once a session closes, the next candidate gets a new one
        let finished = self.session_task.as_ref().map_or(false, |task| task.is_finished());
        if finished {
            self.session_task = None;
            self.session = None;
            if self.exiting {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            } else {
                self.start_session();
            }
        }

        let view = self.session.as_ref().map(|handle| handle.view());

        if let Some(view) = &view {
            match view.phase {
                Phase::Sampling | Phase::Countdown(_) => self.update_camera_preview(ctx),
                Phase::Captured => self.update_captured_photo(ctx, view),
                _ => {}
            }
            if view.phase != Phase::Captured {
                self.captured_source = None;
            }
        }

        self.render_ui(ctx, view.as_ref());
        ctx.request_repaint_after(PREVIEW_INTERVAL);
    }
}

impl HandCaptureApp {
    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        let keys = [
            (egui::Key::Num0, 0u8),
            (egui::Key::Num1, 1),
            (egui::Key::Num2, 2),
            (egui::Key::Num3, 3),
            (egui::Key::Num4, 4),
        ];
        for (key, fingers) in keys {
            if ctx.input(|i| i.key_pressed(key)) {
                self.simulator.try_set_fingers(Some(fingers));
            }
        }

        if ctx.input(|i| i.key_pressed(egui::Key::N)) {
            self.simulator.try_set_fingers(None);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::R)) {
            self.retake();
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Enter)) {
            self.submit();
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.exiting = true;
            match &self.session {
                Some(handle) => {
                    handle.cancel();
                }
                None => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            }
        }
    }

    fn retake(&mut self) {
        if let Some(handle) = &self.session {
            handle.retake();
        }
    }

    fn submit(&mut self) {
        if let Some(handle) = &self.session {
            handle.submit();
        }
    }

    fn update_camera_preview(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let should_update = match self.last_camera_update {
            None => true,
            Some(last) => now.duration_since(last) >= PREVIEW_INTERVAL,
        };
        if !should_update {
            return;
        }

        if let Some(mut frame) = self.camera.current_frame() {
            if let Some(hand) = self.session.as_ref().and_then(|handle| handle.latest_hand()) {
                draw_hand_overlay(&mut frame, &hand);
            }
            if self.config.camera.mirrored {
                imageops::flip_horizontal_in_place(&mut frame);
            }
            self.update_camera_texture(ctx, &frame);
            self.last_camera_update = Some(now);
        }
    }

    fn update_captured_photo(&mut self, ctx: &egui::Context, view: &CaptureView) {
        if let Some(image) = &view.captured {
            if let Err(e) = self.show_captured_photo(ctx, image) {
                log::warn!("Cannot display captured photo: {}", e);
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

impl HandCaptureApp {
    fn render_ui(&mut self, ctx: &egui::Context, view: Option<&CaptureView>) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let full_rect = ui.max_rect();
                ui.painter().rect_filled(full_rect, 0.0, egui::Color32::from_rgb(40, 40, 40));

                match view {
                    None => self.render_centered_text(ui, full_rect, "Starting capture session..."),
                    Some(view) => match &view.phase {
                        Phase::Loading => self.render_loading(ui, full_rect),
                        Phase::Failed(reason) => self.render_centered_text(
                            ui,
                            full_rect,
                            &format!("Hand detector unavailable: {}\nPress Esc to close", reason),
                        ),
                        Phase::Sampling | Phase::Countdown(_) => {
                            self.render_live_view(ui, full_rect, view);
                        }
                        Phase::Captured => self.render_captured(ui, ctx, full_rect),
                        Phase::Closed => self.render_centered_text(ui, full_rect, "Closing..."),
                    },
                }

                self.render_status_message(ctx);
            });
    }

    fn render_centered_text(&self, ui: &mut egui::Ui, rect: egui::Rect, text: &str) {
        ui.allocate_ui_at_rect(rect, |ui| {
            ui.centered_and_justified(|ui| {
                ui.label(egui::RichText::new(text).color(egui::Color32::WHITE).size(20.0));
            });
        });
    }

    fn render_loading(&self, ui: &mut egui::Ui, rect: egui::Rect) {
        ui.allocate_ui_at_rect(rect, |ui| {
            ui.centered_and_justified(|ui| {
                ui.horizontal_centered(|ui| {
                    ui.spinner();
                    ui.label(egui::RichText::new("Loading camera...").color(egui::Color32::GRAY));
                });
            });
        });
    }

    fn render_live_view(&self, ui: &mut egui::Ui, rect: egui::Rect, view: &CaptureView) {
        let instructions_height = 40.0;
        let badges_height = POSE_BADGE_RADIUS * 2.0 + UI_PADDING * 2.0;
        let preview_area = egui::Rect::from_min_max(
            rect.min + egui::vec2(UI_PADDING, UI_PADDING + instructions_height),
            rect.max - egui::vec2(UI_PADDING, badges_height),
        );

        ui.painter().text(
            egui::pos2(rect.center().x, rect.min.y + UI_PADDING + instructions_height / 2.0),
            egui::Align2::CENTER_CENTER,
            "Follow the hand poses in order. The photo is taken after the last pose.",
            egui::FontId::proportional(18.0),
            egui::Color32::WHITE,
        );

        let preview_rect = if let Some(texture) = &self.camera_texture {
            let display_size = fit_image_in_rect(texture.size_vec2(), preview_area.size());
            let centered_rect = center_rect_in_rect(display_size, preview_area);
            ui.allocate_ui_at_rect(centered_rect, |ui| {
                ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
            });
            centered_rect
        } else {
            self.render_centered_text(ui, preview_area, "Waiting for camera...");
            preview_area
        };

        if let Some(remaining) = view.countdown {
            let painter = ui.painter();
            painter.rect_filled(preview_rect, 0.0, egui::Color32::from_black_alpha(128));
            painter.text(
                preview_rect.center(),
                egui::Align2::CENTER_CENTER,
                remaining.to_string(),
                egui::FontId::proportional(96.0),
                egui::Color32::WHITE,
            );
        }

        let badges_center = egui::pos2(rect.center().x, rect.max.y - badges_height / 2.0);
        self.render_pose_badges(ui.painter(), badges_center, view);
    }

    /// One badge per pose, highlighted once that pose is confirmed
    fn render_pose_badges(&self, painter: &egui::Painter, center: egui::Pos2, view: &CaptureView) {
        let spacing = POSE_BADGE_RADIUS * 3.5;
        let first_x = center.x - spacing * (POSE_COUNT as f32 - 1.0) / 2.0;

        for index in 0..POSE_COUNT {
            let badge_center = egui::pos2(first_x + spacing * index as f32, center.y);
            let confirmed = view.pose_status[index];
            let current = !confirmed && view.stage as usize == index + 1;

            let (fill, stroke) = if confirmed {
                (CONFIRMED, egui::Stroke::new(3.0, egui::Color32::WHITE))
            } else if current {
                (egui::Color32::from_rgb(70, 70, 80), egui::Stroke::new(3.0, ACCENT))
            } else {
                (egui::Color32::from_rgb(70, 70, 80), egui::Stroke::new(2.0, egui::Color32::from_rgb(100, 100, 110)))
            };

            painter.circle(badge_center, POSE_BADGE_RADIUS, fill, stroke);
            painter.text(
                badge_center,
                egui::Align2::CENTER_CENTER,
                if confirmed { "✔".to_string() } else { format!("{} ☝", index + 1) },
                egui::FontId::proportional(POSE_BADGE_RADIUS * 0.7),
                egui::Color32::WHITE,
            );

            if index + 1 < POSE_COUNT {
                painter.text(
                    badge_center + egui::vec2(spacing / 2.0, 0.0),
                    egui::Align2::CENTER_CENTER,
                    "›",
                    egui::FontId::proportional(POSE_BADGE_RADIUS),
                    egui::Color32::GRAY,
                );
            }
        }

        painter.text(
            egui::pos2(center.x + spacing * 2.2, center.y),
            egui::Align2::LEFT_CENTER,
            format!("Detected: {}", view.fingers),
            egui::FontId::proportional(14.0),
            egui::Color32::GRAY,
        );
    }

    fn render_captured(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, rect: egui::Rect) {
        let buttons_height = ACTION_BUTTON_RADIUS * 2.0 + UI_PADDING * 2.0;
        let photo_area = egui::Rect::from_min_max(
            rect.min + egui::vec2(UI_PADDING, UI_PADDING),
            rect.max - egui::vec2(UI_PADDING, buttons_height),
        );

        if let Some(texture) = &self.captured_texture {
            let display_size = fit_image_in_rect(texture.size_vec2(), photo_area.size());
            let centered_rect = center_rect_in_rect(display_size, photo_area);
            ui.allocate_ui_at_rect(centered_rect, |ui| {
                ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
            });
        }

        let center_y = rect.max.y - buttons_height / 2.0;
        let retake_center = egui::pos2(rect.center().x - ACTION_BUTTON_RADIUS * 1.5, center_y);
        let submit_center = egui::pos2(rect.center().x + ACTION_BUTTON_RADIUS * 1.5, center_y);
        let offset = egui::vec2(ACTION_BUTTON_RADIUS, ACTION_BUTTON_RADIUS);

        egui::Area::new("retake_btn")
            .fixed_pos(retake_center - offset)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                if circular_button(ui, ACTION_BUTTON_RADIUS, "Retake", egui::Color32::from_rgba_unmultiplied(70, 70, 80, 200)) {
                    self.retake();
                }
            });

        egui::Area::new("submit_btn")
            .fixed_pos(submit_center - offset)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                if circular_button(ui, ACTION_BUTTON_RADIUS, "Submit", ACCENT) {
                    self.submit();
                }
            });
    }

    fn render_status_message(&mut self, ctx: &egui::Context) {
        // Auto-hide message after a few seconds
        let expired = self
            .status_message
            .as_ref()
            .map_or(false, |(_, shown_at)| shown_at.elapsed() > MESSAGE_TIMEOUT);
        if expired {
            self.status_message = None;
        }

        if let Some((message, _)) = &self.status_message {
            let is_success = message.starts_with('✓');

            egui::Area::new("status_message")
                .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, UI_PADDING))
                .order(egui::Order::Tooltip)
                .show(ctx, |ui| {
                    egui::Frame::none()
                        .fill(if is_success {
                            egui::Color32::from_rgb(40, 120, 40)
                        } else {
                            egui::Color32::from_rgb(180, 40, 40)
                        })
                        .rounding(8.0)
                        .inner_margin(egui::Margin::symmetric(20.0, 15.0))
                        .show(ui, |ui| {
                            ui.label(egui::RichText::new(message).color(egui::Color32::WHITE).size(18.0));
                        });
                });
        }
    }
}

/// Touch-friendly round button; returns true when clicked
fn circular_button(ui: &mut egui::Ui, radius: f32, text: &str, base_fill: egui::Color32) -> bool {
    let size = egui::vec2(radius * 2.0, radius * 2.0);
    let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click());

    if ui.is_rect_visible(rect) {
        let painter = ui.painter();
        let center = rect.center();

        let fill_color = if response.is_pointer_button_down_on() {
            egui::Color32::from_rgb(
                base_fill.r().saturating_sub(30),
                base_fill.g().saturating_sub(30),
                base_fill.b().saturating_sub(30),
            )
        } else if response.hovered() {
            egui::Color32::from_rgb(
                base_fill.r().saturating_add(20),
                base_fill.g().saturating_add(20),
                base_fill.b().saturating_add(20),
            )
        } else {
            base_fill
        };

        painter.circle(center + egui::vec2(3.0, 3.0), radius, egui::Color32::from_black_alpha(80), egui::Stroke::NONE);
        painter.circle(center, radius, fill_color, egui::Stroke::new(3.0, egui::Color32::from_rgb(100, 100, 110)));
        painter.text(
            center,
            egui::Align2::CENTER_CENTER,
            text,
            egui::FontId::proportional(radius / 3.0),
            egui::Color32::WHITE,
        );

        if response.hovered() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
    }

    response.clicked()
}

fn fit_image_in_rect(image_size: egui::Vec2, container_size: egui::Vec2) -> egui::Vec2 {
    let scale = (container_size.x / image_size.x).min(container_size.y / image_size.y);
    image_size * scale
}

fn center_rect_in_rect(content_size: egui::Vec2, container: egui::Rect) -> egui::Rect {
    let offset = (container.size() - content_size) * 0.5;
    egui::Rect::from_min_size(container.min + offset, content_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_image_keeps_aspect_ratio() {
        let fitted = fit_image_in_rect(egui::vec2(800.0, 600.0), egui::vec2(400.0, 400.0));
        assert_eq!(fitted, egui::vec2(400.0, 300.0));
    }

    #[test]
    fn test_center_rect() {
        let container = egui::Rect::from_min_size(egui::pos2(10.0, 10.0), egui::vec2(100.0, 50.0));
        let centered = center_rect_in_rect(egui::vec2(50.0, 50.0), container);
        assert_eq!(centered.min, egui::pos2(35.0, 10.0));
    }
}
