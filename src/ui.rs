use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use eframe::egui;
use egui_extras::{Size, StripBuilder};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::camera::{CameraSource, Selection, SourceId};
use crate::config::Settings;
use crate::controller::{Command, Controller, Observer};
use crate::video::frame::Frame;
use crate::video::mode::VisualMode;
use crate::video::record::{NOT_RECORDING, RecordingState};

/// What the controller last published for the screen.
#[derive(Debug)]
pub struct DisplayState {
    pub frame: Option<Frame>,
    pub recording_status: String,
    pub notice: String,
    pub sources: Vec<CameraSource>,
    pub selection: Selection,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            frame: None,
            recording_status: NOT_RECORDING.to_string(),
            notice: String::new(),
            sources: Vec::new(),
            selection: Selection::None,
        }
    }
}

/// Observer that stores controller output in a shared [`DisplayState`].
pub struct DisplaySink {
    state: Arc<Mutex<DisplayState>>,
}

impl DisplaySink {
    pub fn new(state: Arc<Mutex<DisplayState>>) -> Self {
        Self { state }
    }
}

impl Observer for DisplaySink {
    fn frame_ready(&mut self, frame: &Frame) {
        self.state.lock().frame = Some(frame.clone());
    }

    fn recording_status(&mut self, status: &str) {
        self.state.lock().recording_status = status.to_string();
    }

    fn notice(&mut self, notice: &str) {
        self.state.lock().notice = notice.to_string();
    }

    fn sources_changed(&mut self, sources: &[CameraSource]) {
        self.state.lock().sources = sources.to_vec();
    }

    fn selection_changed(&mut self, selection: &Selection) {
        let mut state = self.state.lock();
        // 没有活动摄像头时清空画面
        if !matches!(selection, Selection::Active(_)) {
            state.frame = None;
        }
        state.selection = selection.clone();
    }
}

pub struct CameraApp {
    controller: Controller,
    commands: mpsc::UnboundedSender<Command>,
    display: Arc<Mutex<DisplayState>>,
    texture: Option<egui::TextureHandle>,
    settings: Settings,
    path_input: String,
}

impl CameraApp {
    pub fn new(
        mut controller: Controller,
        display: Arc<Mutex<DisplayState>>,
        settings: Settings,
    ) -> Self {
        controller.start(settings.network_camera.clone(), Instant::now());
        let commands = controller.commands();
        Self {
            controller,
            commands,
            display,
            texture: None,
            settings,
            path_input: String::new(),
        }
    }

    fn toggle_recording(&mut self) {
        if self.controller.is_recording() {
            let _ = self.commands.send(Command::StopRecording);
            return;
        }
        let path = if self.path_input.trim().is_empty() {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            self.settings.recording_path(timestamp)
        } else {
            self.path_input.trim().into()
        };
        let _ = self.commands.send(Command::StartRecording(path));
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let (sources, selection, status, notice) = {
            let display = self.display.lock();
            (
                display.sources.clone(),
                display.selection.clone(),
                display.recording_status.clone(),
                display.notice.clone(),
            )
        };
        let selected_name = match &selection {
            Selection::Active(id) | Selection::Failed { id, .. } => sources
                .iter()
                .find(|s| &s.id == id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| id.to_string()),
            Selection::None => "No camera".to_string(),
        };

        ui.horizontal_centered(|ui| {
            ui.add_space(20.0);

            let active_id = self.controller.registry().selected().cloned();
            let mut picked: Option<SourceId> = None;
            egui::ComboBox::from_id_salt("camera")
                .selected_text(selected_name)
                .show_ui(ui, |ui| {
                    for source in &sources {
                        let active = active_id.as_ref() == Some(&source.id);
                        if ui.selectable_label(active, source.name.as_str()).clicked() {
                            picked = Some(source.id.clone());
                        }
                    }
                });
            if let Some(id) = picked {
                let _ = self.commands.send(Command::SelectSource(id));
            }

            let streaming = active_id.is_some();
            let stream_label = if streaming { "⏹ Stop Stream" } else { "▶ Start Stream" };
            if ui.button(stream_label).clicked() {
                let command = if streaming {
                    Command::StopStream
                } else {
                    Command::StartStream
                };
                let _ = self.commands.send(command);
            }

            let mut mode = self.controller.mode();
            egui::ComboBox::from_id_salt("mode")
                .selected_text(mode.label())
                .show_ui(ui, |ui| {
                    for candidate in VisualMode::ALL {
                        ui.selectable_value(&mut mode, candidate, candidate.label());
                    }
                });
            if mode != self.controller.mode() {
                let _ = self.commands.send(Command::SetVisualMode(mode));
            }

            ui.add_space(20.0);
            ui.add_enabled(
                !self.controller.is_recording(),
                egui::TextEdit::singleline(&mut self.path_input)
                    .hint_text("rec_<time>.mp4")
                    .desired_width(220.0),
            );
            let label = match self.controller.recording_state() {
                RecordingState::Recording => "■ Stop",
                RecordingState::Idle => "● Record",
            };
            if ui.button(label).clicked() {
                self.toggle_recording();
            }

            ui.add_space(20.0);
            param_widget(ui, "STATUS", &status);
            ui.add_space(20.0);
            ui.label(
                egui::RichText::new(notice)
                    .size(12.0)
                    .color(egui::Color32::LIGHT_GRAY),
            );
        });
    }
}

impl eframe::App for CameraApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // --- 1. 处理录制快捷键 (R 键) ---
        if !ctx.wants_keyboard_input() && ctx.input(|i| i.key_pressed(egui::Key::R)) {
            self.toggle_recording();
        }

        let wait = self.controller.tick(Instant::now());

        // 获取最新图像并转换为 GPU 纹理
        if let Some(frame) = self.display.lock().frame.take() {
            let image = egui::ColorImage::from_rgb(
                [frame.width() as usize, frame.height() as usize],
                frame.pixels(),
            );
            self.texture = Some(ctx.load_texture("cam_frame", image, egui::TextureOptions::LINEAR));
        }
        if self.controller.registry().selected().is_none() {
            self.texture = None;
        }
        let recording = self.controller.is_recording();

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                StripBuilder::new(ui)
                    .size(Size::remainder())
                    .size(Size::exact(80.0))
                    .vertical(|mut strip| {
                        strip.cell(|ui| {
                            let rect = ui.max_rect();
                            if self.texture.is_none() {
                                ui.painter().text(
                                    rect.center(),
                                    egui::Align2::CENTER_CENTER,
                                    "No video",
                                    egui::FontId::proportional(24.0),
                                    egui::Color32::DARK_GRAY,
                                );
                            }
                            if let Some(texture) = &self.texture {
                                ui.painter().image(
                                    texture.id(),
                                    fit_keep_aspect(rect, texture.size_vec2()),
                                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                                    egui::Color32::WHITE,
                                );
                            }
                            if recording {
                                ui.painter().text(
                                    rect.left_top() + egui::vec2(20.0, 20.0),
                                    egui::Align2::LEFT_TOP,
                                    "● REC",
                                    egui::FontId::proportional(20.0),
                                    egui::Color32::RED,
                                );
                            }
                        });
                        strip.cell(|ui| {
                            // 绘制半透明背景
                            ui.painter().rect_filled(
                                ui.max_rect(),
                                0.0,
                                egui::Color32::from_black_alpha(180),
                            );
                            self.controls(ui);
                        });
                    });
            });

        // 关键：在下一个计时点请求重绘（实现实时视频）
        ctx.request_repaint_after(wait);
    }
}

/// Largest rect with the image's aspect ratio, centered in `area`.
fn fit_keep_aspect(area: egui::Rect, image: egui::Vec2) -> egui::Rect {
    if image.x <= 0.0 || image.y <= 0.0 {
        return area;
    }
    let scale = (area.width() / image.x).min(area.height() / image.y);
    egui::Rect::from_center_size(area.center(), image * scale)
}

fn param_widget(ui: &mut egui::Ui, label: &str, value: &str) {
    ui.vertical(|ui| {
        ui.label(
            egui::RichText::new(label)
                .size(10.0)
                .color(egui::Color32::LIGHT_GRAY),
        );
        ui.label(
            egui::RichText::new(value)
                .size(24.0)
                .strong()
                .color(egui::Color32::WHITE),
        );
    });
}
