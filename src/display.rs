//! Tuner window
//!
//! Shows whatever the detection thread last reported: note name, frequency,
//! a cents needle coloured by accuracy and a small input level readout. The
//! device selector swaps the capture stream feeding the shared frame buffer.

use crossbeam_channel::Receiver;
use eframe::egui;
use std::time::{Duration, Instant};

use notewatch::audio::{get_default_input_device_name, get_input_devices, AudioCapture, CaptureConfig, FrameBuffer};
use notewatch::{Note, TunerEvent};

const GREEN: egui::Color32 = egui::Color32::from_rgb(48, 209, 88);
const ORANGE: egui::Color32 = egui::Color32::from_rgb(255, 159, 10);
const RED: egui::Color32 = egui::Color32::from_rgb(255, 69, 58);
const GREY: egui::Color32 = egui::Color32::from_rgb(142, 142, 147);
const TRACK: egui::Color32 = egui::Color32::from_rgb(59, 59, 59);
const MARK: egui::Color32 = egui::Color32::from_rgb(99, 99, 102);

fn accuracy_color(cents: f32) -> egui::Color32 {
    if cents.abs() < 5.0 {
        GREEN
    } else if cents.abs() < 20.0 {
        ORANGE
    } else {
        RED
    }
}

/// What the window currently shows, built from the event stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayState {
    pub note: Option<Note>,
    pub level_db: Option<f32>,
}

impl DisplayState {
    pub fn apply(&mut self, event: TunerEvent) {
        match event {
            TunerEvent::Note(note) => self.note = Some(note),
            TunerEvent::Clear => self.note = None,
            TunerEvent::Level { db, .. } => self.level_db = Some(db),
        }
    }

    pub fn drain(&mut self, events: &Receiver<TunerEvent>) -> usize {
        let mut applied = 0;
        for event in events.try_iter() {
            self.apply(event);
            applied += 1;
        }
        applied
    }
}

pub struct TunerDisplay {
    events: Receiver<TunerEvent>,
    state: DisplayState,
    buffer: FrameBuffer,
    capture_config: CaptureConfig,
    audio_capture: Option<AudioCapture>,
    available_devices: Vec<(String, cpal::Device)>,
    current_device_name: String,
    last_device_refresh: Instant,
    device_refresh_interval: Duration,
}

impl TunerDisplay {
    pub fn new(events: Receiver<TunerEvent>, buffer: FrameBuffer, capture_config: CaptureConfig) -> Self {
        let available_devices = get_input_devices().unwrap_or_default();
        let current_device_name = get_default_input_device_name().unwrap_or_else(|_| "Default".to_string());

        Self {
            events,
            state: DisplayState::default(),
            buffer,
            capture_config,
            audio_capture: None,
            available_devices,
            current_device_name,
            last_device_refresh: Instant::now(),
            device_refresh_interval: Duration::from_secs(2),
        }
    }

    pub fn set_audio_capture(&mut self, audio_capture: AudioCapture) {
        self.current_device_name = audio_capture.device_name().to_string();
        self.audio_capture = Some(audio_capture);
    }

    fn switch_device(&mut self, device_name: String, device: cpal::Device) {
        // drop the old stream first so two devices never feed the buffer
        self.audio_capture = None;
        match AudioCapture::new_with_device(self.buffer.clone(), device, &self.capture_config) {
            Ok(capture) => {
                self.current_device_name = device_name;
                self.audio_capture = Some(capture);
                self.state.note = None;
            }
            Err(err) => log::warn!("Cannot switch to '{}': {:#}", device_name, err),
        }
    }

    fn refresh_audio_devices(&mut self) {
        if self.last_device_refresh.elapsed() < self.device_refresh_interval {
            return;
        }
        self.last_device_refresh = Instant::now();

        let Ok(devices) = get_input_devices() else {
            return;
        };
        let changed = devices.len() != self.available_devices.len()
            || !devices
                .iter()
                .all(|(name, _)| self.available_devices.iter().any(|(existing, _)| existing == name));
        if changed {
            log::info!("Audio device list changed, {} input(s) available", devices.len());
            self.available_devices = devices;
        }
    }

    fn draw_tuner_display(&self, ui: &mut egui::Ui) {
        let available_size = ui.available_size();
        let center = available_size / 2.0;
        let note = self.state.note.as_ref();

        ui.scope_builder(
            egui::UiBuilder::new().max_rect(egui::Rect::from_center_size(
                egui::pos2(center.x, center.y - 30.0),
                egui::vec2(200.0, 40.0),
            )),
            |ui| {
                ui.vertical_centered(|ui| match note {
                    Some(note) => {
                        ui.label(
                            egui::RichText::new(format!("{}{}", note.name, note.octave))
                                .size(36.0)
                                .color(egui::Color32::WHITE)
                                .strong(),
                        );
                        ui.label(
                            egui::RichText::new(format!("{:.1} Hz", note.frequency))
                                .size(12.0)
                                .color(GREY),
                        );
                    }
                    None => {
                        ui.label(egui::RichText::new("Listening...").size(18.0).color(GREY));
                        ui.add_space(16.0);
                    }
                });
            },
        );

        self.draw_tuner_needle(ui, note.map(|n| n.cents), center);

        ui.scope_builder(
            egui::UiBuilder::new().max_rect(egui::Rect::from_center_size(
                egui::pos2(center.x, center.y + 38.0),
                egui::vec2(160.0, 20.0),
            )),
            |ui| {
                ui.vertical_centered(|ui| {
                    let text = match (note, self.state.level_db) {
                        (Some(note), _) => {
                            let sign = if note.cents > 0.0 { "+" } else { "" };
                            egui::RichText::new(format!("{}{:.0} cents", sign, note.cents))
                                .color(accuracy_color(note.cents))
                        }
                        (None, Some(db)) => egui::RichText::new(format!("{:.0} dB", db)).color(MARK),
                        (None, None) => egui::RichText::new(""),
                    };
                    ui.label(text.size(11.0));
                });
            },
        );
    }

    fn draw_tuner_needle(&self, ui: &mut egui::Ui, cents: Option<f32>, center: egui::Vec2) {
        let painter = ui.painter();
        let needle_area = egui::Rect::from_center_size(
            egui::pos2(center.x, center.y + 5.0),
            egui::vec2(220.0, 20.0),
        );
        painter.rect_filled(needle_area, 10.0, TRACK);

        let center_x = needle_area.center().x;
        let half_span = needle_area.width() / 2.0 - 10.0;
        painter.line_segment(
            [
                egui::pos2(center_x, needle_area.top() + 3.0),
                egui::pos2(center_x, needle_area.bottom() - 3.0),
            ],
            egui::Stroke::new(1.5, MARK),
        );

        let max_cents = 50.0;
        for i in [-4i32, -2, 2, 4] {
            let mark_x = center_x + (i as f32 * 12.5 / max_cents) * half_span;
            painter.line_segment(
                [
                    egui::pos2(mark_x, needle_area.center().y - 3.0),
                    egui::pos2(mark_x, needle_area.center().y + 3.0),
                ],
                egui::Stroke::new(1.0, MARK),
            );
        }

        if let Some(cents) = cents {
            let needle_x = center_x + (cents / max_cents).clamp(-1.0, 1.0) * half_span;
            painter.circle_filled(egui::pos2(needle_x, needle_area.center().y), 6.0, accuracy_color(cents));
        }
    }

    fn draw_device_selector(&mut self, ui: &mut egui::Ui) {
        let available_rect = ui.available_rect_before_wrap();
        let combo_rect = egui::Rect::from_center_size(available_rect.center(), egui::vec2(200.0, 25.0));

        ui.scope_builder(egui::UiBuilder::new().max_rect(combo_rect), |ui| {
            let mut style = (*ui.ctx().style()).clone();
            let hovered = egui::Color32::from_rgb(75, 75, 75);
            for (widget, fill) in [
                (&mut style.visuals.widgets.inactive, TRACK),
                (&mut style.visuals.widgets.hovered, hovered),
                (&mut style.visuals.widgets.active, TRACK),
                (&mut style.visuals.widgets.open, TRACK),
            ] {
                widget.bg_fill = fill;
                widget.weak_bg_fill = fill;
                widget.fg_stroke.color = egui::Color32::WHITE;
            }
            style.visuals.window_fill = TRACK;
            style.visuals.panel_fill = TRACK;
            style.visuals.extreme_bg_color = TRACK;
            style.visuals.selection.bg_fill = hovered;
            style.visuals.selection.stroke.color = egui::Color32::WHITE;
            style.visuals.override_text_color = Some(egui::Color32::WHITE);
            style.visuals.popup_shadow = eframe::epaint::Shadow::NONE;
            ui.ctx().set_style(style);

            let mut selected = None;
            egui::ComboBox::from_id_salt("device_selector")
                .selected_text(&self.current_device_name)
                .width(200.0)
                .height(25.0)
                .show_ui(ui, |ui| {
                    for (device_name, device) in &self.available_devices {
                        let is_current = *device_name == self.current_device_name;
                        if ui.selectable_label(is_current, device_name).clicked() && !is_current {
                            selected = Some((device_name.clone(), device.clone()));
                        }
                    }
                });

            if let Some((device_name, device)) = selected {
                self.switch_device(device_name, device);
            }
        });
    }
}

impl eframe::App for TunerDisplay {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.refresh_audio_devices();
        self.state.drain(&self.events);

        // keep polling the channel even when nothing moves on screen
        ctx.request_repaint_after(Duration::from_millis(30));

        egui::CentralPanel::default()
            .frame(egui::Frame {
                fill: egui::Color32::from_rgba_premultiplied(31, 31, 31, 240),
                corner_radius: 8.0.into(),
                shadow: eframe::epaint::Shadow::NONE,
                outer_margin: egui::Margin::ZERO,
                inner_margin: egui::Margin::symmetric(0, 16),
                ..Default::default()
            })
            .show(ctx, |ui| {
                ui.add_space(8.0);
                ui.with_layout(egui::Layout::top_down(egui::Align::Center), |ui| {
                    ui.add_space(10.0);
                    self.draw_tuner_display(ui);
                    ui.add_space(12.0);
                    ui.vertical_centered(|ui| {
                        ui.add_space(20.0);
                        self.draw_device_selector(ui);
                    });
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notewatch::note::frequency_to_note;

    #[test]
    fn events_are_applied_in_arrival_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(TunerEvent::Note(frequency_to_note(440.0))).unwrap();
        tx.send(TunerEvent::Level { rms: 0.1, db: -20.0 }).unwrap();
        tx.send(TunerEvent::Note(frequency_to_note(493.88))).unwrap();

        let mut state = DisplayState::default();
        assert_eq!(state.drain(&rx), 3);
        assert_eq!(state.note.as_ref().map(|n| n.name), Some("B"));
        assert_eq!(state.level_db, Some(-20.0));
    }

    #[test]
    fn clear_returns_to_placeholder_but_keeps_level() {
        let mut state = DisplayState::default();
        state.apply(TunerEvent::Note(frequency_to_note(440.0)));
        state.apply(TunerEvent::Level { rms: 0.0, db: -100.0 });
        state.apply(TunerEvent::Clear);
        assert!(state.note.is_none());
        assert_eq!(state.level_db, Some(-100.0));
    }

    #[test]
    fn needle_colour_follows_accuracy() {
        assert_eq!(accuracy_color(-3.0), GREEN);
        assert_eq!(accuracy_color(12.0), ORANGE);
        assert_eq!(accuracy_color(-35.0), RED);
    }
}
