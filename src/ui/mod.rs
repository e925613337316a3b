use crate::app::session::SessionStatus;
use crate::route::{Route, Variant};

/// Shortcut legend shown in the corner of the viewport.
pub const CONTROL_LEGEND: [(&str, &str); 4] = [
    ("Left-click", "Rotate"),
    ("Right-click", "Pan"),
    ("Scroll", "Zoom"),
    ("Double-click", "Reset View"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Back,
    SelectVariant(Variant),
    OpenModel,
}

pub struct UiState {
    show_legend: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

impl UiState {
    pub fn new() -> Self {
        Self { show_legend: true }
    }

    pub fn show(
        &mut self,
        ctx: &egui::Context,
        status: &SessionStatus,
        route: &Route,
    ) -> Vec<UiAction> {
        let mut actions = Vec::new();

        egui::Area::new(egui::Id::new("nav"))
            .anchor(egui::Align2::LEFT_TOP, egui::vec2(12.0, 12.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if let Route::Individual { variant, unit_id } = route {
                        if ui.button("< Back").clicked() {
                            actions.push(UiAction::Back);
                        }
                        unit_badge(ui, unit_id);
                        ui.separator();
                        for option in [Variant::With, Variant::Without] {
                            if ui
                                .selectable_label(*variant == option, option.label())
                                .clicked()
                                && *variant != option
                            {
                                actions.push(UiAction::SelectVariant(option));
                            }
                        }
                    }
                });
            });

        egui::Area::new(egui::Id::new("model"))
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-12.0, 12.0))
            .show(ctx, |ui| {
                ui.vertical(|ui| {
                    if ui.button("Open model...").clicked() {
                        actions.push(UiAction::OpenModel);
                    }
                    if let Some(name) = &status.model_name {
                        ui.weak(name);
                    }
                    if let Some(unit) = status.hovered_unit {
                        egui::Frame::popup(ui.style()).show(ui, |ui| {
                            ui.strong(format!("Unit {unit}"));
                        });
                    }
                });
            });

        if status.loading.is_active() {
            egui::Area::new(egui::Id::new("loading"))
                .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
                .show(ctx, |ui| {
                    let percent = status.loading.percent();
                    ui.add(
                        egui::ProgressBar::new(f32::from(percent) / 100.0)
                            .desired_width(240.0)
                            .text(progress_label(percent)),
                    );
                });
        }

        egui::Area::new(egui::Id::new("legend"))
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(12.0, -12.0))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    let toggle = if self.show_legend { "Hide controls" } else { "Controls" };
                    if ui.small_button(toggle).clicked() {
                        self.show_legend = !self.show_legend;
                    }
                    if self.show_legend {
                        egui::Grid::new("legend-grid").show(ui, |ui| {
                            for (input, action) in CONTROL_LEGEND {
                                ui.strong(input);
                                ui.label(action);
                                ui.end_row();
                            }
                        });
                    }
                });
            });

        actions
    }
}

fn unit_badge(ui: &mut egui::Ui, unit_id: &str) {
    egui::Frame::new()
        .fill(ui.visuals().selection.bg_fill)
        .corner_radius(6.0)
        .inner_margin(egui::Margin::symmetric(8, 2))
        .show(ui, |ui| {
            ui.colored_label(ui.visuals().strong_text_color(), format!("Unit #{unit_id}"));
        });
}

pub fn progress_label(percent: u8) -> String {
    format!("Loading model {percent}%")
}
