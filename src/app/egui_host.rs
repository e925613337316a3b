use winit::event::WindowEvent;
use winit::window::Window;

/// Tessellated overlay for one frame, ready for the renderer.
pub struct EguiFrameOutput {
    pub clipped_primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
    pub screen_size_px: [u32; 2],
}

/// egui context plus its winit glue. One per viewer session, so a fresh
/// renderer always receives the full font atlas.
pub struct EguiHost {
    context: egui::Context,
    winit_state: egui_winit::State,
    wants_pointer: bool,
}

impl EguiHost {
    pub fn new(window: &Window) -> Self {
        let context = egui::Context::default();
        let winit_state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        Self {
            context,
            winit_state,
            wants_pointer: false,
        }
    }

    /// Returns whether egui consumed the event.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    /// Whether the pointer is over a panel or a widget is being dragged, as
    /// of the last frame. Viewport input is withheld while this holds.
    pub fn wants_pointer(&self) -> bool {
        self.wants_pointer
    }

    pub fn run_ui<F>(&mut self, window: &Window, build: F) -> EguiFrameOutput
    where
        F: FnMut(&egui::Context),
    {
        let raw_input = self.winit_state.take_egui_input(window);
        let full_output = self.context.run(raw_input, build);
        self.winit_state
            .handle_platform_output(window, full_output.platform_output);
        let pixels_per_point = full_output.pixels_per_point;
        let clipped_primitives = self
            .context
            .tessellate(full_output.shapes, pixels_per_point);
        self.wants_pointer =
            self.context.wants_pointer_input() || self.context.is_pointer_over_area();
        let size = window.inner_size();

        EguiFrameOutput {
            clipped_primitives,
            textures_delta: full_output.textures_delta,
            pixels_per_point,
            screen_size_px: [size.width.max(1), size.height.max(1)],
        }
    }
}
