use glam::Vec2;
use std::time::{Duration, Instant};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, TouchPhase};

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);
/// Pointer travel, in pixels, beyond which a press becomes a drag.
const CLICK_SLOP: f32 = 5.0;
const PIXELS_PER_LINE: f32 = 40.0;
/// Wheel lines per unit of trackpad magnification.
const LINES_PER_MAGNIFICATION: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Viewport input after translation from raw window events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerEvent {
    Resized { width: u32, height: u32 },
    PointerMoved(Vec2),
    PointerLeft,
    PointerDown { button: PointerButton, position: Vec2 },
    PointerUp { button: PointerButton, position: Vec2 },
    /// Second primary click or tap in quick succession.
    DoubleClick(Vec2),
    /// Positive scrolls toward the scene.
    Wheel(f32),
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum TouchGesture {
    #[default]
    Idle,
    /// One finger down, acting as the primary button.
    Drag,
    /// Two or more fingers; `span` is the last distance between the first two.
    Pinch { span: f32 },
}

/// Tracks the pointer between events to derive double-clicks, and turns
/// touches into the same pointer events a mouse produces.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    position: Option<Vec2>,
    press_origin: Option<Vec2>,
    last_click: Option<(Instant, Vec2)>,
    touches: Vec<(u64, Vec2)>,
    gesture: TouchGesture,
}

impl InputState {
    pub fn position(&self) -> Option<Vec2> {
        self.position
    }

    pub fn cursor_moved(&mut self, position: Vec2) -> ViewerEvent {
        self.position = Some(position);
        ViewerEvent::PointerMoved(position)
    }

    pub fn cursor_left(&mut self) -> ViewerEvent {
        self.position = None;
        ViewerEvent::PointerLeft
    }

    pub fn mouse_input(
        &mut self,
        button: MouseButton,
        state: ElementState,
        now: Instant,
    ) -> Vec<ViewerEvent> {
        let Some(button) = map_button(button) else {
            return Vec::new();
        };
        let Some(position) = self.position else {
            return Vec::new();
        };
        match state {
            ElementState::Pressed => {
                if button == PointerButton::Primary {
                    self.press_origin = Some(position);
                }
                vec![ViewerEvent::PointerDown { button, position }]
            }
            ElementState::Released if button == PointerButton::Primary => {
                self.release_primary(position, now)
            }
            ElementState::Released => vec![ViewerEvent::PointerUp { button, position }],
        }
    }

    fn release_primary(&mut self, position: Vec2, now: Instant) -> Vec<ViewerEvent> {
        let mut events = vec![ViewerEvent::PointerUp {
            button: PointerButton::Primary,
            position,
        }];
        let still = self
            .press_origin
            .take()
            .is_some_and(|origin| origin.distance(position) <= CLICK_SLOP);
        if !still {
            return events;
        }
        let double = self.last_click.is_some_and(|(at, origin)| {
            now.saturating_duration_since(at) <= DOUBLE_CLICK_WINDOW
                && origin.distance(position) <= CLICK_SLOP
        });
        if double {
            events.push(ViewerEvent::DoubleClick(position));
            self.last_click = None;
        } else {
            self.last_click = Some((now, position));
        }
        events
    }

    pub fn wheel(&self, delta: MouseScrollDelta) -> ViewerEvent {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
        };
        ViewerEvent::Wheel(lines)
    }

    /// Trackpad pinch. Positive `delta` magnifies.
    pub fn pinch(&self, delta: f64) -> ViewerEvent {
        ViewerEvent::Wheel(delta as f32 * LINES_PER_MAGNIFICATION)
    }

    /// One finger drags like the primary button and a quick second tap is a
    /// double-click. A second finger ends the drag and starts a pinch, which
    /// zooms by the change in finger spread.
    pub fn touch(
        &mut self,
        id: u64,
        phase: TouchPhase,
        position: Vec2,
        now: Instant,
    ) -> Vec<ViewerEvent> {
        match phase {
            TouchPhase::Started => {
                self.touches.push((id, position));
                match self.gesture {
                    TouchGesture::Idle => {
                        self.gesture = TouchGesture::Drag;
                        self.position = Some(position);
                        self.press_origin = Some(position);
                        vec![
                            ViewerEvent::PointerMoved(position),
                            ViewerEvent::PointerDown {
                                button: PointerButton::Primary,
                                position,
                            },
                        ]
                    }
                    TouchGesture::Drag => {
                        let span = self.touch_span().unwrap_or(0.0);
                        self.gesture = TouchGesture::Pinch { span };
                        self.press_origin = None;
                        let position = self.position.unwrap_or(position);
                        vec![ViewerEvent::PointerUp {
                            button: PointerButton::Primary,
                            position,
                        }]
                    }
                    TouchGesture::Pinch { .. } => Vec::new(),
                }
            }
            TouchPhase::Moved => {
                let Some(index) = self.touches.iter().position(|(touch, _)| *touch == id) else {
                    return Vec::new();
                };
                self.touches[index].1 = position;
                match self.gesture {
                    TouchGesture::Drag if index == 0 => vec![self.cursor_moved(position)],
                    TouchGesture::Pinch { span } if index < 2 => {
                        let Some(current) = self.touch_span() else {
                            return Vec::new();
                        };
                        self.gesture = TouchGesture::Pinch { span: current };
                        let lines = (current - span) / PIXELS_PER_LINE;
                        if lines == 0.0 {
                            Vec::new()
                        } else {
                            vec![ViewerEvent::Wheel(lines)]
                        }
                    }
                    _ => Vec::new(),
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                let Some(index) = self.touches.iter().position(|(touch, _)| *touch == id) else {
                    return Vec::new();
                };
                self.touches.remove(index);
                match self.gesture {
                    TouchGesture::Drag => {
                        self.gesture = TouchGesture::Idle;
                        self.position = Some(position);
                        if phase == TouchPhase::Cancelled {
                            self.press_origin = None;
                        }
                        self.release_primary(position, now)
                    }
                    TouchGesture::Pinch { .. } => {
                        if self.touches.is_empty() {
                            self.gesture = TouchGesture::Idle;
                        } else if let Some(span) = self.touch_span() {
                            self.gesture = TouchGesture::Pinch { span };
                        }
                        Vec::new()
                    }
                    TouchGesture::Idle => Vec::new(),
                }
            }
        }
    }

    fn touch_span(&self) -> Option<f32> {
        match self.touches.as_slice() {
            [(_, a), (_, b), ..] => Some(a.distance(*b)),
            _ => None,
        }
    }
}

fn map_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

/// Pixel position to normalized device coordinates, `y` up.
pub fn to_ndc(position: Vec2, viewport: Vec2) -> Option<Vec2> {
    if viewport.x <= 0.0 || viewport.y <= 0.0 {
        return None;
    }
    Some(Vec2::new(
        position.x / viewport.x * 2.0 - 1.0,
        -(position.y / viewport.y) * 2.0 + 1.0,
    ))
}
