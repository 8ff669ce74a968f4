// ------------------------- Input Controller -------------------------

use crate::render::FrameSize;
use crate::viewport::{Complex, ViewportState};

pub const ZOOM_IN_FACTOR: f64 = 1.1;
pub const ZOOM_OUT_FACTOR: f64 = 0.9;
pub const PAINT_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    In,
    Out,
}

impl WheelDirection {
    // egui reports positive y for wheel-up
    pub fn from_scroll_delta(dy: f32) -> Option<Self> {
        if dy > 0.0 {
            Some(WheelDirection::In)
        } else if dy < 0.0 {
            Some(WheelDirection::Out)
        } else {
            None
        }
    }

    pub fn factor(self) -> f64 {
        match self {
            WheelDirection::In => ZOOM_IN_FACTOR,
            WheelDirection::Out => ZOOM_OUT_FACTOR,
        }
    }
}

/// Pointer activity over the canvas. Positions are normalized to the
/// surface: `[0, 0]` top-left, `[1, 1]` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Wheel(WheelDirection),
    Moved { position: [f64; 2], primary_held: bool },
    PrimaryPressed,
    PrimaryReleased,
    SecondaryPressed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintSample {
    pub seed: Complex,
    pub intensity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputOutcome {
    Ignored,
    Zoomed,
    DragStarted(PaintSample),
    Panned(PaintSample),
    DragEnded,
    ContextMenuSuppressed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Dragging { last: [f64; 2] },
}

pub struct InputController {
    drag: DragState,
    paint_observer: Option<Box<dyn FnMut(PaintSample)>>,
}

impl Default for InputController {
    fn default() -> Self {
        Self::new()
    }
}

impl InputController {
    pub fn new() -> Self {
        Self {
            drag: DragState::Idle,
            paint_observer: None,
        }
    }

    pub fn set_paint_observer(&mut self, observer: impl FnMut(PaintSample) + 'static) {
        self.paint_observer = Some(Box::new(observer));
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    pub fn handle(
        &mut self,
        event: PointerEvent,
        surface: FrameSize,
        state: &mut ViewportState,
    ) -> InputOutcome {
        match event {
            PointerEvent::Wheel(direction) => {
                state.scale_zoom(direction.factor());
                InputOutcome::Zoomed
            }
            PointerEvent::PrimaryPressed => {
                self.drag = DragState::Idle;
                InputOutcome::Ignored
            }
            PointerEvent::PrimaryReleased => self.end_drag(),
            PointerEvent::SecondaryPressed => InputOutcome::ContextMenuSuppressed,
            PointerEvent::Moved {
                primary_held: false,
                ..
            } => self.end_drag(),
            PointerEvent::Moved {
                position,
                primary_held: true,
            } => match self.drag {
                DragState::Idle => {
                    self.drag = DragState::Dragging { last: position };
                    InputOutcome::DragStarted(self.paint_at(position, surface, state))
                }
                DragState::Dragging { last } => {
                    let sample = self.drag_to(last, position, surface, state);
                    InputOutcome::Panned(sample)
                }
            },
        }
    }

    fn end_drag(&mut self) -> InputOutcome {
        match std::mem::replace(&mut self.drag, DragState::Idle) {
            DragState::Dragging { .. } => InputOutcome::DragEnded,
            DragState::Idle => InputOutcome::Ignored,
        }
    }

    fn drag_to(
        &mut self,
        last: [f64; 2],
        position: [f64; 2],
        surface: FrameSize,
        state: &mut ViewportState,
    ) -> PaintSample {
        let aspect = surface.aspect();
        let zoom = state.zoom();
        let dx = position[0] - last[0];
        let dy = position[1] - last[1];
        // screen y grows downward, the fractal plane's imaginary axis upward
        state.nudge_center(-dx * 2.0 / zoom * aspect, dy * 2.0 / zoom);
        self.drag = DragState::Dragging { last: position };
        self.paint_at(position, surface, state)
    }

    fn paint_at(
        &mut self,
        position: [f64; 2],
        surface: FrameSize,
        state: &mut ViewportState,
    ) -> PaintSample {
        let seed = screen_to_fractal(position, surface.aspect(), state);
        let intensity = state.apply_paint(seed, PAINT_STEP);
        let sample = PaintSample { seed, intensity };
        if let Some(observer) = self.paint_observer.as_mut() {
            observer(sample);
        }
        sample
    }
}

/// Maps a normalized surface position to the point of the plane drawn there.
pub fn screen_to_fractal(position: [f64; 2], aspect: f64, state: &ViewportState) -> Complex {
    let zoom = state.zoom();
    let center = state.center();
    Complex::new(
        (position[0] * 2.0 - 1.0) * aspect / zoom + center.re,
        (1.0 - 2.0 * position[1]) / zoom + center.im,
    )
}

/// Collects this frame's pointer activity for a canvas occupying `rect`.
/// Every wheel notch is its own event; moves keep coming outside the canvas
/// while a drag is under way.
pub fn pointer_events(
    input: &egui::InputState,
    rect: egui::Rect,
    hovered: bool,
    dragging: bool,
) -> Vec<PointerEvent> {
    let mut events = Vec::new();
    let pointer = &input.pointer;

    if hovered {
        for event in &input.events {
            if let egui::Event::MouseWheel { delta, .. } = event {
                if let Some(direction) = WheelDirection::from_scroll_delta(delta.y) {
                    events.push(PointerEvent::Wheel(direction));
                }
            }
        }
        if pointer.button_pressed(egui::PointerButton::Primary) {
            events.push(PointerEvent::PrimaryPressed);
        }
        if pointer.button_pressed(egui::PointerButton::Secondary) {
            events.push(PointerEvent::SecondaryPressed);
        }
    }

    if (hovered || dragging) && pointer.is_moving() && rect.width() > 0.0 && rect.height() > 0.0 {
        if let Some(pos) = pointer.hover_pos() {
            let position = [
                f64::from((pos.x - rect.left()) / rect.width()),
                f64::from((pos.y - rect.top()) / rect.height()),
            ];
            events.push(PointerEvent::Moved {
                position,
                primary_held: pointer.primary_down(),
            });
        }
    }

    if pointer.button_released(egui::PointerButton::Primary) {
        events.push(PointerEvent::PrimaryReleased);
    }
    events
}
