use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::VisibilityAnimation;

const SHOW_HIDE_DURATION: Duration = Duration::from_millis(250);
const EDGE_INSET: f32 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenSize {
    pub width: f32,
    pub height: f32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 390.0,
            height: 844.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OverlayPosition {
    pub x: f32,
    pub y: f32,
}

impl OverlayPosition {
    /// Right edge, vertically centred.
    pub fn initial(screen: ScreenSize) -> Self {
        Self {
            x: screen.width - EDGE_INSET,
            y: screen.height / 2.0,
        }
    }
}

/// Raw input on the trigger, already separated into taps and drags by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TriggerGesture {
    Tapped,
    DragStart,
    /// Translation since the drag started.
    DragMove { dx: f32, dy: f32 },
    DragEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEffect {
    None,
    Moved(OverlayPosition),
    Activated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySnapshot {
    pub visible: bool,
    pub position: OverlayPosition,
    pub opacity: f32,
    pub dragging: bool,
}

/// The floating capture button. Position survives hide/show for the process
/// lifetime and changes only through drags.
#[derive(Debug, Clone)]
pub struct OverlayTrigger {
    visible: bool,
    position: OverlayPosition,
    drag_origin: Option<OverlayPosition>,
    animation: VisibilityAnimation,
}

impl OverlayTrigger {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            visible: false,
            position: OverlayPosition::initial(screen),
            drag_origin: None,
            animation: VisibilityAnimation::hidden(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    pub fn position(&self) -> OverlayPosition {
        self.position
    }

    /// Opacity and scale share this value.
    pub fn opacity_at(&self, now: Instant) -> f32 {
        self.animation.value_at(now)
    }

    pub fn show(&mut self, now: Instant) -> bool {
        if self.visible {
            return false;
        }
        self.visible = true;
        self.animation.animate_to(1.0, SHOW_HIDE_DURATION, now);
        true
    }

    pub fn hide(&mut self, now: Instant) -> bool {
        if !self.visible {
            return false;
        }
        self.visible = false;
        self.drag_origin = None;
        self.animation.animate_to(0.0, SHOW_HIDE_DURATION, now);
        true
    }

    /// Applies one gesture. Drags never activate; a tap while dragging or
    /// hidden is dropped. Activation hides the trigger.
    pub fn handle(&mut self, gesture: TriggerGesture, now: Instant) -> GestureEffect {
        if !self.visible {
            return GestureEffect::None;
        }

        match gesture {
            TriggerGesture::DragStart => {
                self.drag_origin = Some(self.position);
                GestureEffect::None
            }
            TriggerGesture::DragMove { dx, dy } => match self.drag_origin {
                Some(origin) => {
                    self.position = OverlayPosition {
                        x: origin.x + dx,
                        y: origin.y + dy,
                    };
                    GestureEffect::Moved(self.position)
                }
                None => GestureEffect::None,
            },
            TriggerGesture::DragEnd => match self.drag_origin.take() {
                Some(_) => GestureEffect::Moved(self.position),
                None => GestureEffect::None,
            },
            TriggerGesture::Tapped => {
                if self.is_dragging() {
                    return GestureEffect::None;
                }
                self.hide(now);
                GestureEffect::Activated
            }
        }
    }

    pub fn snapshot(&self, now: Instant) -> OverlaySnapshot {
        OverlaySnapshot {
            visible: self.visible,
            position: self.position,
            opacity: self.opacity_at(now),
            dragging: self.is_dragging(),
        }
    }
}
