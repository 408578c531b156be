mod animation;
mod trigger;

pub use animation::VisibilityAnimation;
pub use trigger::{
    GestureEffect, OverlayPosition, OverlaySnapshot, OverlayTrigger, ScreenSize, TriggerGesture,
};
