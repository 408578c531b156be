#[cfg(feature = "app")]
pub(crate) mod commands;
mod controller;
mod lifecycle;
mod state;

pub use controller::{SessionConfig, SessionController};
pub use lifecycle::LifecycleSignal;
pub use state::{
    AppLifecycle, Rejection, SessionEvent, SessionSnapshot, SessionState, Transition,
    TriggerPolicy,
};
