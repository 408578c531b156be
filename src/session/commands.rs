use std::path::PathBuf;

use tauri::State;

use crate::{
    models::PipelineRun,
    overlay::TriggerGesture,
    pipeline::SourceKind,
    session::{AppLifecycle, SessionController, SessionEvent, SessionSnapshot, Transition},
};

use crate::AppState;

fn controller_from_state(state: &State<'_, AppState>) -> SessionController {
    state.session.clone()
}

#[tauri::command]
pub async fn get_session_snapshot(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn dispatch_session_event(
    state: State<'_, AppState>,
    event: SessionEvent,
) -> Result<Transition, String> {
    let controller = controller_from_state(&state);
    Ok(controller.dispatch(event).await)
}

#[tauri::command]
pub async fn get_started(state: State<'_, AppState>) -> Result<Transition, String> {
    let controller = controller_from_state(&state);
    Ok(controller.dispatch(SessionEvent::GetStarted).await)
}

#[tauri::command]
pub async fn permissions_acked(state: State<'_, AppState>) -> Result<Transition, String> {
    let controller = controller_from_state(&state);
    Ok(controller.dispatch(SessionEvent::PermissionsAcked).await)
}

#[tauri::command]
pub async fn trigger_gesture(
    state: State<'_, AppState>,
    gesture: TriggerGesture,
) -> Result<Transition, String> {
    let controller = controller_from_state(&state);
    Ok(controller.dispatch(SessionEvent::Gesture(gesture)).await)
}

#[tauri::command]
pub async fn trigger_activated(state: State<'_, AppState>) -> Result<Transition, String> {
    let controller = controller_from_state(&state);
    Ok(controller.dispatch(SessionEvent::TriggerActivated).await)
}

/// In-screen capture from a specific source; resolves once the run settles.
#[tauri::command]
pub async fn capture_from(
    state: State<'_, AppState>,
    source: SourceKind,
) -> Result<PipelineRun, String> {
    let controller = controller_from_state(&state);
    controller
        .capture_from(source)
        .await
        .map_err(|e| e.to_string())
}

/// Desktop gallery pick: the webview's file dialog hands over a path.
#[tauri::command]
pub async fn capture_file(
    state: State<'_, AppState>,
    path: PathBuf,
) -> Result<PipelineRun, String> {
    let controller = controller_from_state(&state);
    controller
        .capture_file(path)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn dismiss_result(state: State<'_, AppState>) -> Result<Transition, String> {
    let controller = controller_from_state(&state);
    Ok(controller.dispatch(SessionEvent::ResultDismissed).await)
}

#[tauri::command]
pub async fn acknowledge_result(state: State<'_, AppState>) -> Result<Transition, String> {
    let controller = controller_from_state(&state);
    Ok(controller.acknowledge_result().await)
}

/// For hosts where window focus does not track app visibility (mobile).
#[tauri::command]
pub fn notify_lifecycle(state: State<'_, AppState>, lifecycle: AppLifecycle) -> Result<(), String> {
    state.lifecycle.emit(lifecycle);
    Ok(())
}
