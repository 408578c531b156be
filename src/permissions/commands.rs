use tauri::State;

use crate::{
    permissions::{Capability, PermissionOutcome, PermissionsView},
    AppState,
};

#[tauri::command]
pub async fn get_permissions(state: State<'_, AppState>) -> Result<PermissionsView, String> {
    let gate = state.session.gate();
    Ok(PermissionsView::new(gate.platform(), &gate.records().await))
}

#[tauri::command]
pub async fn refresh_permissions(state: State<'_, AppState>) -> Result<PermissionsView, String> {
    let gate = state.session.gate();
    let records = gate.check_all().await;
    Ok(PermissionsView::new(gate.platform(), &records))
}

#[tauri::command]
pub async fn request_permission(
    state: State<'_, AppState>,
    capability: Capability,
) -> Result<PermissionOutcome, String> {
    Ok(state.session.gate().request(capability).await)
}

#[tauri::command]
pub async fn open_permission_settings(state: State<'_, AppState>) -> Result<(), String> {
    state
        .session
        .gate()
        .open_settings()
        .await
        .map_err(|e| e.to_string())
}
