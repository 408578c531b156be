pub mod bridge;
pub mod errors;
pub mod models;
pub mod overlay;
pub mod permissions;
pub mod pipeline;
pub mod presenter;
pub mod session;
pub mod settings;
mod utils;

#[cfg(feature = "app")]
use std::sync::Arc;

#[cfg(feature = "app")]
use anyhow::Context;
#[cfg(feature = "app")]
use log::warn;
#[cfg(feature = "app")]
use tauri::{Emitter, Manager, State, WindowEvent};

#[cfg(feature = "app")]
use bridge::{BridgeEmitter, BridgeReply, BridgeRequest, FrontendBridge, BRIDGE_EVENT};
#[cfg(feature = "app")]
use permissions::{
    commands::{get_permissions, open_permission_settings, refresh_permissions, request_permission},
    PermissionGate, Platform,
};
#[cfg(feature = "app")]
use pipeline::{service_from_settings, CapturePipeline, HttpAnalysisService};
#[cfg(feature = "app")]
use session::{
    commands::{
        acknowledge_result, capture_file, capture_from, dispatch_session_event, dismiss_result,
        get_session_snapshot, get_started, notify_lifecycle, permissions_acked, trigger_activated,
        trigger_gesture,
    },
    AppLifecycle, LifecycleSignal, SessionConfig, SessionController,
};
#[cfg(feature = "app")]
use settings::{AppSettings, SettingsStore};

/// Event carrying every published `SessionSnapshot` to the webview.
pub const SESSION_EVENT: &str = "session-state-changed";

#[cfg(feature = "app")]
pub(crate) struct AppState {
    pub(crate) session: SessionController,
    pub(crate) bridge: FrontendBridge,
    pub(crate) lifecycle: LifecycleSignal,
    pub(crate) settings: SettingsStore,
}

#[cfg(feature = "app")]
impl BridgeEmitter for tauri::AppHandle {
    fn emit_request(&self, request: &BridgeRequest) -> anyhow::Result<()> {
        self.emit(BRIDGE_EVENT, request)
            .context("failed to emit bridge request")
    }
}

#[cfg(feature = "app")]
#[tauri::command]
fn resolve_bridge_request(
    id: uuid::Uuid,
    reply: BridgeReply,
    state: State<AppState>,
) -> Result<(), String> {
    state.bridge.resolve(id, reply).map_err(|e| e.to_string())
}

#[cfg(feature = "app")]
#[tauri::command]
fn get_settings(state: State<AppState>) -> Result<AppSettings, String> {
    Ok(state.settings.get())
}

/// Stored for the next launch; the running session keeps its policy.
#[cfg(feature = "app")]
#[tauri::command]
fn set_settings(settings: AppSettings, state: State<AppState>) -> Result<(), String> {
    state.settings.update(settings).map_err(|e| e.to_string())
}

#[cfg(feature = "app")]
#[tauri::command]
async fn check_analysis_health(state: State<'_, AppState>) -> Result<bool, String> {
    let analysis = state.settings.effective().analysis;
    if analysis.use_mock {
        return Ok(true);
    }
    let service = HttpAnalysisService::new(analysis.base_url, analysis.timeout())
        .map_err(|e| e.to_string())?;
    service.health().await.map_err(|e| e.to_string())
}

#[cfg(feature = "app")]
fn build_state(app: &tauri::App) -> anyhow::Result<AppState> {
    let app_data_dir = app
        .path()
        .app_data_dir()
        .map_err(|err| anyhow::anyhow!(err))?;
    std::fs::create_dir_all(&app_data_dir)?;

    let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
    let settings = settings_store.effective();

    let bridge = FrontendBridge::new(Arc::new(app.handle().clone()), settings.bridge_timeout());
    let gate = PermissionGate::new(Arc::new(bridge.clone()), Platform::current());
    let analysis = service_from_settings(&settings.analysis)?;
    let pipeline = CapturePipeline::new(gate.clone(), bridge.image_sources(), analysis);

    let lifecycle = LifecycleSignal::new();
    let config = SessionConfig {
        policy: settings.trigger_policy,
        preferred_source: settings.preferred_source,
        screen: settings.screen,
    };
    // The listener task needs the runtime context.
    let session = tauri::async_runtime::block_on(async {
        SessionController::new(pipeline, gate, &lifecycle, config)
    });

    let mut snapshots = session.subscribe();
    let handle = app.handle().clone();
    tauri::async_runtime::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if let Err(err) = handle.emit(SESSION_EVENT, &snapshot) {
                warn!("Failed to emit session snapshot: {}", err);
            }
        }
    });

    Ok(AppState {
        session,
        bridge,
        lifecycle,
        settings: settings_store,
    })
}

#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Is This True? starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let state = build_state(app)?;
            app.manage(state);
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Focused(focused) = event {
                if let Some(state) = window.try_state::<AppState>() {
                    let lifecycle = if *focused {
                        AppLifecycle::Foreground
                    } else {
                        AppLifecycle::Background
                    };
                    state.lifecycle.emit(lifecycle);
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            get_session_snapshot,
            dispatch_session_event,
            get_started,
            permissions_acked,
            trigger_gesture,
            trigger_activated,
            capture_from,
            capture_file,
            dismiss_result,
            acknowledge_result,
            notify_lifecycle,
            get_permissions,
            refresh_permissions,
            request_permission,
            open_permission_settings,
            resolve_bridge_request,
            get_settings,
            set_settings,
            check_analysis_health,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
