//! multiroot daemon
//!
//! Hosts one display session and serves configuration requests.
//!
//! Responsibilities:
//! - Load configuration and the remembered display layouts
//! - Own the `Session` on the main task (single-threaded runtime)
//! - Handle IPC commands from the CLI over a Unix domain socket
//! - Run deferred root destruction on a later loop turn
//! - Persist display layouts on change and on shutdown

mod config;

use anyhow::{Context, Result};
use config::Config;
use multiroot_core::{
    parse_display_specs, DefaultPlacement, Display, DisplayLayout, DisplayMetrics, DisplayObserver, Insets,
    LayoutStore, Placement, Point, Position, Rect, Rotation, RotationSource, Session, SessionConfig, UserId,
};
use multiroot_ipc::{
    encode_line, DisplayState, InsetsSpec, IpcCommand, IpcResponse, PlacementPosition, PlacementSpec, RectSpec,
    RequestSource, MAX_IPC_MESSAGE_SIZE,
};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Events processed by the main event loop.
enum DaemonEvent {
    /// IPC command from CLI with a channel to send the response.
    IpcCommand {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// Deferred root destruction is waiting.
    RunPendingTasks,
    /// Shutdown signal.
    Shutdown,
}

/// Timeout for reading a command from an IPC client.
const IPC_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The daemon hosts a single local user session.
const LOCAL_USER: UserId = 1;

/// Logs every display notification.
struct LoggingObserver;

impl DisplayObserver for LoggingObserver {
    fn on_display_configuration_changing(&self) {
        debug!("Display configuration changing");
    }

    fn on_display_configuration_changed(&self) {
        debug!("Display configuration changed");
    }

    fn on_display_added(&self, d: &Display) {
        info!(
            "Display {} added: bounds {}, scale {}",
            d.id, d.bounds, d.device_scale_factor
        );
    }

    fn on_display_removed(&self, d: &Display) {
        info!("Display {} removed", d.id);
    }

    fn on_display_metrics_changed(&self, d: &Display, changed: DisplayMetrics) {
        info!(
            "Display {} changed {:?}: bounds {}, work area {}",
            d.id, changed, d.bounds, d.work_area
        );
    }

    fn on_displays_initialized(&self) {
        info!("Displays initialized");
    }
}

/// Application state.
struct AppState {
    /// The display session. Never leaves the main task.
    session: Session,
    /// Current configuration.
    config: Config,
    /// Where layouts are persisted. `None` disables persistence.
    layouts_path: Option<PathBuf>,
}

impl AppState {
    /// Build the session from config, restoring layouts saved at `layouts_path`.
    fn new_with_config(config: Config, layouts_path: Option<PathBuf>) -> Result<Self> {
        let layouts = layouts_path
            .as_deref()
            .filter(|_| config.behavior.persist_layouts)
            .and_then(load_layouts);
        if let Some(store) = &layouts {
            info!("Restored {} remembered display layouts", store.len());
        }

        let initial_displays = parse_display_specs(&config.displays.initial)
            .with_context(|| format!("Invalid initial displays '{}'", config.displays.initial))?;

        let mut session = Session::new(SessionConfig {
            default_placement: default_placement(&config),
            initial_displays: Vec::new(),
            layouts,
        })?;
        session.add_display_observer(Rc::new(LoggingObserver));
        session.update_displays(initial_displays)?;
        session.begin(LOCAL_USER);

        let mut state = Self {
            session,
            config: Config::default(),
            layouts_path,
        };
        state.apply_config(config);
        Ok(state)
    }

    /// Apply configuration to the running session.
    ///
    /// The log level and socket path only take effect on restart.
    fn apply_config(&mut self, config: Config) {
        let placement = default_placement(&config);
        match self
            .session
            .manager_mut()
            .set_default_placement(placement.position, placement.offset)
        {
            Ok(true) => info!(
                "Default placement set to {:?} offset {}",
                placement.position, placement.offset
            ),
            Ok(false) => {}
            Err(e) => warn!("Failed to apply default placement: {}", e),
        }
        self.config = config;
        info!("Configuration applied");
    }

    /// Save the layout store if persistence is enabled.
    fn persist_layouts(&self) {
        let Some(path) = self.layouts_path.as_ref().filter(|_| self.config.behavior.persist_layouts) else {
            return;
        };
        if let Err(e) = save_layouts(path, self.session.manager().layout_store()) {
            warn!("Failed to save display layouts: {}", e);
        }
    }

    fn run_pending_tasks(&mut self) {
        let destroyed = self.session.run_pending_tasks();
        if !destroyed.is_empty() {
            debug!("Destroyed {} windows with removed roots", destroyed.len());
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.session.manager().pending_task_count() > 0
    }

    /// Final persistence and teardown.
    fn shutdown(&mut self) {
        self.persist_layouts();
        let destroyed = self.session.shutdown();
        debug!("Session shut down, {} windows destroyed", destroyed.len());
    }

    /// Handle an IPC command and return a response.
    fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        let persists = matches!(
            cmd,
            IpcCommand::UpdateDisplays { .. }
                | IpcCommand::SetLayout { .. }
                | IpcCommand::SetPlacement { .. }
                | IpcCommand::SetDefaultPlacement { .. }
                | IpcCommand::SetPrimary { .. }
        );

        let response = self.execute(cmd);
        if persists && !response.is_error() {
            self.persist_layouts();
        }
        response
    }

    fn execute(&mut self, cmd: IpcCommand) -> IpcResponse {
        match cmd {
            IpcCommand::UpdateDisplays { spec } => {
                let infos = match parse_display_specs(&spec) {
                    Ok(infos) => infos,
                    Err(e) => return IpcResponse::error(e.to_string()),
                };
                match self.session.update_displays(infos) {
                    Ok(()) => IpcResponse::Ok,
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }

            IpcCommand::SetLayout {
                placements,
                default_position,
                default_offset,
            } => {
                let mut layout = DisplayLayout::new(DefaultPlacement::new(
                    position_from_wire(default_position),
                    default_offset,
                ));
                layout.placements = placements.into_iter().map(placement_from_wire).collect();
                applied(self.session.manager_mut().set_layout(layout))
            }
            IpcCommand::SetPlacement { placement } => {
                applied(self.session.manager_mut().set_placement(placement_from_wire(placement)))
            }
            IpcCommand::SetDefaultPlacement { position, offset } => applied(
                self.session
                    .manager_mut()
                    .set_default_placement(position_from_wire(position), offset),
            ),

            IpcCommand::SetPrimary { display_id } => applied(self.session.manager_mut().set_primary(display_id)),
            IpcCommand::SetOverscan { display_id, insets } => applied(
                self.session
                    .manager_mut()
                    .set_overscan(display_id, insets_from_wire(insets)),
            ),
            IpcCommand::SetRotation {
                display_id,
                rotation,
                source,
            } => {
                let Some(rotation) = Rotation::from_degrees(rotation) else {
                    return IpcResponse::error(format!(
                        "Invalid rotation {} (expected 0, 90, 180 or 270)",
                        rotation
                    ));
                };
                let source = match source {
                    RequestSource::User => RotationSource::User,
                    RequestSource::Policy => RotationSource::Policy,
                };
                applied(self.session.manager_mut().set_rotation(display_id, rotation, source))
            }
            IpcCommand::SetUiScale { display_id, scale } => {
                applied(self.session.manager_mut().set_ui_scale(display_id, scale))
            }
            IpcCommand::SetWorkAreaInsets { display_id, insets } => applied(
                self.session
                    .manager_mut()
                    .set_work_area_insets(display_id, insets_from_wire(insets)),
            ),

            IpcCommand::MoveCursor { display_id, x, y } => {
                match self
                    .session
                    .manager_mut()
                    .move_cursor_to_host(display_id, Point::new(x, y))
                {
                    Ok(_) => self.cursor_response(),
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcCommand::HostToRoot { display_id, x, y } => {
                match self.session.manager().host_to_root(display_id, Point::new(x, y)) {
                    Ok(root) => IpcResponse::RootPoint {
                        display_id,
                        x: root.x,
                        y: root.y,
                    },
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }

            IpcCommand::QueryDisplays => IpcResponse::Displays {
                displays: self.session.manager().displays().map(display_to_wire).collect(),
            },
            IpcCommand::QueryLayout => {
                let layout = self.session.manager().current_layout();
                IpcResponse::Layout {
                    primary_id: layout.primary_id,
                    placements: layout.placements.iter().map(placement_to_wire).collect(),
                    default_position: position_to_wire(layout.default_placement.position),
                    default_offset: layout.default_placement.offset,
                }
            }
            IpcCommand::QueryCursor => self.cursor_response(),

            IpcCommand::Reload => match Config::load() {
                Ok(mut new_config) => {
                    for w in &new_config.validate() {
                        warn!("Config: {} - {}", w.field, w.message);
                    }
                    self.apply_config(new_config);
                    IpcResponse::Ok
                }
                Err(e) => IpcResponse::error(format!("Failed to reload config: {}", e)),
            },
            IpcCommand::Stop => {
                // Stop is handled specially in the event loop
                IpcResponse::Ok
            }
        }
    }

    fn cursor_response(&self) -> IpcResponse {
        match self.session.manager().cursor() {
            Some(cursor) => IpcResponse::Cursor {
                x: cursor.location.x,
                y: cursor.location.y,
                display_id: cursor.display_id,
                device_scale_factor: cursor.device_scale_factor,
                rotation: cursor.rotation.degrees(),
            },
            None => IpcResponse::error("No displays connected"),
        }
    }
}

fn applied<E: std::fmt::Display>(result: std::result::Result<bool, E>) -> IpcResponse {
    match result {
        Ok(changed) => IpcResponse::Applied { changed },
        Err(e) => IpcResponse::error(e.to_string()),
    }
}

fn default_placement(config: &Config) -> DefaultPlacement {
    DefaultPlacement::new(config.layout.default_position.into(), config.layout.default_offset)
}

// ============================================================================
// Wire conversions
// ============================================================================

fn position_from_wire(position: PlacementPosition) -> Position {
    match position {
        PlacementPosition::Top => Position::Top,
        PlacementPosition::Right => Position::Right,
        PlacementPosition::Bottom => Position::Bottom,
        PlacementPosition::Left => Position::Left,
    }
}

fn position_to_wire(position: Position) -> PlacementPosition {
    match position {
        Position::Top => PlacementPosition::Top,
        Position::Right => PlacementPosition::Right,
        Position::Bottom => PlacementPosition::Bottom,
        Position::Left => PlacementPosition::Left,
    }
}

fn placement_from_wire(spec: PlacementSpec) -> Placement {
    Placement::new(
        spec.display_id,
        spec.parent_id,
        position_from_wire(spec.position),
        spec.offset,
    )
}

fn placement_to_wire(placement: &Placement) -> PlacementSpec {
    PlacementSpec {
        display_id: placement.display_id,
        parent_id: placement.parent_id,
        position: position_to_wire(placement.position),
        offset: placement.offset,
    }
}

fn insets_from_wire(insets: InsetsSpec) -> Insets {
    Insets::new(insets.top, insets.left, insets.bottom, insets.right)
}

fn rect_to_wire(rect: Rect) -> RectSpec {
    RectSpec {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

fn display_to_wire(display: &Display) -> DisplayState {
    DisplayState {
        id: display.id,
        bounds: rect_to_wire(display.bounds),
        work_area: rect_to_wire(display.work_area),
        rotation: display.rotation.degrees(),
        device_scale_factor: display.device_scale_factor,
        ui_scale: display.ui_scale,
        is_internal: display.is_internal,
        is_primary: display.is_primary,
    }
}

// ============================================================================
// Layout persistence
// ============================================================================

/// Get the path to the layout persistence file.
fn layouts_file_path() -> PathBuf {
    directories::ProjectDirs::from("com", "multiroot", "multiroot")
        .map(|dirs| dirs.data_dir().join("display-layouts.json"))
        .unwrap_or_else(|| PathBuf::from("display-layouts.json"))
}

/// Save the layout store as pretty JSON.
fn save_layouts(path: &Path, store: &LayoutStore) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(store)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Display layouts saved to {:?}", path);
    Ok(())
}

/// Load saved layouts. Missing or unreadable files yield `None`.
fn load_layouts(path: &Path) -> Option<LayoutStore> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("No saved display layouts at {:?}: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Failed to parse saved display layouts {:?}: {}", path, e);
            None
        }
    }
}

// ============================================================================
// IPC server
// ============================================================================

/// Run the IPC server, accepting connections on the Unix socket.
async fn run_ipc_server(listener: UnixListener, event_tx: mpsc::Sender<DaemonEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let tx = event_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, tx).await {
                        warn!("Client handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept IPC connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Serialize a response line, falling back to a fixed error line.
fn response_line(response: &IpcResponse) -> String {
    match encode_line(response) {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to serialize IPC response: {}", e);
            "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n".to_string()
        }
    }
}

/// Handle a single IPC client connection.
async fn handle_client(stream: UnixStream, event_tx: mpsc::Sender<DaemonEvent>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let limited_reader = reader.take(MAX_IPC_MESSAGE_SIZE as u64);
    let mut reader = BufReader::new(limited_reader);
    let mut line = String::new();

    // Read command (single line of JSON) with timeout and size bound
    let read_result = tokio::time::timeout(IPC_READ_TIMEOUT, reader.read_line(&mut line)).await;
    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            debug!("IPC client timed out before sending a command");
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(()); // Client disconnected
    }

    let line = line.trim();
    debug!("Received command: {}", line);

    let cmd: IpcCommand = match serde_json::from_str(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            let response = IpcResponse::error(format!("Invalid command: {}", e));
            writer.write_all(response_line(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);

    let (resp_tx, resp_rx) = oneshot::channel();
    if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response = IpcResponse::error("Daemon is shutting down");
        writer.write_all(response_line(&response).as_bytes()).await?;
        return Ok(());
    }

    let response = match resp_rx.await {
        Ok(resp) => resp,
        Err(_) => IpcResponse::error("Failed to get response from daemon"),
    };
    writer.write_all(response_line(&response).as_bytes()).await?;

    if is_stop {
        // Respond first, then stop the loop
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

/// Check whether another daemon is already serving `path`.
async fn check_already_running(path: &Path) -> bool {
    UnixStream::connect(path).await.is_ok()
}

/// Bind the IPC socket, removing a stale socket file left by a crash.
fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        warn!("Removing stale socket {:?}", path);
        std::fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    UnixListener::bind(path).with_context(|| format!("Failed to bind {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration first (needed for log level)
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
        Config::default()
    });
    let config_warnings = config.validate();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.behavior.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for w in &config_warnings {
        warn!("Config: {} - {}", w.field, w.message);
    }

    info!("multiroot daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let socket_path = config.ipc.socket_path();
    if check_already_running(&socket_path).await {
        error!("Another multiroot daemon is already listening on {:?}", socket_path);
        return Ok(());
    }

    let mut state = AppState::new_with_config(config, Some(layouts_file_path()))?;
    info!(
        "Managing {} displays, primary {:?}",
        state.session.manager().display_count(),
        state.session.manager().primary_display().map(|d| d.id)
    );

    let listener = bind_socket(&socket_path)?;
    info!("Listening on {:?}", socket_path);

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);

    tokio::spawn(run_ipc_server(listener, event_tx.clone()));

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
        }
    });

    info!("Ready. Use multiroot-cli to send commands.");

    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                let response = state.handle_command(cmd);
                if responder.send(response).is_err() {
                    debug!("Client disconnected before receiving IPC response");
                }
                if state.has_pending_tasks() && event_tx.try_send(DaemonEvent::RunPendingTasks).is_err() {
                    warn!("Event queue full, running deferred tasks inline");
                    state.run_pending_tasks();
                }
            }
            DaemonEvent::RunPendingTasks => state.run_pending_tasks(),
            DaemonEvent::Shutdown => {
                info!("Shutting down...");
                break;
            }
        }
    }

    state.shutdown();
    if let Err(e) = std::fs::remove_file(&socket_path) {
        debug!("Failed to remove socket {:?}: {}", socket_path, e);
    }
    info!("multiroot daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const D1: i64 = 2_200_000_000;
    const D2: i64 = 2_200_000_001;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.displays.initial = "500x500,400x400".to_string();
        config
    }

    fn test_state() -> AppState {
        AppState::new_with_config(test_config(), None).unwrap()
    }

    fn displays(state: &mut AppState) -> Vec<DisplayState> {
        match state.handle_command(IpcCommand::QueryDisplays) {
            IpcResponse::Displays { displays } => displays,
            other => panic!("Expected Displays, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_query_displays() {
        let mut state = test_state();
        let displays = displays(&mut state);
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].id, D1);
        assert!(displays[0].is_primary);
        assert_eq!(
            displays[1].bounds,
            RectSpec {
                x: 500,
                y: 0,
                width: 400,
                height: 400
            }
        );
    }

    #[test]
    fn test_cmd_update_displays() {
        let mut state = test_state();
        let resp = state.handle_command(IpcCommand::UpdateDisplays {
            spec: "500x500".to_string(),
        });
        assert_eq!(resp, IpcResponse::Ok);
        assert_eq!(displays(&mut state).len(), 1);
        assert!(state.has_pending_tasks());

        state.run_pending_tasks();
        assert!(!state.has_pending_tasks());
    }

    #[test]
    fn test_cmd_update_displays_invalid_spec() {
        let mut state = test_state();
        let resp = state.handle_command(IpcCommand::UpdateDisplays {
            spec: "wide".to_string(),
        });
        assert!(resp.is_error());
        assert_eq!(displays(&mut state).len(), 2);
    }

    #[test]
    fn test_cmd_set_primary() {
        let mut state = test_state();
        assert_eq!(
            state.handle_command(IpcCommand::SetPrimary { display_id: D2 }),
            IpcResponse::Applied { changed: true }
        );
        assert_eq!(
            state.handle_command(IpcCommand::SetPrimary { display_id: D2 }),
            IpcResponse::Applied { changed: false }
        );
        let displays = displays(&mut state);
        let primary = displays.iter().find(|d| d.is_primary).unwrap();
        assert_eq!(primary.id, D2);
        assert_eq!((primary.bounds.x, primary.bounds.y), (0, 0));

        assert!(state
            .handle_command(IpcCommand::SetPrimary { display_id: 42 })
            .is_error());
    }

    #[test]
    fn test_cmd_set_placement_and_query_layout() {
        let mut state = test_state();
        let placement = PlacementSpec {
            display_id: D2,
            parent_id: D1,
            position: PlacementPosition::Bottom,
            offset: 490,
        };
        assert_eq!(
            state.handle_command(IpcCommand::SetPlacement { placement }),
            IpcResponse::Applied { changed: true }
        );

        let displays = displays(&mut state);
        assert_eq!((displays[1].bounds.x, displays[1].bounds.y), (400, 500));

        match state.handle_command(IpcCommand::QueryLayout) {
            IpcResponse::Layout {
                primary_id,
                placements,
                ..
            } => {
                assert_eq!(primary_id, Some(D1));
                assert_eq!(placements.len(), 1);
                assert_eq!(placements[0].position, PlacementPosition::Bottom);
            }
            other => panic!("Expected Layout, got {:?}", other),
        }
    }

    #[test]
    fn test_cmd_set_layout_identical_is_unchanged() {
        let mut state = test_state();
        let cmd = IpcCommand::SetLayout {
            placements: vec![PlacementSpec {
                display_id: D2,
                parent_id: D1,
                position: PlacementPosition::Left,
                offset: 0,
            }],
            default_position: PlacementPosition::Right,
            default_offset: 0,
        };
        assert_eq!(state.handle_command(cmd.clone()), IpcResponse::Applied { changed: true });
        assert_eq!(state.handle_command(cmd), IpcResponse::Applied { changed: false });
    }

    #[test]
    fn test_cmd_set_layout_rejects_duplicate_placements() {
        let mut state = test_state();
        let placement = |position| PlacementSpec {
            display_id: D2,
            parent_id: D1,
            position,
            offset: 0,
        };
        let resp = state.handle_command(IpcCommand::SetLayout {
            placements: vec![placement(PlacementPosition::Left), placement(PlacementPosition::Bottom)],
            default_position: PlacementPosition::Right,
            default_offset: 0,
        });
        assert!(resp.is_error());
        assert_eq!(displays(&mut state)[1].bounds.x, 500);
    }

    #[test]
    fn test_cmd_negative_overscan_rejected() {
        let mut state = test_state();
        let resp = state.handle_command(IpcCommand::SetOverscan {
            display_id: D1,
            insets: InsetsSpec {
                top: -50,
                left: -50,
                bottom: -50,
                right: -50,
            },
        });
        assert!(resp.is_error());
        assert_eq!(displays(&mut state)[0].bounds.width, 500);
        assert_eq!(displays(&mut state)[0].bounds.height, 500);
    }

    #[test]
    fn test_cmd_set_rotation() {
        let mut state = test_state();
        let resp = state.handle_command(IpcCommand::SetRotation {
            display_id: D2,
            rotation: 45,
            source: RequestSource::User,
        });
        assert!(resp.is_error());

        let resp = state.handle_command(IpcCommand::SetRotation {
            display_id: D2,
            rotation: 90,
            source: RequestSource::Policy,
        });
        assert_eq!(resp, IpcResponse::Applied { changed: true });
        assert_eq!(displays(&mut state)[1].rotation, 90);
    }

    #[test]
    fn test_cmd_work_area_insets() {
        let mut state = test_state();
        let resp = state.handle_command(IpcCommand::SetWorkAreaInsets {
            display_id: D2,
            insets: InsetsSpec {
                top: 5,
                left: 5,
                bottom: 5,
                right: 5,
            },
        });
        assert_eq!(resp, IpcResponse::Applied { changed: true });
        assert_eq!(
            displays(&mut state)[1].work_area,
            RectSpec {
                x: 505,
                y: 5,
                width: 390,
                height: 390
            }
        );
    }

    #[test]
    fn test_cmd_ui_scale_ignored_on_external() {
        let mut state = test_state();
        let resp = state.handle_command(IpcCommand::SetUiScale {
            display_id: D2,
            scale: 1.5,
        });
        assert_eq!(resp, IpcResponse::Applied { changed: false });
    }

    #[test]
    fn test_cmd_host_to_root_and_cursor() {
        let mut state = test_state();
        let resp = state.handle_command(IpcCommand::HostToRoot {
            display_id: D2,
            x: 10,
            y: 20,
        });
        assert_eq!(
            resp,
            IpcResponse::RootPoint {
                display_id: D2,
                x: 10,
                y: 20
            }
        );

        let resp = state.handle_command(IpcCommand::MoveCursor {
            display_id: D2,
            x: 10,
            y: 20,
        });
        match resp {
            IpcResponse::Cursor { x, y, display_id, .. } => {
                assert_eq!((x, y), (510, 20));
                assert_eq!(display_id, D2);
            }
            other => panic!("Expected Cursor, got {:?}", other),
        }
        assert!(state
            .handle_command(IpcCommand::HostToRoot {
                display_id: 7,
                x: 0,
                y: 0
            })
            .is_error());
    }

    #[test]
    fn test_cmd_stop() {
        let mut state = test_state();
        assert_eq!(state.handle_command(IpcCommand::Stop), IpcResponse::Ok);
    }

    #[test]
    fn test_apply_config_sets_default_placement() {
        let mut state = test_state();
        let mut config = test_config();
        config.layout.default_position = config::PositionConfig::Bottom;
        state.apply_config(config);

        let displays = displays(&mut state);
        assert_eq!((displays[1].bounds.x, displays[1].bounds.y), (0, 500));
    }

    #[test]
    fn test_invalid_initial_displays_fail() {
        let mut config = test_config();
        config.displays.initial = "nope".to_string();
        assert!(AppState::new_with_config(config, None).is_err());
    }

    #[test]
    fn test_save_and_load_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("display-layouts.json");
        assert!(load_layouts(&path).is_none());

        let mut store = LayoutStore::new(DefaultPlacement::new(Position::Left, 10));
        let mut layout = DisplayLayout::new(store.default_placement());
        layout.placements.push(Placement::new(D2, D1, Position::Top, 0));
        store.register(&[D1, D2], layout.clone());

        save_layouts(&path, &store).unwrap();
        let loaded = load_layouts(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.get(&[D1, D2]), Some(&layout));
    }

    #[test]
    fn test_load_layouts_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display-layouts.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_layouts(&path).is_none());
    }

    #[test]
    fn test_layouts_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display-layouts.json");

        let mut state = AppState::new_with_config(test_config(), Some(path.clone())).unwrap();
        let placement = PlacementSpec {
            display_id: D2,
            parent_id: D1,
            position: PlacementPosition::Left,
            offset: 0,
        };
        state.handle_command(IpcCommand::SetPlacement { placement });
        assert!(path.exists());
        state.shutdown();

        let mut restarted = AppState::new_with_config(test_config(), Some(path)).unwrap();
        let displays = displays(&mut restarted);
        assert_eq!((displays[1].bounds.x, displays[1].bounds.y), (-400, 0));
    }

    #[test]
    fn test_persistence_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display-layouts.json");
        let mut config = test_config();
        config.behavior.persist_layouts = false;

        let mut state = AppState::new_with_config(config, Some(path.clone())).unwrap();
        state.handle_command(IpcCommand::SetPrimary { display_id: D2 });
        state.shutdown();
        assert!(!path.exists());
    }

    #[test]
    fn test_response_line_is_newline_terminated() {
        let line = response_line(&IpcResponse::Ok);
        assert_eq!(line, "{\"status\":\"ok\"}\n");
    }

    #[test]
    fn test_ipc_read_timeout_is_reasonable() {
        assert!(IPC_READ_TIMEOUT.as_secs() >= 1);
        assert!(IPC_READ_TIMEOUT.as_secs() <= 30);
    }

    #[test]
    fn test_max_ipc_message_size_is_reasonable() {
        const { assert!(MAX_IPC_MESSAGE_SIZE >= 1024) };
        const { assert!(MAX_IPC_MESSAGE_SIZE <= 1024 * 1024) };
    }
}
