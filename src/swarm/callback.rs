//! HTTP callback server for receiving progress updates from swarm agents.
//!
//! The callback server provides a lightweight HTTP endpoint that swarm agents
//! can call to report task progress, completion, and other events. This enables
//! Forge to monitor swarm execution without polling.
//!
//! ## Features
//!
//! - Binds to localhost on a dynamic port for security
//! - Accumulates events for batch retrieval
//! - Configurable max events limit to prevent unbounded memory growth
//! - Graceful shutdown support
//!
//! ## Usage
//!
//! ```no_run
//! use forge::swarm::CallbackServer;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut server = CallbackServer::new();
//! let callback_url = server.start().await?;
//!
//! // Pass callback_url to swarm agents...
//! // Agents POST to {callback_url}/progress, {callback_url}/complete, etc.
//!
//! // Poll for events
//! let events = server.drain_events().await;
//!
//! // Cleanup
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, oneshot};

/// Maximum number of events to retain before dropping oldest.
/// This prevents unbounded memory growth from misbehaving agents.
const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Progress update from a swarm task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Task identifier
    pub task: String,
    /// Current status description
    pub status: String,
    /// Progress percentage (0-100), if applicable
    #[serde(default)]
    pub percent: Option<u32>,
    /// Additional metadata
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Task completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task completed successfully
    Success,
    /// Task failed
    Failed,
    /// Task was cancelled
    Cancelled,
}

/// Completion notification from a swarm task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskComplete {
    /// Task identifier
    pub task: String,
    /// Completion status
    pub status: TaskStatus,
    /// Summary of work done
    #[serde(default)]
    pub summary: Option<String>,
    /// Error message if failed
    #[serde(default)]
    pub error: Option<String>,
    /// Files modified by this task
    #[serde(default)]
    pub files_changed: Vec<String>,
}

/// Generic event from swarm execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericEvent {
    /// Event type identifier
    pub event_type: String,
    /// Event payload
    pub payload: serde_json::Value,
}

/// Events that swarm agents send to the callback server via HTTP POST.
///
/// ## HTTP Endpoint Mapping
///
/// | Variant            | HTTP endpoint       | Content-Type       |
/// |--------------------|---------------------|--------------------|
/// | `Progress(...)`    | `POST /progress`    | `application/json` |
/// | `Complete(...)`    | `POST /complete`    | `application/json` |
/// | `Event(...)`       | `POST /event`       | `application/json` |
///
/// ## Client Contract
///
/// Agents receive `callback_url` as an environment variable when spawned. They must:
/// 1. Send `POST {callback_url}/progress` at least once per iteration so the
///    orchestrator knows the task is alive.
/// 2. Send `POST {callback_url}/complete` exactly once when the task finishes
///    (success, failure, or cancellation).
/// 3. Optionally send `POST {callback_url}/event` for structured custom payloads.
///
/// The server responds `200 OK` for all accepted events. Any other status indicates
/// a server error and the agent should retry with exponential backoff.
///
/// Events are stored in a bounded ring buffer (default [`DEFAULT_MAX_EVENTS`]).
/// When the buffer is full the oldest event is dropped to make room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwarmEvent {
    /// Progress update
    Progress(ProgressUpdate),
    /// Task completed
    Complete(TaskComplete),
    /// Generic event
    Event(GenericEvent),
}

/// Internal state shared between handlers.
///
/// This is exposed with crate visibility to allow the SwarmExecutor
/// to poll for new events during execution.
#[derive(Debug)]
pub(crate) struct ServerState {
    /// Accumulated events (VecDeque for O(1) front removal)
    pub(crate) events: VecDeque<SwarmEvent>,
    /// Whether the server is running
    pub(crate) running: bool,
    /// Maximum number of events to retain
    pub(crate) max_events: usize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
            running: false,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl ServerState {
    /// Add an event, dropping oldest if at capacity.
    fn push_event(&mut self, event: SwarmEvent) {
        if self.events.len() >= self.max_events {
            // Remove oldest event to make room (O(1) with VecDeque)
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// HTTP callback server for swarm progress updates.
///
/// The server binds to a dynamic port on localhost and provides endpoints
/// for swarm agents to report progress. Events are accumulated and can be
/// polled by the orchestrator.
pub struct CallbackServer {
    /// Shared state (exposed for polling by SwarmExecutor)
    pub(crate) state: Arc<RwLock<ServerState>>,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server address once started
    addr: Option<SocketAddr>,
}

impl Default for CallbackServer {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackServer {
    /// Create a new callback server.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ServerState::default())),
            shutdown_tx: None,
            addr: None,
        }
    }

    /// Start the callback server on a dynamic port.
    ///
    /// Returns the callback URL that should be passed to swarm agents.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port.
    pub async fn start(&mut self) -> Result<String> {
        // Bind to localhost with dynamic port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind callback server")?;

        let addr = listener
            .local_addr()
            .context("Failed to get server address")?;

        self.addr = Some(addr);

        // Mark as running
        {
            let mut state = self.state.write().await;
            state.running = true;
        }

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        // Build router
        let state = self.state.clone();
        let app = build_router(state);

        // Spawn server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                eprintln!("Callback server error: {}", e);
            }
        });

        let callback_url = format!("http://{}", addr);
        Ok(callback_url)
    }

    /// Stop the callback server gracefully.
    pub async fn stop(&mut self) -> Result<()> {
        // Send shutdown signal
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Mark as stopped
        {
            let mut state = self.state.write().await;
            state.running = false;
        }

        self.addr = None;
        Ok(())
    }

    /// Check if the server is running.
    pub async fn is_running(&self) -> bool {
        self.state.read().await.running
    }

    /// Get the server address if running.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Get the callback URL if running.
    pub fn callback_url(&self) -> Option<String> {
        self.addr.map(|addr| format!("http://{}", addr))
    }

    /// Drain all accumulated events, clearing the internal buffer.
    pub async fn drain_events(&self) -> Vec<SwarmEvent> {
        let mut state = self.state.write().await;
        state.events.drain(..).collect()
    }

    /// Peek at accumulated events without draining.
    pub async fn peek_events(&self) -> Vec<SwarmEvent> {
        self.state.read().await.events.iter().cloned().collect()
    }

    /// Get the count of accumulated events.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Clear all accumulated events.
    pub async fn clear_events(&self) {
        let mut state = self.state.write().await;
        state.events.clear();
    }

    /// Get a clone of the internal state for polling.
    ///
    /// This is used by SwarmExecutor to poll for new events during execution.
    pub(crate) fn state_clone(&self) -> Arc<RwLock<ServerState>> {
        self.state.clone()
    }
}

/// Build the axum router with all endpoints.
fn build_router(state: Arc<RwLock<ServerState>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/progress", post(progress_handler))
        .route("/complete", post(complete_handler))
        .route("/event", post(event_handler))
        .with_state(state)
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "ok"
}

/// Handle progress updates from swarm tasks.
async fn progress_handler(
    State(state): State<Arc<RwLock<ServerState>>>,
    Json(update): Json<ProgressUpdate>,
) -> StatusCode {
    let mut state = state.write().await;
    state.push_event(SwarmEvent::Progress(update));
    StatusCode::OK
}

/// Handle task completion notifications.
async fn complete_handler(
    State(state): State<Arc<RwLock<ServerState>>>,
    Json(complete): Json<TaskComplete>,
) -> StatusCode {
    let mut state = state.write().await;
    state.push_event(SwarmEvent::Complete(complete));
    StatusCode::OK
}

/// Handle generic events.
async fn event_handler(
    State(state): State<Arc<RwLock<ServerState>>>,
    Json(event): Json<GenericEvent>,
) -> StatusCode {
    let mut state = state.write().await;
    state.push_event(SwarmEvent::Event(event));
    StatusCode::OK
}
