//! FFI client implementation.
//!
//! This module provides the C-callable functions for the relay.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use super::callbacks::*;
use super::types::*;
use crate::relay::Connection;

/// Internal client state.
struct FfiClient {
    connection: Arc<Connection>,
    callbacks: SkywireCallbacks,
    // Tokio runtime (created on first start)
    runtime: Option<Runtime>,
    task: Option<JoinHandle<()>>,
}

type ClientHandle = Arc<Mutex<FfiClient>>;

impl FfiClient {
    fn ensure_runtime(&mut self) -> Option<&Runtime> {
        if self.runtime.is_none() {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("skywire-relay")
                .enable_all()
                .build()
                .ok()?;
            self.runtime = Some(rt);
        }
        self.runtime.as_ref()
    }
}

/// Forward state changes until the connection reaches a terminal state.
async fn forward_states(connection: Arc<Connection>, callbacks: SkywireCallbacks) {
    let mut states = connection.subscribe_state();
    loop {
        let state = states.borrow_and_update().clone();
        callbacks.notify_state(&state);
        if state.is_terminal() || states.changed().await.is_err() {
            break;
        }
    }
}

// =============================================================================
// FFI Functions - C ABI
// =============================================================================

/// Create a new relay client.
///
/// # Parameters
/// - `config`: Relay configuration.
/// - `callbacks`: Host callbacks; at least `protect_socket` and `establish`
///   are needed for a working tunnel.
///
/// # Returns
/// Handle to the client, or NULL on error.
///
/// # Safety
/// - `config` must point to a valid `SkywireRelayConfig`.
/// - String pointers in config must be valid null-terminated UTF-8.
/// - `callbacks` must be null or point to a valid `SkywireCallbacks`.
#[no_mangle]
pub unsafe extern "C" fn skywire_relay_create(
    config: *const SkywireRelayConfig,
    callbacks: *const SkywireCallbacks,
) -> SkywireHandle {
    if config.is_null() {
        return SKYWIRE_HANDLE_NULL;
    }

    let relay_config = match (*config).to_relay_config() {
        Some(c) => c,
        None => return SKYWIRE_HANDLE_NULL,
    };

    let cbs = if callbacks.is_null() {
        SkywireCallbacks::default()
    } else {
        *callbacks
    };

    let bridge = Arc::new(CallbackBridge::new(cbs));
    let mut connection = Connection::new(relay_config, bridge.clone(), bridge);
    if let Some(listener) = cbs.establish_listener() {
        connection = connection.with_establish_listener(listener);
    }

    let client = FfiClient {
        connection: Arc::new(connection),
        callbacks: cbs,
        runtime: None,
        task: None,
    };
    let handle: ClientHandle = Arc::new(Mutex::new(client));

    Arc::into_raw(handle) as SkywireHandle
}

/// Start the relay.
///
/// Returns immediately; progress is reported via `on_state_changed` and
/// `on_log`, the outcome via `on_disconnected`. A client can only be started once.
///
/// # Safety
/// `handle` must be a valid handle from `skywire_relay_create`.
#[no_mangle]
pub unsafe extern "C" fn skywire_relay_start(handle: SkywireHandle) -> SkywireResult {
    if handle.is_null() {
        return SkywireResult::InvalidParam;
    }

    let client = &*(handle as *const Mutex<FfiClient>);
    let mut guard = match client.lock() {
        Ok(g) => g,
        Err(_) => return SkywireResult::InternalError,
    };

    if guard.task.is_some() {
        return SkywireResult::AlreadyRunning;
    }

    let connection = Arc::clone(&guard.connection);
    let callbacks = guard.callbacks;
    let rt = match guard.ensure_runtime() {
        Some(rt) => rt,
        None => return SkywireResult::InternalError,
    };

    let task = rt.spawn(async move {
        let watcher = tokio::spawn(forward_states(Arc::clone(&connection), callbacks));

        let result = match connection.run().await {
            Ok(()) => {
                callbacks.log_info(&format!("{}: stopped", connection.tag()));
                SkywireResult::Ok
            }
            Err(e) => {
                callbacks.log_error(&format!("{}: {}", connection.tag(), e));
                SkywireResult::from(&e)
            }
        };
        let _ = watcher.await;
        callbacks.notify_disconnected(result);
    });
    guard.task = Some(task);

    SkywireResult::Ok
}

/// Request the relay to stop.
///
/// Safe to call at any time and more than once, including before start.
///
/// # Safety
/// `handle` must be a valid handle from `skywire_relay_create`.
#[no_mangle]
pub unsafe extern "C" fn skywire_relay_stop(handle: SkywireHandle) -> SkywireResult {
    if handle.is_null() {
        return SkywireResult::InvalidParam;
    }

    let client = &*(handle as *const Mutex<FfiClient>);
    match client.lock() {
        Ok(guard) => {
            guard.connection.stop();
            SkywireResult::Ok
        }
        Err(_) => SkywireResult::InternalError,
    }
}

/// Get current connection state.
///
/// # Returns
/// Current state, or `Idle` if handle is invalid.
///
/// # Safety
/// `handle` must be null or a valid handle from `skywire_relay_create`.
#[no_mangle]
pub unsafe extern "C" fn skywire_relay_get_state(handle: SkywireHandle) -> SkywireState {
    if handle.is_null() {
        return SkywireState::Idle;
    }

    let client = &*(handle as *const Mutex<FfiClient>);
    match client.lock() {
        Ok(guard) => SkywireState::from(&guard.connection.state()),
        Err(_) => SkywireState::Idle,
    }
}

/// Destroy a relay client.
///
/// Stops the relay and waits briefly for it to wind down.
///
/// # Safety
/// - `handle` must be a valid handle from `skywire_relay_create`.
/// - `handle` must not be used after this call.
/// - Must not be called from inside a callback.
#[no_mangle]
pub unsafe extern "C" fn skywire_relay_destroy(handle: SkywireHandle) {
    if handle.is_null() {
        return;
    }

    let client = Arc::from_raw(handle as *const Mutex<FfiClient>);

    let runtime = match client.lock() {
        Ok(mut guard) => {
            guard.connection.stop();
            guard.task = None;
            guard.runtime.take()
        }
        Err(_) => None,
    };

    if let Some(rt) = runtime {
        rt.shutdown_timeout(Duration::from_secs(2));
    }
}
