// crates/mesh-rpc/src/worker.rs
//
// ManagedWorker: runs a Servicer on a dedicated OS thread with its own
// single-threaded tokio runtime.
//
// The worker joins the overlay, registers the servicer's methods, signals
// readiness, then handles inbound calls one at a time in delivery order until
// the shutdown channel fires. Teardown deregisters every method before the
// thread exits. The owner only sees lifecycle methods; the overlay only sees
// the handler inbox.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use mesh_core::{Authorizer, MeshError, PeerInfo};
use mesh_p2p::{InboundCall, Overlay};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::AuthRpcWrapper;
use crate::readiness::ReadinessSignal;
use crate::role::Role;
use crate::servicer::{CallContext, Servicer};
use crate::shutdown::{ShutdownChannel, ShutdownListener};
use crate::state::{WorkerState, WorkerStateMachine};

/// Capacity of the inbox between the overlay and the worker loop.
pub const INBOX_CAPACITY: usize = 64;

type SharedState = Arc<Mutex<WorkerStateMachine>>;

fn lock_state(state: &SharedState) -> MutexGuard<'_, WorkerStateMachine> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn advance(state: &SharedState, next: WorkerState) {
    if let Err(e) = lock_state(state).transition(next) {
        warn!("{}", e);
    }
}

/// Everything the worker thread needs besides the servicer.
struct WorkerContext {
    name: String,
    overlay: Arc<dyn Overlay>,
    authorizer: Option<Arc<dyn Authorizer>>,
    readiness: ReadinessSignal<PeerInfo>,
    shutdown: ShutdownListener,
    state: SharedState,
}

/// Owner-side handle of a servicer running on its own thread.
pub struct ManagedWorker<S> {
    name: String,
    overlay: Arc<dyn Overlay>,
    authorizer: Option<Arc<dyn Authorizer>>,
    servicer: Mutex<Option<S>>,
    readiness: ReadinessSignal<PeerInfo>,
    shutdown: ShutdownChannel,
    state: SharedState,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<S> std::fmt::Debug for ManagedWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedWorker")
            .field("name", &self.name)
            .field("state", &lock_state(&self.state).current)
            .finish()
    }
}

impl<S: Servicer + Send> ManagedWorker<S> {
    /// Wrap `servicer`. Nothing runs until [`ManagedWorker::start`].
    pub fn new(
        overlay: Arc<dyn Overlay>,
        servicer: S,
        authorizer: Option<Arc<dyn Authorizer>>,
    ) -> Self {
        Self {
            name: servicer.name().to_string(),
            overlay,
            authorizer,
            servicer: Mutex::new(Some(servicer)),
            readiness: ReadinessSignal::new(),
            shutdown: ShutdownChannel::new(),
            state: Arc::new(Mutex::new(WorkerStateMachine::new())),
            thread: Mutex::new(None),
        }
    }

    /// Spawn the worker thread without waiting for readiness.
    ///
    /// Fails with `InvalidState` if the worker was already started.
    pub fn start(&self) -> Result<(), MeshError> {
        lock_state(&self.state).transition(WorkerState::Starting)?;

        let servicer = self
            .servicer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| MeshError::InvalidState("Servicer already handed off".to_string()))?;

        let ctx = WorkerContext {
            name: self.name.clone(),
            overlay: self.overlay.clone(),
            authorizer: self.authorizer.clone(),
            readiness: self.readiness.clone(),
            shutdown: self.shutdown.listener(),
            state: self.state.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("mesh-{}", self.name))
            .spawn(move || run_thread(servicer, ctx));

        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                Ok(())
            }
            Err(e) => {
                let err = MeshError::Startup(format!("Failed to spawn worker thread: {}", e));
                advance(&self.state, WorkerState::Stopped);
                let _ = self.readiness.set_error(err.clone());
                Err(err)
            }
        }
    }

    /// Start the worker and, if `await_ready`, block until it is ready.
    ///
    /// A setup failure or an elapsed `timeout` is returned as
    /// `MeshError::Startup`. Blocking here from a runtime thread the overlay
    /// relies on will deadlock; use [`ManagedWorker::ready`] there instead.
    pub fn run_in_background(
        &self,
        await_ready: bool,
        timeout: Option<Duration>,
    ) -> Result<(), MeshError> {
        self.start()?;
        if await_ready {
            self.readiness.wait(timeout).map_err(as_startup_error)?;
        }
        Ok(())
    }

    /// Await readiness from async code. Returns the local peer on success.
    pub async fn ready(&self, timeout: Option<Duration>) -> Result<PeerInfo, MeshError> {
        self.readiness
            .wait_async(timeout)
            .await
            .map_err(as_startup_error)
    }

    /// Ask the worker to shut down. Never blocks.
    pub fn stop(&self) {
        info!("Stopping {} worker", self.name);
        self.shutdown.signal();
    }

    /// Block until the worker thread has exited. No-op if it never started
    /// or was already joined.
    pub fn join(&self) {
        let handle = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("{} worker thread panicked", self.name);
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        lock_state(&self.state).current
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S> Drop for ManagedWorker<S> {
    fn drop(&mut self) {
        self.shutdown.signal();
    }
}

fn as_startup_error(err: MeshError) -> MeshError {
    match err {
        MeshError::Timeout(detail) => MeshError::Startup(format!("Worker {}", detail)),
        other => other,
    }
}

/// Reports an abnormal thread exit (e.g. a panic) to anyone still waiting
/// for readiness.
struct ExitGuard {
    readiness: ReadinessSignal<PeerInfo>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.readiness.is_set() {
            let _ = self.readiness.set_error(MeshError::Startup(
                "Worker exited before becoming ready".to_string(),
            ));
        }
    }
}

fn run_thread<S: Servicer>(servicer: S, ctx: WorkerContext) {
    let _guard = ExitGuard {
        readiness: ctx.readiness.clone(),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            advance(&ctx.state, WorkerState::Stopped);
            let _ = ctx.readiness.set_error(MeshError::Startup(format!(
                "Failed to build worker runtime: {}",
                e
            )));
            return;
        }
    };

    runtime.block_on(run_loop(servicer, ctx));
}

/// Join the overlay, run servicer setup and register every method.
/// Registered methods are rolled back if a later registration fails.
async fn setup<S: Servicer>(
    servicer: &mut S,
    methods: &[String],
    inbox: mpsc::Sender<InboundCall>,
    ctx: &WorkerContext,
) -> Result<PeerInfo, MeshError> {
    ctx.overlay
        .join()
        .await
        .map_err(|e| MeshError::Startup(format!("Failed to join overlay: {}", e.detail())))?;

    let local = ctx.overlay.local_peer();
    servicer
        .setup(&local)
        .await
        .map_err(|e| MeshError::Startup(format!("{} setup failed: {}", ctx.name, e.detail())))?;

    for (i, method) in methods.iter().enumerate() {
        if let Err(e) = ctx.overlay.add_handler(method, inbox.clone()).await {
            for registered in &methods[..i] {
                let _ = ctx.overlay.remove_handler(registered).await;
            }
            return Err(MeshError::Startup(format!(
                "Failed to register '{}': {}",
                method,
                e.detail()
            )));
        }
    }

    Ok(local)
}

async fn run_loop<S: Servicer>(mut servicer: S, ctx: WorkerContext) {
    let methods = servicer.methods();
    let (inbox_tx, mut inbox) = mpsc::channel(INBOX_CAPACITY);

    let local = match setup(&mut servicer, &methods, inbox_tx, &ctx).await {
        Ok(local) => local,
        Err(e) => {
            error!("{} worker failed to start: {}", ctx.name, e);
            advance(&ctx.state, WorkerState::Stopped);
            let _ = ctx.readiness.set_error(e);
            return;
        }
    };

    advance(&ctx.state, WorkerState::Ready);
    let _ = ctx.readiness.set(local.clone());
    advance(&ctx.state, WorkerState::Running);
    info!("{} worker serving {:?} as {}", ctx.name, methods, local);

    let mut wrapper = AuthRpcWrapper::new(servicer, Role::Servicer, ctx.authorizer.clone());
    let mut shutdown = ctx.shutdown.clone();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            call = inbox.recv() => match call {
                Some(call) => {
                    debug!("{} handling '{}' from {}", ctx.name, call.request.method, call.remote);
                    let call_ctx = CallContext {
                        remote: call.remote,
                        local: local.clone(),
                    };
                    let response = wrapper.handle_request(call.request, &call_ctx).await;
                    if call.reply.send(response).is_err() {
                        debug!("Caller went away before the response was sent");
                    }
                }
                None => {
                    warn!("{} worker lost all handler registrations", ctx.name);
                    break;
                }
            },
        }
    }

    advance(&ctx.state, WorkerState::Stopping);
    for method in &methods {
        if let Err(e) = ctx.overlay.remove_handler(method).await {
            warn!("Failed to deregister '{}': {}", method, e);
        }
    }
    advance(&ctx.state, WorkerState::Stopped);
    info!("{} worker stopped", ctx.name);
}
