//! Call session coordinator
//!
//! Single authority for call state. Local user actions and signals pushed by
//! the realtime platform are both funneled as messages into one mailbox
//! drained by a single driver task, so no transition ever runs concurrently
//! with another for the same session. Asynchronous side effects (device
//! probe, join, ring, leave, reject) complete inside the handler before the
//! next message is taken, which locks the session implicitly while an
//! operation is in flight.
//!
//! The auto-decline and settle timers are spawned tasks that post a message
//! back into the same mailbox. They are aborted outright on any transition
//! away from the state that armed them; a timer message that still slips
//! through the race is recognized as stale and dropped.

pub mod builder;
pub mod config;

pub use builder::CoordinatorBuilder;
pub use config::CoordinatorConfig;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CallError, CallResult};
use crate::events::{CallEvent, CallEventHandler, CallStatusInfo, RingAction};
use crate::identity::IdentityResolver;
use crate::media::MediaDevices;
use crate::platform::{CallHandle, CallSignal, RealtimePlatform};
use crate::session::{CallId, CallSession, CallState, ParticipantId, RingDescriptor};

const MAILBOX_CAPACITY: usize = 32;

/// Counters over the coordinator's lifetime
#[derive(Debug, Clone, Default)]
pub struct CoordinatorStats {
    /// Outgoing call attempts that reached `Ready`
    pub total_outgoing: usize,
    /// Inbound rings recorded
    pub total_incoming: usize,
    /// Calls that reached `Active` and ended normally
    pub completed_calls: usize,
    /// Rings declined by the auto-decline timer
    pub auto_declined: usize,
    /// Inbound rings dropped because a session was already engaged
    pub dropped_rings: usize,
}

/// Read-only snapshot of the per-attempt session fields
#[derive(Debug, Clone, Default)]
struct SharedView {
    pending_incoming: Option<RingDescriptor>,
    pending_outgoing: Option<CallId>,
    remote: Option<ParticipantId>,
    call_id: Option<CallId>,
}

enum Command {
    Setup {
        remote: ParticipantId,
        reply: oneshot::Sender<CallResult<()>>,
    },
    Start {
        reply: oneshot::Sender<CallResult<()>>,
    },
    Accept {
        reply: oneshot::Sender<CallResult<()>>,
    },
    Reject {
        reply: oneshot::Sender<CallResult<()>>,
    },
    Cancel {
        reply: oneshot::Sender<CallResult<()>>,
    },
    End {
        reply: oneshot::Sender<CallResult<()>>,
    },
    Signal(CallSignal),
    RingExpired {
        call_id: CallId,
    },
    Settle {
        epoch: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct DriverParts {
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<CallState>,
}

/// Coordinator for one local participant's call lifecycle
///
/// Construct through [`CoordinatorBuilder`], then `start()` to begin
/// consuming platform signals. All action methods return either `Ok` or a
/// typed [`CallError`] with the recovery transition already applied.
pub struct CallSessionCoordinator {
    local: ParticipantId,
    config: CoordinatorConfig,
    platform: Arc<dyn RealtimePlatform>,
    devices: Arc<dyn MediaDevices>,
    identity: Arc<dyn IdentityResolver>,
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<CallState>,
    view: Arc<StdRwLock<SharedView>>,
    stats: Arc<StdRwLock<CoordinatorStats>>,
    event_tx: broadcast::Sender<CallEvent>,
    handler: Arc<RwLock<Option<Arc<dyn CallEventHandler>>>>,
    running: AtomicBool,
    driver_parts: Mutex<Option<DriverParts>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CallSessionCoordinator {
    pub fn new(
        local: ParticipantId,
        platform: Arc<dyn RealtimePlatform>,
        devices: Arc<dyn MediaDevices>,
        identity: Arc<dyn IdentityResolver>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (state_tx, state_rx) = watch::channel(CallState::Idle);
        let (event_tx, _) = broadcast::channel(config.event_buffer);

        Arc::new(Self {
            local,
            config,
            platform,
            devices,
            identity,
            cmd_tx,
            state_rx,
            view: Arc::new(StdRwLock::new(SharedView::default())),
            stats: Arc::new(StdRwLock::new(CoordinatorStats::default())),
            event_tx,
            handler: Arc::new(RwLock::new(None)),
            running: AtomicBool::new(false),
            driver_parts: Mutex::new(Some(DriverParts { cmd_rx, state_tx })),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the driver task and the platform signal pump
    pub async fn start(&self) -> CallResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!(label = %self.config.label, "coordinator already running");
            return Ok(());
        }

        let parts = match self.driver_parts.lock().await.take() {
            Some(parts) => parts,
            None => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CallError::internal(
                    "coordinator cannot be restarted after stop",
                ));
            }
        };

        let driver = Driver {
            session: CallSession::new(self.local.clone()),
            platform: self.platform.clone(),
            devices: self.devices.clone(),
            identity: self.identity.clone(),
            config: self.config.clone(),
            state_tx: parts.state_tx,
            view: self.view.clone(),
            stats: self.stats.clone(),
            event_tx: self.event_tx.clone(),
            handler: self.handler.clone(),
            cmd_tx: self.cmd_tx.clone(),
            decline_timer: None,
            settle_timer: None,
        };
        let driver_task = tokio::spawn(driver.run(parts.cmd_rx));

        let mut signals = self.platform.signals();
        let signal_tx = self.cmd_tx.clone();
        let label = self.config.label.clone();
        let pump_task = tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        if signal_tx.send(Command::Signal(signal)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%label, skipped, "platform signal stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(driver_task);
        tasks.push(pump_task);

        info!(label = %self.config.label, local = %self.local, "call coordinator started");
        Ok(())
    }

    /// Stop the driver and the signal pump; terminal for this coordinator
    pub async fn stop(&self) -> CallResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let (reply, done) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        info!(label = %self.config.label, local = %self.local, "call coordinator stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The participant this coordinator belongs to
    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    /// Current lifecycle state
    pub fn state(&self) -> CallState {
        *self.state_rx.borrow()
    }

    /// Watch channel carrying the lifecycle state
    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state_rx.clone()
    }

    /// Pending inbound ring descriptor; non-empty exactly in `Incoming`
    pub fn pending_incoming(&self) -> Option<RingDescriptor> {
        self.view.read().unwrap().pending_incoming.clone()
    }

    /// Identifier of the call being rung; non-empty exactly in `Outgoing`
    pub fn pending_outgoing(&self) -> Option<CallId> {
        self.view.read().unwrap().pending_outgoing
    }

    /// The other party of the current attempt, if any
    pub fn remote_participant(&self) -> Option<ParticipantId> {
        self.view.read().unwrap().remote.clone()
    }

    /// Identifier of the call attempt currently holding the handle
    pub fn current_call_id(&self) -> Option<CallId> {
        self.view.read().unwrap().call_id
    }

    /// Subscribe to coordinator events
    pub fn subscribe_events(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    /// Install the callback-style event handler
    pub async fn set_event_handler(&self, handler: Arc<dyn CallEventHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// Lifetime counters
    pub fn stats(&self) -> CoordinatorStats {
        self.stats.read().unwrap().clone()
    }

    /// Probe capture devices and prepare a call to `remote`
    ///
    /// `Idle`/`Ended` → `Setup` → `Ready`. The devices are verified then
    /// released; the call handle is created but not joined.
    pub async fn setup_call(&self, remote: impl Into<ParticipantId>) -> CallResult<()> {
        let remote = remote.into();
        self.send(|reply| Command::Setup { remote, reply }).await
    }

    /// Join the prepared call locally and ring the remote participant
    ///
    /// `Ready` → `Outgoing`. On transport failure the session reverts to
    /// `Ready`, not `Idle`: the handle and device probe remain valid and a
    /// retry is cheap.
    pub async fn start_call(&self) -> CallResult<()> {
        self.send(|reply| Command::Start { reply }).await
    }

    /// Join the pending inbound call
    ///
    /// `Incoming` → `Active`. On join failure the session resets to `Idle`
    /// and the ring is abandoned; the caller is not retried automatically.
    pub async fn accept_call(&self) -> CallResult<()> {
        self.send(|reply| Command::Accept { reply }).await
    }

    /// Decline the pending inbound call, notifying the caller
    pub async fn reject_call(&self) -> CallResult<()> {
        self.send(|reply| Command::Reject { reply }).await
    }

    /// Withdraw an outgoing ring and leave the call
    ///
    /// `Outgoing` → `Idle`. The transition happens even when the transport
    /// leave fails; a stuck remote handle beats a stuck client.
    pub async fn cancel_call(&self) -> CallResult<()> {
        self.send(|reply| Command::Cancel { reply }).await
    }

    /// End the call
    ///
    /// Valid from `Active`; tolerated from `Ready`/`Outgoing`/`Incoming` as
    /// a force-stop. Always reaches `Ended` regardless of transport-leave
    /// outcome, then settles back to `Idle`.
    pub async fn end_call(&self) -> CallResult<()> {
        self.send(|reply| Command::End { reply }).await
    }

    async fn send<F>(&self, make: F) -> CallResult<()>
    where
        F: FnOnce(oneshot::Sender<CallResult<()>>) -> Command,
    {
        if !self.is_running() {
            return Err(CallError::NotConnected);
        }
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(make(reply))
            .await
            .map_err(|_| CallError::NotConnected)?;
        response
            .await
            .map_err(|_| CallError::internal("coordinator stopped while handling the action"))?
    }
}

impl std::fmt::Debug for CallSessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionCoordinator")
            .field("local", &self.local)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

/// The single serialized transition handler; owns the session exclusively
struct Driver {
    session: CallSession,
    platform: Arc<dyn RealtimePlatform>,
    devices: Arc<dyn MediaDevices>,
    identity: Arc<dyn IdentityResolver>,
    config: CoordinatorConfig,
    state_tx: watch::Sender<CallState>,
    view: Arc<StdRwLock<SharedView>>,
    stats: Arc<StdRwLock<CoordinatorStats>>,
    event_tx: broadcast::Sender<CallEvent>,
    handler: Arc<RwLock<Option<Arc<dyn CallEventHandler>>>>,
    cmd_tx: mpsc::Sender<Command>,
    decline_timer: Option<JoinHandle<()>>,
    settle_timer: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        while let Some(command) = cmd_rx.recv().await {
            match command {
                Command::Setup { remote, reply } => {
                    let _ = reply.send(self.handle_setup(remote).await);
                }
                Command::Start { reply } => {
                    let _ = reply.send(self.handle_start().await);
                }
                Command::Accept { reply } => {
                    let _ = reply.send(self.handle_accept().await);
                }
                Command::Reject { reply } => {
                    let _ = reply.send(self.handle_reject().await);
                }
                Command::Cancel { reply } => {
                    let _ = reply.send(self.handle_cancel().await);
                }
                Command::End { reply } => {
                    let _ = reply.send(self.handle_end().await);
                }
                Command::Signal(signal) => self.handle_signal(signal).await,
                Command::RingExpired { call_id } => self.handle_ring_expired(call_id).await,
                Command::Settle { epoch } => self.handle_settle(epoch).await,
                Command::Shutdown { reply } => {
                    self.abort_decline();
                    self.abort_settle();
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    // ===== user actions =====

    async fn handle_setup(&mut self, remote: ParticipantId) -> CallResult<()> {
        if remote == self.session.local {
            return Err(CallError::InvalidTarget);
        }
        match self.session.state {
            CallState::Idle => {}
            CallState::Ended => {
                // re-entry before settle completes is allowed
                self.abort_settle();
                self.session.clear_attempt();
                self.sync_view();
            }
            CallState::Setup | CallState::Ready => {
                return Err(CallError::InvalidState {
                    action: "setup",
                    state: self.session.state,
                });
            }
            state => return Err(CallError::SessionBusy { state }),
        }

        self.transition(CallState::Setup, None).await;

        match self.devices.acquire().await {
            Ok(grant) => {
                // capability verified; release before real use so the
                // transport can acquire it on join
                drop(grant);
            }
            Err(device_err) => {
                let error = CallError::from(device_err);
                self.transition(CallState::Idle, Some("device check failed".into()))
                    .await;
                self.emit_error(error.clone(), None).await;
                return Err(error);
            }
        }

        let handle = match self
            .platform
            .create_call(&self.session.local, &remote)
            .await
        {
            Ok(handle) => handle,
            Err(platform_err) => {
                let error = CallError::transport("create_call", platform_err);
                self.transition(CallState::Idle, Some("call creation failed".into()))
                    .await;
                self.emit_error(error.clone(), None).await;
                return Err(error);
            }
        };

        debug!(call_id = %handle.id(), %remote, "call prepared, not yet joined");
        self.session.remote = Some(remote);
        self.session.handle = Some(handle);
        self.stats.write().unwrap().total_outgoing += 1;
        self.transition(CallState::Ready, None).await;
        Ok(())
    }

    async fn handle_start(&mut self) -> CallResult<()> {
        if self.session.state != CallState::Ready {
            return Err(CallError::InvalidState {
                action: "start",
                state: self.session.state,
            });
        }
        let handle = self
            .session
            .handle
            .clone()
            .ok_or_else(|| CallError::internal("ready session without a call handle"))?;

        self.session.pending_outgoing = Some(handle.clone());
        self.transition(CallState::Outgoing, None).await;

        if let Err(platform_err) = handle.join().await {
            let error = CallError::transport("join", platform_err);
            self.session.pending_outgoing = None;
            self.transition(CallState::Ready, Some("local join failed".into()))
                .await;
            self.emit_error(error.clone(), Some(handle.id())).await;
            return Err(error);
        }

        if let Err(platform_err) = handle.ring().await {
            // the local join succeeded; leave so a retried start() does not
            // stack joins on the platform
            if let Err(leave_err) = handle.leave().await {
                warn!(call_id = %handle.id(), error = %leave_err, "leave after failed ring also failed");
            }
            let error = CallError::transport("ring", platform_err);
            self.session.pending_outgoing = None;
            self.transition(CallState::Ready, Some("ring failed".into()))
                .await;
            self.emit_error(error.clone(), Some(handle.id())).await;
            return Err(error);
        }

        debug!(call_id = %handle.id(), "ringing remote participant");
        Ok(())
    }

    async fn handle_accept(&mut self) -> CallResult<()> {
        if self.session.state != CallState::Incoming || self.session.pending_incoming.is_none() {
            return Err(CallError::InvalidState {
                action: "accept",
                state: self.session.state,
            });
        }
        let handle = self
            .session
            .handle
            .clone()
            .ok_or_else(|| CallError::internal("incoming session without a call handle"))?;

        self.abort_decline();

        if let Err(platform_err) = handle.join().await {
            // the ring is implicitly abandoned; no automatic retry
            let error = CallError::transport("join", platform_err);
            self.session.clear_attempt();
            self.transition(CallState::Idle, Some("join failed, ring abandoned".into()))
                .await;
            self.emit_error(error.clone(), Some(handle.id())).await;
            return Err(error);
        }

        self.session.pending_incoming = None;
        self.transition(CallState::Active, None).await;
        Ok(())
    }

    async fn handle_reject(&mut self) -> CallResult<()> {
        if self.session.state != CallState::Incoming || self.session.pending_incoming.is_none() {
            return Err(CallError::InvalidState {
                action: "reject",
                state: self.session.state,
            });
        }
        let handle = self
            .session
            .handle
            .clone()
            .ok_or_else(|| CallError::internal("incoming session without a call handle"))?;

        self.abort_decline();
        let result = handle.reject().await;

        self.session.clear_attempt();
        self.transition(CallState::Idle, Some("ring declined".into()))
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(platform_err) => {
                let error = CallError::transport("reject", platform_err);
                self.emit_error(error.clone(), Some(handle.id())).await;
                Err(error)
            }
        }
    }

    async fn handle_cancel(&mut self) -> CallResult<()> {
        if self.session.state != CallState::Outgoing {
            return Err(CallError::InvalidState {
                action: "cancel",
                state: self.session.state,
            });
        }
        let handle = self
            .session
            .handle
            .clone()
            .ok_or_else(|| CallError::internal("outgoing session without a call handle"))?;

        let result = handle.leave().await;

        self.session.clear_attempt();
        self.transition(CallState::Idle, Some("outgoing cancelled".into()))
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(platform_err) => {
                let error = CallError::transport("leave", platform_err);
                self.emit_error(error.clone(), Some(handle.id())).await;
                Err(error)
            }
        }
    }

    async fn handle_end(&mut self) -> CallResult<()> {
        match self.session.state {
            CallState::Active
            | CallState::Ready
            | CallState::Outgoing
            | CallState::Incoming => {}
            state => {
                return Err(CallError::InvalidState {
                    action: "end",
                    state,
                });
            }
        }

        self.abort_decline();
        let was_active = self.session.state == CallState::Active;
        let handle = self.session.handle.clone();

        let result = match &handle {
            Some(handle) => handle.leave().await,
            None => Ok(()),
        };

        if was_active {
            self.stats.write().unwrap().completed_calls += 1;
        }
        self.session.clear_attempt();
        self.transition(CallState::Ended, Some("ended locally".into()))
            .await;
        self.arm_settle();

        match result {
            Ok(()) => Ok(()),
            Err(platform_err) => {
                let error = CallError::transport("leave", platform_err);
                self.emit_error(error.clone(), handle.map(|h| h.id())).await;
                Err(error)
            }
        }
    }

    // ===== platform signals =====

    async fn handle_signal(&mut self, signal: CallSignal) {
        match signal {
            CallSignal::Ring { call, from, to } => self.handle_ring(call, from, to).await,
            CallSignal::Accepted { call_id, by } => self.handle_remote_accepted(call_id, by).await,
            CallSignal::Rejected { call_id, by } => self.handle_remote_rejected(call_id, by).await,
            CallSignal::Ended { call_id } => self.handle_remote_ended(call_id).await,
        }
    }

    async fn handle_ring(
        &mut self,
        call: Arc<dyn CallHandle>,
        from: ParticipantId,
        to: ParticipantId,
    ) {
        if to != self.session.local {
            debug!(call_id = %call.id(), %to, "ring addressed to another participant, ignoring");
            return;
        }
        if self.session.state.is_engaged() {
            // first ring wins
            self.stats.write().unwrap().dropped_rings += 1;
            debug!(
                call_id = %call.id(),
                %from,
                state = %self.session.state,
                "dropping inbound ring while a session is engaged"
            );
            return;
        }
        if self.session.state == CallState::Ended {
            self.abort_settle();
            self.session.clear_attempt();
            self.sync_view();
        }

        let from_display_name = self.identity.resolve(&from).await.map(|p| p.label());
        let descriptor = RingDescriptor {
            call_id: call.id(),
            from: from.clone(),
            from_display_name,
            received_at: Utc::now(),
        };

        info!(call_id = %descriptor.call_id, %from, "inbound ring");
        self.session.remote = Some(from);
        self.session.handle = Some(call);
        self.session.pending_incoming = Some(descriptor.clone());
        self.stats.write().unwrap().total_incoming += 1;
        self.transition(CallState::Incoming, None).await;
        self.arm_decline(descriptor.call_id);

        let _ = self.event_tx.send(CallEvent::IncomingRing {
            info: descriptor.clone(),
        });

        // clone out of the lock so handler callbacks never hold it
        let handler = self.handler.read().await.clone();
        let action = match handler {
            Some(handler) => handler.on_incoming_ring(descriptor).await,
            None => RingAction::Ignore,
        };
        match action {
            RingAction::Accept => {
                if let Err(error) = self.handle_accept().await {
                    debug!(%error, "handler-requested accept failed");
                }
            }
            RingAction::Decline => {
                if let Err(error) = self.handle_reject().await {
                    debug!(%error, "handler-requested decline failed");
                }
            }
            RingAction::Ignore => {}
        }
    }

    async fn handle_remote_accepted(&mut self, call_id: CallId, by: ParticipantId) {
        if self.session.state == CallState::Outgoing {
            let matches = self
                .session
                .pending_outgoing
                .as_ref()
                .map(|pending| pending.id() == call_id)
                .unwrap_or(false);
            if matches {
                self.session.pending_outgoing = None;
                self.transition(CallState::Active, Some(format!("accepted by {by}")))
                    .await;
                return;
            }
        }
        debug!(%call_id, state = %self.session.state, "ignoring stale accepted signal");
    }

    async fn handle_remote_rejected(&mut self, call_id: CallId, by: ParticipantId) {
        match self.session.state {
            CallState::Outgoing => {
                let matches = self
                    .session
                    .pending_outgoing
                    .as_ref()
                    .map(|pending| pending.id() == call_id)
                    .unwrap_or(false);
                if matches {
                    self.session.clear_attempt();
                    self.transition(CallState::Ended, Some(format!("rejected by {by}")))
                        .await;
                    self.arm_settle();
                    return;
                }
            }
            CallState::Incoming => {
                let matches = self
                    .session
                    .pending_incoming
                    .as_ref()
                    .map(|pending| pending.call_id == call_id)
                    .unwrap_or(false);
                if matches {
                    // the caller withdrew the ring before we answered
                    self.abort_decline();
                    self.session.clear_attempt();
                    self.transition(CallState::Ended, Some("caller withdrew the ring".into()))
                        .await;
                    self.arm_settle();
                    return;
                }
            }
            _ => {}
        }
        debug!(%call_id, state = %self.session.state, "ignoring stale rejected signal");
    }

    async fn handle_remote_ended(&mut self, call_id: CallId) {
        if self.session.call_id() != Some(call_id) || self.session.state.is_settled() {
            debug!(%call_id, state = %self.session.state, "ignoring stale ended signal");
            return;
        }
        match self.session.state {
            CallState::Active | CallState::Outgoing => {
                if let Some(handle) = self.session.handle.clone() {
                    if let Err(error) = handle.leave().await {
                        warn!(%call_id, %error, "leave after remote end failed");
                    }
                }
                if self.session.state == CallState::Active {
                    self.stats.write().unwrap().completed_calls += 1;
                }
                self.session.clear_attempt();
                self.transition(CallState::Ended, Some("remote ended the call".into()))
                    .await;
                self.arm_settle();
            }
            CallState::Incoming => {
                self.abort_decline();
                self.session.clear_attempt();
                self.transition(CallState::Ended, Some("caller ended before answer".into()))
                    .await;
                self.arm_settle();
            }
            _ => {
                // a prepared-but-never-rung call has no remote lifecycle yet
                debug!(%call_id, state = %self.session.state, "ignoring ended signal in pre-ring state");
            }
        }
    }

    // ===== timers =====

    async fn handle_ring_expired(&mut self, call_id: CallId) {
        let matches = self.session.state == CallState::Incoming
            && self
                .session
                .pending_incoming
                .as_ref()
                .map(|pending| pending.call_id == call_id)
                .unwrap_or(false);
        if !matches {
            debug!(%call_id, state = %self.session.state, "ignoring stale auto-decline timer");
            return;
        }

        info!(%call_id, "ring window expired, auto-declining");
        self.stats.write().unwrap().auto_declined += 1;

        if let Some(handle) = self.session.handle.clone() {
            // notify the caller so their outgoing ring resolves
            if let Err(error) = handle.reject().await {
                debug!(%call_id, %error, "reject on ring expiry failed");
            }
        }

        self.decline_timer = None;
        self.session.clear_attempt();
        self.transition(CallState::Idle, Some("ring window expired".into()))
            .await;
    }

    async fn handle_settle(&mut self, epoch: u64) {
        if self.session.state != CallState::Ended || epoch != self.session.epoch {
            debug!(epoch, state = %self.session.state, "ignoring stale settle timer");
            return;
        }
        self.settle_timer = None;
        self.session.clear_attempt();
        self.transition(CallState::Idle, None).await;
    }

    fn arm_decline(&mut self, call_id: CallId) {
        self.abort_decline();
        let window = self.config.ring_timeout;
        let tx = self.cmd_tx.clone();
        self.decline_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(Command::RingExpired { call_id }).await;
        }));
    }

    fn abort_decline(&mut self) {
        if let Some(timer) = self.decline_timer.take() {
            timer.abort();
        }
    }

    fn arm_settle(&mut self) {
        self.abort_settle();
        self.session.epoch += 1;
        let epoch = self.session.epoch;
        let delay = self.config.settle_delay;
        let tx = self.cmd_tx.clone();
        self.settle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::Settle { epoch }).await;
        }));
    }

    fn abort_settle(&mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
    }

    // ===== bookkeeping =====

    async fn transition(&mut self, new_state: CallState, reason: Option<String>) {
        let previous = self.session.state;
        if previous == new_state {
            return;
        }
        self.session.state = new_state;
        self.sync_view();

        let info = CallStatusInfo {
            call_id: self.session.call_id(),
            new_state,
            previous_state: previous,
            reason,
            timestamp: Utc::now(),
        };
        info!(
            label = %self.config.label,
            local = %self.session.local,
            from = %previous,
            to = %new_state,
            reason = info.reason.as_deref().unwrap_or(""),
            "call state changed"
        );

        let _ = self.state_tx.send(new_state);
        let _ = self.event_tx.send(CallEvent::StateChanged { info: info.clone() });
        let handler = self.handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_state_changed(info).await;
        }
    }

    async fn emit_error(&self, error: CallError, call_id: Option<CallId>) {
        let _ = self.event_tx.send(CallEvent::CallError {
            error: error.clone(),
            call_id,
        });
        let handler = self.handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_error(error, call_id).await;
        }
    }

    fn sync_view(&self) {
        let mut view = self.view.write().unwrap();
        view.pending_incoming = self.session.pending_incoming.clone();
        view.pending_outgoing = self.session.pending_outgoing.as_ref().map(|h| h.id());
        view.remote = self.session.remote.clone();
        view.call_id = self.session.call_id();
    }
}
