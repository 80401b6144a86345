//! Shared test doubles: a scripted in-memory realtime platform
//!
//! `MockHub` wires any number of per-participant platforms together and
//! relays signals the way the hosted platform would: `ring()` delivers a
//! `Ring` to the callee, a callee `join()` delivers `Accepted` to the
//! caller, `reject()` delivers `Rejected`, and `leave()` delivers `Ended`
//! to the counterpart. Every verb can be scripted to fail.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use tutorcall_call_core::{
    CallHandle, CallId, CallSessionCoordinator, CallSignal, CallState, CaptureGrant,
    CoordinatorBuilder, CoordinatorConfig, DeviceError, MediaDevices, ParticipantId,
    ParticipantProfile, PlatformError, RealtimePlatform, TokenProvider,
};

const SIGNAL_BUFFER: usize = 32;

/// Which side of the call a handle instance belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caller,
    Callee,
}

#[derive(Debug)]
struct CallCore {
    id: CallId,
    caller: ParticipantId,
    callee: ParticipantId,
}

/// Scripted failure switches, shared by both sides of a call
#[derive(Debug, Default)]
pub struct CallFlags {
    pub fail_join: AtomicBool,
    pub fail_ring: AtomicBool,
    pub fail_leave: AtomicBool,
    pub fail_reject: AtomicBool,
}

pub struct MockCallHandle {
    core: Arc<CallCore>,
    role: Role,
    hub: Arc<MockHub>,
    pub flags: Arc<CallFlags>,
    pub joined: AtomicBool,
    pub rang: AtomicBool,
    pub left: AtomicBool,
    pub rejected: AtomicBool,
}

impl MockCallHandle {
    fn new(core: Arc<CallCore>, role: Role, hub: Arc<MockHub>, flags: Arc<CallFlags>) -> Self {
        Self {
            core,
            role,
            hub,
            flags,
            joined: AtomicBool::new(false),
            rang: AtomicBool::new(false),
            left: AtomicBool::new(false),
            rejected: AtomicBool::new(false),
        }
    }

    /// A caller-side handle not registered with any platform, for driving
    /// inbound-ring tests through `MockPlatform::inject`
    pub fn standalone(
        hub: &Arc<MockHub>,
        caller: impl Into<ParticipantId>,
        callee: impl Into<ParticipantId>,
    ) -> Arc<Self> {
        let core = Arc::new(CallCore {
            id: Uuid::new_v4(),
            caller: caller.into(),
            callee: callee.into(),
        });
        Arc::new(Self::new(
            core,
            Role::Callee,
            hub.clone(),
            Arc::new(CallFlags::default()),
        ))
    }

    /// The callee-side view of this call, as delivered inside a `Ring`
    pub fn callee_side(&self) -> Arc<MockCallHandle> {
        Arc::new(MockCallHandle::new(
            self.core.clone(),
            Role::Callee,
            self.hub.clone(),
            self.flags.clone(),
        ))
    }

    pub fn ring_signal(self: &Arc<Self>) -> CallSignal {
        CallSignal::Ring {
            call: self.clone(),
            from: self.core.caller.clone(),
            to: self.core.callee.clone(),
        }
    }
}

impl std::fmt::Debug for MockCallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCallHandle")
            .field("id", &self.core.id)
            .field("role", &self.role)
            .field("joined", &self.joined)
            .field("left", &self.left)
            .finish()
    }
}

#[async_trait]
impl CallHandle for MockCallHandle {
    fn id(&self) -> CallId {
        self.core.id
    }

    async fn join(&self) -> Result<(), PlatformError> {
        if self.flags.fail_join.load(Ordering::SeqCst) {
            return Err(PlatformError::new("scripted join failure"));
        }
        self.joined.store(true, Ordering::SeqCst);
        if self.role == Role::Callee {
            self.hub.deliver(
                &self.core.caller,
                CallSignal::Accepted {
                    call_id: self.core.id,
                    by: self.core.callee.clone(),
                },
            );
        }
        Ok(())
    }

    async fn ring(&self) -> Result<(), PlatformError> {
        if self.flags.fail_ring.load(Ordering::SeqCst) {
            return Err(PlatformError::new("scripted ring failure"));
        }
        self.rang.store(true, Ordering::SeqCst);
        let callee_handle: Arc<dyn CallHandle> = self.callee_side();
        self.hub.deliver(
            &self.core.callee,
            CallSignal::Ring {
                call: callee_handle,
                from: self.core.caller.clone(),
                to: self.core.callee.clone(),
            },
        );
        Ok(())
    }

    async fn leave(&self) -> Result<(), PlatformError> {
        if self.flags.fail_leave.load(Ordering::SeqCst) {
            return Err(PlatformError::new("scripted leave failure"));
        }
        self.left.store(true, Ordering::SeqCst);
        let counterpart = match self.role {
            Role::Caller => &self.core.callee,
            Role::Callee => &self.core.caller,
        };
        self.hub
            .deliver(counterpart, CallSignal::Ended { call_id: self.core.id });
        Ok(())
    }

    async fn reject(&self) -> Result<(), PlatformError> {
        if self.flags.fail_reject.load(Ordering::SeqCst) {
            return Err(PlatformError::new("scripted reject failure"));
        }
        self.rejected.store(true, Ordering::SeqCst);
        if self.role == Role::Callee {
            self.hub.deliver(
                &self.core.caller,
                CallSignal::Rejected {
                    call_id: self.core.id,
                    by: self.core.callee.clone(),
                },
            );
        }
        Ok(())
    }
}

/// Relay connecting the per-participant mock platforms
pub struct MockHub {
    participants: DashMap<ParticipantId, broadcast::Sender<CallSignal>>,
}

impl MockHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            participants: DashMap::new(),
        })
    }

    /// Platform client for one participant, joining them to the hub
    pub fn platform(self: &Arc<Self>, id: impl Into<ParticipantId>) -> Arc<MockPlatform> {
        let id = id.into();
        let sender = self
            .participants
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(SIGNAL_BUFFER).0)
            .clone();
        Arc::new(MockPlatform {
            hub: self.clone(),
            local: id,
            signals: sender,
            flags: Arc::new(CallFlags::default()),
            created: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
        })
    }

    fn deliver(&self, to: &ParticipantId, signal: CallSignal) {
        if let Some(sender) = self.participants.get(to) {
            let _ = sender.send(signal);
        }
    }
}

/// One participant's connection to the scripted platform
pub struct MockPlatform {
    hub: Arc<MockHub>,
    local: ParticipantId,
    signals: broadcast::Sender<CallSignal>,
    /// Failure switches applied to every call this platform creates
    pub flags: Arc<CallFlags>,
    created: Mutex<Vec<Arc<MockCallHandle>>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_connect: AtomicBool,
}

impl MockPlatform {
    /// Push a signal into this participant's stream, bypassing the relay
    pub fn inject(&self, signal: CallSignal) {
        let _ = self.signals.send(signal);
    }

    /// The most recently created caller-side handle
    pub fn last_call(&self) -> Option<Arc<MockCallHandle>> {
        self.created.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RealtimePlatform for MockPlatform {
    async fn connect(
        &self,
        _profile: &ParticipantProfile,
        _token: &str,
    ) -> Result<(), PlatformError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PlatformError::new("scripted connect failure"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_call(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
    ) -> Result<Arc<dyn CallHandle>, PlatformError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PlatformError::new("scripted create_call failure"));
        }
        let core = Arc::new(CallCore {
            id: Uuid::new_v4(),
            caller: local.clone(),
            callee: remote.clone(),
        });
        let handle = Arc::new(MockCallHandle::new(
            core,
            Role::Caller,
            self.hub.clone(),
            self.flags.clone(),
        ));
        self.created.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    fn signals(&self) -> broadcast::Receiver<CallSignal> {
        self.signals.subscribe()
    }
}

struct MockGrant {
    releases: Arc<AtomicUsize>,
}

impl CaptureGrant for MockGrant {}

impl Drop for MockGrant {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Capture probe double with scripted classification failures
#[derive(Default)]
pub struct MockDevices {
    failure: Mutex<Option<DeviceError>>,
    pub acquisitions: AtomicUsize,
    pub releases: Arc<AtomicUsize>,
}

impl MockDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, error: DeviceError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

#[async_trait]
impl MediaDevices for MockDevices {
    async fn acquire(&self) -> Result<Box<dyn CaptureGrant>, DeviceError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockGrant {
            releases: self.releases.clone(),
        }))
    }
}

/// Token provider double
#[derive(Default)]
pub struct MockTokens {
    pub fail: AtomicBool,
    pub issued: AtomicUsize,
}

impl MockTokens {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TokenProvider for MockTokens {
    async fn issue_token(&self, id: &ParticipantId) -> Result<String, PlatformError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlatformError::new("scripted token failure"));
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("tok-{id}"))
    }
}

/// Short timer windows so the suite stays fast
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::new()
        .with_ring_timeout(Duration::from_millis(200))
        .with_settle_delay(Duration::from_millis(50))
        .with_label("test")
}

/// Build and start a coordinator wired to the hub
pub async fn started_coordinator(
    hub: &Arc<MockHub>,
    id: &str,
) -> (Arc<CallSessionCoordinator>, Arc<MockPlatform>) {
    let platform = hub.platform(id);
    let coordinator = CoordinatorBuilder::new()
        .local(id)
        .platform(platform.clone())
        .config(test_config())
        .build()
        .await
        .expect("failed to build coordinator");
    coordinator.start().await.expect("failed to start coordinator");
    (coordinator, platform)
}

/// Wait until the coordinator reaches `state`, with a hard timeout
pub async fn wait_for_state(coordinator: &CallSessionCoordinator, state: CallState) {
    let mut rx = coordinator.watch_state();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {state}"))
        .expect("state channel closed");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tutorcall_call_core=debug")
        .with_test_writer()
        .try_init();
}
