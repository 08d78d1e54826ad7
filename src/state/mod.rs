/// Per-room change bus.
pub mod bus;
/// Presence tracking of connected devices.
pub mod presence;
/// Mounted host sessions.
pub mod session;
mod sse;
/// Room lifecycle transitions.
pub mod state_machine;
/// Question countdown.
pub mod timer;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{room::RoomRepository, room_store::RoomStore},
    error::ServiceError,
};

pub use self::sse::SseHub;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Snapshot};
use self::{bus::ChangeBus, presence::PresenceRegistry, session::HostSession};

/// Handle shared by every route.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, change bus, presence and mounted host sessions.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    bus: Arc<ChangeBus>,
    presence: Arc<PresenceRegistry>,
    sessions: DashMap<Uuid, Arc<HostSession>>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let bus = ChangeBus::new(config.bus_capacity());
        let presence = PresenceRegistry::new(bus.clone());
        Arc::new(Self {
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            bus,
            presence,
            sessions: DashMap::new(),
            config: Arc::new(config),
        })
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Repository over the installed store, or [`ServiceError::Degraded`].
    pub async fn repository(&self) -> Result<RoomRepository, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        let store = self.room_store().await.ok_or(ServiceError::Degraded)?;
        Ok(RoomRepository::new(store, self.bus.clone()))
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Change bus shared by repositories and subscribers.
    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    /// Presence registry.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Mount a host session on `room_id`, closing any session already mounted there.
    pub async fn mount_session(&self, room_id: Uuid) -> Result<Arc<HostSession>, ServiceError> {
        if let Some((_, previous)) = self.sessions.remove(&room_id) {
            info!(room_id = %room_id, "replacing mounted host session");
            previous.close().await;
        }

        let repo = self.repository().await?;
        let session = HostSession::mount(
            room_id,
            repo,
            &self.bus,
            self.presence.clone(),
            self.config.clone(),
        )
        .await?;

        if let Some(raced) = self.sessions.insert(room_id, session.clone()) {
            raced.close().await;
        }
        Ok(session)
    }

    /// Session mounted on `room_id`, if any.
    pub fn session(&self, room_id: Uuid) -> Option<Arc<HostSession>> {
        self.sessions.get(&room_id).map(|entry| entry.value().clone())
    }

    /// Number of mounted host sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close and forget the session mounted on `room_id`. Returns whether one existed.
    pub async fn unmount_session(&self, room_id: Uuid) -> bool {
        match self.sessions.remove(&room_id) {
            Some((_, session)) => {
                session.close().await;
                true
            }
            None => false,
        }
    }
}
