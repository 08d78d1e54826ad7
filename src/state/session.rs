//! Host session: the authoritative driver of one room.
//!
//! Mounting runs the reset barrier, then a dispatch loop consumes bus events
//! and timer signals to keep [`HostView`] current and push snapshots to the
//! host stream. Only the session writes room status and question index.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use indexmap::IndexMap;
use tokio::{
    sync::{Mutex, RwLock, broadcast, broadcast::error::RecvError, mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        models::{PlayerEntity, RoomEntity, RoomStatus},
        room::RoomRepository,
        storage::StorageResult,
    },
    dto::{
        host::{HostSnapshot, TimerTick},
        sse::{ServerEvent, SessionClosedEvent},
    },
    error::ServiceError,
    state::{
        SseHub,
        bus::{ChangeBus, ChangeEvent, Subscription},
        presence::PresenceRegistry,
        state_machine::{
            EndReason, SessionEvent, SessionPhase, SessionStateMachine, TransitionContext,
        },
        timer::{TimerAuthority, TimerSignal, seed_seconds},
    },
};

const HOST_STREAM_CAPACITY: usize = 32;
/// SSE event name of a full host snapshot.
pub const SNAPSHOT_EVENT: &str = "host.snapshot";
/// SSE event name of a countdown tick.
pub const TICK_EVENT: &str = "timer.tick";
/// SSE event name sent when the session is torn down.
pub const CLOSED_EVENT: &str = "session.closed";

/// Local cache rendered by the host.
#[derive(Debug, Default, Clone)]
pub struct HostView {
    /// Last known room row.
    pub room: Option<RoomEntity>,
    /// Players in insertion order, keyed by id.
    pub players: IndexMap<Uuid, PlayerEntity>,
    /// Devices attached to the presence channel.
    pub online_devices: HashSet<String>,
    /// Countdown of the running question.
    pub time_left: Option<u32>,
}

impl HostView {
    /// Whether `device_id` is attached.
    pub fn is_online(&self, device_id: &str) -> bool {
        self.online_devices.contains(device_id)
    }

    /// Insert or replace a player; an existing id keeps its position.
    pub fn upsert_player(&mut self, player: PlayerEntity) {
        self.players.insert(player.id, player);
    }

    /// Replace a player already in the view. Unknown ids are left out.
    pub fn update_player(&mut self, player: PlayerEntity) -> bool {
        match self.players.get_mut(&player.id) {
            Some(slot) => {
                *slot = player;
                true
            }
            None => false,
        }
    }

    fn replace_players(&mut self, players: Vec<PlayerEntity>) {
        self.players = players
            .into_iter()
            .map(|player| (player.id, player))
            .collect();
    }
}

/// Handle on a mounted host session.
pub struct HostSession {
    inner: Arc<SessionInner>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

struct SessionInner {
    room_id: Uuid,
    repo: RoomRepository,
    presence: Arc<PresenceRegistry>,
    config: Arc<AppConfig>,
    machine: Mutex<SessionStateMachine>,
    gate: Mutex<()>,
    view: RwLock<HostView>,
    timer: Mutex<TimerAuthority>,
    /// Asks the dispatch loop to drop its subscription and open a fresh one.
    resubscribe: mpsc::UnboundedSender<oneshot::Sender<()>>,
    ready: AtomicBool,
    closed: AtomicBool,
    hub: SseHub,
}

impl HostSession {
    /// Mount a session on `room_id`.
    ///
    /// Runs the barrier in order: (a) reset write awaited, (b) local player
    /// cache discarded, (c) subscription opened then room and players fetched,
    /// (d) session marked ready. Events received between (c) and the end of
    /// the fetch are applied afterwards as upserts by id.
    pub async fn mount(
        room_id: Uuid,
        repo: RoomRepository,
        bus: &Arc<ChangeBus>,
        presence: Arc<PresenceRegistry>,
        config: Arc<AppConfig>,
    ) -> Result<Arc<Self>, ServiceError> {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (resubscribe_tx, resubscribe_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            room_id,
            repo,
            presence,
            config,
            machine: Mutex::new(SessionStateMachine::default()),
            gate: Mutex::new(()),
            view: RwLock::new(HostView::default()),
            timer: Mutex::new(TimerAuthority::new(signals_tx)),
            resubscribe: resubscribe_tx,
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            hub: SseHub::new(HOST_STREAM_CAPACITY),
        });

        inner.run_transition(SessionEvent::Reset, None).await?;

        inner.view.write().await.players.clear();

        let subscription = bus.subscribe(room_id);
        inner.resync().await?;

        inner.ready.store(true, Ordering::SeqCst);
        info!(room_id = %room_id, "host session ready");
        inner.publish_snapshot().await;

        let task = tokio::spawn(dispatch_loop(
            inner.clone(),
            bus.clone(),
            subscription,
            signals_rx,
            resubscribe_rx,
        ));

        Ok(Arc::new(Self {
            inner,
            dispatch: Mutex::new(Some(task)),
        }))
    }

    /// Room this session drives.
    pub fn room_id(&self) -> Uuid {
        self.inner.room_id
    }

    /// Whether the mount barrier completed and the session was not closed.
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Subscribe to the host stream (snapshots and timer ticks).
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.hub.subscribe()
    }

    /// Current host snapshot.
    pub async fn snapshot(&self) -> HostSnapshot {
        self.inner.snapshot().await
    }

    /// Current state machine phase.
    pub async fn phase(&self) -> SessionPhase {
        self.inner.machine.lock().await.phase()
    }

    /// Start the question at `index`.
    pub async fn start_question(&self, index: usize) -> Result<RoomEntity, ServiceError> {
        self.inner
            .drive(SessionEvent::StartQuestion { index }, None)
            .await
    }

    /// End the running question.
    pub async fn end_question(&self) -> Result<RoomEntity, ServiceError> {
        self.inner
            .drive(SessionEvent::EndQuestion(EndReason::HostAction), None)
            .await
    }

    /// Show the leaderboard.
    pub async fn show_leaderboard(&self) -> Result<RoomEntity, ServiceError> {
        self.inner.drive(SessionEvent::ShowLeaderboard, None).await
    }

    /// Next question, or the podium after the last one.
    pub async fn advance(&self) -> Result<RoomEntity, ServiceError> {
        self.inner.drive(SessionEvent::Advance, None).await
    }

    /// Wipe players and return to the lobby.
    pub async fn reset(&self) -> Result<RoomEntity, ServiceError> {
        self.inner.drive(SessionEvent::Reset, None).await
    }

    /// Tear the session down: stop the dispatch loop, drop the subscription,
    /// cancel the timer and end host streams. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.ready.store(false, Ordering::SeqCst);

        let task = self.dispatch.lock().await.take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        self.inner.timer.lock().await.cancel();

        let room_id = self.inner.room_id;
        if let Err(err) = self
            .inner
            .hub
            .publish(CLOSED_EVENT, &SessionClosedEvent { room_id })
        {
            warn!(room_id = %room_id, error = %err, "failed to serialise close event");
        }
        info!(room_id = %room_id, "host session closed");
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.dispatch.try_lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

impl SessionInner {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<(), ServiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::InvalidState("host session is closed".into()));
        }
        if !self.ready.load(Ordering::SeqCst) {
            return Err(ServiceError::InvalidState("host session is not ready".into()));
        }
        Ok(())
    }

    async fn load_room(&self) -> Result<RoomEntity, ServiceError> {
        self.repo
            .find_room(self.room_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("room `{}` not found", self.room_id)))
    }

    /// Run a host command end to end and fold its result into the view.
    async fn drive(
        &self,
        event: SessionEvent,
        expected: Option<SessionPhase>,
    ) -> Result<RoomEntity, ServiceError> {
        self.ensure_ready()?;
        let room = self.run_transition(event, expected).await?;

        if event == SessionEvent::Reset {
            // Events queued before the wipe must not repopulate the view.
            self.renew_subscription().await;
            self.resync().await?;
        } else {
            self.on_room(room.clone()).await;
        }
        self.publish_snapshot().await;
        Ok(room)
    }

    /// Plan against the stored row, write it within the transition timeout,
    /// then apply the plan, or abort it if the write failed.
    async fn run_transition(
        &self,
        event: SessionEvent,
        expected: Option<SessionPhase>,
    ) -> Result<RoomEntity, ServiceError> {
        let _gate = self.gate.lock().await;

        let room = self.load_room().await?;
        let player_count = self.repo.list_players(self.room_id).await?.len();
        let context = TransitionContext {
            question_count: room.game_data.len(),
            player_count,
        };

        let plan = {
            let mut machine = self.machine.lock().await;
            machine.observe(SessionPhase::of(&room));
            if let Some(expected) = expected {
                let current = machine.phase();
                if current != expected {
                    return Err(ServiceError::InvalidState(format!(
                        "room moved to {current} before {event:?} could run"
                    )));
                }
            }
            machine.plan(event, context)?
        };

        let next = plan.apply_to(room, SystemTime::now());
        let outcome = match timeout(
            self.config.transition_timeout(),
            self.write_transition(event, next.clone()),
        )
        .await
        {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::Timeout),
        };

        match outcome {
            Ok(()) => {
                let phase = self.machine.lock().await.apply(plan.id)?;
                info!(room_id = %self.room_id, event = ?event, phase = %phase, "transition applied");
                Ok(next)
            }
            Err(err) => {
                if let Err(abort_err) = self.machine.lock().await.abort(plan.id) {
                    warn!(
                        event = ?event,
                        plan_id = %plan.id,
                        error = ?abort_err,
                        "failed to abort transition after write error"
                    );
                }
                warn!(room_id = %self.room_id, event = ?event, error = %err, "transition write failed");
                Err(err)
            }
        }
    }

    async fn write_transition(&self, event: SessionEvent, room: RoomEntity) -> StorageResult<()> {
        if event == SessionEvent::Reset {
            let removed = self.repo.delete_players(self.room_id).await?;
            debug!(room_id = %self.room_id, removed, "players cleared");
        }
        self.repo.save_room(room).await
    }

    /// Wait until the dispatch loop listens on a subscription opened after now.
    async fn renew_subscription(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.resubscribe.send(ack_tx).is_err() || ack_rx.await.is_err() {
            debug!(room_id = %self.room_id, "dispatch loop gone; subscription not renewed");
        }
    }

    /// Replace the view with the authoritative room and player list.
    async fn resync(&self) -> Result<(), ServiceError> {
        let room = self.load_room().await?;
        let players = self.repo.list_players(self.room_id).await?;
        let online = self.presence.devices(self.room_id);
        {
            let mut view = self.view.write().await;
            view.replace_players(players);
            view.online_devices = online.into_iter().collect();
            // Force the room through `on_room` even if an older copy is cached.
            if let Some(cached) = view.room.as_mut() {
                cached.updated_at = SystemTime::UNIX_EPOCH;
            }
        }
        self.on_room(room).await;
        Ok(())
    }

    /// Fold a room row into the view, arming or cancelling the timer when the
    /// room enters or leaves `active`. Rows older than the cached one are ignored.
    async fn on_room(&self, room: RoomEntity) {
        let previous = {
            let mut view = self.view.write().await;
            if let Some(cached) = view.room.as_ref() {
                if room.updated_at < cached.updated_at {
                    debug!(room_id = %self.room_id, "ignoring stale room update");
                    return;
                }
            }
            let previous = view.room.as_ref().map(SessionPhase::of);
            if room.status != RoomStatus::Active {
                view.time_left = None;
            }
            view.room = Some(room.clone());
            previous
        };

        self.machine.lock().await.observe(SessionPhase::of(&room));

        let mut timer = self.timer.lock().await;
        if room.status != RoomStatus::Active {
            timer.cancel();
            return;
        }

        let entered = previous.is_none_or(|phase| {
            phase.status != RoomStatus::Active
                || phase.question_index != room.current_question_index
        });
        if !entered {
            return;
        }

        match room.current_question() {
            Some(question) => {
                let seconds = seed_seconds(
                    question,
                    room.config.question_timer_multiplier,
                    self.config.default_time_limit_secs(),
                );
                timer.arm(room.current_question_index, seconds);
            }
            None => {
                timer.cancel();
                warn!(
                    room_id = %self.room_id,
                    index = room.current_question_index,
                    "active room points at a missing question; timer not armed"
                );
            }
        }
    }

    async fn on_change(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::PlayerJoined(player) => {
                self.view.write().await.upsert_player(player);
            }
            ChangeEvent::PlayerUpdated(player) => {
                if !self.view.write().await.update_player(player) {
                    debug!(room_id = %self.room_id, "ignoring update of a player not in the view");
                    return;
                }
            }
            ChangeEvent::RoomUpdated(room) => self.on_room(room).await,
            ChangeEvent::PresenceSync { device_ids } => {
                self.view.write().await.online_devices = device_ids.into_iter().collect();
            }
        }
        self.publish_snapshot().await;
    }

    async fn on_timer(&self, signal: TimerSignal) {
        match signal {
            TimerSignal::Tick {
                question_index,
                remaining,
            } => {
                {
                    let mut view = self.view.write().await;
                    let running = view.room.as_ref().is_some_and(|room| {
                        room.status == RoomStatus::Active
                            && room.current_question_index == question_index
                    });
                    if !running {
                        return;
                    }
                    view.time_left = Some(remaining);
                }
                let tick = TimerTick {
                    question_index,
                    time_left: remaining,
                };
                if let Err(err) = self.hub.publish(TICK_EVENT, &tick) {
                    warn!(error = %err, "failed to serialise timer tick");
                }
            }
            TimerSignal::Expired { question_index } => {
                let expected = SessionPhase::new(RoomStatus::Active, question_index);
                match self
                    .drive(SessionEvent::EndQuestion(EndReason::TimerExpired), Some(expected))
                    .await
                {
                    Ok(_) => info!(room_id = %self.room_id, question_index, "question ended by timer"),
                    Err(err) => {
                        warn!(room_id = %self.room_id, question_index, error = %err, "timer could not end question")
                    }
                }
            }
        }
    }

    async fn snapshot(&self) -> HostSnapshot {
        let view = self.view.read().await;
        HostSnapshot::build(&view, &self.config, self.is_ready())
    }

    async fn publish_snapshot(&self) {
        let snapshot = self.snapshot().await;
        match self.hub.publish(SNAPSHOT_EVENT, &snapshot) {
            Ok(streams) => debug!(room_id = %self.room_id, streams, "host snapshot published"),
            Err(err) => warn!(room_id = %self.room_id, error = %err, "failed to serialise host snapshot"),
        }
    }
}

async fn dispatch_loop(
    inner: Arc<SessionInner>,
    bus: Arc<ChangeBus>,
    mut subscription: Subscription,
    mut signals: mpsc::UnboundedReceiver<TimerSignal>,
    mut resubscribe: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
) {
    let room_id = subscription.room_id();
    loop {
        tokio::select! {
            biased;
            Some(ack) = resubscribe.recv() => {
                subscription = bus.subscribe(room_id);
                debug!(room_id = %room_id, "host subscription renewed");
                let _ = ack.send(());
            }
            received = subscription.recv() => match received {
                Ok(event) => {
                    debug!(room_id = %room_id, kind = event.kind(), "host dispatch");
                    inner.on_change(event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room_id = %room_id, skipped, "host session lagged; resynchronising");
                    if let Err(err) = inner.resync().await {
                        warn!(room_id = %room_id, error = %err, "resync failed");
                    }
                    inner.publish_snapshot().await;
                }
                Err(RecvError::Closed) => break,
            },
            Some(signal) = signals.recv() => inner.on_timer(signal).await,
        }
    }
    debug!(room_id = %room_id, "host dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::{
        models::{ChoiceOption, Difficulty, Question, QuestionContent, RoomConfig},
        room_store::{InMemoryRoomStore, RoomStore},
    };

    struct Fixture {
        store: InMemoryRoomStore,
        repo: RoomRepository,
        bus: Arc<ChangeBus>,
        presence: Arc<PresenceRegistry>,
        config: Arc<AppConfig>,
        room_id: Uuid,
    }

    fn question(id: &str, time_limit: u32) -> Question {
        Question {
            id: id.into(),
            statement: format!("statement {id}"),
            difficulty: Difficulty::Medium,
            time_limit: Some(time_limit),
            content: QuestionContent::MultipleChoice {
                options: vec![
                    ChoiceOption {
                        id: "a".into(),
                        text: "A".into(),
                        is_correct: true,
                    },
                    ChoiceOption {
                        id: "b".into(),
                        text: "B".into(),
                        is_correct: false,
                    },
                ],
            },
        }
    }

    async fn fixture(status: RoomStatus, questions: Vec<Question>) -> Fixture {
        let store = InMemoryRoomStore::new();
        let bus = ChangeBus::new(64);
        let presence = PresenceRegistry::new(bus.clone());
        let repo = RoomRepository::new(Arc::new(store.clone()), bus.clone());
        let now = SystemTime::now();
        let room = RoomEntity {
            id: Uuid::new_v4(),
            pin_code: "424242".into(),
            host_id: "host".into(),
            title: "Quiz".into(),
            config: RoomConfig::default(),
            status,
            current_question_index: if status == RoomStatus::Waiting { -1 } else { 0 },
            question_start_at: None,
            is_showing_results: false,
            game_data: questions,
            created_at: now,
            updated_at: now,
        };
        let room_id = room.id;
        store.insert_room(room).await.unwrap();
        Fixture {
            store,
            repo,
            bus,
            presence,
            config: Arc::new(AppConfig::default()),
            room_id,
        }
    }

    impl Fixture {
        async fn mount(&self) -> Arc<HostSession> {
            HostSession::mount(
                self.room_id,
                self.repo.clone(),
                &self.bus,
                self.presence.clone(),
                self.config.clone(),
            )
            .await
            .unwrap()
        }

        async fn join(&self, nickname: &str) -> PlayerEntity {
            let player = PlayerEntity {
                id: Uuid::new_v4(),
                room_id: self.room_id,
                nickname: nickname.into(),
                device_id: format!("device-{nickname}"),
                score: 0,
                streak: 0,
                last_answer: None,
                joined_at: SystemTime::now(),
            };
            self.repo.insert_player(player.clone()).await.unwrap();
            player
        }

        async fn stored_room(&self) -> RoomEntity {
            self.store.find_room(self.room_id).await.unwrap().unwrap()
        }
    }

    /// Wait for the next snapshot matching `predicate`.
    async fn wait_for_snapshot(
        rx: &mut broadcast::Receiver<ServerEvent>,
        predicate: impl Fn(&serde_json::Value) -> bool,
    ) -> serde_json::Value {
        loop {
            let event = rx.recv().await.unwrap();
            if event.event.as_deref() != Some(SNAPSHOT_EVENT) {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&event.data).unwrap();
            if predicate(&value) {
                return value;
            }
        }
    }

    #[tokio::test]
    async fn mount_resets_room_and_discards_players() {
        let fx = fixture(RoomStatus::Leaderboard, vec![question("q1", 10)]).await;
        fx.store
            .insert_player(PlayerEntity {
                id: Uuid::new_v4(),
                room_id: fx.room_id,
                nickname: "stale".into(),
                device_id: "stale-device".into(),
                score: 900,
                streak: 4,
                last_answer: Some("a".into()),
                joined_at: SystemTime::now(),
            })
            .await
            .unwrap();

        let session = fx.mount().await;

        let room = fx.stored_room().await;
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.current_question_index, -1);
        assert!(!room.is_showing_results);
        assert!(fx.store.list_players(fx.room_id).await.unwrap().is_empty());

        let snapshot = session.snapshot().await;
        assert!(snapshot.ready);
        assert!(snapshot.players.is_empty());
        assert_eq!(session.phase().await, SessionPhase::new(RoomStatus::Waiting, -1));
        session.close().await;
    }

    #[tokio::test]
    async fn players_joining_after_mount_reach_the_host() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 10)]).await;
        let session = fx.mount().await;
        let mut rx = session.subscribe();

        let ana = fx.join("ana").await;
        let snapshot =
            wait_for_snapshot(&mut rx, |value| value["players"].as_array().unwrap().len() == 1)
                .await;
        assert_eq!(snapshot["players"][0]["id"], ana.id.to_string());
        assert_eq!(snapshot["players"][0]["online"], false);

        let _guard = fx.presence.track(fx.room_id, ana.device_id.clone());
        let snapshot =
            wait_for_snapshot(&mut rx, |value| value["players"][0]["online"] == true).await;
        assert_eq!(snapshot["players"][0]["nickname"], "ana");
        session.close().await;
    }

    #[tokio::test]
    async fn start_requires_a_player() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 10)]).await;
        let session = fx.mount().await;

        let err = session.start_question(0).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(fx.stored_room().await.status, RoomStatus::Waiting);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expiry_ends_the_question() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 3)]).await;
        let session = fx.mount().await;
        fx.join("ana").await;
        let mut rx = session.subscribe();

        let room = session.start_question(0).await.unwrap();
        assert_eq!(room.status, RoomStatus::Active);
        assert!(room.question_start_at.is_some());

        let snapshot =
            wait_for_snapshot(&mut rx, |value| value["room"]["status"] == "question_ended").await;
        assert_eq!(snapshot["vote_tally"][0]["option_id"], "a");
        assert_eq!(fx.stored_room().await.status, RoomStatus::QuestionEnded);
        assert!(snapshot["time_left"].is_null());
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timer_publishes_ticks() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 2)]).await;
        let session = fx.mount().await;
        fx.join("ana").await;
        let mut rx = session.subscribe();
        session.start_question(0).await.unwrap();

        let mut ticks = Vec::new();
        while ticks.len() < 3 {
            let event = rx.recv().await.unwrap();
            if event.event.as_deref() == Some(TICK_EVENT) {
                let value: serde_json::Value = serde_json::from_str(&event.data).unwrap();
                ticks.push(value["time_left"].as_u64().unwrap());
            }
        }
        assert_eq!(ticks, vec![2, 1, 0]);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn host_end_cancels_the_timer() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 5), question("q2", 5)]).await;
        let session = fx.mount().await;
        fx.join("ana").await;

        session.start_question(0).await.unwrap();
        session.end_question().await.unwrap();
        session.show_leaderboard().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;

        let room = fx.stored_room().await;
        assert_eq!(room.status, RoomStatus::Leaderboard);
        assert_eq!(room.current_question_index, 0);
        session.close().await;
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_phase() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 30)]).await;
        let session = fx.mount().await;
        fx.join("ana").await;
        session.start_question(0).await.unwrap();

        fx.store.set_fail_writes(true);
        let err = session.end_question().await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(session.phase().await, SessionPhase::new(RoomStatus::Active, 0));
        assert_eq!(fx.stored_room().await.status, RoomStatus::Active);

        fx.store.set_fail_writes(false);
        let room = session.end_question().await.unwrap();
        assert_eq!(room.status, RoomStatus::QuestionEnded);
        session.close().await;
    }

    #[tokio::test]
    async fn full_game_reaches_the_podium() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 30), question("q2", 30)]).await;
        let session = fx.mount().await;
        let ana = fx.join("ana").await;
        let bob = fx.join("bob").await;

        session.start_question(0).await.unwrap();
        session.end_question().await.unwrap();
        session.show_leaderboard().await.unwrap();
        let room = session.advance().await.unwrap();
        assert_eq!(room.status, RoomStatus::Active);
        assert_eq!(room.current_question_index, 1);

        fx.repo
            .save_player(PlayerEntity {
                score: 1200,
                streak: 3,
                ..bob.clone()
            })
            .await
            .unwrap();
        fx.repo
            .save_player(PlayerEntity {
                score: 800,
                ..ana.clone()
            })
            .await
            .unwrap();

        session.end_question().await.unwrap();
        session.show_leaderboard().await.unwrap();
        let room = session.advance().await.unwrap();
        assert_eq!(room.status, RoomStatus::Finished);

        let mut rx = session.subscribe();
        // Player updates are folded in by the dispatch loop.
        let snapshot = loop {
            let snapshot = session.snapshot().await;
            if snapshot.players.iter().any(|p| p.player.score == 1200) {
                break snapshot;
            }
            let _ = rx.recv().await;
        };
        let podium = snapshot.podium.unwrap();
        assert_eq!(podium[0].player_id, bob.id);
        assert!(podium[0].on_fire);
        assert_eq!(podium[1].player_id, ana.id);

        let err = session.advance().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        session.close().await;
    }

    #[tokio::test]
    async fn reset_wipes_players_and_returns_to_lobby() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 30)]).await;
        let session = fx.mount().await;
        fx.join("ana").await;
        session.start_question(0).await.unwrap();

        let room = session.reset().await.unwrap();
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.current_question_index, -1);
        assert!(session.snapshot().await.players.is_empty());
        assert!(fx.store.list_players(fx.room_id).await.unwrap().is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn queued_player_events_do_not_survive_a_reset() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 30)]).await;
        let session = fx.mount().await;
        let ana = fx.join("ana").await;
        session.start_question(0).await.unwrap();
        // Both events are still queued for the dispatch loop when the reset runs.
        fx.repo
            .save_player(PlayerEntity { score: 500, ..ana })
            .await
            .unwrap();
        session.reset().await.unwrap();

        let mut rx = session.subscribe();
        let bob = fx.join("bob").await;
        let snapshot = wait_for_snapshot(&mut rx, |value| {
            value["players"]
                .as_array()
                .unwrap()
                .iter()
                .any(|p| p["nickname"] == "bob")
        })
        .await;
        let players = snapshot["players"].as_array().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["id"], bob.id.to_string());
        assert_eq!(session.snapshot().await.players.len(), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn player_write_racing_a_reset_is_dropped() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 30)]).await;
        let session = fx.mount().await;
        let ana = fx.join("ana").await;
        session.start_question(0).await.unwrap();
        let stale = fx
            .repo
            .find_player(fx.room_id, ana.id)
            .await
            .unwrap()
            .unwrap();

        session.reset().await.unwrap();
        let saved = fx
            .repo
            .save_player(PlayerEntity { score: 900, ..stale })
            .await
            .unwrap();

        assert!(!saved);
        assert!(fx.store.list_players(fx.room_id).await.unwrap().is_empty());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(session.snapshot().await.players.is_empty());
        session.close().await;
    }

    #[test]
    fn update_of_an_unknown_player_is_ignored() {
        let mut view = HostView::default();
        let player = PlayerEntity {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            nickname: "ghost".into(),
            device_id: "d".into(),
            score: 10,
            streak: 0,
            last_answer: None,
            joined_at: SystemTime::now(),
        };
        assert!(!view.update_player(player.clone()));
        assert!(view.players.is_empty());

        view.upsert_player(player.clone());
        assert!(view.update_player(PlayerEntity { score: 20, ..player }));
        assert_eq!(view.players.values().next().unwrap().score, 20);
    }

    #[tokio::test]
    async fn closed_session_rejects_commands_and_detaches() {
        let fx = fixture(RoomStatus::Waiting, vec![question("q1", 30)]).await;
        let session = fx.mount().await;
        assert_eq!(fx.bus.subscriber_count(fx.room_id), 1);

        session.close().await;
        assert!(!session.is_ready());
        assert!(!fx.bus.has_topic(fx.room_id));
        let err = session.start_question(0).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[test]
    fn missing_question_is_reported_not_repaired() {
        let now = SystemTime::now();
        let view = HostView {
            room: Some(RoomEntity {
                id: Uuid::new_v4(),
                pin_code: "000000".into(),
                host_id: "h".into(),
                title: "t".into(),
                config: RoomConfig::default(),
                status: RoomStatus::Active,
                current_question_index: 4,
                question_start_at: Some(now),
                is_showing_results: false,
                game_data: vec![question("q1", 10)],
                created_at: now,
                updated_at: now,
            }),
            ..Default::default()
        };

        let snapshot = HostSnapshot::build(&view, &AppConfig::default(), true);
        assert!(snapshot.question.is_none());
        assert!(snapshot.question_error.is_some());
        assert_eq!(view.room.unwrap().current_question_index, 4);
    }
}
