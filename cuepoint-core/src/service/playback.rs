//! Playback session manager
//!
//! Sessions live in a `DashMap` behind per-session async mutexes: a session
//! operation may await the decision engine or the catalog while holding its
//! own session, but never anything else.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    config::SessionConfig,
    models::{
        CapabilityDeclaration, DecideRequest, DecisionAction, DecisionStatus, GeneratorId,
        HeartbeatAck, HeartbeatRequest, ItemId, PlaybackDecision, PlaybackSession, PlaybackState,
        PlaylistEntry, PlaylistType, ResumeDetails, SessionId, StartPlaybackRequest,
        StartedSession, StopOutcome,
    },
    provider::{DecisionEngine, DecisionRequest, Delivery},
    service::{
        capability::CapabilityStore,
        playlist::{CreatePlaylistRequest, PlaylistService},
    },
    validation::CapabilityValidator,
    Error, Result,
};

/// Sessions keyed by id, one async lock per session
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<PlaybackSession>>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: PlaybackSession) {
        self.sessions
            .insert(session.id.clone(), Arc::new(Mutex::new(session)));
    }

    #[must_use]
    pub fn handle(&self, id: &SessionId) -> Option<Arc<Mutex<PlaybackSession>>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    #[must_use]
    pub fn handles(&self) -> Vec<(SessionId, Arc<Mutex<PlaybackSession>>)> {
        self.sessions
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Where an advancing decision moves the playlist cursor
#[derive(Debug, Clone, Copy)]
enum MoveTarget {
    Next,
    Index(i64),
}

#[derive(Clone)]
pub struct PlaybackService {
    sessions: Arc<SessionStore>,
    playlists: PlaylistService,
    capabilities: Arc<dyn CapabilityStore>,
    decision_engine: Arc<dyn DecisionEngine>,
    config: SessionConfig,
}

impl std::fmt::Debug for PlaybackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackService").finish()
    }
}

impl PlaybackService {
    /// Maximum attempts for a cursor commit under version conflicts
    const MAX_RETRIES: u32 = 3;
    /// Base delay for exponential backoff (milliseconds)
    const BACKOFF_BASE_MS: u64 = 5;

    #[must_use]
    pub fn new(
        playlists: PlaylistService,
        capabilities: Arc<dyn CapabilityStore>,
        decision_engine: Arc<dyn DecisionEngine>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new()),
            playlists,
            capabilities,
            decision_engine,
            config,
        }
    }

    #[must_use]
    pub const fn playlists(&self) -> &PlaylistService {
        &self.playlists
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn validate_capability(declaration: Option<&CapabilityDeclaration>) -> Result<()> {
        if let Some(declaration) = declaration {
            CapabilityValidator::new().validate(declaration)?;
        }
        Ok(())
    }

    fn validate_position(name: &str, value: i64) -> Result<()> {
        if value < 0 {
            return Err(Error::InvalidInput(format!("{name} must be >= 0, got {value}")));
        }
        Ok(())
    }

    async fn locked(
        &self,
        session_id: &SessionId,
    ) -> Result<tokio::sync::OwnedMutexGuard<PlaybackSession>> {
        let handle = self
            .sessions
            .handle(session_id)
            .ok_or_else(|| Error::NotFound(format!("Session {session_id} not found")))?;
        let session = handle.lock_owned().await;
        if session.is_stopped() {
            return Err(Error::StaleSession(format!(
                "Session {session_id} was stopped"
            )));
        }
        Ok(session)
    }

    /// Re-declare capabilities and bind the session to the new version
    fn bind_capability(
        &self,
        session: &mut PlaybackSession,
        declaration: CapabilityDeclaration,
    ) -> Result<()> {
        let device_id = declaration.device_id.clone();
        let version = self.capabilities.declare(declaration)?;
        session.device_id = Some(device_id);
        session.capability_version = version;
        Ok(())
    }

    fn mismatch(&self, session: &PlaybackSession) -> bool {
        session.device_id.as_ref().is_none_or(|device_id| {
            self.capabilities
                .mismatch(device_id, session.capability_version)
        })
    }

    /// Whether the device declared a profile other than the one the session is bound to
    fn has_newer_profile(&self, session: &PlaybackSession) -> bool {
        session
            .device_id
            .as_ref()
            .and_then(|device_id| self.capabilities.current_version(device_id))
            .is_some_and(|version| version != session.capability_version)
    }

    async fn deliver(&self, request: DecisionRequest) -> Result<Delivery> {
        self.decision_engine.decide(&request).await.map_err(|e| {
            warn!(
                session_id = %request.session_id,
                item_id = %request.item.id,
                engine = self.decision_engine.name(),
                error = %e,
                "Decision engine failed"
            );
            Error::Upstream(format!(
                "Decision engine {} failed: {e}",
                self.decision_engine.name()
            ))
        })
    }

    /// Decision input for `entry`, negotiated against the device's latest profile
    fn decision_request(
        &self,
        session: &PlaybackSession,
        entry: &PlaylistEntry,
        offset_ms: i64,
    ) -> DecisionRequest {
        let capability = session
            .device_id
            .as_ref()
            .and_then(|d| self.capabilities.profile(d));
        DecisionRequest {
            session_id: session.id.clone(),
            device_id: session.device_id.clone(),
            item: entry.to_catalog_item(),
            offset_ms,
            capability_version: capability
                .as_ref()
                .map_or(session.capability_version, |c| c.version),
            capability: capability.map(|c| c.profile),
            previous_plan: Some(session.stream_plan.clone()),
        }
    }

    fn playlist_request(request: &StartPlaybackRequest) -> CreatePlaylistRequest {
        let start = Some(request.item_id.clone());
        match request.playlist_type {
            PlaylistType::Single => CreatePlaylistRequest {
                playlist_type: PlaylistType::Single,
                originator_id: None,
                item_ids: Vec::new(),
                start_item_id: start,
                shuffle: false,
                repeat: request.repeat,
            },
            PlaylistType::Explicit => CreatePlaylistRequest {
                playlist_type: PlaylistType::Explicit,
                originator_id: None,
                item_ids: if request.item_ids.is_empty() {
                    vec![request.item_id.clone()]
                } else {
                    request.item_ids.clone()
                },
                start_item_id: start,
                shuffle: request.shuffle,
                repeat: request.repeat,
            },
            container => CreatePlaylistRequest {
                playlist_type: container,
                originator_id: request.originator_id.clone(),
                item_ids: Vec::new(),
                start_item_id: start,
                shuffle: request.shuffle,
                repeat: request.repeat,
            },
        }
    }

    /// Start a session: negotiate, build the playlist, decide the first item
    pub async fn start(&self, request: StartPlaybackRequest) -> Result<StartedSession> {
        let offset_ms = request.offset_ms.unwrap_or(0);
        Self::validate_position("offsetMs", offset_ms)?;
        Self::validate_capability(request.capability.as_ref())?;

        let cursor = self
            .playlists
            .create(Self::playlist_request(&request))
            .await?;
        let generator_id = cursor.generator_id;

        let result = self.open_session(&generator_id, request, offset_ms).await;
        if let Err(e) = &result {
            self.playlists.remove(&generator_id);
            debug!(generator_id = %generator_id, error = %e, "Session start failed, generator discarded");
        }
        result
    }

    async fn open_session(
        &self,
        generator_id: &GeneratorId,
        request: StartPlaybackRequest,
        offset_ms: i64,
    ) -> Result<StartedSession> {
        let (_, entry) = self.playlists.current_entry(generator_id)?;

        let device_id = request
            .capability
            .as_ref()
            .map(|d| d.device_id.clone())
            .or(request.device_id);
        let capability_version = match request.capability {
            Some(declaration) => self.capabilities.declare(declaration)?,
            None => device_id
                .as_ref()
                .and_then(|d| self.capabilities.current_version(d))
                .unwrap_or(0),
        };

        let capability = device_id
            .as_ref()
            .and_then(|d| self.capabilities.profile(d));
        let session_id = SessionId::new();
        let delivery = self
            .deliver(DecisionRequest {
                session_id: session_id.clone(),
                device_id: device_id.clone(),
                item: entry.to_catalog_item(),
                offset_ms,
                capability_version,
                capability: capability.map(|c| c.profile),
                previous_plan: None,
            })
            .await?;

        self.playlists.mark_served(generator_id, entry.id)?;
        let session = PlaybackSession::new(
            session_id,
            device_id,
            generator_id.clone(),
            &entry,
            delivery,
            offset_ms,
            capability_version,
        );

        let cursor = self.playlists.get(generator_id)?;
        let current_item = cursor.current_item.ok_or_else(|| {
            Error::Internal(format!("Playlist generator {generator_id} has no current entry"))
        })?;

        let started = StartedSession {
            session_id: session.id.clone(),
            playlist_generator_id: generator_id.clone(),
            stream_plan_json: session.stream_plan.clone(),
            playback_url: session.playback_url.clone(),
            capability_profile_version: session.capability_version,
            capability_version_mismatch: self.mismatch(&session),
            playlist_index: cursor.current_index,
            playlist_total_count: cursor.total_count,
            current_item,
            next_item: cursor.next_item,
            media_part_id: session.media_part_id.clone(),
            duration_ms: session.duration_ms,
        };

        info!(
            session_id = %session.id,
            generator_id = %generator_id,
            item_id = %session.current_item_id,
            device_id = ?session.device_id.as_ref().map(|d| d.as_str()),
            capability_version = session.capability_version,
            "Playback session started"
        );
        self.sessions.insert(session);

        Ok(started)
    }

    /// Record client liveness and progress
    ///
    /// A lapsed session is resumed, never rejected. `state=stopped` stops it.
    pub async fn heartbeat(
        &self,
        session_id: &SessionId,
        request: HeartbeatRequest,
    ) -> Result<HeartbeatAck> {
        Self::validate_position("playheadMs", request.playhead_ms)?;
        Self::validate_capability(request.capability.as_ref())?;

        let mut session = self.locked(session_id).await?;

        if request.state == PlaybackState::Stopped {
            session.record_heartbeat(request.playhead_ms, PlaybackState::Playing);
            session.stop();
            info!(session_id = %session_id, playhead_ms = session.playhead_ms, "Playback session stopped by heartbeat");
            return Ok(HeartbeatAck {
                capability_profile_version: session.capability_version,
                capability_version_mismatch: self.mismatch(&session),
                resumed: false,
            });
        }

        let resumed = session.is_lapsed(Instant::now(), self.config.liveness_window());
        if resumed {
            info!(
                session_id = %session_id,
                idle_secs = session.idle_for(Instant::now()).as_secs(),
                "Lapsed session resumed by heartbeat"
            );
        }

        if let Some(declaration) = request.capability {
            self.bind_capability(&mut session, declaration)?;
        }
        session.record_heartbeat(request.playhead_ms, request.state);

        debug!(
            session_id = %session_id,
            playhead_ms = session.playhead_ms,
            state = %session.state,
            "Heartbeat"
        );

        Ok(HeartbeatAck {
            capability_profile_version: session.capability_version,
            capability_version_mismatch: self.mismatch(&session),
            resumed,
        })
    }

    /// Decide what the client plays next
    pub async fn decide(
        &self,
        session_id: &SessionId,
        request: DecideRequest,
    ) -> Result<PlaybackDecision> {
        Self::validate_position("progressMs", request.progress_ms)?;
        Self::validate_capability(request.capability.as_ref())?;
        let jump_index = match (request.status, request.jump_index) {
            (DecisionStatus::Jump, None) => {
                return Err(Error::InvalidInput(
                    "jumpIndex is required when status is jump".to_string(),
                ))
            }
            (_, index) => index,
        };

        let mut session = self.locked(session_id).await?;
        let snapshot = session.clone();
        let outcome = self
            .apply_decision(
                &mut session,
                request.status,
                request.progress_ms,
                jump_index,
                request.capability,
            )
            .await;
        if outcome.is_err() {
            *session = snapshot;
        }
        outcome
    }

    /// Mutates `session` in place; `decide` rolls it back when this fails
    async fn apply_decision(
        &self,
        session: &mut PlaybackSession,
        status: DecisionStatus,
        progress_ms: i64,
        jump_index: Option<i64>,
        capability: Option<CapabilityDeclaration>,
    ) -> Result<PlaybackDecision> {
        if let Some(declaration) = capability {
            self.bind_capability(session, declaration)?;
        }

        match (status, jump_index) {
            (DecisionStatus::Ended, _) => {
                let state = session.state;
                session.record_heartbeat(progress_ms, state);
                self.advance(session, MoveTarget::Next).await
            }
            (DecisionStatus::Jump, Some(index)) => {
                session.touch();
                self.advance(session, MoveTarget::Index(index)).await
            }
            (status, _) => {
                let state = match status {
                    DecisionStatus::Paused => PlaybackState::Paused,
                    DecisionStatus::Buffering => PlaybackState::Buffering,
                    _ => PlaybackState::Playing,
                };
                session.record_heartbeat(progress_ms, state);
                self.follow(session).await
            }
        }
    }

    /// Move the cursor and switch the session to the new entry
    ///
    /// peek, decide, then compare-and-set the cursor; a concurrent playlist
    /// mutation in between is retried with backoff.
    async fn advance(
        &self,
        session: &mut PlaybackSession,
        target: MoveTarget,
    ) -> Result<PlaybackDecision> {
        let generator_id = session.generator_id.clone();

        for attempt in 0..Self::MAX_RETRIES {
            let peeked = match target {
                MoveTarget::Next => self.playlists.peek_next(&generator_id).await?,
                MoveTarget::Index(index) => {
                    self.playlists.peek_index(&generator_id, index).await?
                }
            };

            let Some((index, entry)) = peeked.target else {
                info!(session_id = %session.id, generator_id = %generator_id, "End of playlist");
                let cursor = self.playlists.get(&generator_id)?;
                return Ok(self.decision(
                    session,
                    DecisionAction::Stop,
                    cursor.current_index,
                    cursor.total_count,
                    cursor.current_item,
                    None,
                ));
            };

            let request = self.decision_request(session, &entry, 0);
            let negotiated_version = request.capability.as_ref().map(|_| request.capability_version);
            let delivery = self.deliver(request).await?;

            match self
                .playlists
                .commit_move(&generator_id, peeked.version, index)
            {
                Ok(nav) => {
                    session.switch_item(&entry, delivery);
                    if let Some(version) = negotiated_version {
                        session.capability_version = version;
                    }
                    self.playlists.mark_served(&generator_id, entry.id)?;
                    info!(
                        session_id = %session.id,
                        item_id = %entry.item_id,
                        index,
                        "Session advanced"
                    );
                    return Ok(self.decision(
                        session,
                        DecisionAction::Advance,
                        nav.current_index,
                        nav.total_count,
                        nav.current_item,
                        Some(entry.item_id),
                    ));
                }
                Err(Error::OptimisticLockConflict) if attempt + 1 < Self::MAX_RETRIES => {
                    // Exponential backoff with jitter: base * 2^attempt + random(0..base)
                    let backoff = Self::BACKOFF_BASE_MS * (1 << attempt);
                    let jitter = rand::rng().random_range(0..Self::BACKOFF_BASE_MS);
                    let delay = backoff + jitter;
                    debug!(
                        session_id = %session.id,
                        generator_id = %generator_id,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        "Playlist version conflict, retrying with backoff"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Internal(
            "Playlist advance failed after maximum retry attempts".to_string(),
        ))
    }

    /// Non-terminal statuses: follow external playlist moves or renegotiate
    async fn follow(&self, session: &mut PlaybackSession) -> Result<PlaybackDecision> {
        let generator_id = session.generator_id.clone();
        let (index, entry) = self.playlists.current_entry(&generator_id)?;

        if entry.id != session.current_entry_id {
            // The cursor was moved through the playlist API since the last decision
            let request = self.decision_request(session, &entry, 0);
            let negotiated_version = request.capability.as_ref().map(|_| request.capability_version);
            let delivery = self.deliver(request).await?;
            session.switch_item(&entry, delivery);
            if let Some(version) = negotiated_version {
                session.capability_version = version;
            }
            self.playlists.mark_served(&generator_id, entry.id)?;
            info!(
                session_id = %session.id,
                item_id = %entry.item_id,
                index,
                "Session followed playlist navigation"
            );

            let cursor = self.playlists.get(&generator_id)?;
            return Ok(self.decision(
                session,
                DecisionAction::Advance,
                cursor.current_index,
                cursor.total_count,
                cursor.current_item,
                Some(entry.item_id),
            ));
        }

        let cursor = self.playlists.get(&generator_id)?;

        if self.has_newer_profile(session) {
            let request = self.decision_request(session, &entry, session.playhead_ms);
            let negotiated_version = request.capability_version;
            let delivery = self.deliver(request).await?;
            let mut decision = self.decision(
                session,
                DecisionAction::Renegotiate,
                cursor.current_index,
                cursor.total_count,
                cursor.current_item,
                None,
            );
            session.replan(delivery);
            session.capability_version = negotiated_version;
            info!(
                session_id = %session.id,
                capability_version = negotiated_version,
                "Session renegotiated after capability change"
            );

            decision.stream_plan_json = session.stream_plan.clone();
            decision.playback_url = session.playback_url.clone();
            decision.capability_profile_version = negotiated_version;
            return Ok(decision);
        }

        Ok(self.decision(
            session,
            DecisionAction::Continue,
            cursor.current_index,
            cursor.total_count,
            cursor.current_item,
            None,
        ))
    }

    fn decision(
        &self,
        session: &PlaybackSession,
        action: DecisionAction,
        playlist_index: usize,
        playlist_total_count: i64,
        current_item: Option<crate::models::PlaylistItem>,
        next_item_id: Option<ItemId>,
    ) -> PlaybackDecision {
        PlaybackDecision {
            action,
            stream_plan_json: session.stream_plan.clone(),
            playback_url: session.playback_url.clone(),
            next_item_id,
            capability_profile_version: session.capability_version,
            capability_version_mismatch: self.mismatch(session),
            playlist_index,
            playlist_total_count,
            current_item,
        }
    }

    /// Re-attach a client to a live session without touching the playhead
    pub async fn resume(
        &self,
        session_id: &SessionId,
        capability: Option<CapabilityDeclaration>,
    ) -> Result<ResumeDetails> {
        Self::validate_capability(capability.as_ref())?;

        let mut session = self.locked(session_id).await?;
        if let Some(declaration) = capability {
            self.bind_capability(&mut session, declaration)?;
        }
        session.touch();

        info!(
            session_id = %session_id,
            item_id = %session.current_item_id,
            playhead_ms = session.playhead_ms,
            "Playback session resumed"
        );

        Ok(session.resume_details(self.mismatch(&session)))
    }

    /// Explicit seek within the current item
    pub async fn seek(&self, session_id: &SessionId, position_ms: i64) -> Result<ResumeDetails> {
        Self::validate_position("positionMs", position_ms)?;

        let mut session = self.locked(session_id).await?;
        if let Some(duration) = session.duration_ms {
            if position_ms > duration {
                return Err(Error::InvalidInput(format!(
                    "positionMs {position_ms} is past the item duration {duration}"
                )));
            }
        }
        session.seek(position_ms);
        debug!(session_id = %session_id, position_ms, "Session seek");

        Ok(session.resume_details(self.mismatch(&session)))
    }

    /// Stop a session. Idempotent; unknown sessions succeed too.
    pub async fn stop(&self, session_id: &SessionId) -> StopOutcome {
        let Some(handle) = self.sessions.handle(session_id) else {
            debug!(session_id = %session_id, "Stop for unknown session");
            return StopOutcome { success: true };
        };

        let mut session = handle.lock().await;
        if !session.is_stopped() {
            session.stop();
            info!(
                session_id = %session_id,
                playhead_ms = session.playhead_ms,
                "Playback session stopped"
            );
        }
        StopOutcome { success: true }
    }

    /// Snapshot of a session, stopped ones included
    pub async fn get(&self, session_id: &SessionId) -> Result<PlaybackSession> {
        let handle = self
            .sessions
            .handle(session_id)
            .ok_or_else(|| Error::NotFound(format!("Session {session_id} not found")))?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Forget lapsed sessions and stopped tombstones past the reap horizon,
    /// together with their playlist generators. Busy sessions are skipped.
    pub fn reap(&self) -> usize {
        let now = Instant::now();
        let horizon = self.config.reap_after();
        let mut reaped = 0;

        for (id, handle) in self.sessions.handles() {
            let Ok(session) = handle.try_lock() else {
                continue;
            };
            if session.is_reapable(now, horizon) {
                self.sessions.remove(&id);
                self.playlists.remove(&session.generator_id);
                reaped += 1;
            }
        }

        if reaped > 0 {
            info!(reaped, remaining = self.sessions.len(), "Reaped idle playback sessions");
        }
        reaped
    }

    /// Spawn the periodic reaper; `None` when disabled by configuration
    #[must_use]
    pub fn start_reaper(&self) -> Option<JoinHandle<()>> {
        let period = self.config.reap_interval()?;
        let service = self.clone();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                service.reap();
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaylistConfig;
    use crate::models::{GeneratorId, StreamPlan};
    use crate::provider::{MockDecisionEngine, ProviderError};
    use crate::service::CapabilityRegistry;
    use crate::test_helpers::{
        album_catalog, album_start, declaration, ServiceFixture, ServiceFixtureBuilder,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fixture() -> ServiceFixture {
        ServiceFixtureBuilder::new().build()
    }

    fn heartbeat(playhead_ms: i64, state: PlaybackState) -> HeartbeatRequest {
        HeartbeatRequest {
            playhead_ms,
            state,
            capability: None,
        }
    }

    fn decide(status: DecisionStatus, progress_ms: i64) -> DecideRequest {
        DecideRequest {
            status,
            progress_ms,
            jump_index: None,
            capability: None,
        }
    }

    #[test]
    fn test_retry_constants() {
        assert_eq!(PlaybackService::MAX_RETRIES, 3);
        assert_eq!(PlaybackService::BACKOFF_BASE_MS, 5);
    }

    #[tokio::test]
    async fn test_album_start_then_ended_advances() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-9"))
            .await
            .unwrap();

        assert_eq!(started.playlist_index, 9);
        assert_eq!(started.playlist_total_count, 12);
        assert_eq!(started.current_item.item_id.as_str(), "album-1-track-9");
        assert!(started.current_item.served);
        assert_eq!(started.next_item.as_ref().unwrap().index, 10);
        assert!(started.playback_url.contains("album-1-part-9"));

        let decision = f
            .playback
            .decide(&started.session_id, decide(DecisionStatus::Ended, 180_000))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Advance);
        assert_eq!(decision.playlist_index, 10);
        assert_eq!(
            decision.next_item_id.as_ref().unwrap().as_str(),
            "album-1-track-10"
        );
        assert!(decision.playback_url.contains("album-1-part-10"));

        let session = f.playback.get(&started.session_id).await.unwrap();
        assert_eq!(session.current_item_id.as_str(), "album-1-track-10");
        assert_eq!(session.playhead_ms, 0);
    }

    #[tokio::test]
    async fn test_end_of_playlist_stops() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-11"))
            .await
            .unwrap();

        let decision = f
            .playback
            .decide(&started.session_id, decide(DecisionStatus::Ended, 190_000))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Stop);
        assert!(decision.next_item_id.is_none());
        assert_eq!(decision.playlist_index, 11);
    }

    #[tokio::test]
    async fn test_end_of_repeating_playlist_wraps() {
        let f = fixture();
        let mut request = album_start("album-1", "album-1-track-11");
        request.repeat = true;
        let started = f.playback.start(request).await.unwrap();

        let decision = f
            .playback
            .decide(&started.session_id, decide(DecisionStatus::Ended, 190_000))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Advance);
        assert_eq!(decision.playlist_index, 0);
    }

    #[tokio::test]
    async fn test_jump_decision() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();

        let mut request = decide(DecisionStatus::Jump, 1000);
        assert!(matches!(
            f.playback.decide(&started.session_id, request.clone()).await,
            Err(Error::InvalidInput(_))
        ));

        request.jump_index = Some(12);
        assert!(matches!(
            f.playback.decide(&started.session_id, request.clone()).await,
            Err(Error::IndexOutOfRange { index: 12, total: 12 })
        ));

        request.jump_index = Some(5);
        let decision = f
            .playback
            .decide(&started.session_id, request)
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Advance);
        assert_eq!(decision.playlist_index, 5);
    }

    #[tokio::test]
    async fn test_playing_follows_external_navigation() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-2"))
            .await
            .unwrap();

        let decision = f
            .playback
            .decide(&started.session_id, decide(DecisionStatus::Playing, 5000))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Continue);

        f.playlists
            .next(&started.playlist_generator_id)
            .await
            .unwrap();

        let decision = f
            .playback
            .decide(&started.session_id, decide(DecisionStatus::Playing, 6000))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Advance);
        assert_eq!(decision.playlist_index, 3);
        assert_eq!(
            decision.next_item_id.unwrap().as_str(),
            "album-1-track-3"
        );
    }

    #[tokio::test]
    async fn test_capability_change_renegotiates() {
        let f = fixture();
        let mut request = album_start("album-1", "album-1-track-0");
        request.capability = Some(declaration("tv"));
        let started = f.playback.start(request).await.unwrap();
        assert_eq!(started.capability_profile_version, 1);
        assert!(!started.capability_version_mismatch);

        // Declared out of band, e.g. through the capabilities endpoint
        f.capabilities.declare(declaration("tv")).unwrap();

        let ack = f
            .playback
            .heartbeat(&started.session_id, heartbeat(1000, PlaybackState::Playing))
            .await
            .unwrap();
        assert!(ack.capability_version_mismatch);

        let decision = f
            .playback
            .decide(&started.session_id, decide(DecisionStatus::Playing, 2000))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Renegotiate);
        assert_eq!(decision.capability_profile_version, 2);

        let decision = f
            .playback
            .decide(&started.session_id, decide(DecisionStatus::Playing, 3000))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Continue);
        assert!(!decision.capability_version_mismatch);
    }

    #[tokio::test]
    async fn test_heartbeat_capability_rebinds_session() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();
        assert!(started.capability_version_mismatch);

        let mut request = heartbeat(1000, PlaybackState::Playing);
        request.capability = Some(declaration("phone"));
        let ack = f
            .playback
            .heartbeat(&started.session_id, request)
            .await
            .unwrap();
        assert_eq!(ack.capability_profile_version, 1);
        assert!(!ack.capability_version_mismatch);
    }

    #[tokio::test]
    async fn test_invalid_capability_rejected_before_any_mutation() {
        let f = fixture();
        let mut request = album_start("album-1", "album-1-track-0");
        let mut bad = declaration("tv");
        bad.device_id = "".into();
        request.capability = Some(bad);

        assert!(matches!(
            f.playback.start(request).await,
            Err(Error::InvalidCapability(_))
        ));
        assert!(f.playlists.is_empty());
        assert_eq!(f.capabilities.device_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_final() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();

        assert!(f.playback.stop(&started.session_id).await.success);
        assert!(f.playback.stop(&started.session_id).await.success);
        assert!(f.playback.stop(&SessionId::new()).await.success);

        assert!(matches!(
            f.playback
                .heartbeat(&started.session_id, heartbeat(1000, PlaybackState::Playing))
                .await,
            Err(Error::StaleSession(_))
        ));
        assert!(matches!(
            f.playback.resume(&started.session_id, None).await,
            Err(Error::StaleSession(_))
        ));
        assert!(matches!(
            f.playback
                .decide(&started.session_id, decide(DecisionStatus::Ended, 0))
                .await,
            Err(Error::StaleSession(_))
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_with_stopped_state_stops() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();

        f.playback
            .heartbeat(&started.session_id, heartbeat(4000, PlaybackState::Stopped))
            .await
            .unwrap();

        let session = f.playback.get(&started.session_id).await.unwrap();
        assert!(session.is_stopped());
        assert_eq!(session.playhead_ms, 4000);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture();
        let id = SessionId::new();
        assert!(matches!(
            f.playback
                .heartbeat(&id, heartbeat(0, PlaybackState::Playing))
                .await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            f.playback.resume(&id, None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_and_seek() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-4"))
            .await
            .unwrap();

        f.playback
            .heartbeat(&started.session_id, heartbeat(42_000, PlaybackState::Paused))
            .await
            .unwrap();

        let details = f.playback.resume(&started.session_id, None).await.unwrap();
        assert_eq!(details.playhead_ms, 42_000);
        assert_eq!(details.state, PlaybackState::Paused);
        assert_eq!(details.current_item_id.as_str(), "album-1-track-4");
        assert_eq!(details.playlist_generator_id, started.playlist_generator_id);
        assert_eq!(details.stream_plan_json, started.stream_plan_json);

        // Backward heartbeat is ignored, explicit seek is not
        f.playback
            .heartbeat(&started.session_id, heartbeat(10_000, PlaybackState::Playing))
            .await
            .unwrap();
        assert_eq!(
            f.playback.get(&started.session_id).await.unwrap().playhead_ms,
            42_000
        );

        let details = f.playback.seek(&started.session_id, 10_000).await.unwrap();
        assert_eq!(details.playhead_ms, 10_000);

        assert!(matches!(
            f.playback.seek(&started.session_id, -5).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            f.playback.seek(&started.session_id, 10_000_000).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_negative_playhead_rejected() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();
        assert!(matches!(
            f.playback
                .heartbeat(&started.session_id, heartbeat(-1, PlaybackState::Playing))
                .await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lapsed_session_is_resumed_by_heartbeat() {
        let f = fixture();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;

        let ack = f
            .playback
            .heartbeat(&started.session_id, heartbeat(1000, PlaybackState::Playing))
            .await
            .unwrap();
        assert!(ack.resumed);

        let ack = f
            .playback
            .heartbeat(&started.session_id, heartbeat(2000, PlaybackState::Playing))
            .await
            .unwrap();
        assert!(!ack.resumed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_removes_idle_sessions_and_generators() {
        let f = fixture();
        let idle = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();
        let stopped = f
            .playback
            .start(album_start("album-1", "album-1-track-1"))
            .await
            .unwrap();
        let active = f
            .playback
            .start(album_start("album-1", "album-1-track-2"))
            .await
            .unwrap();
        f.playback.stop(&stopped.session_id).await;

        tokio::time::advance(Duration::from_secs(300)).await;
        f.playback
            .heartbeat(&active.session_id, heartbeat(1000, PlaybackState::Playing))
            .await
            .unwrap();
        assert_eq!(f.playback.reap(), 0);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(f.playback.reap(), 2);
        assert_eq!(f.playback.session_count(), 1);
        assert_eq!(f.playlists.len(), 1);

        assert!(matches!(
            f.playback.resume(&idle.session_id, None).await,
            Err(Error::NotFound(_))
        ));
        assert!(f.playback.resume(&active.session_id, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_engine_failure_discards_generator() {
        let mut engine = MockDecisionEngine::new();
        engine.expect_name().return_const("mock");
        engine
            .expect_decide()
            .returning(|_| Err(ProviderError::Unavailable("transcoder offline".into())));

        let f = ServiceFixtureBuilder::new()
            .with_engine(Arc::new(engine))
            .build();

        assert!(matches!(
            f.playback
                .start(album_start("album-1", "album-1-track-0"))
                .await,
            Err(Error::Upstream(_))
        ));
        assert!(f.playlists.is_empty());
        assert_eq!(f.playback.session_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_decision_leaves_session_untouched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = MockDecisionEngine::new();
        engine.expect_name().return_const("mock");
        {
            let calls = Arc::clone(&calls);
            engine.expect_decide().returning(move |request| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(Delivery {
                        stream_plan: StreamPlan::new(format!("plan-{}", request.item.id)),
                        playback_url: format!("http://media.test/{}", request.item.id),
                        media_part_id: None,
                        duration_ms: None,
                    })
                } else {
                    Err(ProviderError::Unavailable("transcoder offline".into()))
                }
            });
        }

        let f = ServiceFixtureBuilder::new()
            .with_engine(Arc::new(engine))
            .build();
        let started = f
            .playback
            .start(album_start("album-1", "album-1-track-0"))
            .await
            .unwrap();
        let before = f.playback.get(&started.session_id).await.unwrap();

        assert!(matches!(
            f.playback
                .decide(&started.session_id, decide(DecisionStatus::Ended, 180_000))
                .await,
            Err(Error::Upstream(_))
        ));

        let after = f.playback.get(&started.session_id).await.unwrap();
        assert_eq!(after.playhead_ms, 0);
        assert_eq!(after.current_item_id, before.current_item_id);
        assert_eq!(after.state, before.state);
        assert_eq!(after.last_heartbeat_at, before.last_heartbeat_at);
        assert_eq!(
            f.playlists
                .get(&started.playlist_generator_id)
                .unwrap()
                .current_index,
            0
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_advance_retries_on_version_conflict() {
        let playlists = PlaylistService::new(
            Arc::new(album_catalog("album-1", 12)),
            PlaylistConfig::default(),
        );
        let generator: Arc<parking_lot::Mutex<Option<GeneratorId>>> =
            Arc::new(parking_lot::Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut engine = MockDecisionEngine::new();
        engine.expect_name().return_const("mock");
        {
            let playlists = playlists.clone();
            let generator = Arc::clone(&generator);
            let calls = Arc::clone(&calls);
            engine.expect_decide().returning(move |request| {
                // Second call is the first `ended` decision: race a playlist mutation
                if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                    if let Some(id) = generator.lock().clone() {
                        playlists.set_repeat(&id, false).unwrap();
                    }
                }
                Ok(Delivery {
                    stream_plan: StreamPlan::new(format!("plan-{}", request.item.id)),
                    playback_url: format!("http://media.test/{}", request.item.id),
                    media_part_id: None,
                    duration_ms: None,
                })
            });
        }

        let playback = PlaybackService::new(
            playlists.clone(),
            Arc::new(CapabilityRegistry::new()),
            Arc::new(engine),
            SessionConfig::default(),
        );

        let started = playback
            .start(album_start("album-1", "album-1-track-3"))
            .await
            .unwrap();
        *generator.lock() = Some(started.playlist_generator_id.clone());

        let decision = playback
            .decide(&started.session_id, decide(DecisionStatus::Ended, 100))
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Advance);
        assert_eq!(decision.playlist_index, 4);
        assert_eq!(decision.stream_plan_json.as_str(), "plan-album-1-track-4");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
