//! Playback session controller.
//!
//! A reducer over [`PlaybackSession`]: every input is a [`PlayerEvent`] and
//! every effect is a [`Command`] for the driver to execute. Nothing in here
//! touches a timer, a socket or a media element, so the whole state machine
//! is testable as plain function calls.
//!
//! Positions inside the controller are always title time. The media element
//! of a re-encoded stream starts at the negotiated offset, so element time is
//! shifted by `stream_offset` on the way in and out.

use std::sync::Arc;
use std::time::Duration;

use cs_core::config::PlaybackConfig;
use cs_core::{BufferedRange, DeliveryMethod, SessionId, StreamDescriptor, TimelineEvent, TitleId};

use crate::negotiator::{NegotiateOptions, StreamNegotiator};
use crate::progress::{Notification, ProgressReporter};
use crate::seek::{SeekAction, SeekManager, SeekPolicy};
use crate::session::{ErrorPrompt, FailureKind, PlaybackSession, PlaybackState};
use crate::transport::{
    needs_adaptive_transport, RecoveryAction, RecoveryBudget, RecoveryPolicy, TransportError,
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tuning knobs, usually derived from [`PlaybackConfig`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub direct_load_timeout: Duration,
    pub transcode_load_timeout: Duration,
    pub seek_debounce: Duration,
    pub progress_interval: Duration,
    pub watched_threshold: f64,
    pub native_hls: bool,
    pub seek: SeekPolicy,
    pub recovery: RecoveryPolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for ControllerSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            direct_load_timeout: config.direct_load_timeout(),
            transcode_load_timeout: config.transcode_load_timeout(),
            seek_debounce: config.seek_debounce(),
            progress_interval: config.progress_interval(),
            watched_threshold: config.watched_threshold,
            native_hls: config.native_hls,
            seek: SeekPolicy::from(config),
            recovery: RecoveryPolicy::from(config),
        }
    }
}

impl ControllerSettings {
    fn load_timeout(&self, delivery: DeliveryMethod) -> Duration {
        match delivery {
            DeliveryMethod::Direct => self.direct_load_timeout,
            DeliveryMethod::Transcode => self.transcode_load_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Events and commands
// ---------------------------------------------------------------------------

/// What to play when a session mounts.
#[derive(Debug, Clone, PartialEq)]
pub struct MountRequest {
    pub title_id: TitleId,
    /// Resume offset in seconds.
    pub offset: f64,
    pub quality: Option<String>,
    /// Known duration in seconds, if the caller already has metadata.
    pub duration: Option<f64>,
}

impl MountRequest {
    pub fn new(title_id: TitleId) -> Self {
        Self {
            title_id,
            offset: 0.0,
            quality: None,
            duration: None,
        }
    }
}

/// Inputs to the controller. Media times are in element time.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Mount(MountRequest),
    /// A media-element event tagged with the load generation of the stream
    /// that produced it. Events from a torn-down stream are dropped.
    Stream {
        generation: u64,
        event: Box<PlayerEvent>,
    },
    /// The first frame of the current stream is ready.
    MediaReady,
    /// The element started (or resumed) rendering.
    Playing,
    /// The element refused to start without a user gesture.
    AutoplayBlocked,
    UserPlay,
    UserPause,
    /// The element starved for data.
    Waiting,
    TimeUpdate { media_time: f64 },
    DurationChange { duration: f64 },
    BufferedChanged(Vec<BufferedRange>),
    /// Scrubber moved; more may follow.
    SeekRequested { target: f64 },
    /// Scrub gesture released.
    SeekCommitted { target: f64 },
    SeekDebounceElapsed { seq: u64 },
    /// The element finished repositioning.
    Seeked,
    Ended,
    PlaybackFailed(FailureKind),
    TransportError(TransportError),
    LoadDeadlineElapsed { generation: u64 },
    QualitySelected { quality: String },
    Retry,
    TryTranscoding,
    ProgressTick,
    Unmount,
}

/// Effects requested by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Attach a new stream. `start_at` is the element time to seek to once
    /// loaded; `adaptive` selects the segmented-streaming client.
    Load {
        descriptor: StreamDescriptor,
        adaptive: bool,
        start_at: f64,
        generation: u64,
    },
    /// Discard the media element and any transport attached to it.
    TearDown,
    Play { muted: bool },
    Pause,
    /// Reposition the element (element time).
    SetPosition(f64),
    /// Ask the segmented-streaming client to restart loading.
    RestartLoad { from: f64 },
    RecoverDecoder,
    ArmLoadDeadline { generation: u64, after: Duration },
    ArmSeekDebounce { seq: u64, after: Duration },
    /// Best-effort stop of an upstream re-encode job.
    StopTranscode { session: String },
    Notify(Notification),
    /// Final report sent through a channel that survives teardown.
    NotifyFinal(TimelineEvent),
    SetScrubberEnabled(bool),
    PromptForPlay,
    ShowError(ErrorPrompt),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns one [`PlaybackSession`] and transitions it in response to events.
pub struct PlaybackController {
    negotiator: Arc<StreamNegotiator>,
    settings: ControllerSettings,
    session: Option<PlaybackSession>,
    seek: SeekManager,
    progress: ProgressReporter,
    recovery: RecoveryBudget,
    /// Quality id in effect for the current watch attempt.
    quality: Option<String>,
    force_reencode: bool,
    /// Title time at which element time zero sits.
    stream_offset: f64,
    scrubber: Option<bool>,
}

impl PlaybackController {
    pub fn new(negotiator: Arc<StreamNegotiator>, settings: ControllerSettings) -> Self {
        let seek = SeekManager::new(settings.seek);
        let progress = ProgressReporter::new(settings.watched_threshold);
        let recovery = RecoveryBudget::new(settings.recovery);
        Self {
            negotiator,
            settings,
            session: None,
            seek,
            progress,
            recovery,
            quality: None,
            force_reencode: false,
            stream_offset: 0.0,
            scrubber: None,
        }
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn seek_manager(&self) -> &SeekManager {
        &self.seek
    }

    /// Apply one event and return the effects it produces, in order.
    pub fn handle(&mut self, event: PlayerEvent) -> Vec<Command> {
        let mut out = Vec::new();

        let event = match event {
            PlayerEvent::Stream { generation, event } => {
                let current = self.session.as_ref().map(|s| s.generation);
                if current != Some(generation) || !event.is_media_event() {
                    tracing::trace!(generation, ?current, ?event, "Stale stream event dropped");
                    return out;
                }
                *event
            }
            event => event,
        };

        match event {
            PlayerEvent::Mount(request) => self.mount(request, &mut out),
            PlayerEvent::Unmount => {
                self.unmount(&mut out);
                return out;
            }
            event => {
                let Some(state) = self.session.as_ref().map(|s| s.state) else {
                    tracing::debug!(?event, "Event without a mounted session ignored");
                    return out;
                };
                if !accepts(state, &event) {
                    tracing::trace!(%state, ?event, "Event ignored in current state");
                    return out;
                }
                self.dispatch(event, &mut out);
            }
        }

        self.sync_scrubber(&mut out);
        out
    }

    fn dispatch(&mut self, event: PlayerEvent, out: &mut Vec<Command>) {
        match event {
            PlayerEvent::MediaReady => self.on_media_ready(out),
            PlayerEvent::Playing => {
                self.recovery.reset();
                self.transition(PlaybackState::Playing, out);
            }
            PlayerEvent::AutoplayBlocked => self.on_autoplay_blocked(out),
            PlayerEvent::UserPlay => {
                let muted = self.session.as_ref().is_some_and(|s| s.muted);
                out.push(Command::Play { muted });
            }
            PlayerEvent::UserPause => {
                out.push(Command::Pause);
                self.transition(PlaybackState::Paused, out);
            }
            PlayerEvent::Waiting => {
                if self.state() == Some(PlaybackState::Playing) {
                    self.transition(PlaybackState::Buffering, out);
                }
            }
            PlayerEvent::TimeUpdate { media_time } => self.on_time_update(media_time, out),
            PlayerEvent::DurationChange { duration } => {
                if let Some(s) = self.session.as_mut() {
                    // A re-encoded stream only reports what lies after its offset.
                    let duration = duration + self.stream_offset;
                    if duration.is_finite() && duration > s.duration {
                        s.duration = duration;
                    }
                }
            }
            PlayerEvent::BufferedChanged(ranges) => {
                let offset = self.stream_offset;
                if let Some(s) = self.session.as_mut() {
                    s.buffered = ranges
                        .into_iter()
                        .map(|r| BufferedRange::new(r.start + offset, r.end + offset))
                        .collect();
                }
            }
            PlayerEvent::SeekRequested { target } => {
                let action = self.with_buffer(|seek, delivery, buffered| {
                    seek.request(target, delivery, buffered)
                });
                self.apply_seek(action, out);
            }
            PlayerEvent::SeekCommitted { target } => {
                let action = self.with_buffer(|seek, delivery, buffered| {
                    seek.commit(target, delivery, buffered)
                });
                self.apply_seek(action, out);
            }
            PlayerEvent::SeekDebounceElapsed { seq } => {
                let action = self.seek.debounce_elapsed(seq);
                self.apply_seek(action, out);
            }
            PlayerEvent::Seeked => {
                if let Some(s) = self.session.as_mut() {
                    s.seeking = false;
                }
            }
            PlayerEvent::Ended => {
                if let Some(s) = self.session.as_mut() {
                    let duration = s.duration;
                    s.set_position(duration);
                }
                self.transition(PlaybackState::Ended, out);
            }
            PlayerEvent::PlaybackFailed(kind) => self.fail(kind, out),
            PlayerEvent::TransportError(error) => self.on_transport_error(error, out),
            PlayerEvent::LoadDeadlineElapsed { generation } => {
                let current = self.session.as_ref().map(|s| (s.generation, s.state));
                if current == Some((generation, PlaybackState::Loading)) {
                    tracing::warn!(generation, "Loading deadline elapsed");
                    self.seek.reload_failed();
                    self.enter_error(FailureKind::Timeout, out);
                }
            }
            PlayerEvent::QualitySelected { quality } => {
                tracing::info!(quality = %quality, "Quality re-selected");
                self.quality = Some(quality);
                self.force_reencode = false;
                let position = self.position();
                self.seek.reload_failed();
                self.reload(position, out);
            }
            PlayerEvent::Retry => {
                let position = self.position();
                self.seek.reload_failed();
                self.reload(position, out);
            }
            PlayerEvent::TryTranscoding => {
                self.force_reencode = true;
                let position = self.position();
                self.seek.reload_failed();
                self.reload(position, out);
            }
            PlayerEvent::ProgressTick => {
                if let Some(s) = self.session.as_ref() {
                    out.extend(self.progress.on_tick(s).into_iter().map(Command::Notify));
                }
            }
            PlayerEvent::Mount(_) | PlayerEvent::Unmount | PlayerEvent::Stream { .. } => {}
        }
    }

    // -- lifecycle ----------------------------------------------------------

    fn mount(&mut self, request: MountRequest, out: &mut Vec<Command>) {
        if self.session.is_some() {
            self.unmount(out);
        }

        let quality = self.negotiator.resolve_quality(request.quality.as_deref());
        let mut session = PlaybackSession::new(
            SessionId::new(),
            request.title_id.clone(),
            quality,
            request.duration.unwrap_or(0.0),
        );
        session.set_position(request.offset);
        let position = session.position;

        tracing::info!(
            title_id = %request.title_id,
            session_id = %session.id,
            offset = position,
            "Mounting playback session"
        );

        self.progress.load_title(&request.title_id);
        self.seek.reset();
        self.quality = request.quality;
        self.force_reencode = false;
        self.stream_offset = 0.0;
        self.scrubber = None;
        self.session = Some(session);
        self.reload(position, out);
    }

    fn unmount(&mut self, out: &mut Vec<Command>) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::info!(session_id = %session.id, "Unmounting playback session");

        out.push(Command::NotifyFinal(self.progress.final_stopped(&session)));
        if let Some(stop) = stop_transcode(&session) {
            out.push(stop);
        }
        out.push(Command::TearDown);
        self.seek.reset();
    }

    /// Tear down the current stream and load a fresh descriptor anchored at
    /// `anchor` (title time).
    fn reload(&mut self, anchor: f64, out: &mut Vec<Command>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if self.seek.reload_in_flight() {
            tracing::debug!(anchor, "Reload already in flight; recorded as pending");
            return;
        }

        let anchor = session.clamp(anchor);
        if session.descriptor.is_some() {
            if let Some(stop) = stop_transcode(session) {
                out.push(stop);
            }
            out.push(Command::TearDown);
        }

        let opts = NegotiateOptions {
            offset_seconds: anchor,
            quality: self.quality.clone(),
            force_reencode: self.force_reencode,
            session: Some(session.id),
            attempt: session.generation + 1,
        };
        let descriptor = self
            .negotiator
            .build_stream_descriptor(&session.title_id, &opts);

        session.generation += 1;
        session.state = PlaybackState::Loading;
        session.seeking = false;
        session.error = None;
        session.delivery = descriptor.delivery;
        session.quality = descriptor.quality.clone();
        session.buffered.clear();
        session.set_position(anchor);
        if descriptor.delivery == DeliveryMethod::Transcode {
            session.transcode_attempted = true;
        }

        // Re-encoded streams begin at the offset; the original file is
        // positioned explicitly once loaded.
        let (stream_offset, start_at) = match descriptor.delivery {
            DeliveryMethod::Transcode => (descriptor.start_offset_secs as f64, 0.0),
            DeliveryMethod::Direct => (0.0, session.position),
        };
        self.stream_offset = stream_offset;
        self.recovery.reset();
        self.seek.begin_reload(anchor, descriptor.delivery);

        tracing::info!(
            title_id = %session.title_id,
            delivery = %descriptor.delivery,
            quality = %descriptor.quality.id,
            generation = session.generation,
            anchor,
            "Loading stream"
        );

        let generation = session.generation;
        let after = self.settings.load_timeout(descriptor.delivery);
        let adaptive = needs_adaptive_transport(descriptor.protocol, self.settings.native_hls);
        session.descriptor = Some(descriptor.clone());

        out.push(Command::Load {
            descriptor,
            adaptive,
            start_at,
            generation,
        });
        out.push(Command::ArmLoadDeadline { generation, after });
    }

    // -- playback -----------------------------------------------------------

    fn on_media_ready(&mut self, out: &mut Vec<Command>) {
        if self.state() != Some(PlaybackState::Loading) {
            return;
        }
        if let Some(s) = self.session.as_mut() {
            s.initialized = true;
        }

        if let Some(target) = self.seek.reload_complete() {
            tracing::debug!(target, "Replaying seek recorded during reload");
            let action = self.with_buffer(|seek, delivery, buffered| {
                seek.commit(target, delivery, buffered)
            });
            if matches!(action, SeekAction::Reload(_)) {
                self.apply_seek(action, out);
                return;
            }
            self.apply_seek(action, out);
        }

        let muted = self.session.as_ref().is_some_and(|s| s.muted);
        out.push(Command::Play { muted });
    }

    fn on_autoplay_blocked(&mut self, out: &mut Vec<Command>) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if !s.autoplay_retried {
            s.autoplay_retried = true;
            s.muted = true;
            tracing::debug!(session_id = %s.id, "Autoplay blocked; retrying muted");
            out.push(Command::Play { muted: true });
            return;
        }
        tracing::info!(session_id = %s.id, "Autoplay blocked while muted; waiting for user");
        self.transition(PlaybackState::Paused, out);
        out.push(Command::PromptForPlay);
    }

    fn on_time_update(&mut self, media_time: f64, out: &mut Vec<Command>) {
        let offset = self.stream_offset;
        let Some(s) = self.session.as_mut() else {
            return;
        };
        s.set_position(media_time + offset);
        if let Some(note) = self.progress.on_position(s) {
            out.push(Command::Notify(note));
        }
    }

    fn transition(&mut self, next: PlaybackState, out: &mut Vec<Command>) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if s.state == next {
            return;
        }
        tracing::debug!(from = %s.state, to = %next, "Playback state transition");
        s.state = next;
        out.extend(self.progress.on_transition(s).into_iter().map(Command::Notify));
    }

    // -- seeking ------------------------------------------------------------

    fn with_buffer<F>(&mut self, f: F) -> SeekAction
    where
        F: FnOnce(&mut SeekManager, DeliveryMethod, &[BufferedRange]) -> SeekAction,
    {
        match self.session.as_ref() {
            Some(s) => f(&mut self.seek, s.delivery, &s.buffered),
            None => SeekAction::Ignore,
        }
    }

    fn apply_seek(&mut self, action: SeekAction, out: &mut Vec<Command>) {
        match action {
            SeekAction::Native(target) => {
                let offset = self.stream_offset;
                if let Some(s) = self.session.as_mut() {
                    s.set_position(target);
                    s.seeking = true;
                    out.push(Command::SetPosition((s.position - offset).max(0.0)));
                }
            }
            SeekAction::Debounce { seq, target } => {
                tracing::trace!(seq, target, "Unbuffered seek; debouncing");
                out.push(Command::ArmSeekDebounce {
                    seq,
                    after: self.settings.seek_debounce,
                });
            }
            SeekAction::Reload(target) => {
                tracing::debug!(target, "Unbuffered seek; reloading stream");
                self.reload(target, out);
            }
            SeekAction::Deferred(target) => {
                tracing::trace!(target, "Reload in flight; seek deferred");
            }
            SeekAction::Ignore => {}
        }
    }

    fn sync_scrubber(&mut self, out: &mut Vec<Command>) {
        let Some(s) = self.session.as_ref() else {
            return;
        };
        let enabled = self.seek.scrubber_enabled(s.delivery, s.buffer_ahead());
        if self.scrubber != Some(enabled) {
            self.scrubber = Some(enabled);
            out.push(Command::SetScrubberEnabled(enabled));
        }
    }

    // -- failures -----------------------------------------------------------

    fn on_transport_error(&mut self, error: TransportError, out: &mut Vec<Command>) {
        match self.recovery.classify(&error) {
            RecoveryAction::Ignore => {}
            RecoveryAction::RetryLoad => {
                tracing::warn!(error = %error, "Transport network error; retrying load");
                let from = (self.position() - self.stream_offset).max(0.0);
                out.push(Command::RestartLoad { from });
            }
            RecoveryAction::RecoverDecoder => {
                tracing::warn!(error = %error, "Transport media error; recovering decoder");
                out.push(Command::RecoverDecoder);
            }
            RecoveryAction::GiveUp => {
                tracing::warn!(error = %error, "Transport failed; giving up");
                self.fail(FailureKind::Transport(error.details), out);
            }
        }
    }

    /// First failure on the original file falls back to one re-encode;
    /// anything after that is terminal.
    fn fail(&mut self, kind: FailureKind, out: &mut Vec<Command>) {
        self.seek.reload_failed();
        let Some(s) = self.session.as_mut() else {
            return;
        };

        if s.delivery == DeliveryMethod::Direct && !s.transcode_attempted && !s.fallback_used {
            s.fallback_used = true;
            tracing::warn!(
                title_id = %s.title_id,
                reason = %kind,
                position = s.position,
                "Direct playback failed; falling back to re-encode"
            );
            self.force_reencode = true;
            let position = s.position;
            self.reload(position, out);
            return;
        }

        self.enter_error(kind, out);
    }

    fn enter_error(&mut self, kind: FailureKind, out: &mut Vec<Command>) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        tracing::error!(title_id = %s.title_id, reason = %kind, "Playback failed");

        let prompt = ErrorPrompt {
            message: kind.user_message(),
            can_retry: true,
            can_transcode: s.delivery == DeliveryMethod::Direct,
        };
        s.state = PlaybackState::Error;
        s.seeking = false;
        s.error = Some(prompt.clone());

        if let Some(stop) = stop_transcode(s) {
            out.push(stop);
        }
        out.push(Command::TearDown);
        s.descriptor = None;
        out.push(Command::ShowError(prompt));
    }

    fn state(&self) -> Option<PlaybackState> {
        self.session.as_ref().map(|s| s.state)
    }

    fn position(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.position)
    }
}

/// Events a session in `state` reacts to.
fn accepts(state: PlaybackState, event: &PlayerEvent) -> bool {
    match state {
        PlaybackState::Error => matches!(
            event,
            PlayerEvent::Retry | PlayerEvent::TryTranscoding | PlayerEvent::QualitySelected { .. }
        ),
        PlaybackState::Ended => matches!(event, PlayerEvent::ProgressTick),
        _ => !matches!(event, PlayerEvent::Retry | PlayerEvent::TryTranscoding),
    }
}

impl PlayerEvent {
    /// Whether the event originates from the media element or its transport.
    pub fn is_media_event(&self) -> bool {
        matches!(
            self,
            PlayerEvent::MediaReady
                | PlayerEvent::Playing
                | PlayerEvent::AutoplayBlocked
                | PlayerEvent::Waiting
                | PlayerEvent::TimeUpdate { .. }
                | PlayerEvent::DurationChange { .. }
                | PlayerEvent::BufferedChanged(_)
                | PlayerEvent::Seeked
                | PlayerEvent::Ended
                | PlayerEvent::PlaybackFailed(_)
                | PlayerEvent::TransportError(_)
        )
    }
}

fn stop_transcode(session: &PlaybackSession) -> Option<Command> {
    let descriptor = session.descriptor.as_ref()?;
    if descriptor.delivery != DeliveryMethod::Transcode {
        return None;
    }
    descriptor.session.clone().map(|session| Command::StopTranscode { session })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiator::ClientIdentity;
    use cs_core::TimelineState;

    fn controller() -> PlaybackController {
        let negotiator = StreamNegotiator::new(
            cs_core::default_quality_catalog(),
            ClientIdentity {
                client_identifier: "cs-test".into(),
                product: "Cinesync".into(),
                platform: "Web".into(),
            },
            "h264",
            "aac",
        );
        PlaybackController::new(Arc::new(negotiator), ControllerSettings::default())
    }

    fn mount(c: &mut PlaybackController, quality: Option<&str>, offset: f64) -> Vec<Command> {
        c.handle(PlayerEvent::Mount(MountRequest {
            title_id: "77".parse().unwrap(),
            offset,
            quality: quality.map(String::from),
            duration: Some(1000.0),
        }))
    }

    fn loads(cmds: &[Command]) -> Vec<&StreamDescriptor> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Load { descriptor, .. } => Some(descriptor),
                _ => None,
            })
            .collect()
    }

    fn start_playing(c: &mut PlaybackController) {
        c.handle(PlayerEvent::MediaReady);
        c.handle(PlayerEvent::Playing);
    }

    #[test]
    fn mount_loads_direct_stream_with_short_deadline() {
        let mut c = controller();
        let cmds = mount(&mut c, None, 0.0);
        let descriptor = loads(&cmds)[0];
        assert_eq!(descriptor.delivery, DeliveryMethod::Direct);
        assert!(cmds.contains(&Command::ArmLoadDeadline {
            generation: 1,
            after: Duration::from_secs(20),
        }));
        assert!(cmds.contains(&Command::SetScrubberEnabled(true)));
        assert_eq!(c.session().unwrap().state, PlaybackState::Loading);
    }

    #[test]
    fn reencode_mount_uses_long_deadline_and_adaptive_transport() {
        let mut c = controller();
        let cmds = mount(&mut c, Some("720p"), 125.4);
        let Some(Command::Load {
            adaptive, start_at, ..
        }) = cmds.iter().find(|c| matches!(c, Command::Load { .. }))
        else {
            panic!("expected load");
        };
        assert!(*adaptive);
        assert_eq!(*start_at, 0.0);
        assert!(cmds.contains(&Command::ArmLoadDeadline {
            generation: 1,
            after: Duration::from_secs(45),
        }));
        assert!(cmds.contains(&Command::SetScrubberEnabled(false)));
    }

    #[test]
    fn media_ready_autoplays_then_playing_reports_timeline() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        assert_eq!(
            c.handle(PlayerEvent::MediaReady),
            vec![Command::Play { muted: false }]
        );
        let cmds = c.handle(PlayerEvent::Playing);
        assert!(matches!(
            &cmds[0],
            Command::Notify(Notification::Timeline(ev)) if ev.state == TimelineState::Playing
        ));
        assert_eq!(c.session().unwrap().state, PlaybackState::Playing);
    }

    #[test]
    fn autoplay_retries_muted_once_then_prompts() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        c.handle(PlayerEvent::MediaReady);
        assert_eq!(
            c.handle(PlayerEvent::AutoplayBlocked),
            vec![Command::Play { muted: true }]
        );
        let cmds = c.handle(PlayerEvent::AutoplayBlocked);
        assert!(cmds.contains(&Command::PromptForPlay));
        assert_eq!(c.session().unwrap().state, PlaybackState::Paused);
    }

    #[test]
    fn waiting_buffers_and_playing_resumes() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        start_playing(&mut c);
        c.handle(PlayerEvent::Waiting);
        assert_eq!(c.session().unwrap().state, PlaybackState::Buffering);
        c.handle(PlayerEvent::Playing);
        assert_eq!(c.session().unwrap().state, PlaybackState::Playing);
    }

    #[test]
    fn decode_failure_on_direct_falls_back_exactly_once() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        c.handle(PlayerEvent::MediaReady);
        c.handle(PlayerEvent::TimeUpdate { media_time: 300.0 });

        let cmds = c.handle(PlayerEvent::PlaybackFailed(FailureKind::Decode("hevc".into())));
        let retry = loads(&cmds);
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].delivery, DeliveryMethod::Transcode);
        assert_eq!(retry[0].start_offset_secs, 300);
        assert!(!cmds.iter().any(|c| matches!(c, Command::ShowError(_))));

        let cmds = c.handle(PlayerEvent::PlaybackFailed(FailureKind::Decode("again".into())));
        assert!(loads(&cmds).is_empty());
        let Some(Command::ShowError(prompt)) =
            cmds.iter().find(|c| matches!(c, Command::ShowError(_)))
        else {
            panic!("expected error");
        };
        assert!(prompt.can_retry);
        assert!(!prompt.can_transcode);
        assert!(cmds.iter().any(|c| matches!(c, Command::StopTranscode { .. })));
        assert_eq!(c.session().unwrap().state, PlaybackState::Error);
    }

    #[test]
    fn deadline_is_fatal_and_offers_transcoding() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        let cmds = c.handle(PlayerEvent::LoadDeadlineElapsed { generation: 1 });
        assert!(loads(&cmds).is_empty());
        let Some(Command::ShowError(prompt)) = cmds.last() else {
            panic!("expected error");
        };
        assert!(prompt.can_transcode);

        let cmds = c.handle(PlayerEvent::TryTranscoding);
        assert_eq!(loads(&cmds)[0].delivery, DeliveryMethod::Transcode);
    }

    #[test]
    fn stale_deadline_is_ignored() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        c.handle(PlayerEvent::PlaybackFailed(FailureKind::Network("reset".into())));
        // Generation 2 is loading now.
        assert!(c
            .handle(PlayerEvent::LoadDeadlineElapsed { generation: 1 })
            .is_empty());
        assert_eq!(c.session().unwrap().state, PlaybackState::Loading);
    }

    #[test]
    fn unbuffered_reencode_seeks_coalesce_into_one_reload() {
        let mut c = controller();
        mount(&mut c, Some("720p"), 0.0);
        start_playing(&mut c);
        c.handle(PlayerEvent::BufferedChanged(vec![BufferedRange::new(0.0, 20.0)]));

        let mut last_seq = 0;
        for target in [40.0, 42.0, 45.0] {
            let cmds = c.handle(PlayerEvent::SeekRequested { target });
            assert!(loads(&cmds).is_empty());
            if let Some(Command::ArmSeekDebounce { seq, .. }) = cmds.first() {
                last_seq = *seq;
            }
        }
        assert!(c
            .handle(PlayerEvent::SeekDebounceElapsed { seq: last_seq - 1 })
            .is_empty());

        let cmds = c.handle(PlayerEvent::SeekDebounceElapsed { seq: last_seq });
        let reload = loads(&cmds);
        assert_eq!(reload.len(), 1);
        assert_eq!(reload[0].start_offset_secs, 45);
        assert!(matches!(cmds[0], Command::StopTranscode { .. }));
        assert_eq!(cmds[1], Command::TearDown);
    }

    #[test]
    fn reload_stops_previous_job_not_its_replacement() {
        let mut c = controller();
        let first = loads(&mount(&mut c, Some("720p"), 0.0))[0].session.clone();
        start_playing(&mut c);

        let cmds = c.handle(PlayerEvent::SeekCommitted { target: 300.0 });
        let stopped: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                Command::StopTranscode { session } => Some(session.clone()),
                _ => None,
            })
            .collect();
        let replacement = loads(&cmds)[0].session.clone();

        assert_eq!(stopped.len(), 1);
        assert_eq!(Some(&stopped[0]), first.as_ref());
        assert_ne!(Some(&stopped[0]), replacement.as_ref());
        assert_eq!(loads(&cmds)[0].param("session"), replacement.as_deref());
    }

    #[test]
    fn events_from_a_torn_down_stream_are_dropped() {
        let mut c = controller();
        mount(&mut c, Some("720p"), 0.0);
        start_playing(&mut c);
        c.handle(PlayerEvent::SeekCommitted { target: 300.0 });
        assert_eq!(c.session().unwrap().generation, 2);

        let stale = |event| PlayerEvent::Stream {
            generation: 1,
            event: Box::new(event),
        };
        assert!(c
            .handle(stale(PlayerEvent::TimeUpdate { media_time: 50.0 }))
            .is_empty());
        assert!(c
            .handle(stale(PlayerEvent::PlaybackFailed(FailureKind::Network(
                "aborted".into()
            ))))
            .is_empty());
        let session = c.session().unwrap();
        assert_eq!(session.position, 300.0);
        assert_eq!(session.state, PlaybackState::Loading);

        let cmds = c.handle(PlayerEvent::Stream {
            generation: 2,
            event: Box::new(PlayerEvent::MediaReady),
        });
        assert!(cmds.contains(&Command::Play { muted: false }));
    }

    #[test]
    fn tagged_control_events_are_rejected() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        assert!(c
            .handle(PlayerEvent::Stream {
                generation: 1,
                event: Box::new(PlayerEvent::Unmount),
            })
            .is_empty());
        assert!(c.session().is_some());
    }

    #[test]
    fn buffered_seek_updates_position_without_reload() {
        let mut c = controller();
        mount(&mut c, Some("720p"), 100.0);
        start_playing(&mut c);
        // Element time 0..30 is title time 100..130.
        c.handle(PlayerEvent::BufferedChanged(vec![BufferedRange::new(0.0, 30.0)]));
        let cmds = c.handle(PlayerEvent::SeekRequested { target: 120.0 });
        assert_eq!(cmds, vec![Command::SetPosition(20.0)]);
        assert!(c.session().unwrap().seeking);
        c.handle(PlayerEvent::Seeked);
        assert!(!c.session().unwrap().seeking);
    }

    #[test]
    fn direct_seek_is_always_native() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        start_playing(&mut c);
        let cmds = c.handle(PlayerEvent::SeekRequested { target: 700.0 });
        assert_eq!(cmds, vec![Command::SetPosition(700.0)]);
    }

    #[test]
    fn seek_during_reload_is_replayed_after_it_lands() {
        let mut c = controller();
        mount(&mut c, Some("720p"), 0.0);
        start_playing(&mut c);
        c.handle(PlayerEvent::SeekCommitted { target: 300.0 });
        assert!(c.seek_manager().reload_in_flight());

        assert!(loads(&c.handle(PlayerEvent::SeekRequested { target: 600.0 })).is_empty());
        let cmds = c.handle(PlayerEvent::MediaReady);
        let reload = loads(&cmds);
        assert_eq!(reload.len(), 1);
        assert_eq!(reload[0].start_offset_secs, 600);
        assert!(!cmds.iter().any(|c| matches!(c, Command::Play { .. })));
    }

    #[test]
    fn scrubber_reenabled_once_buffer_ahead_is_sufficient() {
        let mut c = controller();
        mount(&mut c, Some("720p"), 50.0);
        c.handle(PlayerEvent::MediaReady);
        c.handle(PlayerEvent::Playing);
        let cmds = c.handle(PlayerEvent::BufferedChanged(vec![BufferedRange::new(0.0, 4.0)]));
        assert!(!cmds.contains(&Command::SetScrubberEnabled(true)));
        let cmds = c.handle(PlayerEvent::BufferedChanged(vec![BufferedRange::new(0.0, 12.0)]));
        assert_eq!(cmds, vec![Command::SetScrubberEnabled(true)]);
    }

    #[test]
    fn watched_marked_once_past_threshold() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        start_playing(&mut c);

        let mut watched = 0;
        for t in [850.0, 910.0, 920.0, 990.0] {
            watched += c
                .handle(PlayerEvent::TimeUpdate { media_time: t })
                .iter()
                .filter(|c| matches!(c, Command::Notify(Notification::MarkWatched(_))))
                .count();
            watched += c
                .handle(PlayerEvent::ProgressTick)
                .iter()
                .filter(|c| matches!(c, Command::Notify(Notification::MarkWatched(_))))
                .count();
        }
        assert_eq!(watched, 1);
    }

    #[test]
    fn ended_is_terminal() {
        let mut c = controller();
        mount(&mut c, None, 0.0);
        start_playing(&mut c);
        let cmds = c.handle(PlayerEvent::Ended);
        assert!(matches!(
            &cmds[0],
            Command::Notify(Notification::Timeline(ev)) if ev.state == TimelineState::Stopped
        ));
        assert!(c.handle(PlayerEvent::UserPlay).is_empty());
        assert!(c
            .handle(PlayerEvent::QualitySelected {
                quality: "720p".into()
            })
            .is_empty());
        assert_eq!(c.session().unwrap().state, PlaybackState::Ended);
    }

    #[test]
    fn unmount_sends_final_stop_and_stops_transcode() {
        let mut c = controller();
        mount(&mut c, Some("480p"), 0.0);
        start_playing(&mut c);
        c.handle(PlayerEvent::TimeUpdate { media_time: 42.0 });

        let cmds = c.handle(PlayerEvent::Unmount);
        let Command::NotifyFinal(ev) = &cmds[0] else {
            panic!("expected final notification first");
        };
        assert_eq!(ev.state, TimelineState::Stopped);
        assert_eq!(ev.position_ms, 42_000);
        assert!(matches!(cmds[1], Command::StopTranscode { .. }));
        assert_eq!(cmds[2], Command::TearDown);
        assert!(c.session().is_none());
    }

    #[test]
    fn quality_reselection_may_return_to_direct() {
        let mut c = controller();
        mount(&mut c, Some("720p"), 0.0);
        start_playing(&mut c);
        c.handle(PlayerEvent::TimeUpdate { media_time: 10.0 });
        let cmds = c.handle(PlayerEvent::QualitySelected {
            quality: "original".into(),
        });
        let reload = loads(&cmds);
        assert_eq!(reload[0].delivery, DeliveryMethod::Direct);
        assert_eq!(c.session().unwrap().position, 10.0);
    }

    #[test]
    fn transport_errors_recover_before_failing() {
        let mut c = controller();
        mount(&mut c, Some("720p"), 0.0);
        c.handle(PlayerEvent::MediaReady);
        let cmds = c.handle(PlayerEvent::TransportError(TransportError::media("append")));
        assert_eq!(cmds, vec![Command::RecoverDecoder]);
        c.handle(PlayerEvent::TransportError(TransportError::media("append")));
        let cmds = c.handle(PlayerEvent::TransportError(TransportError::media("append")));
        assert!(cmds.iter().any(|c| matches!(c, Command::ShowError(_))));
    }

    #[test]
    fn events_before_mount_are_ignored() {
        let mut c = controller();
        assert!(c.handle(PlayerEvent::Playing).is_empty());
        assert!(c.handle(PlayerEvent::Unmount).is_empty());
    }
}
