//! Progress reporting: timeline notifications and one-shot watched marking.
//!
//! The reporter only decides *what* to send. Sending is fire-and-forget and
//! handled by the driver through a [`crate::Notifier`].

use cs_core::{TimelineEvent, TimelineState, TitleId};

use crate::session::{PlaybackSession, PlaybackState};

/// An upstream notification the controller wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Timeline(TimelineEvent),
    MarkWatched(TitleId),
}

#[derive(Debug, Clone)]
pub struct ProgressReporter {
    threshold: f64,
    title_id: Option<TitleId>,
    watched_sent: bool,
}

impl ProgressReporter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            title_id: None,
            watched_sent: false,
        }
    }

    /// Start reporting for `title_id`. The watched flag only resets when the
    /// title actually changes.
    pub fn load_title(&mut self, title_id: &TitleId) {
        if self.title_id.as_ref() != Some(title_id) {
            self.title_id = Some(title_id.clone());
            self.watched_sent = false;
        }
    }

    pub fn watched_sent(&self) -> bool {
        self.watched_sent
    }

    /// Immediate report for a state transition. Only transitions into
    /// playing, paused or ended are reported.
    pub fn on_transition(&mut self, session: &PlaybackSession) -> Vec<Notification> {
        let Some(state) = timeline_state(session.state) else {
            return Vec::new();
        };
        let mut out = vec![Notification::Timeline(timeline(session, state))];
        out.extend(self.check_watched(session));
        out
    }

    /// Periodic report; silent unless the session is playing.
    pub fn on_tick(&mut self, session: &PlaybackSession) -> Vec<Notification> {
        if session.state != PlaybackState::Playing {
            return Vec::new();
        }
        let mut out = vec![Notification::Timeline(timeline(
            session,
            TimelineState::Playing,
        ))];
        out.extend(self.check_watched(session));
        out
    }

    /// Position moved; mark watched the first time the threshold is crossed.
    pub fn on_position(&mut self, session: &PlaybackSession) -> Option<Notification> {
        self.check_watched(session)
    }

    /// The last report of a watch attempt.
    pub fn final_stopped(&self, session: &PlaybackSession) -> TimelineEvent {
        timeline(session, TimelineState::Stopped)
    }

    fn check_watched(&mut self, session: &PlaybackSession) -> Option<Notification> {
        if self.watched_sent || session.duration <= 0.0 {
            return None;
        }
        if session.position / session.duration < self.threshold {
            return None;
        }
        self.watched_sent = true;
        Some(Notification::MarkWatched(session.title_id.clone()))
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(0.9)
    }
}

fn timeline_state(state: PlaybackState) -> Option<TimelineState> {
    match state {
        PlaybackState::Playing => Some(TimelineState::Playing),
        PlaybackState::Paused => Some(TimelineState::Paused),
        PlaybackState::Ended => Some(TimelineState::Stopped),
        _ => None,
    }
}

fn timeline(session: &PlaybackSession, state: TimelineState) -> TimelineEvent {
    TimelineEvent::from_secs(
        session.title_id.clone(),
        state,
        session.position,
        session.duration,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_core::{QualityProfile, SessionId};

    fn session(state: PlaybackState, position: f64) -> PlaybackSession {
        let mut s = PlaybackSession::new(
            SessionId::new(),
            "31".parse().unwrap(),
            QualityProfile::original(),
            100.0,
        );
        s.state = state;
        s.set_position(position);
        s
    }

    fn watched_count(notes: &[Notification]) -> usize {
        notes
            .iter()
            .filter(|n| matches!(n, Notification::MarkWatched(_)))
            .count()
    }

    #[test]
    fn tick_only_while_playing() {
        let mut r = ProgressReporter::default();
        assert_eq!(r.on_tick(&session(PlaybackState::Playing, 10.0)).len(), 1);
        assert!(r.on_tick(&session(PlaybackState::Paused, 10.0)).is_empty());
        assert!(r.on_tick(&session(PlaybackState::Buffering, 10.0)).is_empty());
    }

    #[test]
    fn ended_reports_stopped() {
        let mut r = ProgressReporter::default();
        let notes = r.on_transition(&session(PlaybackState::Ended, 50.0));
        let Notification::Timeline(ev) = &notes[0] else {
            panic!("expected timeline");
        };
        assert_eq!(ev.state, TimelineState::Stopped);
        assert_eq!(ev.position_ms, 50_000);
    }

    #[test]
    fn loading_transition_is_silent() {
        let mut r = ProgressReporter::default();
        assert!(r.on_transition(&session(PlaybackState::Loading, 0.0)).is_empty());
    }

    #[test]
    fn watched_fires_once_past_threshold() {
        let mut r = ProgressReporter::default();
        let title: TitleId = "31".parse().unwrap();
        r.load_title(&title);

        assert!(r.on_position(&session(PlaybackState::Playing, 89.0)).is_none());
        assert!(r.on_position(&session(PlaybackState::Playing, 91.0)).is_some());
        assert!(r.on_position(&session(PlaybackState::Playing, 95.0)).is_none());
        assert_eq!(watched_count(&r.on_tick(&session(PlaybackState::Playing, 96.0))), 0);

        // Seeking back and forward again does not re-fire.
        assert!(r.on_position(&session(PlaybackState::Playing, 20.0)).is_none());
        assert!(r.on_position(&session(PlaybackState::Playing, 92.0)).is_none());

        // Reloading the same title keeps the flag.
        r.load_title(&title);
        assert!(r.watched_sent());
    }

    #[test]
    fn new_title_resets_watched_flag() {
        let mut r = ProgressReporter::default();
        r.load_title(&"31".parse().unwrap());
        r.on_position(&session(PlaybackState::Playing, 95.0));
        r.load_title(&"32".parse().unwrap());
        assert!(!r.watched_sent());
    }

    #[test]
    fn unknown_duration_never_marks_watched() {
        let mut r = ProgressReporter::default();
        let mut s = session(PlaybackState::Playing, 0.0);
        s.duration = 0.0;
        s.position = 500.0;
        assert!(r.on_position(&s).is_none());
    }
}
