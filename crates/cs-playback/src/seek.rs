//! Buffer-aware seeking.
//!
//! Seeks inside the buffered window (or anywhere on the unmodified file) are
//! plain position updates. An unbuffered seek on a re-encoded stream cannot
//! be served by the existing encode job, so it turns into a reload anchored
//! at the target. Those reloads are debounced, coalesced and guarded so at
//! most one is ever in flight.

use cs_core::config::PlaybackConfig;
use cs_core::{BufferedRange, DeliveryMethod};

/// Tolerances used when classifying a seek target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekPolicy {
    /// Slack before the start of a buffered range, in seconds.
    pub back_tolerance: f64,
    /// Slack past the end of a buffered range, in seconds.
    pub forward_tolerance: f64,
    /// Buffer ahead of the playhead needed before scrubbing is re-enabled
    /// after a re-encode reload.
    pub scrub_ready_buffer: f64,
}

impl Default for SeekPolicy {
    fn default() -> Self {
        Self {
            back_tolerance: 1.0,
            forward_tolerance: 5.0,
            scrub_ready_buffer: 10.0,
        }
    }
}

impl From<&PlaybackConfig> for SeekPolicy {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            back_tolerance: config.buffer_back_tolerance_secs,
            forward_tolerance: config.buffer_forward_tolerance_secs,
            scrub_ready_buffer: config.scrub_ready_buffer_secs,
        }
    }
}

/// Whether `target` falls inside `[start - back, end + forward]` of any range.
pub fn is_buffered(target: f64, ranges: &[BufferedRange], back: f64, forward: f64) -> bool {
    ranges
        .iter()
        .any(|r| r.contains_with_slack(target, back, forward))
}

/// What the controller should do with a seek.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekAction {
    /// Set the media element position directly; no reload.
    Native(f64),
    /// (Re)start the debounce window. Only a firing tagged with `seq` counts.
    Debounce { seq: u64, target: f64 },
    /// Reload the stream now, anchored at the target.
    Reload(f64),
    /// A reload is in flight; the target was recorded as pending.
    Deferred(f64),
    /// Stale timer firing or nothing pending.
    Ignore,
}

/// Guard state for seek-triggered reloads of one session.
#[derive(Debug, Clone)]
pub struct SeekManager {
    policy: SeekPolicy,
    /// Latest unbuffered target not yet turned into a reload.
    pending: Option<f64>,
    reload_in_flight: bool,
    /// Offset the in-flight (or last) reload was anchored at.
    anchor: Option<f64>,
    /// Set when a re-encode reload starts; cleared once enough buffer exists.
    awaiting_buffer: bool,
    seq: u64,
}

impl SeekManager {
    pub fn new(policy: SeekPolicy) -> Self {
        Self {
            policy,
            pending: None,
            reload_in_flight: false,
            anchor: None,
            awaiting_buffer: false,
            seq: 0,
        }
    }

    pub fn policy(&self) -> &SeekPolicy {
        &self.policy
    }

    pub fn pending_target(&self) -> Option<f64> {
        self.pending
    }

    pub fn reload_in_flight(&self) -> bool {
        self.reload_in_flight
    }

    pub fn anchor(&self) -> Option<f64> {
        self.anchor
    }

    /// Sequence number of the most recently armed debounce window.
    pub fn debounce_seq(&self) -> u64 {
        self.seq
    }

    pub fn is_buffered(&self, target: f64, ranges: &[BufferedRange]) -> bool {
        is_buffered(
            target,
            ranges,
            self.policy.back_tolerance,
            self.policy.forward_tolerance,
        )
    }

    /// A seek requested while the user is still scrubbing.
    pub fn request(
        &mut self,
        target: f64,
        delivery: DeliveryMethod,
        buffered: &[BufferedRange],
    ) -> SeekAction {
        if delivery == DeliveryMethod::Direct {
            return self.native(target);
        }
        if self.reload_in_flight {
            self.pending = Some(target);
            return SeekAction::Deferred(target);
        }
        if self.is_buffered(target, buffered) {
            return self.native(target);
        }

        self.pending = Some(target);
        self.seq += 1;
        SeekAction::Debounce {
            seq: self.seq,
            target,
        }
    }

    /// An explicit commit (drag released). Skips the debounce window.
    pub fn commit(
        &mut self,
        target: f64,
        delivery: DeliveryMethod,
        buffered: &[BufferedRange],
    ) -> SeekAction {
        if delivery == DeliveryMethod::Direct {
            return self.native(target);
        }
        if self.reload_in_flight {
            self.pending = Some(target);
            return SeekAction::Deferred(target);
        }
        if self.is_buffered(target, buffered) {
            return self.native(target);
        }

        // Invalidate any armed timer; the reload happens now.
        self.seq += 1;
        self.pending = None;
        SeekAction::Reload(target)
    }

    /// The debounce timer tagged `seq` fired.
    pub fn debounce_elapsed(&mut self, seq: u64) -> SeekAction {
        if seq != self.seq {
            return SeekAction::Ignore;
        }
        if self.reload_in_flight {
            return self.pending.map_or(SeekAction::Ignore, SeekAction::Deferred);
        }
        match self.pending.take() {
            Some(target) => SeekAction::Reload(target),
            None => SeekAction::Ignore,
        }
    }

    /// Mark a reload anchored at `anchor` as in flight.
    pub fn begin_reload(&mut self, anchor: f64, delivery: DeliveryMethod) {
        self.reload_in_flight = true;
        self.anchor = Some(anchor);
        self.awaiting_buffer = delivery == DeliveryMethod::Transcode;
    }

    /// The in-flight reload produced a playable stream.
    ///
    /// Returns the latest target recorded while it was in flight when that
    /// target is meaningfully different from where the reload landed.
    pub fn reload_complete(&mut self) -> Option<f64> {
        self.reload_in_flight = false;
        let pending = self.pending.take()?;
        let anchor = self.anchor.unwrap_or(0.0);
        ((pending - anchor).abs() > self.policy.back_tolerance).then_some(pending)
    }

    /// The in-flight reload failed; nothing pending survives it.
    pub fn reload_failed(&mut self) {
        self.reload_in_flight = false;
        self.awaiting_buffer = false;
        self.pending = None;
    }

    /// Forget everything, e.g. when a new title is mounted.
    pub fn reset(&mut self) {
        self.pending = None;
        self.reload_in_flight = false;
        self.anchor = None;
        self.awaiting_buffer = false;
        self.seq += 1;
    }

    /// Whether the UI may offer scrubbing given the buffer ahead of the
    /// playhead. Unmodified-file delivery always allows it.
    pub fn scrubber_enabled(&mut self, delivery: DeliveryMethod, buffer_ahead: f64) -> bool {
        if delivery == DeliveryMethod::Direct {
            self.awaiting_buffer = false;
            return true;
        }
        if self.reload_in_flight {
            return false;
        }
        if self.awaiting_buffer && buffer_ahead >= self.policy.scrub_ready_buffer {
            self.awaiting_buffer = false;
        }
        !self.awaiting_buffer
    }

    fn native(&mut self, target: f64) -> SeekAction {
        // A buffered seek supersedes any unbuffered target still waiting.
        if self.pending.take().is_some() {
            self.seq += 1;
        }
        SeekAction::Native(target)
    }
}

impl Default for SeekManager {
    fn default() -> Self {
        Self::new(SeekPolicy::default())
    }
}
