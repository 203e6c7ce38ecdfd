//! cs-playback: the adaptive playback controller.
//!
//! The crate is split into pure decision logic and a thin async runtime:
//!
//! - [`negotiator`]: decides direct vs. re-encoded delivery and builds the
//!   upstream stream parameters.
//! - [`controller`]: the session state machine, a reducer from
//!   [`controller::PlayerEvent`] to [`controller::Command`]s.
//! - [`seek`]: buffer-aware seeking with debounce and a single-reload guard.
//! - [`progress`]: timeline notifications and one-shot watched marking.
//! - [`transport`]: error classification for the segmented-streaming client.
//! - [`debounce`] and [`driver`]: tokio timers and the actor that executes
//!   commands against a media host and a notifier.
//! - [`notify`]: the reqwest-backed notifier talking to the cinesync server.

pub mod controller;
pub mod debounce;
pub mod driver;
pub mod negotiator;
pub mod notify;
pub mod progress;
pub mod seek;
pub mod session;
pub mod transport;

pub use controller::{Command, ControllerSettings, MountRequest, PlaybackController, PlayerEvent};
pub use driver::{MediaHost, Notifier, PlayerDriver, PlayerHandle, StreamEvents};
pub use negotiator::{ClientIdentity, NegotiateOptions, StreamNegotiator};
pub use notify::HttpNotifier;
pub use session::{ErrorPrompt, FailureKind, PlaybackSession, PlaybackState};
