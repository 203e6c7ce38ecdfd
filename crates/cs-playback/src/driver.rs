//! Async runtime around the [`PlaybackController`] reducer.
//!
//! The driver owns the controller, the media host and every timer. Events
//! arrive over an unbounded channel from a [`PlayerHandle`], or from the
//! [`StreamEvents`] handed to the host with each load; commands are
//! executed in order against the [`MediaHost`], and notifications are spawned
//! fire-and-forget so an upstream call can never hold up playback.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use cs_core::{Result, SessionId, StreamDescriptor, TimelineEvent, TitleId};

use crate::controller::{Command, PlaybackController, PlayerEvent};
use crate::debounce::KeyedDebouncer;
use crate::progress::Notification;
use crate::session::ErrorPrompt;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The media element plus whatever transport feeds it.
///
/// Implementations report what the element does by sending [`PlayerEvent`]s
/// through the [`StreamEvents`] given with the stream they concern.
pub trait MediaHost: Send + 'static {
    /// Attach a new stream. `adaptive` selects the segmented-streaming client.
    fn load(
        &mut self,
        descriptor: &StreamDescriptor,
        adaptive: bool,
        start_at: f64,
        events: StreamEvents,
    );
    /// Discard the element and its transport.
    fn tear_down(&mut self);
    fn play(&mut self, muted: bool);
    fn pause(&mut self);
    fn set_position(&mut self, media_time: f64);
    fn restart_load(&mut self, from: f64);
    fn recover_decoder(&mut self);
    fn set_scrubber_enabled(&mut self, enabled: bool);
    fn prompt_for_play(&mut self);
    fn show_error(&mut self, prompt: &ErrorPrompt);
}

/// Upstream progress notifications.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn timeline(&self, event: &TimelineEvent) -> Result<()>;

    async fn mark_watched(&self, title_id: &TitleId) -> Result<()>;

    async fn stop_transcode(&self, session: &str) -> Result<()>;

    /// Send a final report without blocking the caller. Must survive the
    /// caller going away immediately afterwards.
    fn beacon(&self, event: TimelineEvent);
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable sender for player events.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: UnboundedSender<PlayerEvent>,
}

impl PlayerHandle {
    /// Queue an event. Returns `false` once the driver has stopped.
    pub fn send(&self, event: PlayerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn unmount(&self) -> bool {
        self.send(PlayerEvent::Unmount)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Event sender scoped to one loaded stream. Every event is tagged with the
/// stream's load generation, so reports from a torn-down element that are
/// still queued never reach its replacement.
#[derive(Clone)]
pub struct StreamEvents {
    tx: WeakUnboundedSender<PlayerEvent>,
    generation: u64,
}

impl StreamEvents {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event. Returns `false` once the driver has stopped.
    pub fn send(&self, event: PlayerEvent) -> bool {
        let Some(tx) = self.tx.upgrade() else {
            return false;
        };
        tx.send(PlayerEvent::Stream {
            generation: self.generation,
            event: Box::new(event),
        })
        .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Shortest period between progress ticks.
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

pub struct PlayerDriver<H: MediaHost> {
    controller: PlaybackController,
    host: H,
    notifier: Arc<dyn Notifier>,
    rx: UnboundedReceiver<PlayerEvent>,
    /// Timers only hold weak senders so dropping every handle ends the loop.
    timer_tx: WeakUnboundedSender<PlayerEvent>,
    debouncer: KeyedDebouncer<SessionId>,
    deadline: Option<JoinHandle<()>>,
    progress_interval: Duration,
}

impl<H: MediaHost> PlayerDriver<H> {
    /// The progress period comes from the controller settings.
    pub fn new(
        controller: PlaybackController,
        host: H,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, PlayerHandle) {
        let progress_interval = controller
            .settings()
            .progress_interval
            .max(MIN_PROGRESS_INTERVAL);
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self {
            controller,
            host,
            notifier,
            rx,
            timer_tx: tx.downgrade(),
            debouncer: KeyedDebouncer::new(),
            deadline: None,
            progress_interval,
        };
        (driver, PlayerHandle { tx })
    }

    /// Run on the current tokio runtime. The join handle yields the host
    /// back once the session unmounts.
    pub fn spawn(self) -> JoinHandle<H> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> H {
        let mut ticker = tokio::time::interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("All player handles dropped; unmounting");
                        self.dispatch(PlayerEvent::Unmount);
                        break;
                    };
                    let unmount = matches!(event, PlayerEvent::Unmount);
                    self.dispatch(event);
                    if unmount {
                        break;
                    }
                }
                _ = ticker.tick() => self.dispatch(PlayerEvent::ProgressTick),
            }
        }

        self.debouncer.cancel_all();
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
        self.host
    }

    fn dispatch(&mut self, event: PlayerEvent) {
        for command in self.controller.handle(event) {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Load {
                descriptor,
                adaptive,
                start_at,
                generation,
            } => {
                let events = StreamEvents {
                    tx: self.timer_tx.clone(),
                    generation,
                };
                self.host.load(&descriptor, adaptive, start_at, events);
            }
            Command::TearDown => self.host.tear_down(),
            Command::Play { muted } => self.host.play(muted),
            Command::Pause => self.host.pause(),
            Command::SetPosition(t) => self.host.set_position(t),
            Command::RestartLoad { from } => self.host.restart_load(from),
            Command::RecoverDecoder => self.host.recover_decoder(),
            Command::SetScrubberEnabled(enabled) => self.host.set_scrubber_enabled(enabled),
            Command::PromptForPlay => self.host.prompt_for_play(),
            Command::ShowError(prompt) => self.host.show_error(&prompt),
            Command::ArmLoadDeadline { generation, after } => {
                if let Some(previous) = self.deadline.take() {
                    previous.abort();
                }
                let tx = self.timer_tx.clone();
                self.deadline = Some(tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    send_weak(&tx, PlayerEvent::LoadDeadlineElapsed { generation });
                }));
            }
            Command::ArmSeekDebounce { seq, after } => {
                let Some(session_id) = self.controller.session().map(|s| s.id) else {
                    return;
                };
                let tx = self.timer_tx.clone();
                self.debouncer.schedule(session_id, after, async move {
                    send_weak(&tx, PlayerEvent::SeekDebounceElapsed { seq });
                });
            }
            Command::StopTranscode { session } => {
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.stop_transcode(&session).await {
                        tracing::warn!(session = %session, error = %e, "Failed to stop re-encode job");
                    }
                });
            }
            Command::Notify(Notification::Timeline(event)) => {
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.timeline(&event).await {
                        tracing::warn!(title_id = %event.title_id, error = %e, "Timeline report failed");
                    }
                });
            }
            Command::Notify(Notification::MarkWatched(title_id)) => {
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.mark_watched(&title_id).await {
                        tracing::warn!(title_id = %title_id, error = %e, "Mark watched failed");
                    }
                });
            }
            Command::NotifyFinal(event) => self.notifier.beacon(event),
        }
    }
}

fn send_weak(tx: &WeakUnboundedSender<PlayerEvent>, event: PlayerEvent) {
    if let Some(tx) = tx.upgrade() {
        let _ = tx.send(event);
    }
}
