use std::{
    path::PathBuf,
    sync::mpsc::{self, Receiver, Sender},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::TransporterError;
use crate::config::Preferences;
use crate::session::{SessionCounter, SessionStore};

use super::{
    Authorization, LiveTelemetry, MetricAccumulator, PositionSource, Session, SessionClock,
    TICK_PERIOD_MS, now_epoch_seconds,
};

/// Events the recorder reports to the user-facing surface.
#[derive(Clone, Debug, PartialEq)]
pub enum RecorderStatus {
    PermissionDenied,
    PermissionRestricted,
    SessionSaved { session_id: u64, path: PathBuf },
    PersistenceFailed { session_id: u64, reason: String },
}

struct ActiveRecording {
    session: Session,
    clock: SessionClock,
}

enum RecorderState {
    Idle,
    Recording(ActiveRecording),
}

/// `RecordingController` runs the recording lifecycle: it allocates session ids,
/// samples the position source on every clock tick while recording and hands the
/// sealed session to the store when recording stops.
///
/// The controller is `Idle` or `Recording`. Only the recording state owns an
/// open session, so at most one session is ever active.
pub struct RecordingController<S: PositionSource> {
    source: S,
    store: Box<dyn SessionStore>,
    counter: Box<dyn SessionCounter>,
    preferences: Box<dyn Preferences>,
    accumulator: MetricAccumulator,
    state: RecorderState,
    tick_period: Option<Duration>,
    live_sender: Option<Sender<LiveTelemetry>>,
    status_sender: Option<Sender<RecorderStatus>>,
    reported_authorization: Option<Authorization>,
}

impl<S: PositionSource> RecordingController<S> {
    pub fn new(
        source: S,
        store: impl SessionStore + 'static,
        counter: impl SessionCounter + 'static,
        preferences: impl Preferences + 'static,
    ) -> Self {
        Self {
            source,
            store: Box::new(store),
            counter: Box::new(counter),
            preferences: Box::new(preferences),
            accumulator: MetricAccumulator::new(),
            state: RecorderState::Idle,
            tick_period: Some(Duration::from_millis(TICK_PERIOD_MS)),
            live_sender: None,
            status_sender: None,
            reported_authorization: None,
        }
    }

    /// Sets the clock period. `None` means no clock thread is started and the
    /// owner calls [`Self::on_tick`] itself.
    pub fn with_tick_period(mut self, tick_period: Option<Duration>) -> Self {
        self.tick_period = tick_period;
        self
    }

    /// Subscribe to live values. Every sample pushes a fresh snapshot, and
    /// stopping pushes a cleared one.
    pub fn live_feed(&mut self) -> Receiver<LiveTelemetry> {
        let (live_tx, live_rx) = mpsc::channel();
        self.live_sender = Some(live_tx);
        live_rx
    }

    pub fn status_feed(&mut self) -> Receiver<RecorderStatus> {
        let (status_tx, status_rx) = mpsc::channel();
        self.status_sender = Some(status_tx);
        status_rx
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording(_))
    }

    pub fn active_session(&self) -> Option<&Session> {
        match &self.state {
            RecorderState::Recording(active) => Some(&active.session),
            RecorderState::Idle => None,
        }
    }

    pub fn live(&self) -> LiveTelemetry {
        self.accumulator.live()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Number of clock ticks dropped because sampling had not caught up
    pub fn dropped_ticks(&self) -> u64 {
        match &self.state {
            RecorderState::Recording(active) => active.clock.dropped_ticks(),
            RecorderState::Idle => 0,
        }
    }

    /// Begin a new recording and return its session id.
    ///
    /// # Errors
    ///
    /// `AlreadyRecording` if a session is active, in which case nothing changes.
    /// Counter failures leave the controller `Idle`.
    pub fn start(&mut self) -> Result<u64, TransporterError> {
        if let RecorderState::Recording(active) = &self.state {
            warn!(
                "Ignoring start request, session {} is still recording",
                active.session.session_id
            );
            return Err(TransporterError::AlreadyRecording {
                session_id: active.session.session_id,
            });
        }

        self.check_authorization();

        let session_id = self.counter.next_session_id()?;
        let session = Session::new(
            session_id,
            now_epoch_seconds(),
            self.preferences.current_tyre_type(),
            self.preferences.current_driver_name(),
        );
        self.accumulator.reset();

        if let Err(e) = self.source.start() {
            warn!("Position source did not start: {}", e);
        }

        let clock = match self.tick_period {
            Some(period) => SessionClock::start(period),
            None => SessionClock::manual(),
        };
        self.state = RecorderState::Recording(ActiveRecording { session, clock });

        info!("Recording session {}", session_id);
        Ok(session_id)
    }

    /// Finish the active recording and persist it.
    ///
    /// The controller is `Idle` when this returns, whether or not the session
    /// could be saved.
    ///
    /// # Errors
    ///
    /// `NotRecording` if there is no active session, or the store's error if
    /// persisting failed.
    pub fn stop(&mut self) -> Result<PathBuf, TransporterError> {
        let RecorderState::Recording(mut active) =
            std::mem::replace(&mut self.state, RecorderState::Idle)
        else {
            return Err(TransporterError::NotRecording);
        };

        active.clock.halt();
        if active.clock.dropped_ticks() > 0 {
            debug!("{} ticks dropped during recording", active.clock.dropped_ticks());
        }
        self.source.stop();

        let mut session = active.session;
        session.seal(now_epoch_seconds());
        let session_id = session.session_id;
        info!(
            "Stopping session {} with {} samples",
            session_id,
            session.data.len()
        );

        let result = self.store.persist(session);

        self.accumulator.reset();
        self.publish_live();

        match &result {
            Ok(path) => self.report(RecorderStatus::SessionSaved {
                session_id,
                path: path.clone(),
            }),
            Err(e) => {
                error!("Could not save session {}: {}", session_id, e);
                self.report(RecorderStatus::PersistenceFailed {
                    session_id,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    /// Runs one sampling step. Returns `true` when a sample was appended.
    pub fn on_tick(&mut self) -> bool {
        let RecorderState::Recording(active) = &mut self.state else {
            return false;
        };

        let fix = match self.source.latest_fix() {
            Ok(Some(fix)) if fix.is_usable() => fix,
            Ok(_) => {
                debug!("No position fix, skipping tick");
                return false;
            }
            Err(e) => {
                warn!("Position source failed, skipping tick: {}", e);
                return false;
            }
        };

        let sample = self.accumulator.record(&fix, now_epoch_seconds());
        active.session.data.push(sample);

        self.publish_live();
        true
    }

    /// Wait up to `timeout` for the next clock tick and run the sampling step
    /// for it. Returns whether a tick arrived.
    pub fn wait_for_tick(&mut self, timeout: Duration) -> bool {
        let ticked = match &self.state {
            RecorderState::Recording(active) => active.clock.next_tick(timeout).is_some(),
            RecorderState::Idle => false,
        };
        if ticked {
            self.on_tick();
        }
        ticked
    }

    /// The host signals that the app became active again. An active recording
    /// re-requests location updates.
    pub fn resume(&mut self) {
        if !self.is_recording() {
            return;
        }
        debug!("Resuming location updates");
        if let Err(e) = self.source.start() {
            warn!("Position source did not resume: {}", e);
        }
        self.check_authorization();
    }

    /// Query the source's permission state, reporting a denial once per change.
    pub fn check_authorization(&mut self) -> Authorization {
        let authorization = self.source.authorization();
        if self.reported_authorization != Some(authorization) {
            self.reported_authorization = Some(authorization);
            match authorization {
                Authorization::Denied => {
                    warn!("Location access denied");
                    self.report(RecorderStatus::PermissionDenied);
                }
                Authorization::Restricted => {
                    warn!("Location access restricted");
                    self.report(RecorderStatus::PermissionRestricted);
                }
                Authorization::Authorized | Authorization::NotDetermined => {}
            }
        }
        authorization
    }

    fn publish_live(&mut self) {
        if let Some(sender) = &self.live_sender {
            if sender.send(self.accumulator.live()).is_err() {
                debug!("Live feed receiver dropped");
                self.live_sender = None;
            }
        }
    }

    fn report(&mut self, status: RecorderStatus) {
        if let Some(sender) = &self.status_sender {
            if sender.send(status).is_err() {
                debug!("Status feed receiver dropped");
                self.status_sender = None;
            }
        }
    }
}
