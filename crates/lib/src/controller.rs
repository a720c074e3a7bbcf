use crate::{
    BalanceSnapshot, Clock, ConfigError, ControllerConfig, InterpolationConfig, InterpolationError,
    Interpolator, RunId, Scheduler, ShownBalanceStore, Tick,
};
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Error, Debug, PartialEq)]
pub enum ControllerError {
    #[error("Invalid controller configuration")]
    Config(#[from] ConfigError),
    #[error("Invalid animation")]
    Interpolation(#[from] InterpolationError),
    #[error("No balance snapshot has been received")]
    MissingSnapshot,
}

/// What the balance display is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DisplayPhase {
    /// Nothing has been shown yet.
    Uninitialized,
    /// Fast animation toward the reference balance as of now.
    CatchingUp,
    /// Slow animation toward the end of day projection.
    Drifting,
    /// No animation, the shown value is final until the next snapshot.
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PhaseKind {
    CatchUp,
    Drift,
}

/// Parameters of the animation currently driving the display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationPhase {
    pub kind: PhaseKind,
    pub start_value: f64,
    pub target_value: f64,
    pub tick_interval_millis: f64,
    pub total_duration_millis: f64,
}

impl AnimationPhase {
    pub fn catch_up(start_value: f64, target_value: f64, config: &ControllerConfig) -> Self {
        Self {
            kind: PhaseKind::CatchUp,
            start_value,
            target_value,
            tick_interval_millis: config.catch_up_interval_millis as f64,
            total_duration_millis: config.catch_up_duration_millis as f64,
        }
    }

    /// `None` when there is not a single step to take.
    pub fn drift(
        start_value: f64,
        target_value: f64,
        remaining_millis: f64,
        config: &ControllerConfig,
    ) -> Option<Self> {
        let interpolation = InterpolationConfig::with_duration(
            start_value,
            target_value,
            config.drift_step_size as f64,
            remaining_millis,
        );
        if interpolation.number_of_steps() == 0.0 {
            return None;
        }

        Some(Self {
            kind: PhaseKind::Drift,
            start_value,
            target_value,
            tick_interval_millis: interpolation.tick_interval_millis(),
            total_duration_millis: remaining_millis,
        })
    }

    pub fn interpolation(
        &self,
        config: &ControllerConfig,
    ) -> Result<InterpolationConfig, InterpolationError> {
        match self.kind {
            PhaseKind::CatchUp => InterpolationConfig::spread(
                self.start_value,
                self.target_value,
                self.tick_interval_millis,
                self.total_duration_millis,
            ),
            PhaseKind::Drift => Ok(InterpolationConfig::with_duration(
                self.start_value,
                self.target_value,
                config.drift_step_size as f64,
                self.total_duration_millis,
            )),
        }
    }
}

/// Notification sent to subscribers of the shown balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The value on screen changed.
    Shown(i64),
    CatchUpStarted { target: i64 },
    DriftStarted { target: i64 },
    Settled(i64),
}

/// In-memory side of the persisted shown balance.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ShownBalanceState {
    pub last_shown_value: f64,
    pub last_persist_millis: Option<i64>,
    pub last_persisted_value: Option<i64>,
}

impl ShownBalanceState {
    pub fn shown(&self) -> i64 {
        whole(self.last_shown_value)
    }
}

fn whole(value: f64) -> i64 {
    value.round() as i64
}

type Listener = Box<dyn FnMut(DisplayEvent)>;

/// Single writer of the shown balance: keeps it in memory for rendering,
/// tells subscribers, and writes it through to the store.
struct ShownBalance<St> {
    state: ShownBalanceState,
    store: St,
    throttle_millis: i64,
    listeners: Vec<Listener>,
}

impl<St: ShownBalanceStore> ShownBalance<St> {
    fn notify(&mut self, event: DisplayEvent) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }

    fn show(&mut self, value: f64) {
        self.state.last_shown_value = value;
        self.notify(DisplayEvent::Shown(whole(value)));
    }

    fn progress(&mut self, value: f64, now: i64) {
        self.show(value);
        let due = self
            .state
            .last_persist_millis
            .map_or(true, |last| now - last > self.throttle_millis);
        if due {
            self.persist(now);
        }
    }

    fn complete(&mut self, value: f64, now: i64) {
        self.show(value);
        if self.state.last_persisted_value != Some(self.state.shown()) {
            self.persist(now);
        }
    }

    // the animation goes on with the in-memory value if the write fails
    fn persist(&mut self, now: i64) {
        let value = self.state.shown();
        match self.store.publish(value) {
            Ok(()) => self.state.last_persisted_value = Some(value),
            Err(err) => warn!(%err, value, "failed to persist shown balance"),
        }
        self.state.last_persist_millis = Some(now);
    }
}

/// Decides which animation drives the shown balance.
///
/// A new reference balance (mount, save, withdrawal, boost) always forces a
/// fast catch-up toward the reference advanced to now, even downwards. Once
/// caught up it drifts toward the end of day projection and then settles.
/// Transitions other than a forced catch-up never move the shown value down.
pub struct BalanceController<C, S, St> {
    config: ControllerConfig,
    clock: C,
    scheduler: S,
    interpolator: Interpolator,
    shown: ShownBalance<St>,
    phase: DisplayPhase,
    active: Option<AnimationPhase>,
    snapshot: Option<BalanceSnapshot>,
    catch_up_target: f64,
    mounted: bool,
}

impl<C: Clock, S: Scheduler, St: ShownBalanceStore> BalanceController<C, S, St> {
    pub fn new(
        config: ControllerConfig,
        clock: C,
        scheduler: S,
        store: St,
    ) -> Result<Self, ControllerError> {
        config.validate()?;

        Ok(Self {
            config,
            clock,
            scheduler,
            interpolator: Interpolator::new(),
            shown: ShownBalance {
                state: ShownBalanceState::default(),
                store,
                throttle_millis: i64::try_from(config.persist_throttle_millis)
                    .unwrap_or(i64::MAX),
                listeners: Vec::new(),
            },
            phase: DisplayPhase::Uninitialized,
            active: None,
            snapshot: None,
            catch_up_target: 0.0,
            mounted: false,
        })
    }

    /// Attaches the display to `snapshot` and catches up to it. The first mount
    /// resumes from the persisted value when there is one.
    pub fn mount(&mut self, snapshot: BalanceSnapshot) -> Result<(), ControllerError> {
        if self.phase == DisplayPhase::Uninitialized {
            match self.shown.store.load() {
                Ok(Some(value)) => {
                    debug!(value, "resuming from persisted balance");
                    self.shown.state.last_shown_value = value as f64;
                    self.shown.state.last_persisted_value = Some(value);
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "failed to load persisted balance"),
            }
        }

        self.mounted = true;
        self.snapshot = Some(snapshot);
        self.start_catch_up()
    }

    /// Takes a refreshed snapshot. A different reference restarts the catch-up,
    /// a different projection alone redirects the drift.
    pub fn on_reference_balance_changed(
        &mut self,
        snapshot: BalanceSnapshot,
    ) -> Result<(), ControllerError> {
        let (reference_changed, projection_changed) = match &self.snapshot {
            Some(previous) => (
                previous.reference != snapshot.reference,
                previous.projection_differs(&snapshot),
            ),
            None => (true, true),
        };
        self.snapshot = Some(snapshot);

        if !self.mounted {
            return Ok(());
        }
        if reference_changed {
            debug!("reference balance changed, forcing catch-up");
            return self.start_catch_up();
        }
        if projection_changed && self.phase != DisplayPhase::CatchingUp {
            debug!("projection changed, re-evaluating drift");
            return self.start_drift();
        }
        Ok(())
    }

    /// Delivers an expired timer.
    pub fn on_timer(&mut self, run: RunId) -> Result<(), ControllerError> {
        let now = self.clock.now_millis();
        let shown = &mut self.shown;
        let tick = self
            .interpolator
            .tick(run, &self.clock, &mut self.scheduler, |value| {
                shown.progress(value, now)
            });

        match tick {
            Tick::Stale => {
                trace!(?run, "ignoring stale tick");
                Ok(())
            }
            Tick::Progressed(value) => {
                trace!(value, "balance tick");
                Ok(())
            }
            Tick::Finished(value) => self.on_finished(value, now),
        }
    }

    /// Detaches the display. Pending ticks become no-ops, the shown value is kept.
    pub fn dispose(&mut self) {
        self.interpolator.cancel();
        self.active = None;
        self.mounted = false;
        if self.phase != DisplayPhase::Uninitialized {
            self.phase = DisplayPhase::Settled;
        }
    }

    /// Forgets everything shown so far, including the persisted value.
    pub fn reset(&mut self) {
        self.dispose();
        if let Err(err) = self.shown.store.clear() {
            warn!(%err, "failed to clear persisted balance");
        }
        self.shown.state = ShownBalanceState::default();
        self.phase = DisplayPhase::Uninitialized;
        self.snapshot = None;
        self.catch_up_target = 0.0;
    }

    pub fn subscribe(&mut self, listener: impl FnMut(DisplayEvent) + 'static) {
        self.shown.listeners.push(Box::new(listener));
    }

    pub fn shown_value(&self) -> i64 {
        self.shown.state.shown()
    }

    pub fn shown_state(&self) -> &ShownBalanceState {
        &self.shown.state
    }

    pub fn phase(&self) -> DisplayPhase {
        self.phase
    }

    pub fn active_phase(&self) -> Option<&AnimationPhase> {
        self.active.as_ref()
    }

    pub fn snapshot(&self) -> Option<&BalanceSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn store(&self) -> &St {
        &self.shown.store
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    fn on_finished(&mut self, value: f64, now: i64) -> Result<(), ControllerError> {
        self.shown.complete(value, now);
        self.active = None;

        match self.phase {
            DisplayPhase::CatchingUp if value == self.catch_up_target => self.start_drift(),
            _ => {
                self.settle();
                Ok(())
            }
        }
    }

    fn start_catch_up(&mut self) -> Result<(), ControllerError> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(ControllerError::MissingSnapshot)?;
        let now = self.clock.now_millis();
        let target = snapshot.projected_at(now, &self.clock);
        let phase = AnimationPhase::catch_up(
            self.shown.state.last_shown_value,
            target as f64,
            &self.config,
        );

        debug!(
            from = phase.start_value,
            to = target,
            "catching up to reference balance"
        );
        self.catch_up_target = target as f64;
        self.run(phase, DisplayPhase::CatchingUp)?;
        self.shown.notify(DisplayEvent::CatchUpStarted { target });
        Ok(())
    }

    fn start_drift(&mut self) -> Result<(), ControllerError> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(ControllerError::MissingSnapshot)?;
        let now = self.clock.now_millis();
        let shown = self.shown.state.last_shown_value;

        let target = match snapshot.drift_target(now, &self.clock) {
            Some(target) if target as f64 >= shown => target,
            Some(target) => {
                debug!(target, shown, "drift target below shown balance");
                self.settle();
                return Ok(());
            }
            None => {
                debug!("no projection for today");
                self.settle();
                return Ok(());
            }
        };

        let remaining = (self.clock.end_of_day_millis(now) - now).max(0) as f64;
        match AnimationPhase::drift(shown, target as f64, remaining, &self.config) {
            Some(phase) => {
                debug!(
                    from = shown,
                    to = target,
                    interval = phase.tick_interval_millis,
                    "drifting toward end of day balance"
                );
                self.run(phase, DisplayPhase::Drifting)?;
                self.shown.notify(DisplayEvent::DriftStarted { target });
            }
            None => self.settle(),
        }
        Ok(())
    }

    fn run(&mut self, phase: AnimationPhase, state: DisplayPhase) -> Result<(), ControllerError> {
        let interpolation = phase.interpolation(&self.config)?;
        self.interpolator.start(&interpolation, &mut self.scheduler)?;
        self.active = Some(phase);
        self.phase = state;
        Ok(())
    }

    fn settle(&mut self) {
        self.interpolator.cancel();
        self.active = None;
        self.phase = DisplayPhase::Settled;
        debug!(shown = self.shown_value(), "balance settled");
        let shown = self.shown_value();
        self.shown.notify(DisplayEvent::Settled(shown));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DatedAmount, ManualClock, MemoryStore, MonetaryAmount, TimerQueue, Unit, MILLIS_PER_DAY,
    };
    use std::{cell::RefCell, rc::Rc};

    type TestController = BalanceController<ManualClock, TimerQueue<ManualClock>, MemoryStore>;

    fn zar(amount: i64, epoch_millis: i64) -> DatedAmount {
        DatedAmount::new(
            MonetaryAmount::new(amount, Unit::HundredthCent, "ZAR"),
            epoch_millis,
        )
    }

    fn snapshot(reference: (i64, i64), projection: Option<(i64, i64)>) -> BalanceSnapshot {
        let snapshot = BalanceSnapshot::new(zar(reference.0, reference.1));
        match projection {
            Some((amount, at)) => snapshot.with_end_of_today(zar(amount, at)),
            None => snapshot,
        }
    }

    fn controller(now: i64, store: MemoryStore) -> (TestController, ManualClock) {
        let clock = ManualClock::utc(now);
        let controller = BalanceController::new(
            ControllerConfig::default(),
            clock.clone(),
            TimerQueue::new(clock.clone()),
            store,
        )
        .unwrap();
        (controller, clock)
    }

    /// Fires the next pending timer, if any.
    fn fire_next(controller: &mut TestController, clock: &ManualClock) -> bool {
        match controller.scheduler_mut().pop_due(i64::MAX) {
            Some((due, run)) => {
                clock.set(due.max(clock.now_millis()));
                controller.on_timer(run).unwrap();
                true
            }
            None => false,
        }
    }

    fn fire_until(controller: &mut TestController, clock: &ManualClock, until: i64) {
        while let Some((due, run)) = controller.scheduler_mut().pop_due(until) {
            clock.set(due);
            controller.on_timer(run).unwrap();
        }
        clock.set(until);
    }

    fn record(controller: &mut TestController) -> Rc<RefCell<Vec<DisplayEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        controller.subscribe(move |event| sink.borrow_mut().push(event));
        events
    }

    fn shown_values(events: &[DisplayEvent]) -> Vec<i64> {
        events
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::Shown(value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn starts_uninitialized() {
        let (controller, _) = controller(0, MemoryStore::default());
        assert_eq!(controller.phase(), DisplayPhase::Uninitialized);
        assert_eq!(controller.shown_value(), 0);
        assert!(controller.active_phase().is_none());
    }

    #[test]
    fn rejects_invalid_config() {
        let clock = ManualClock::utc(0);
        let config = ControllerConfig {
            drift_step_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            BalanceController::new(
                config,
                clock.clone(),
                TimerQueue::new(clock),
                MemoryStore::default()
            ),
            Err(ControllerError::Config(ConfigError::Zero("drift_step_size")))
        ));
    }

    #[test]
    fn catches_up_to_projected_balance_then_drifts_to_end_of_day() {
        let half_day = MILLIS_PER_DAY / 2;
        let (mut controller, clock) = controller(half_day, MemoryStore::default());
        controller
            .mount(snapshot((10000, 0), Some((10500, MILLIS_PER_DAY))))
            .unwrap();

        assert_eq!(controller.phase(), DisplayPhase::CatchingUp);
        assert_eq!(
            controller.active_phase(),
            Some(&AnimationPhase {
                kind: PhaseKind::CatchUp,
                start_value: 0.0,
                target_value: 10250.0,
                tick_interval_millis: 75.0,
                total_duration_millis: 4000.0,
            })
        );

        fire_until(&mut controller, &clock, half_day + 4000);

        assert_eq!(controller.shown_value(), 10350);
        assert_eq!(controller.phase(), DisplayPhase::Drifting);
        let drift = *controller.active_phase().unwrap();
        assert_eq!(drift.kind, PhaseKind::Drift);
        assert_eq!(drift.start_value, 10250.0);
        assert_eq!(drift.target_value, 10500.0);
        let remaining = (MILLIS_PER_DAY - 1 - (half_day + 3975)) as f64;
        assert_eq!(drift.total_duration_millis, remaining);
        assert_eq!(drift.tick_interval_millis, remaining / 2.5);

        while fire_next(&mut controller, &clock) {}
        assert_eq!(controller.shown_value(), 10500);
        assert_eq!(controller.phase(), DisplayPhase::Settled);
        assert_eq!(controller.store().value(), Some(10500));
    }

    #[test]
    fn shown_values_never_decrease_without_new_reference() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        let events = record(&mut controller);
        controller
            .mount(snapshot((10000, 0), Some((12000, MILLIS_PER_DAY))))
            .unwrap();
        while fire_next(&mut controller, &clock) {}

        let events = events.borrow();
        let values = shown_values(&events);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&12000));
        assert_eq!(
            events
                .iter()
                .filter(|e| !matches!(e, DisplayEvent::Shown(_)))
                .collect::<Vec<_>>(),
            vec![
                &DisplayEvent::CatchUpStarted { target: 10000 },
                &DisplayEvent::DriftStarted { target: 12000 },
                &DisplayEvent::Settled(12000),
            ]
        );
    }

    #[test]
    fn equal_drift_target_settles_without_a_run() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller
            .mount(snapshot((1000, 0), Some((1000, MILLIS_PER_DAY))))
            .unwrap();
        while fire_next(&mut controller, &clock) {}

        assert_eq!(controller.phase(), DisplayPhase::Settled);
        assert_eq!(controller.shown_value(), 1000);
        assert!(controller.active_phase().is_none());
        assert!(controller.scheduler().is_empty());
    }

    #[test]
    fn zero_step_drift_is_skipped() {
        let config = ControllerConfig::default();
        assert_eq!(AnimationPhase::drift(500.0, 500.0, 1000.0, &config), None);
        assert_eq!(
            AnimationPhase::drift(0.0, 500.0, 1000.0, &config).map(|p| p.tick_interval_millis),
            Some(200.0)
        );
    }

    #[test]
    fn missing_projection_only_catches_up() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller.mount(snapshot((10250, 0), None)).unwrap();
        while fire_next(&mut controller, &clock) {}

        assert_eq!(controller.phase(), DisplayPhase::Settled);
        assert_eq!(controller.shown_value(), 10250);
        assert_eq!(clock.now_millis(), 3975);
    }

    #[test]
    fn persists_at_most_once_per_second() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller.mount(snapshot((10250, 0), None)).unwrap();

        fire_until(&mut controller, &clock, 1000);
        assert_eq!(controller.store().writes(), 1);
        assert_eq!(controller.store().value(), Some(192));

        fire_until(&mut controller, &clock, 1050);
        assert_eq!(controller.store().writes(), 2);
        assert_eq!(controller.store().value(), Some(2883));

        while fire_next(&mut controller, &clock) {}
        assert_eq!(controller.store().writes(), 5);
        assert_eq!(controller.store().value(), Some(10250));
    }

    #[test]
    fn persistence_failures_do_not_stall_the_animation() {
        let (mut controller, clock) = controller(0, MemoryStore::unavailable());
        controller.mount(snapshot((10250, 0), None)).unwrap();
        while fire_next(&mut controller, &clock) {}

        assert_eq!(controller.shown_value(), 10250);
        assert_eq!(controller.phase(), DisplayPhase::Settled);
        assert_eq!(controller.shown_state().last_persisted_value, None);
        assert_eq!(controller.store().writes(), 0);
    }

    #[test]
    fn resumes_from_persisted_value() {
        let (mut controller, _) = controller(0, MemoryStore::with_value(5000));
        controller.mount(snapshot((10000, 0), None)).unwrap();

        let phase = controller.active_phase().unwrap();
        assert_eq!(phase.start_value, 5000.0);
        assert_eq!(phase.target_value, 10000.0);
        assert_eq!(controller.shown_value(), 5000);
    }

    #[test]
    fn new_reference_may_move_the_balance_down() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller
            .mount(snapshot((1000, 0), Some((2000, MILLIS_PER_DAY))))
            .unwrap();
        while controller.shown_value() < 1200 {
            assert!(fire_next(&mut controller, &clock));
        }
        assert_eq!(controller.shown_value(), 1200);
        assert_eq!(controller.phase(), DisplayPhase::Drifting);

        let events = record(&mut controller);
        let now = clock.now_millis();
        controller
            .on_reference_balance_changed(snapshot((1000, now), Some((1900, MILLIS_PER_DAY))))
            .unwrap();
        assert_eq!(controller.phase(), DisplayPhase::CatchingUp);
        let phase = *controller.active_phase().unwrap();
        assert_eq!((phase.start_value, phase.target_value), (1200.0, 1000.0));

        while controller.phase() == DisplayPhase::CatchingUp {
            assert!(fire_next(&mut controller, &clock));
        }
        assert_eq!(controller.phase(), DisplayPhase::Drifting);

        let values = shown_values(&events.borrow());
        let lowest = values.iter().position(|v| *v == 1000).unwrap();
        assert!(values[..=lowest].windows(2).all(|w| w[0] >= w[1]));
        assert!(values[lowest..].windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn lowered_projection_never_drifts_down() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller
            .mount(snapshot((1000, 0), Some((2000, MILLIS_PER_DAY))))
            .unwrap();
        while controller.shown_value() < 1200 {
            assert!(fire_next(&mut controller, &clock));
        }

        controller
            .on_reference_balance_changed(snapshot((1000, 0), Some((1100, MILLIS_PER_DAY))))
            .unwrap();
        assert_eq!(controller.phase(), DisplayPhase::Settled);
        while fire_next(&mut controller, &clock) {}
        assert_eq!(controller.shown_value(), 1200);
    }

    #[test]
    fn raised_projection_redirects_the_drift() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller
            .mount(snapshot((1000, 0), Some((2000, MILLIS_PER_DAY))))
            .unwrap();
        while controller.phase() != DisplayPhase::Drifting {
            assert!(fire_next(&mut controller, &clock));
        }

        controller
            .on_reference_balance_changed(snapshot((1000, 0), Some((3000, MILLIS_PER_DAY))))
            .unwrap();
        assert_eq!(controller.phase(), DisplayPhase::Drifting);
        assert_eq!(controller.active_phase().unwrap().target_value, 3000.0);

        while fire_next(&mut controller, &clock) {}
        assert_eq!(controller.shown_value(), 3000);
    }

    #[test]
    fn unchanged_snapshot_is_ignored() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        let snap = snapshot((1000, 0), Some((2000, MILLIS_PER_DAY)));
        controller.mount(snap.clone()).unwrap();
        fire_next(&mut controller, &clock);
        let before = *controller.active_phase().unwrap();

        controller.on_reference_balance_changed(snap).unwrap();
        assert_eq!(controller.active_phase(), Some(&before));
        assert_eq!(controller.phase(), DisplayPhase::CatchingUp);
    }

    #[test]
    fn disposed_controller_ignores_pending_ticks() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller.mount(snapshot((10250, 0), None)).unwrap();
        fire_until(&mut controller, &clock, 300);
        let shown = controller.shown_value();
        let writes = controller.store().writes();

        controller.dispose();
        assert!(!controller.is_mounted());
        assert_eq!(controller.phase(), DisplayPhase::Settled);
        while fire_next(&mut controller, &clock) {}

        assert_eq!(controller.shown_value(), shown);
        assert_eq!(controller.store().writes(), writes);
    }

    #[test]
    fn snapshots_while_unmounted_wait_for_the_next_mount() {
        let (mut controller, _) = controller(0, MemoryStore::default());
        controller
            .on_reference_balance_changed(snapshot((500, 0), None))
            .unwrap();
        assert_eq!(controller.phase(), DisplayPhase::Uninitialized);
        assert!(controller.scheduler().is_empty());
        assert_eq!(controller.snapshot().unwrap().reference_amount(), 500);
    }

    #[test]
    fn remount_continues_from_memory() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller.mount(snapshot((10250, 0), None)).unwrap();
        fire_until(&mut controller, &clock, 300);
        controller.dispose();
        let shown = controller.shown_state().last_shown_value;

        controller.mount(snapshot((10250, 0), None)).unwrap();
        assert_eq!(controller.active_phase().unwrap().start_value, shown);
        while fire_next(&mut controller, &clock) {}
        assert_eq!(controller.shown_value(), 10250);
    }

    #[test]
    fn reset_forgets_the_shown_balance() {
        let (mut controller, clock) = controller(0, MemoryStore::default());
        controller.mount(snapshot((10250, 0), None)).unwrap();
        while fire_next(&mut controller, &clock) {}
        assert_eq!(controller.store().value(), Some(10250));

        controller.reset();
        assert_eq!(controller.phase(), DisplayPhase::Uninitialized);
        assert_eq!(controller.shown_value(), 0);
        assert_eq!(controller.store().value(), None);
        assert!(controller.snapshot().is_none());
    }

    /// Every write waits until the test lets it through.
    struct GatedStore {
        gate: std::sync::mpsc::Receiver<()>,
        written: Vec<i64>,
    }

    impl ShownBalanceStore for GatedStore {
        fn load(&self) -> Result<Option<i64>, crate::StoreError> {
            Ok(None)
        }

        fn publish(&mut self, value: i64) -> Result<(), crate::StoreError> {
            self.gate
                .recv()
                .map_err(|_| crate::StoreError::Unavailable)?;
            self.written.push(value);
            Ok(())
        }

        fn clear(&mut self) -> Result<(), crate::StoreError> {
            self.written.clear();
            Ok(())
        }
    }

    #[test]
    fn stalled_writes_do_not_delay_the_catch_up() {
        let (open, gate) = std::sync::mpsc::channel();
        let store = crate::BackgroundStore::spawn(GatedStore {
            gate,
            written: Vec::new(),
        })
        .unwrap();
        let clock = ManualClock::utc(0);
        let mut controller = BalanceController::new(
            ControllerConfig::default(),
            clock.clone(),
            TimerQueue::new(clock.clone()),
            store,
        )
        .unwrap();

        controller.mount(snapshot((10250, 0), None)).unwrap();
        let mut dues = Vec::new();
        while let Some((due, run)) = controller.scheduler_mut().pop_due(i64::MAX) {
            dues.push(due);
            clock.set(due.max(clock.now_millis()));
            controller.on_timer(run).unwrap();
        }

        assert_eq!(dues.len(), 54);
        assert_eq!(&dues[..4], &[0, 75, 150, 225]);
        assert_eq!(clock.now_millis(), 3975);
        assert_eq!(controller.shown_value(), 10250);
        assert_eq!(controller.phase(), DisplayPhase::Settled);

        for _ in 0..5 {
            open.send(()).unwrap();
        }
        drop(open);
        let BalanceController { shown, .. } = controller;
        let store = shown.store.close().unwrap();
        assert_eq!(store.written, vec![192, 2883, 5573, 8264, 10250]);
    }
}
