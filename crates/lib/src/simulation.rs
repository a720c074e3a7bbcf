use crate::{
    BalanceController, Clock, ControllerConfig, ControllerError, ManualClock, RecordingStore,
    ScenarioEvent, ShownBalanceStore, TimedEvent, TimerQueue, Unit,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, PartialEq)]
pub enum SimulationError {
    #[error("Event at {at} comes before the previous event at {previous}")]
    OutOfOrder { at: i64, previous: i64 },
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// A value written to the balance store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedValue {
    pub at: i64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    unit: Unit,
    published: Vec<PublishedValue>,
}

impl SimulationReport {
    pub fn new(unit: Unit, published: Vec<PublishedValue>) -> Self {
        Self { unit, published }
    }

    /// Unit of the last reference balance seen, the published values are in it.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn published(&self) -> &[PublishedValue] {
        &self.published
    }
}

pub type SimulatedController<St> =
    BalanceController<ManualClock, TimerQueue<ManualClock>, RecordingStore<St, ManualClock>>;

/// Replays scenario events against a controller in virtual time, firing every
/// timer that falls due between two events.
pub struct Simulation<St> {
    clock: ManualClock,
    controller: SimulatedController<St>,
    unit: Unit,
    last_event: Option<i64>,
}

impl<St: ShownBalanceStore> Simulation<St> {
    pub fn new(config: ControllerConfig, clock: ManualClock, store: St) -> Result<Self, ControllerError> {
        let controller = BalanceController::new(
            config,
            clock.clone(),
            TimerQueue::new(clock.clone()),
            RecordingStore::new(store, clock.clone()),
        )?;

        Ok(Self {
            clock,
            controller,
            unit: Unit::default(),
            last_event: None,
        })
    }

    pub fn controller(&self) -> &SimulatedController<St> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SimulatedController<St> {
        &mut self.controller
    }

    /// Fires all timers due up to `at` and moves the clock there.
    pub fn advance_to(&mut self, at: i64) -> Result<(), SimulationError> {
        while let Some((due, run)) = self.controller.scheduler_mut().pop_due(at) {
            self.clock.set(due.max(self.clock.now_millis()));
            self.controller.on_timer(run)?;
        }
        if at > self.clock.now_millis() {
            self.clock.set(at);
        }
        Ok(())
    }

    /// Advances to the event and applies it. Returns `false` once the scenario ended.
    pub fn apply(&mut self, event: TimedEvent) -> Result<bool, SimulationError> {
        if let Some(previous) = self.last_event {
            if event.at < previous {
                return Err(SimulationError::OutOfOrder {
                    at: event.at,
                    previous,
                });
            }
        }
        self.last_event = Some(event.at);
        self.advance_to(event.at)?;

        if let Some(snapshot) = event.event.snapshot() {
            self.unit = snapshot.reference.amount.unit;
        }
        debug!(at = event.at, kind = %event.event.kind(), "scenario event");

        match event.event {
            ScenarioEvent::Mount(snapshot) => self.controller.mount(snapshot)?,
            ScenarioEvent::Balance(snapshot) => {
                self.controller.on_reference_balance_changed(snapshot)?
            }
            ScenarioEvent::Unmount => self.controller.dispose(),
            ScenarioEvent::Logout => self.controller.reset(),
            ScenarioEvent::End => return Ok(false),
        }
        Ok(true)
    }

    pub fn run(
        mut self,
        events: impl IntoIterator<Item = TimedEvent>,
    ) -> Result<SimulationReport, SimulationError> {
        for event in events {
            if !self.apply(event)? {
                break;
            }
        }
        Ok(self.report())
    }

    pub fn report(&self) -> SimulationReport {
        let published = self
            .controller
            .store()
            .log()
            .iter()
            .map(|&(at, value)| PublishedValue { at, value })
            .collect::<Vec<_>>();
        info!(
            writes = published.len(),
            shown = self.controller.shown_value(),
            "scenario replayed"
        );
        SimulationReport::new(self.unit, published)
    }
}
