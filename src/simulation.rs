//! Step driver around the elevator system.
//!
//! Builds a system out of a scenario, runs it one step at a time and keeps
//! per-passenger statistics. The step ceiling is the only give-up policy: a
//! run that exceeds it signals a dispatch bug (someone starved).

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::direction::{Direction, Floor};
use crate::elevator::{Elevator, ElevatorError, ElevatorId, ElevatorKind};
use crate::passenger::{Passenger, PassengerError, PassengerId, PassengerState};
use crate::system::{DispatchError, ElevatorSystem, SystemOptions};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("simulation aborted after {steps} steps with {active} passengers still active")]
    StepLimitExceeded { steps: u64, active: usize },

    #[error("scenario has no floors to generate from")]
    NoFloors,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Elevator(#[from] ElevatorError),

    #[error(transparent)]
    Passenger(#[from] PassengerError),

    #[error("invalid scenario config: {0}")]
    Config(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Abort once this many steps ran without every passenger arriving.
    pub step_limit: u64,
    pub system: SystemOptions,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            step_limit: 10_000,
            system: SystemOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevatorSpec {
    pub min_floor: Floor,
    pub max_floor: Floor,
    pub start_floor: Floor,
    #[serde(default)]
    pub kind: ElevatorKind,
    /// Starting direction of a paternoster car.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl ElevatorSpec {
    pub fn common(min_floor: Floor, max_floor: Floor, start_floor: Floor) -> Self {
        Self {
            min_floor,
            max_floor,
            start_floor,
            kind: ElevatorKind::Common,
            direction: None,
        }
    }

    pub fn paternoster(min_floor: Floor, max_floor: Floor, start_floor: Floor) -> Self {
        Self {
            kind: ElevatorKind::Paternoster,
            ..Self::common(min_floor, max_floor, start_floor)
        }
    }

    pub fn build(&self) -> Result<Elevator, ElevatorError> {
        match self.kind {
            ElevatorKind::Common => Elevator::new(self.min_floor, self.max_floor, self.start_floor),
            ElevatorKind::Paternoster => Elevator::paternoster(
                self.min_floor,
                self.max_floor,
                self.start_floor,
                self.direction.unwrap_or(Direction::Up),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerSpec {
    pub start_floor: Floor,
    pub destination_floor: Floor,
}

impl PassengerSpec {
    pub fn new(start_floor: Floor, destination_floor: Floor) -> Self {
        Self {
            start_floor,
            destination_floor,
        }
    }
}

/// Parameters for a seeded random scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomScenario {
    pub seed: u64,
    pub elevators: usize,
    pub passengers: usize,
    /// Every car serves `1..=floors`.
    pub floors: Floor,
}

/// Elevators and passengers to register before the system goes ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub elevators: Vec<ElevatorSpec>,
    pub passengers: Vec<PassengerSpec>,
}

impl ScenarioConfig {
    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn single_elevator_single_passenger() -> Self {
        Self {
            elevators: vec![ElevatorSpec::common(1, 10, 5)],
            passengers: vec![PassengerSpec::new(1, 10)],
        }
    }

    pub fn simple() -> Self {
        Self {
            elevators: vec![ElevatorSpec::common(1, 10, 1), ElevatorSpec::common(1, 10, 6)],
            passengers: vec![
                PassengerSpec::new(1, 2),
                PassengerSpec::new(1, 5),
                PassengerSpec::new(8, 10),
                PassengerSpec::new(9, 3),
                PassengerSpec::new(10, 1),
            ],
        }
    }

    /// A trip that needs three cars with overlapping ranges.
    pub fn three_legs() -> Self {
        Self {
            elevators: vec![
                ElevatorSpec::common(7, 10, 10),
                ElevatorSpec::common(4, 8, 5),
                ElevatorSpec::common(1, 5, 3),
            ],
            passengers: vec![PassengerSpec::new(1, 10)],
        }
    }

    pub fn paternoster() -> Self {
        Self {
            elevators: vec![
                ElevatorSpec::common(6, 10, 10),
                ElevatorSpec::paternoster(1, 8, 5),
                ElevatorSpec::paternoster(8, 10, 10),
            ],
            passengers: vec![PassengerSpec::new(1, 7)],
        }
    }

    pub fn random(params: RandomScenario) -> Result<Self, SimulationError> {
        if params.floors < 1 {
            return Err(SimulationError::NoFloors);
        }
        info!(seed = params.seed, "generating random scenario");
        let mut rng = StdRng::seed_from_u64(params.seed);

        let elevators = (0..params.elevators)
            .map(|_| ElevatorSpec::common(1, params.floors, rng.gen_range(1..=params.floors)))
            .collect();
        let passengers = (0..params.passengers)
            .map(|_| PassengerSpec::new(rng.gen_range(1..=params.floors), rng.gen_range(1..=params.floors)))
            .collect();

        Ok(Self { elevators, passengers })
    }

    pub fn build(&self, options: SimulationOptions) -> Result<Simulation, SimulationError> {
        let mut simulation = Simulation::new(options);
        for spec in &self.elevators {
            simulation.add_elevator(spec.build()?);
        }
        for spec in &self.passengers {
            simulation.add_passenger(Passenger::new(spec.start_floor, spec.destination_floor)?);
        }
        Ok(simulation)
    }
}

/// How many steps a passenger spent in each state.
#[derive(Debug, Clone)]
pub struct PassengerStatistics {
    passenger: PassengerId,
    steps: BTreeMap<PassengerState, u64>,
}

impl PassengerStatistics {
    fn new(passenger: PassengerId) -> Self {
        Self {
            passenger,
            steps: BTreeMap::new(),
        }
    }

    pub fn passenger(&self) -> PassengerId {
        self.passenger
    }

    pub fn steps_in(&self, state: PassengerState) -> u64 {
        self.steps.get(&state).copied().unwrap_or(0)
    }

    fn record(&mut self, state: PassengerState) {
        *self.steps.entry(state).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevatorSnapshot {
    pub id: ElevatorId,
    pub min_floor: Floor,
    pub max_floor: Floor,
    pub current_floor: Floor,
    pub targets: Vec<Floor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerSnapshot {
    pub id: PassengerId,
    pub state: PassengerState,
    pub current_floor: Floor,
    pub current_elevator: Option<ElevatorId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub step: u64,
    pub elevators: BTreeMap<ElevatorId, ElevatorSnapshot>,
    pub passengers: BTreeMap<PassengerId, PassengerSnapshot>,
}

#[derive(Debug)]
pub struct Simulation {
    system: ElevatorSystem,
    statistics: Vec<PassengerStatistics>,
    step_count: u64,
    step_limit: u64,
}

impl Simulation {
    pub fn new(options: SimulationOptions) -> Self {
        Self {
            system: ElevatorSystem::with_options(options.system),
            statistics: Vec::new(),
            step_count: 0,
            step_limit: options.step_limit,
        }
    }

    pub fn add_elevator(&mut self, elevator: Elevator) -> ElevatorId {
        self.system.register_elevator(elevator)
    }

    /// Register a passenger. After `start` the passenger calls a car during the
    /// next step's hall-call events.
    pub fn add_passenger(&mut self, passenger: Passenger) -> PassengerId {
        let id = self.system.register_passenger(passenger);
        self.statistics.push(PassengerStatistics::new(id));
        id
    }

    pub fn system(&self) -> &ElevatorSystem {
        &self.system
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn statistics(&self) -> &[PassengerStatistics] {
        &self.statistics
    }

    pub fn start(&mut self) -> Result<(), SimulationError> {
        self.system.ready()?;
        Ok(())
    }

    pub fn step(&mut self) -> Result<(), SimulationError> {
        self.system.move_one_floor()?;
        for stats in &mut self.statistics {
            if let Some(passenger) = self.system.passenger(stats.passenger) {
                stats.record(passenger.state());
            }
        }
        self.step_count += 1;
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        !self.system.has_active_passengers()
    }

    /// Start the system and step until every passenger arrived.
    pub fn run_until_done(&mut self) -> Result<u64, SimulationError> {
        self.start()?;
        while !self.is_done() {
            if self.step_count >= self.step_limit {
                return Err(SimulationError::StepLimitExceeded {
                    steps: self.step_count,
                    active: self.system.active_passenger_count(),
                });
            }
            self.step()?;
        }
        info!(steps = self.step_count, passengers = self.statistics.len(), "simulation done");
        Ok(self.step_count)
    }

    /// Median share of steps, in percent, that passengers spent in `state`.
    pub fn median_share(&self, state: PassengerState) -> u64 {
        if self.step_count == 0 || self.statistics.is_empty() {
            return 0;
        }
        let mut steps: Vec<u64> = self.statistics.iter().map(|stats| stats.steps_in(state)).collect();
        steps.sort_unstable();

        let middle = steps.len() / 2;
        let median = if steps.len() % 2 == 0 {
            (steps[middle - 1] + steps[middle]) / 2
        } else {
            steps[middle]
        };
        100 * median / self.step_count
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let elevators = self
            .system
            .elevators()
            .map(|elevator| {
                (
                    elevator.id(),
                    ElevatorSnapshot {
                        id: elevator.id(),
                        min_floor: elevator.min_floor(),
                        max_floor: elevator.max_floor(),
                        current_floor: elevator.current_floor(),
                        targets: elevator.targets().collect(),
                    },
                )
            })
            .collect();
        let passengers = self
            .system
            .passengers()
            .map(|passenger| {
                (
                    passenger.id(),
                    PassengerSnapshot {
                        id: passenger.id(),
                        state: passenger.state(),
                        current_floor: passenger.current_floor(),
                        current_elevator: passenger.current_elevator(),
                    },
                )
            })
            .collect();

        SimulationSnapshot {
            step: self.step_count,
            elevators,
            passengers,
        }
    }
}
