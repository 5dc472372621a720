//! Scenario runner - builds synthetic traffic, analyses it and checks the
//! outcome against ground truth.

use airprox_core::{AnalysisConfig, FlightCollection, MemorySink, RunSummary};
use airprox_env::Wind;
use nalgebra::Vector2;
use tracing::{debug, info};

use crate::error::SimError;
use crate::oracle::{Motion, Oracle, SyntheticFlight};
use crate::scenarios::ScenarioId;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Aircraft that were live at least once
    pub num_aircraft: usize,

    /// Total live aircraft-seconds
    pub num_flightsecs: u64,

    pub n_encounters: u32,
    pub n_flocks: u32,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Everything the analysis reported
    pub reports: MemorySink,
}

/// Runs synthetic scenarios through the full analysis.
pub struct ScenarioRunner {
    seed: u64,

    /// Scenario length in seconds
    duration: u32,

    config: AnalysisConfig,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration: 300,
            config: AnalysisConfig::default(),
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration = secs;
        self
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("{}", scenario.description());

        let oracle = self.build(scenario);
        let mut result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            num_aircraft: 0,
            num_flightsecs: 0,
            n_encounters: 0,
            n_flocks: 0,
            failure_reason: None,
            reports: MemorySink::new(),
        };

        let run = match self.analyse(oracle, &mut result.reports) {
            Ok((oracle, run)) => {
                result.num_aircraft = run.num_aircraft;
                result.num_flightsecs = run.num_flightsecs;
                result.n_encounters = run.n_encounters;
                result.n_flocks = run.n_flocks;
                self.check(scenario, &oracle, &run, &result.reports)
            }
            Err(e) => Err(e.to_string()),
        };

        match run {
            Ok(()) => result.passed = true,
            Err(reason) => result.failure_reason = Some(reason),
        }
        result
    }

    fn analyse(
        &self,
        mut oracle: Oracle,
        sink: &mut MemorySink,
    ) -> Result<(Oracle, RunSummary), SimError> {
        let sources = oracle.generate(self.duration)?;
        let mut collection = FlightCollection::new(self.config.clone());
        for source in sources {
            collection.add_source(Box::new(source));
        }
        let run = collection.run(sink)?;
        Ok((oracle, run))
    }

    /// Lays out the traffic for a scenario.
    pub fn build(&self, scenario: ScenarioId) -> Oracle {
        let mut oracle = Oracle::new(self.seed);
        match scenario {
            ScenarioId::Converging => {
                converging_pair(&mut oracle, Vector2::zeros());
            }
            ScenarioId::HeadOn => {
                oracle.spawn(SyntheticFlight::new("A", straight(-1500.0, 0.0, 25.0, 0.0), 1000.0));
                oracle.spawn(SyntheticFlight::new("B", straight(1500.0, 15.0, -25.0, 0.0), 1010.0));
            }
            ScenarioId::Gaggle => {
                oracle = oracle.with_wind(Wind::new(3.0, 1.0));
                gaggle(&mut oracle, Vector2::zeros());
            }
            ScenarioId::Mixed => {
                oracle = oracle.with_wind(Wind::new(3.0, 1.0));
                gaggle(&mut oracle, Vector2::zeros());
                converging_pair(&mut oracle, Vector2::new(0.0, 5000.0));
                oracle.spawn(
                    SyntheticFlight::new("L", straight(0.0, -5000.0, 30.0, 0.0), 900.0)
                        .with_type_info("LS8")
                        .with_launch(60.0, 350.0),
                );
            }
        }
        oracle
    }

    /// Checks the reports against what the oracle knows happened.
    pub fn check(
        &self,
        scenario: ScenarioId,
        oracle: &Oracle,
        run: &RunSummary,
        reports: &MemorySink,
    ) -> Result<(), String> {
        let ensure = |ok: bool, msg: String| if ok { Ok(()) } else { Err(msg) };

        ensure(
            run.num_aircraft == oracle.flights().len(),
            format!("{} of {} aircraft were live", run.num_aircraft, oracle.flights().len()),
        )?;

        let (encounters, flocks) = match scenario {
            ScenarioId::Converging | ScenarioId::HeadOn => (1, 0),
            ScenarioId::Gaggle => (0, 1),
            ScenarioId::Mixed => (1, 1),
        };
        ensure(
            reports.encounters.len() == encounters,
            format!("expected {} encounters, got {}", encounters, reports.encounters.len()),
        )?;
        ensure(
            reports.flocks.len() == flocks,
            format!("expected {} flocks, got {}", flocks, reports.flocks.len()),
        )?;

        let safety = self.config.encounter.safety_distance;
        for enc in &reports.encounters {
            let ids: Vec<&str> = enc.aircraft.iter().take(2).map(|a| a.id.as_str()).collect();
            ensure(ids == ["A", "B"], format!("encounter between {:?}", ids))?;
            ensure(
                enc.d_min < safety,
                format!("d_min {:.1} m not below safety distance", enc.d_min),
            )?;
            for id in &ids {
                let penalty = reports.penalty_of(id).unwrap_or(0.0);
                ensure(penalty > 0.0, format!("{} has no penalty", id))?;
            }
            // Mixed puts the gaggle first, so the pair is not at indices 0 and 1.
            if scenario == ScenarioId::Mixed {
                continue;
            }
            if let Some((_, t_close)) = oracle.closest_approach(0, 1, self.duration) {
                let t = oracle.start_time() + t_close;
                ensure(
                    enc.time_start <= t && t <= enc.time_end,
                    format!(
                        "closest approach at {} outside {}..{}",
                        t, enc.time_start, enc.time_end
                    ),
                )?;
            }
        }
        if scenario == ScenarioId::HeadOn {
            let v_max = reports.encounters.first().map_or(0.0, |e| e.v_max);
            ensure(v_max > 30.0, format!("closing speed {:.1} m/s too low", v_max))?;
        }

        let min_duration = self.config.flock.min_duration;
        for flock in &reports.flocks {
            ensure(
                flock.duration >= min_duration,
                format!("flock lasted {} s", flock.duration),
            )?;
            ensure(
                flock.av_size >= self.config.flock.mu as f64,
                format!("flock average size {:.1}", flock.av_size),
            )?;
            let outsiders = flock
                .trace
                .iter()
                .flat_map(|s| s.members.iter())
                .filter(|m| !m.starts_with('G'))
                .count();
            ensure(outsiders == 0, format!("{} non-gaggle members in flock", outsiders))?;
        }
        Ok(())
    }
}

fn straight(x: f64, y: f64, vx: f64, vy: f64) -> Motion {
    Motion::Straight {
        start: Vector2::new(x, y),
        velocity: Vector2::new(vx, vy),
    }
}

/// A flies east, B converges from 190 m north and crosses A's track at t=20.
fn converging_pair(oracle: &mut Oracle, offset: Vector2<f64>) {
    let (x, y) = (offset.x - 500.0, offset.y);
    oracle.spawn(SyntheticFlight::new("A", straight(x, y, 25.0, 0.0), 1000.0));
    oracle.spawn(SyntheticFlight::new("B", straight(x, y + 190.0, 25.0, -9.5), 1000.0));
}

/// Five gliders evenly spaced on one 60 m thermal circle.
fn gaggle(oracle: &mut Oracle, center: Vector2<f64>) {
    for k in 0..5 {
        let motion = Motion::Circling {
            center,
            radius: 60.0,
            omega: std::f64::consts::TAU / 25.0,
            phase: k as f64 * std::f64::consts::TAU / 5.0,
        };
        oracle.spawn(
            SyntheticFlight::new(&format!("G{}", k), motion, 1000.0 + 10.0 * k as f64)
                .with_type_info("Discus")
                .reporting_wind(),
        );
    }
}
