//! Synthetic traffic scenarios for end-to-end checks.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SCN-001: Two aircraft on converging tracks, crossing once
    Converging,

    /// SCN-002: Two aircraft head-on with a small lateral offset
    HeadOn,

    /// SCN-003: Five aircraft circling together in one thermal
    Gaggle,

    /// SCN-004: Gaggle, a converging pair far away and a late launch
    Mixed,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Converging,
            ScenarioId::HeadOn,
            ScenarioId::Gaggle,
            ScenarioId::Mixed,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Converging => "converging",
            ScenarioId::HeadOn => "head_on",
            ScenarioId::Gaggle => "gaggle",
            ScenarioId::Mixed => "mixed",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Converging => {
                "Two gliders cross at 9.5 m/s lateral rate, expect one encounter"
            }
            ScenarioId::HeadOn => "Head-on pass at 50 m/s closing speed with 15 m offset",
            ScenarioId::Gaggle => {
                "Five gliders share a drifting thermal for 5 minutes, expect one flock"
            }
            ScenarioId::Mixed => "Gaggle plus a distant converging pair plus a late launch",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "converging" | "scn-001" => Ok(ScenarioId::Converging),
            "head_on" | "headon" | "scn-002" => Ok(ScenarioId::HeadOn),
            "gaggle" | "scn-003" => Ok(ScenarioId::Gaggle),
            "mixed" | "scn-004" => Ok(ScenarioId::Mixed),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert!(!scenario.description().is_empty());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("HeadOn".parse::<ScenarioId>(), Ok(ScenarioId::HeadOn));
        assert_eq!("scn-003".parse::<ScenarioId>(), Ok(ScenarioId::Gaggle));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
