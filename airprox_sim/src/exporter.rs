//! JSON exporter for analysis reports.
//!
//! Writes one file per encounter as it is finalised and collects flocks
//! until the run summary arrives:
//! `encounter_NNNNN.json`, `flock.json`, `penalty.json`,
//! `scoring_penalty.txt`, `summary.json`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use airprox_core::{
    AircraftSummary, AnalysisError, EncounterReport, FlockReport, MemorySink, ReportSink,
    RunSummary,
};
use serde::Serialize;
use tracing::info;

use crate::error::SimError;

pub struct JsonExporter {
    output_dir: PathBuf,
    flocks: Vec<FlockReport>,
    encounters_written: usize,
}

impl JsonExporter {
    /// Creates the output directory if needed.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, SimError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            flocks: Vec::new(),
            encounters_written: 0,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn encounters_written(&self) -> usize {
        self.encounters_written
    }

    /// Replays everything a `MemorySink` collected.
    pub fn export(&mut self, reports: &MemorySink) -> Result<(), AnalysisError> {
        for encounter in &reports.encounters {
            self.on_encounter(encounter)?;
        }
        for flock in &reports.flocks {
            self.on_flock(flock)?;
        }
        if let Some(run) = &reports.run {
            self.on_summary(&reports.aircraft, run)?;
        }
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<(), AnalysisError> {
        let path = self.output_dir.join(name);
        let json =
            serde_json::to_string_pretty(value).map_err(|e| AnalysisError::sink(e.to_string()))?;
        let mut file = File::create(&path).map_err(|e| io_failure(&path, e))?;
        file.write_all(json.as_bytes()).map_err(|e| io_failure(&path, e))
    }

    fn write_text(&self, name: &str, text: &str) -> Result<(), AnalysisError> {
        let path = self.output_dir.join(name);
        fs::write(&path, text).map_err(|e| io_failure(&path, e))
    }
}

fn io_failure(path: &Path, e: std::io::Error) -> AnalysisError {
    AnalysisError::sink(format!("{}: {}", path.display(), e))
}

impl ReportSink for JsonExporter {
    fn on_encounter(&mut self, report: &EncounterReport) -> Result<(), AnalysisError> {
        self.write_json(&format!("encounter_{:05}.json", report.id), report)?;
        self.encounters_written += 1;
        Ok(())
    }

    fn on_flock(&mut self, report: &FlockReport) -> Result<(), AnalysisError> {
        self.flocks.push(report.clone());
        Ok(())
    }

    fn on_summary(
        &mut self,
        aircraft: &[AircraftSummary],
        run: &RunSummary,
    ) -> Result<(), AnalysisError> {
        self.write_json("flock.json", &self.flocks)?;
        self.write_json("penalty.json", aircraft)?;
        let scoring: String = run
            .scoring
            .iter()
            .map(|s| format!("{} {}\n", s.id, s.penalty))
            .collect();
        self.write_text("scoring_penalty.txt", &scoring)?;
        self.write_json("summary.json", run)?;
        info!(
            "Exported {} encounters and {} flocks to {}",
            self.encounters_written,
            self.flocks.len(),
            self.output_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_converging_run() {
        let dir = tempfile::tempdir().unwrap();
        let result = ScenarioRunner::new(42).with_duration(120).run(ScenarioId::Converging);
        assert!(result.passed, "{:?}", result.failure_reason);

        let mut exporter = JsonExporter::new(dir.path().join("out")).unwrap();
        exporter.export(&result.reports).unwrap();
        assert_eq!(exporter.encounters_written(), 1);

        let out = exporter.output_dir();
        let read = |name: &str| fs::read_to_string(out.join(name)).unwrap();
        let encounter: EncounterReport =
            serde_json::from_str(&read("encounter_00000.json")).unwrap();
        assert_eq!(encounter.id, result.reports.encounters[0].id);
        assert_eq!(encounter.aircraft.len(), 2);
        assert!(encounter.aircraft[0].trace.iter().all(|p| p.detail.is_some()));

        let flocks: Vec<FlockReport> = serde_json::from_str(&read("flock.json")).unwrap();
        assert!(flocks.is_empty());

        let penalties: Vec<AircraftSummary> = serde_json::from_str(&read("penalty.json")).unwrap();
        assert_eq!(penalties.len(), 2);

        let scoring = read("scoring_penalty.txt");
        assert_eq!(scoring.lines().count(), 2);
        assert!(scoring.lines().all(|l| l.starts_with('A') || l.starts_with('B')));

        let run: RunSummary = serde_json::from_str(&read("summary.json")).unwrap();
        assert_eq!(run.n_encounters, 1);
    }

    #[test]
    fn test_unwritable_directory_reports_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = JsonExporter::new(dir.path()).unwrap();
        exporter.output_dir = dir.path().join("missing").join("deeper");
        let result = ScenarioRunner::new(42).with_duration(120).run(ScenarioId::Converging);
        let err = exporter.export(&result.reports).unwrap_err();
        assert!(matches!(err, AnalysisError::Sink(_)));
    }
}
