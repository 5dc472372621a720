//! Core flight source trait for AirProx tracks.

use crate::{DerivedState, NavState};

/// The central interface for reading one recorded flight.
///
/// This trait abstracts the log/replay parser so that the analysis engines
/// can run over real recordings and synthetic scenarios alike.
///
/// # Implementations
///
/// - **Replay**: `ReplaySource` - in-memory records or a JSON trace file
/// - **Simulation**: the scenario oracle in `airprox_sim` builds `ReplaySource`s
///
/// # Protocol
///
/// Sources are pulled, never pushed. A track calls `next()` only when its
/// interpolation window needs a fresh fix; `false` means end-of-data and
/// the track is simply excluded from later steps.
pub trait FlightSource {
    /// Advances to the next fix. Returns false at end-of-data.
    fn next(&mut self) -> bool;

    /// Navigation state of the current fix.
    fn basic(&self) -> &NavState;

    /// Derived state of the current fix.
    fn calculated(&self) -> &DerivedState;

    /// Mutable derived state (used for wind substitution).
    fn calculated_mut(&mut self) -> &mut DerivedState;

    /// Restarts the source before the first fix.
    fn rewind(&mut self);

    /// Competition/registration identifier of the aircraft.
    fn identifier(&self) -> &str;

    /// Free-form recorder/type information.
    fn type_info(&self) -> &str {
        ""
    }
}
