// Calibration module - reference measurement and factor storage
//
// This module provides two main components:
// 1. CalibrationFactor: the immutable per-session multiplier (state.rs)
// 2. CalibrationEngine: derives a factor from a quiet reference window (engine.rs)
//
// The calibration workflow:
// 1. Collect at least `min_window_ms` worth of raw amplitude frames while quiet
// 2. Call CalibrationEngine::calibrate on the window
// 3. Hand the resulting factor to the session (or reuse a saved one)

pub mod engine;
pub mod state;

pub use engine::CalibrationEngine;
pub use state::CalibrationFactor;
