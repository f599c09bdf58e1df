//! Utility functions for the TuneFlow DevKit

pub mod translate;
