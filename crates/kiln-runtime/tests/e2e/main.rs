//! End-to-end tests for the Kiln host
//!
//! Each test assembles units, runs them through [`kiln_runtime::Host`] and
//! checks console output, exit status and how far the lifecycle got.

mod harness;
mod lifecycle;
mod modules;
mod workers;
