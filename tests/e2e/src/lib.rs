//! Shared scaffolding for the scenario tests in `tests/scenarios.rs`,
//! mirroring the db-manager/fixture-factory split the daemon's unit tests
//! use, generalized to a standalone workspace member so scenarios can open
//! their own temp database per test.

pub mod harness;
pub mod mocks;
