//! Environment overrides run in their own test binary so the variables cannot
//! leak into other configuration tests.

use runtime_config::{Configuration, DequeuePolicy, SchedulingMode};
use std::fs;
use tempfile::tempdir;

#[test]
fn environment_overrides_file_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("marionette.toml");
    fs::write(
        &path,
        "[scheduling]\nmode = \"production\"\niterations = 10\nmax_steps = 500\n",
    )
    .unwrap();

    std::env::set_var("MARIONETTE_SCHEDULING__ITERATIONS", "42");
    std::env::set_var("MARIONETTE_SCHEDULING__MODE", "exploration");
    std::env::set_var("MARIONETTE_RUNTIME__DEQUEUE_POLICY", "first_unhandled");

    let config = Configuration::load(&path).unwrap();

    std::env::remove_var("MARIONETTE_SCHEDULING__ITERATIONS");
    std::env::remove_var("MARIONETTE_SCHEDULING__MODE");
    std::env::remove_var("MARIONETTE_RUNTIME__DEQUEUE_POLICY");

    assert_eq!(config.scheduling.iterations, 42);
    assert_eq!(config.scheduling.mode, SchedulingMode::Exploration);
    assert_eq!(config.scheduling.max_steps, 500);
    assert_eq!(config.runtime.dequeue_policy, DequeuePolicy::FirstUnhandled);
}
