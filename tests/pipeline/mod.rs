//! Migration pipeline behaviour: fixtures, steps, and scenarios.

mod bdd_steps;
mod scenarios;
mod test_helpers;
