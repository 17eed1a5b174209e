//! End-to-end tests driving the engine through its public API.

mod chaining_test;
mod helpers;
mod lifecycle_test;
