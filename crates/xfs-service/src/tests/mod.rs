//! Test suites for the XFS service engine.

mod open_close;
mod routing;
mod support;
mod teardown;
