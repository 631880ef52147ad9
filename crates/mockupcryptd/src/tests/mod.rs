//! Test suites for the mockupcryptd daemon.

mod socket_behaviour;
mod support;
