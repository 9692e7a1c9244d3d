//! The `controller` module starts and stops routes and runs their consumers.

mod consume_loop;
pub mod route_controller;

pub use route_controller::{DEFAULT_RECEIVE_TIMEOUT, RouteController};
