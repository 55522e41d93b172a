//! Tools module - functions the agents can call
//!
//! Contains the tool registry and the built-in tools.

pub mod calculator;
pub mod car_search;
pub mod registry;

pub use calculator::CalculatorTool;
pub use car_search::{CarListing, CarSearchTool};
pub use registry::{Tool, ToolRegistry};
