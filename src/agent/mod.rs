pub mod dispatcher;
pub mod planner;

pub use dispatcher::{Dispatcher, ErrorKind, OperationResult};
pub use planner::InstructionPlanner;
