pub mod process;
pub mod sandbox;

pub use process::{ExecFailure, RawExecResult};
pub use sandbox::{PythonSandbox, Sandbox};
