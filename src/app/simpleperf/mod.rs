pub mod environment;
pub mod locator;
pub mod options;
pub mod protocol;
pub mod session;
pub mod termination;
