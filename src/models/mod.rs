pub mod error;
pub mod hospital;
pub mod position;
pub mod traffic;
pub mod updates;
