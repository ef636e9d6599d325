//! # Protocol Layer
//!
//! Commands carried in packet bodies and the logic that acts on them.
//!
//! ## Components
//! - **Command**: closed set of command codes
//! - **Announcement**: the node-descriptor payload exchanged on connect
//! - **Dispatcher**: routes decoded packets by command and answers announcements

pub mod announcement;
pub mod command;
pub mod dispatcher;
