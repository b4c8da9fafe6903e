//! Poll lifecycle
//!
//! The [`machine::PollStateMachine`] actor drives everything else here:
//! it reads [`attendance`] from the poll's reactions, schedules resets with
//! [`schedule`] and [`timer`], and hands final tallies to [`archive`].

pub mod archive;
pub mod attendance;
pub mod machine;
pub mod schedule;
pub mod timer;

pub use machine::{PollCommand, PollDeps, PollError, PollHandle, PollPhase, PollStateMachine};
