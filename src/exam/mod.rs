//! Speaking exam session
//!
//! A question moves through instructions, optional reading and listening
//! stages, preparation and a timed recording. `transition` holds the rules;
//! `ExamSessionMachine` applies them against a clock, a microphone and a player.

pub mod machine;
pub mod phase;
pub mod question;
pub mod session;

pub use machine::{ExamSessionMachine, SessionEvents};
pub use phase::{transition, Effect, Phase, SessionEvent, SessionNotice, Transition, UserEvent};
pub use question::{ListeningKind, Question};
pub use session::{ExamSession, SessionSnapshot};
