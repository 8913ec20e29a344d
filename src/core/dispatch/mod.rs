//! Directive dispatch and the dialog state machine.
//!
//! Handling a directive usually means sending another event, and the response to that
//! event may carry further directives. The dispatcher runs this chain as an explicit
//! work loop instead of recursing: pending work sits on a stack, so a follow-up
//! response is always consumed completely before the step that triggered it continues
//! (for `Speak`: started, its response, playback, finished, its response).
//!
//! The chain is bounded by the number of responses processed per turn and checks a
//! cancellation token between steps.

mod dispatcher;


pub use dispatcher::{DirectiveDispatcher, TurnSummary};
