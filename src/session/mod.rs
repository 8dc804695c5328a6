// Session module - lifecycle of one noise measurement
//
// - state.rs: SessionState, the single tagged lifecycle state
// - model.rs: Session, Reading and SessionId records
// - token.rs: SessionToken, cancellation shared with in-flight work
// - observer.rs: SessionSnapshot pushed to presentation layers
// - machine.rs: SessionStateMachine, the only writer of Session records

pub mod machine;
pub mod model;
pub mod observer;
pub mod state;
pub mod token;

pub use machine::{CalibrationInput, SessionStateMachine, StartRequest, TickOutcome};
pub use model::{Reading, Session, SessionId};
pub use observer::SessionSnapshot;
pub use state::SessionState;
pub use token::SessionToken;
