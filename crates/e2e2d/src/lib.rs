//! e2e2d: end to end to documentation
//!
//! Drives a browser page through an ordered chain of user-level actions and
//! assertions, narrating each one as a sentence and recording every step
//! (with its screenshots) into a replayable trace.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Runner::in_order_to                    │
//! │    ├── Entry::Action        -> Action::run(&mut Session)    │
//! │    ├── Entry::Precondition  -> followStepsIn + sub-chain    │
//! │    └── first failure        -> narrate, flush trace, close  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session                                                    │
//! │    ├── comment / nav_to / fill / left_click(_nav)           │
//! │    ├── should() / run_should()  -> assertion chains         │
//! │    ├── Recording  -> steps: [Step]                          │
//! │    └── NarrationSink (stdout | memory)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page (trait)                                               │
//! │    ├── PlaywrightPage  -> Node bridge, JSON lines           │
//! │    └── FakePage        -> in-memory, for tests              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TraceSink  -> <output_folder>/<name>/e2e2d.json            │
//! │  Scenario (YAML) -> Vec<Entry>                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod config;
pub mod error;
pub mod narration;
pub mod page;
pub mod playwright;
pub mod recording;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod should;
pub mod testing;
pub mod trace;

pub use config::{AfterPrecondition, E2e2dArgs, E2e2dConfig, FailurePolicy};
pub use error::{E2e2dError, E2e2dResult, ErrorKind, PageError, PageResult};
pub use page::Page;
pub use playwright::PlaywrightPage;
pub use recording::{Recording, Step, StepKind};
pub use runner::{action, precondition, Action, Entry, Precondition, RunOutcome, RunReport, Runner};
pub use scenario::Scenario;
pub use session::Session;
