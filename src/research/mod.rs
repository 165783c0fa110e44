//! Career research orchestration.
//!
//! A run moves through five stages, strictly in sequence:
//!
//! 1. **Clarification** ([`clarify`]) - ask for missing profile fields, one per turn
//! 2. **Scoping** ([`scoping`]) - research brief plus a four-path outline
//! 3. **Supervision** ([`supervisor`]) - budget-gated rounds of parallel
//!    [`researcher`] sub-agents, accounted by [`budget`]
//! 4. **Compression** ([`compression`]) - one deduplicated, renumbered record
//! 5. **Synthesis** ([`report`]) - `preview` and `full` artifacts
//!
//! [`coordinator::ResearchCoordinator`] sequences the stages and owns the run
//! state; [`faq`] answers follow-up questions once a report exists.
//!
//! # Usage
//!
//! ```ignore
//! use wayfinder::research::coordinator::{ResearchCoordinator, StageClients};
//!
//! let coordinator = ResearchCoordinator::new(StageClients::uniform(llm), lookup, store, settings);
//! match coordinator.advance(request, CancellationToken::new()).await? {
//!     RunOutcome::AwaitingUser { question, .. } => println!("{}", question),
//!     RunOutcome::Completed { artifacts, .. } => println!("{}", artifacts.full),
//!     RunOutcome::Failed { reason, .. } => eprintln!("{}", reason),
//! }
//! ```

pub mod budget;
pub mod citations;
pub mod clarify;
pub mod compression;
pub mod coordinator;
pub mod faq;
pub mod prompts;
pub mod report;
pub mod researcher;
pub mod scoping;
pub mod supervisor;

pub use budget::BudgetTracker;
pub use coordinator::{ResearchCoordinator, StageClients};
pub use researcher::{ResearcherAgent, SubAgent};
pub use supervisor::{CompletionReason, Supervisor, SupervisorAction, SupervisorPhase};
