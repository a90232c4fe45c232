//! Loandesk Core - case-file domain model
//!
//! Pure, runtime-free building blocks shared by the client:
//! - Case files, their declared step sequence and status
//! - The step orchestration state machine
//! - Notification and session snapshot types
//! - Action keys used to serialize effects
//!
//! # Example
//!
//! ```rust
//! use loandesk_core::{Step, StepOrchestrator, StepOutcome};
//!
//! let mut orchestrator = StepOrchestrator::with_default_sequence();
//! orchestrator
//!     .advance(Step::Customer, &StepOutcome::success(Some("F100".into())))
//!     .unwrap();
//!
//! assert_eq!(orchestrator.active_step(), Step::Address);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod action;
pub mod case_file;
pub mod error;
pub mod notification;
pub mod orchestrator;
pub mod session;
pub mod step;

pub use action::ActionKey;
pub use case_file::{CaseFile, Decision, DraftId, FileId, FileStatus};
pub use error::OrchestratorError;
pub use notification::{Notification, NotificationId};
pub use orchestrator::{ReopenPolicy, StepOrchestrator, Transition};
pub use session::{OrganizationMembership, SessionSnapshot};
pub use step::{Attachment, Step, StepOutcome, StepPayload};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with case files
    pub use crate::{
        ActionKey, CaseFile, Decision, DraftId, FileId, FileStatus, OrchestratorError, Step,
        StepOrchestrator, StepOutcome, StepPayload, Transition,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
