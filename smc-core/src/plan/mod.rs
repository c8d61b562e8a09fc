//! Trade plan lifecycle: entry, stop/target placement, break-even and trailing.
//!
//! ```text
//! None -> Pending -> Open -> BreakEven -> Closed
//!                      \________________/
//! ```

pub mod advisory;
pub mod manager;
pub mod ratchet;
pub mod trade_plan;

pub use advisory::{AdvisoryContext, AdvisoryError, FixedMultiplier, SizeAdvisor};
pub use manager::{PlanContext, SkipReason, TradePlanManager};
pub use ratchet::RatchetState;
pub use trade_plan::{Adjustment, ExitReason, PlanState, TradePlan, TradePlanEvent};
