pub mod lifecycle;
pub mod retry;
pub mod dispatcher;

pub use lifecycle::{
    LifecycleManager, LifecycleConfig, LifecycleError, SignalOutcome, SkipReason, TickReport,
    ConfirmationOutcome,
};
pub use retry::{PendingIntent, RetryDecision};
pub use dispatcher::Dispatcher;
