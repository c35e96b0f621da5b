//! Error taxonomy for every ledger operation.
//!
//! Four categories, each wrapping a detail enum: validation (bad parameters, rejected before
//! any state is read), insufficient funds, invalid state, and arithmetic failure. Lower
//! layers return the detail enums and `?` lifts them into [`LedgerError`].

use crate::types::{AccountId, Bps, Timestamp};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("amount {amount} is below the minimum trade of {minimum}")]
    BelowMinimum { amount: u64, minimum: u64 },

    #[error("duration of {days} days exceeds the {max} day limit")]
    DurationTooLong { days: u64, max: u64 },

    #[error("fee {fee} outside allowed range [{min}, {max}]")]
    FeeOutOfBounds { fee: Bps, min: Bps, max: Bps },

    #[error("fee mismatch: expected {expected}, provided {provided}")]
    FeeMismatch { expected: u64, provided: u64 },

    #[error("repayment of {amount} must be strictly less than the outstanding {borrowed}")]
    RepayNotPartial { amount: u64, borrowed: u64 },

    #[error("closing repayment {provided} must equal the outstanding {borrowed}")]
    CloseAmountMismatch { provided: u64, borrowed: u64 },

    #[error("cannot remove {requested} collateral, loan holds {held}")]
    CollateralExceedsHeld { requested: u64, held: u64 },

    #[error("bootstrap deposit must be exactly {expected}, got {provided}")]
    BootstrapAmount { expected: u64, provided: u64 },

    #[error("operation would leave zero circulating supply")]
    DrainsSupply,

    #[error("operation would produce zero output")]
    ZeroOutput,

    #[error("credential rejected")]
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FundsError {
    #[error("reserve exhausted: requested {requested}, available {available}")]
    ReserveExhausted { requested: u64, available: u64 },

    #[error("collateral shortfall: required {required}, provided {provided}")]
    CollateralShortfall { required: u64, provided: u64 },

    #[error("payment shortfall: required {required}, provided {provided}")]
    PaymentShortfall { required: u64, provided: u64 },

    #[error("collateral worth {value} does not cover {borrowed} borrowed")]
    Undercollateralized { value: u64, borrowed: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("protocol has not been started")]
    NotStarted,

    #[error("protocol already started")]
    AlreadyStarted,

    #[error("{0} already has an open loan")]
    LoanAlreadyOpen(AccountId),

    #[error("{0} has no open loan")]
    NoLoan(AccountId),

    #[error("loan of {borrower} expired at {end_date}")]
    LoanExpired { borrower: AccountId, end_date: Timestamp },

    #[error("loan of {borrower} runs until {end_date}")]
    LoanNotExpired { borrower: AccountId, end_date: Timestamp },

    #[error("spot price would decrease")]
    PriceDecreased,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(#[from] FundsError),

    #[error("invalid state: {0}")]
    State(#[from] StateError),

    #[error("arithmetic failure: {0}")]
    Arithmetic(#[from] MathError),
}

impl LedgerError {
    /// Short category label, used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::InsufficientFunds(_) => "insufficient_funds",
            LedgerError::State(_) => "state",
            LedgerError::Arithmetic(_) => "arithmetic",
        }
    }
}
