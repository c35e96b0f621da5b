// curve-ledger: bonding-curve token ledger with collateralized borrowing and leverage.
// one reserve asset backs one issued token; loans expire into date buckets that a sweep
// liquidates in bulk. all computation is deterministic, time and custody come in as traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, Timestamp, Bps
//   error.rs: LedgerError and its four categories
//   pricing.rs: curve math, interest, day boundaries
//   router.rs: multi-fragment fee routing
//   pool.rs: reserve balance and circulating supply
//   loan.rs: loan record, collateral handle
//   scheduler.rs: date-bucketed liquidation scheduler
//   ledger.rs: loan transitions, aggregates, bucket bookkeeping
//   7.x  config.rs: protocol config, live fees, env presets
//   8.x  engine/: protocol façade: trading, lending, leverage, liquidations, admin
//   9.1  settlement.rs: value-transfer legs, in-memory vault
//   11.x events.rs: committed state changes
//   12.x auth.rs: admin credentials
//   clock.rs: time source

// ledger core
pub mod error;
pub mod ledger;
pub mod loan;
pub mod pool;
pub mod pricing;
pub mod router;
pub mod scheduler;
pub mod types;

// protocol surface
pub mod config;
pub mod engine;
pub mod events;

// collaborators
pub mod auth;
pub mod clock;
pub mod settlement;

// re exports for convenience
pub use engine::*;
pub use error::*;
pub use events::*;
pub use types::*;
pub use auth::{Authorizer, Credential, StaticAuthorizer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, Environment, FeeBounds, FeeConfig, ProtocolConfig};
pub use ledger::{LoanLedger, MAX_LOAN_DAYS};
pub use loan::{Loan, LoanView};
pub use pool::PoolState;
pub use router::{route, Allocation, Destination, RouteError, Routing};
pub use scheduler::{Bucket, LiquidationScheduler, SweepOutcome};
pub use settlement::{
    InMemoryVault, Leg, Settlement, SettlementError, Source, Value, ValueTransfer,
};
