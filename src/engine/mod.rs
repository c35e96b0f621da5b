// 8.0: protocol façade. sequences sweep, pricing, routing and ledger transitions into the
// public trading and lending operations. deterministic; time, custody, events and admin
// checks come in through Services.

mod admin;
mod core;
mod env;
mod lending;
mod leverage;
mod liquidations;
mod results;
mod trading;

pub use admin::BOOTSTRAP_BURN_PCT;
pub use core::{Protocol, Services};
pub use env::InMemoryEnv;
pub use lending::{BORROW_RATIO_PCT, COLLATERAL_FLOOR_PCT};
pub use results::{
    BorrowReceipt, BuyReceipt, CloseReceipt, CollateralReceipt, ExtendReceipt, FlashCloseReceipt,
    LeverageReceipt, LiquidationReceipt, SellReceipt, StartReceipt, SweepReport,
};
