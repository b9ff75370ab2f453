//! Pure accounting components.
//!
//! Nothing here blocks, allocates I/O, or knows about the event feed.
//!
//! - [`vesting`] - Linear vesting curve
//! - [`ledger`] - Grants and per-account positions
//! - [`accountant`] - Mint/redeem fees and the backing invariant
//! - [`fixed`] - WAD and basis-point arithmetic

pub mod accountant;
pub mod fixed;
pub mod ledger;
pub mod vesting;

pub use accountant::{FeePolicy, MintOutcome, RedeemOutcome, VaultAccountant, VaultState};
pub use fixed::{BPS_DENOMINATOR, WAD, format_wad, mul_div, parse_wad};
pub use ledger::{ClaimReceipt, Grant, PositionLedger};
pub use vesting::VestingSchedule;
