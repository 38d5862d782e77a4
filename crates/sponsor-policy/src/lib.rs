//! Sponsorship eligibility for the fee-sponsoring relayer.
//! Pure logic, no I/O: usable from the relay service and from tests alike.
//!
//! A [`SponsorshipProgram`] inspects a decoded [`TransactionView`] and
//! returns a [`PolicyResult`] that doubles as an allow/deny gate and as a
//! debugging payload for the caller.

mod catalog;
mod payment;
mod program;
mod result;
mod transaction;

pub use catalog::{
    builtin_programs, ProgramRegistry, FAK_CONTRACTS, MINIMUM_NOT_FEES, MINIMUM_SBTC_SATS_FEES,
    NEON_CONTRACTS, NEON_DEPLOYER, SBTC_CONTRACT, SEND_MANY_NOT_CONTRACT,
};
pub use payment::{payment_lines, payment_to, Payment};
pub use program::{ContractFunction, ContractId, PolicyParams, SponsorshipProgram};
pub use result::{PolicyResult, ReasonCode};
pub use transaction::{AuthKind, ClarityValue, ContractCall, Network, Payload, PayloadKind, TransactionView};
