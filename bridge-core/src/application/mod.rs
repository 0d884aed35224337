//! Application layer: the flows tying the ledger and chain boundaries to the
//! domain logic.

pub mod deposit;
pub mod keygen;
pub mod peers;
pub mod settlement;
pub mod withdrawal;

pub use deposit::DepositService;
pub use keygen::KeyExchangeService;
pub use peers::PeerListProvider;
pub use settlement::SettlementService;
pub use withdrawal::{SpendExecutor, WithdrawalCoordinator};
