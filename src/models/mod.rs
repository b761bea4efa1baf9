pub mod amount;
pub mod chain;
pub mod order;
pub mod payment;
pub mod response;
pub mod transfer;
pub mod wallet;

pub use chain::*;
pub use order::*;
pub use payment::*;
pub use response::*;
pub use transfer::*;
pub use wallet::*;
