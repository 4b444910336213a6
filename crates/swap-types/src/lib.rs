pub mod chain;
pub mod currency;
pub mod events;
pub mod fraction;
pub mod gas;
pub mod quote;
pub mod trade;
pub mod transaction;
pub mod validation;

pub use chain::*;
pub use currency::*;
pub use events::*;
pub use fraction::*;
pub use gas::*;
pub use quote::*;
pub use trade::*;
pub use transaction::*;
pub use validation::*;
