//! Domain vocabulary shared by the entities and services.

pub mod address;
pub mod money;
pub mod status;
pub mod tax;

pub use address::AddressInput;
pub use status::{AddressType, AdjustmentType, Mode, ObjectType, OrderStatus, OrderType};
pub use tax::TaxRate;
