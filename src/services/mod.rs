pub mod customers;
pub mod order_builder;
pub mod order_number;
pub mod order_status;
pub mod orders;
pub mod pricing;
pub mod refund_validator;
pub mod refunds;

pub use order_builder::{BuildOrderRequest, CartFee, CartLine, OrderBuilder};
pub use order_status::StatusNotifier;
pub use orders::OrderService;
pub use refund_validator::{RefundLine, RefundScope, RefundValidator};
pub use refunds::{Actor, AllowAllRefunds, CreditRequest, RefundPolicy, RefundRequest, RefundService};
