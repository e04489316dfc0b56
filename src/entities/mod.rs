pub mod customer;
pub mod customer_address;
pub mod customer_email;
pub mod discount;
pub mod order;
pub mod order_address;
pub mod order_adjustment;
pub mod order_item;
pub mod order_meta;
pub mod order_note;
pub mod order_transaction;
pub mod product;
pub mod product_price;
pub mod tax_rate;
