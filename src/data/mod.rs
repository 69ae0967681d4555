//! Delivery data: records, the store seam, augmentation and aggregation.

pub mod aggregate;
pub mod augment;
pub mod record;
pub mod store;
