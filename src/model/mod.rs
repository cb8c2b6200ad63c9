pub mod price;

pub use price::{ExpandedPricePoint, RawPricePoint};
