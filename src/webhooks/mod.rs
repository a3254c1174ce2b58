pub mod shopify;
pub mod verify;

pub use verify::verify;
