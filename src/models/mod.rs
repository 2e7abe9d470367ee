// Models module

pub mod wish;

// Re-export commonly used types
pub use wish::{CreateWishRequest, NewWish, Wish};
