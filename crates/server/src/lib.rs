pub mod gateway;
pub mod pages;

pub use gateway::{router, AppState, Gateway};
