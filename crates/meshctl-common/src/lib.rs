pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod protocol;
pub mod validate;

pub use error::{
    Error,
    Result,
};
