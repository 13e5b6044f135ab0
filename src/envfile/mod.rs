//! The `.env` secrets file: known keys, creation, loading and validation

pub mod keys;
mod materialize;
mod record;
mod validate;

pub use materialize::*;
pub use record::*;
pub use validate::*;
