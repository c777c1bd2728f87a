//! Event categories, payload types and validation rules.

pub mod category;
pub mod payload;
pub mod schema;
