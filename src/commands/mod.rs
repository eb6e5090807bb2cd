pub mod analyze;
pub mod chunk;
pub mod parse;
pub mod validate;
