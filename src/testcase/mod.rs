pub mod id;
pub mod parse;
pub mod stub;
