pub mod aggregate;
pub mod junit;
