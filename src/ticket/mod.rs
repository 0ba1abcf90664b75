pub mod adf;
pub mod fields;
pub mod sections;
