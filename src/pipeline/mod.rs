pub mod codegen;
pub mod fix;
pub mod materialize;
pub mod post;
pub mod prepare;
pub mod prompt;
pub mod test_run;
