//! Ticket-to-tests workflow: derive test cases from tracker issues, stub them, run them and
//! report the results back to the issue.

pub mod assistant;
pub mod config;
pub mod error;
pub mod git;
pub mod jira;
pub mod pipeline;
pub mod report;
pub mod results;
pub mod state;
pub mod testcase;
pub mod ticket;
