//! Parameter binding, statement dispatch, and result-set materialization
//! — the three handler seams interceptors attach to.

pub mod parameter_handler;
pub mod result_set_handler;
pub mod statement_handler;
