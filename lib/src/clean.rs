//! The cleaning rules.
//!
//! Each rule is a total function from a table to a table of the same (or the next) schema. Rules
//! don't know about each other; [`crate::pipeline`] declares the order they run in.
//!
//! Apart from [`patients::split_contact`], [`treatments::append_missing`] and
//! [`patients::fix_weight_unit`], every rule checks for the specific problem before changing
//! anything, so running it a second time changes nothing.
pub mod patients;
pub mod treatments;
