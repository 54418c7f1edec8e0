pub mod action;
pub mod poll;
