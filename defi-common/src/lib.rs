#![doc = include_str!("../README.md")]

pub mod interact_mpc20;
pub mod math;
pub mod pool_math;
pub mod token_balances;
