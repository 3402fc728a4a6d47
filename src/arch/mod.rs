//! # Architecture Abstraction Layer
//!
//! Hardware time base and operator input for the scheduler. Currently
//! implements the Cortex-M4 port; other targets add a sibling module
//! providing a [`Clock`](crate::time::Clock).

pub mod cortex_m4;
