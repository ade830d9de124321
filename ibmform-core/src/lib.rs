//! ibmform Core
//!
//! Resource model, provider abstraction and the state waiter shared by the
//! IBM Cloud provider and the `ibmform` CLI.

pub mod differ;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod waiter;
