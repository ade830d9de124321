//! Resource and data source schemas for the IBM Cloud provider

pub mod cis;
pub mod vpc;
