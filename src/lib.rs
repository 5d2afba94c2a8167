//! Weather batch pipeline
//!
//! Reads daily weather observations from a relational store, normalizes
//! their types, computes monthly mean temperature extremes and replaces a
//! destination table with the result.
//!
//! Stages, in run order:
//! - `store::connector`: connection settings to a validated `Engine`
//! - `ingest`: run the read query, materialize a `Table`
//! - `clean`: coerce dates and numeric columns, derive year/month
//! - `analysis`: group by (year, month) and average
//! - `persist`: drop-and-recreate the destination table
//!
//! `pipeline` sequences them; `config` and `logging` are shared by all.

pub mod analysis;
pub mod clean;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod store;
