//! Data Store Gateway (C2)
//!
//! Bridges the orchestration core to a relational store: filtered row
//! fetch, per-variable histograms, extremas, result ingest, and joined
//! result queries. Modelled as a narrow `DataStoreGateway` trait so the
//! backend stays swappable; `postgres` is the only implementation carried
//! here (see DESIGN.md for the re-architecture note on backend dispatch).

pub mod error;
pub mod gateway;
pub mod histogram;
pub mod postgres;

pub use error::{StorageError, StorageResult};
pub use gateway::{DataStoreGateway, EqualityFilter, Extrema, FilteredData};
pub use histogram::{bucket_domain, snap_interval, Bucket, Histogram};
pub use postgres::PostgresGateway;
