//! Storage façade: typed access to the Bronze, Silver, and Meta schemas.
//! One file per owned table family, each a module of free functions taking
//! `&PgPool` or a generic executor.

pub mod bronze;
pub mod link_tables;
pub mod silver_consolidated;
pub mod silver_source;
