//! Bronze → Silver-source transformation: windowed batch reads,
//! table-driven field projection per source, and hash-gated upsert.

pub mod ad_computers;
pub mod ad_groups;
pub mod ad_organizational_units;
pub mod ad_users;
pub mod engine;
pub mod field_map;
pub mod inventory_computers;
pub mod lab_awards;
pub mod mcommunity_groups;
pub mod mcommunity_users;
pub mod ou_parser;
pub mod tdx_assets;
pub mod tdx_departments;
pub mod tdx_users;
pub mod umapi_departments;
pub mod umapi_employment;
