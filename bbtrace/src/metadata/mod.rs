//! CFG metadata
//!
//! - `record`: [`FunctionCfg`] / [`ModuleCfg`] and their wire format
//! - `recorder`: [`ModuleRecorder`], per compilation unit
//! - `store`: [`MetadataStore`], the shared append-only JSON Lines file
//! - `manifest`: JSON bridge for instrumenters outside this crate
//! - `index`: block ID → owning function lookup

pub mod index;
pub mod manifest;
pub mod record;
pub mod recorder;
pub mod store;

pub use index::{BlockIndex, BlockLocation};
pub use manifest::{register_module, FunctionManifest, ModuleAssignment, ModuleManifest};
pub use record::{FunctionCfg, FunctionCfgBuilder, ModuleCfg};
pub use recorder::ModuleRecorder;
pub use store::{MetadataStore, Recovered};
