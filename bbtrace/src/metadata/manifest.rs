//! Instrumenter bridge
//!
//! Lets an instrumenter that is not written in Rust drive the recorder: it
//! describes a compilation unit's functions and the terminator kind of each
//! block in traversal order, and gets back the IDs to embed.
//!
//! ```json
//! {"functions":[{"name":"main","blocks":["other","return"]}]}
//! ```

use super::recorder::ModuleRecorder;
use super::store::MetadataStore;
use crate::allocation::BlockIdAllocator;
use crate::domain::{BlockId, MetadataError, Terminator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleManifest {
    pub functions: Vec<FunctionManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionManifest {
    pub name: String,
    pub blocks: Vec<Terminator>,
}

/// IDs assigned to one compilation unit, in manifest order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleAssignment {
    #[serde(rename = "moduleName")]
    pub module_name: String,
    pub functions: Vec<FunctionAssignment>,
    /// Functions instrumented without a CFG record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionAssignment {
    pub name: String,
    pub blocks: Vec<BlockId>,
}

/// Allocate IDs for every block in `manifest` and append the CFG record
///
/// # Errors
/// Returns the store's error if the record cannot be appended. IDs were
/// allocated by then and are not reused.
pub fn register_module(
    module_name: &str,
    manifest: &ModuleManifest,
    allocator: &BlockIdAllocator,
    store: &MetadataStore,
) -> Result<ModuleAssignment, MetadataError> {
    let mut recorder = ModuleRecorder::new(module_name, allocator);
    let functions: Vec<FunctionAssignment> = manifest
        .functions
        .iter()
        .map(|f| FunctionAssignment {
            name: f.name.clone(),
            blocks: recorder.record_function(f.name.as_str(), f.blocks.iter().copied()),
        })
        .collect();
    let skipped = recorder.skipped().to_vec();

    store.append(&recorder.finish())?;

    Ok(ModuleAssignment { module_name: module_name.to_string(), functions, skipped })
}
