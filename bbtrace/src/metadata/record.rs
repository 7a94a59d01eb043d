//! CFG metadata records
//!
//! One [`ModuleCfg`] per compilation unit, holding one [`FunctionCfg`] per
//! instrumented function. Field names on the wire are part of the contract
//! with analysis tooling:
//!
//! ```json
//! {"moduleName":"a.c","functions":[{"name":"main","entry_block":0,"exit_blocks":[2],"all_blocks":[0,1,2]}]}
//! ```

use crate::domain::{BlockId, MetadataError, Terminator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Shape of one function's control-flow graph
///
/// Invariants: `entry_block ∈ all_blocks`, `exit_blocks ⊆ all_blocks`, and
/// no ID appears twice in `all_blocks` or `exit_blocks`. Built through
/// [`FunctionCfgBuilder`]; records read back from a store are checked with
/// [`FunctionCfg::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCfg {
    name: String,
    entry_block: BlockId,
    exit_blocks: Vec<BlockId>,
    all_blocks: Vec<BlockId>,
}

impl FunctionCfg {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First block in traversal order
    #[must_use]
    pub fn entry_block(&self) -> BlockId {
        self.entry_block
    }

    /// Blocks ending in return, resume or unreachable, in traversal order
    #[must_use]
    pub fn exit_blocks(&self) -> &[BlockId] {
        &self.exit_blocks
    }

    /// Every block of the function, in traversal order
    #[must_use]
    pub fn all_blocks(&self) -> &[BlockId] {
        &self.all_blocks
    }

    /// Check the record invariants
    ///
    /// # Errors
    /// Returns [`MetadataError::InvalidRecord`] describing the first violation.
    pub fn validate(&self, module: &str) -> Result<(), MetadataError> {
        let invalid = |reason: String| MetadataError::InvalidRecord {
            module: module.to_string(),
            function: self.name.clone(),
            reason,
        };

        let mut all = HashSet::with_capacity(self.all_blocks.len());
        for id in &self.all_blocks {
            if !all.insert(*id) {
                return Err(invalid(format!("block {id} listed twice")));
            }
        }
        if !all.contains(&self.entry_block) {
            return Err(invalid(format!("entry block {} is not one of its blocks", self.entry_block)));
        }

        let mut exits = HashSet::with_capacity(self.exit_blocks.len());
        for id in &self.exit_blocks {
            if !all.contains(id) {
                return Err(invalid(format!("exit block {id} is not one of its blocks")));
            }
            if !exits.insert(*id) {
                return Err(invalid(format!("exit block {id} listed twice")));
            }
        }
        Ok(())
    }
}

/// Accumulates one function's blocks in traversal order
#[derive(Debug)]
pub struct FunctionCfgBuilder {
    name: String,
    entry_block: Option<BlockId>,
    exit_blocks: Vec<BlockId>,
    all_blocks: Vec<BlockId>,
    seen: HashSet<BlockId>,
}

impl FunctionCfgBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_block: None,
            exit_blocks: Vec::new(),
            all_blocks: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Add the next block visited
    ///
    /// The first block added becomes the entry block.
    ///
    /// # Errors
    /// Returns [`MetadataError::DuplicateBlock`] if `id` was already added.
    pub fn add_block(&mut self, id: BlockId, terminator: Terminator) -> Result<(), MetadataError> {
        if !self.seen.insert(id) {
            return Err(MetadataError::DuplicateBlock { function: self.name.clone(), block: id });
        }
        self.entry_block.get_or_insert(id);
        if terminator.is_exit() {
            self.exit_blocks.push(id);
        }
        self.all_blocks.push(id);
        Ok(())
    }

    /// # Errors
    /// Returns [`MetadataError::EmptyFunction`] if no block was added.
    pub fn build(self) -> Result<FunctionCfg, MetadataError> {
        let entry_block = self.entry_block.ok_or_else(|| MetadataError::EmptyFunction(self.name.clone()))?;
        Ok(FunctionCfg {
            name: self.name,
            entry_block,
            exit_blocks: self.exit_blocks,
            all_blocks: self.all_blocks,
        })
    }
}

/// CFG metadata of one compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCfg {
    #[serde(rename = "moduleName", alias = "module_name")]
    module_name: String,
    functions: Vec<FunctionCfg>,
}

impl ModuleCfg {
    pub fn new(module_name: impl Into<String>, functions: Vec<FunctionCfg>) -> Self {
        Self { module_name: module_name.into(), functions }
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    #[must_use]
    pub fn functions(&self) -> &[FunctionCfg] {
        &self.functions
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.functions.iter().map(|f| f.all_blocks.len()).sum()
    }

    #[must_use]
    pub fn exit_count(&self) -> usize {
        self.functions.iter().map(|f| f.exit_blocks.len()).sum()
    }

    /// Check every function record
    ///
    /// # Errors
    /// Returns the first [`MetadataError::InvalidRecord`] found.
    pub fn validate(&self) -> Result<(), MetadataError> {
        self.functions.iter().try_for_each(|f| f.validate(&self.module_name))
    }
}
