//! Reverse lookup from block ID to the function that owns it
//!
//! Block IDs only mean something next to the metadata store they were
//! allocated for; the index joins the two for inspection output.

use super::record::ModuleCfg;
use crate::domain::BlockId;
use std::collections::HashMap;

/// Where a block lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    pub module: String,
    pub function: String,
    pub is_entry: bool,
    pub is_exit: bool,
}

#[derive(Debug, Default)]
pub struct BlockIndex {
    blocks: HashMap<BlockId, BlockLocation>,
    collisions: usize,
}

impl BlockIndex {
    /// Index every block of `modules`
    ///
    /// If two records claim the same ID (the counter was reset mid-session or
    /// ran degraded), the later record wins and the collision is counted.
    #[must_use]
    pub fn build(modules: &[ModuleCfg]) -> Self {
        let mut index = Self::default();
        for module in modules {
            for function in module.functions() {
                for &id in function.all_blocks() {
                    let location = BlockLocation {
                        module: module.module_name().to_string(),
                        function: function.name().to_string(),
                        is_entry: id == function.entry_block(),
                        is_exit: function.exit_blocks().contains(&id),
                    };
                    if index.blocks.insert(id, location).is_some() {
                        index.collisions += 1;
                    }
                }
            }
        }
        index
    }

    #[must_use]
    pub fn locate(&self, id: BlockId) -> Option<&BlockLocation> {
        self.blocks.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of IDs claimed by more than one block
    #[must_use]
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}
