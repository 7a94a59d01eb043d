//! Per-compilation-unit recorder
//!
//! The instrumenter walks each function's blocks in a stable order and hands
//! the terminator classification of every block to [`ModuleRecorder`], which
//! allocates the block IDs, builds the CFG record, and returns the IDs to
//! embed in the runtime calls.

use super::record::{FunctionCfg, FunctionCfgBuilder, ModuleCfg};
use crate::allocation::BlockIdAllocator;
use crate::domain::{BlockId, Terminator};
use log::{debug, warn};

pub struct ModuleRecorder<'a> {
    module_name: String,
    allocator: &'a BlockIdAllocator,
    functions: Vec<FunctionCfg>,
    skipped: Vec<String>,
}

impl<'a> ModuleRecorder<'a> {
    pub fn new(module_name: impl Into<String>, allocator: &'a BlockIdAllocator) -> Self {
        Self { module_name: module_name.into(), allocator, functions: Vec::new(), skipped: Vec::new() }
    }

    /// Allocate IDs for one function's blocks and record its CFG
    ///
    /// Returns the IDs in the order the terminators were given, whether or
    /// not a record could be built. A function without blocks, or one whose
    /// IDs collide (the allocator is degraded), gets no record and is listed
    /// in [`ModuleRecorder::skipped`]. Recording a name twice replaces the
    /// earlier record.
    pub fn record_function<I>(&mut self, name: impl Into<String>, terminators: I) -> Vec<BlockId>
    where
        I: IntoIterator<Item = Terminator>,
    {
        let name = name.into();
        let mut builder = FunctionCfgBuilder::new(name.clone());
        let mut ids = Vec::new();
        let mut failure = None;

        for terminator in terminators {
            let id = self.allocator.allocate();
            ids.push(id);
            if failure.is_none() {
                failure = builder.add_block(id, terminator).err();
            }
        }

        let built = match failure {
            Some(err) => Err(err),
            None => builder.build(),
        };

        match built {
            Ok(function) => {
                debug!(
                    "{}::{name}: {} blocks, entry {}, {} exits",
                    self.module_name,
                    function.all_blocks().len(),
                    function.entry_block(),
                    function.exit_blocks().len()
                );
                match self.functions.iter().position(|f| f.name() == name) {
                    Some(index) => {
                        warn!("Function {name} recorded twice in {}; keeping the later one", self.module_name);
                        self.functions[index] = function;
                    }
                    None => self.functions.push(function),
                }
            }
            Err(err) => {
                warn!("No CFG record for {name} in {}: {err}", self.module_name);
                self.skipped.push(name);
            }
        }

        ids
    }

    /// Functions that were seen but have no record
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Hand the finished record over for serialization
    #[must_use]
    pub fn finish(self) -> ModuleCfg {
        ModuleCfg::new(self.module_name, self.functions)
    }
}
