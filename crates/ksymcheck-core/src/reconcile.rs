//! Required-vs-exported reconciliation.

use serde::Serialize;

use crate::sort::canonical_sort;
use crate::symbol::{Binary, ModuleRequirements, SymbolName, SymbolSet};

/// One unresolved requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingSymbol {
    pub module: Binary,
    pub symbol: SymbolName,
}

impl MissingSymbol {
    /// The report line for this entry.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "Symbol {} required by {} but not provided",
            self.symbol,
            self.module.display_name()
        )
    }
}

/// Every (module, symbol) pair where the module requires a symbol absent from
/// `exported`, in module order, then canonical symbol order within a module.
#[must_use]
pub fn find_missing(requirements: &ModuleRequirements, exported: &SymbolSet) -> Vec<MissingSymbol> {
    requirements
        .iter()
        .flat_map(|(module, required)| {
            canonical_sort(required.iter().filter(|s| !exported.contains(*s)))
                .into_iter()
                .map(move |symbol| MissingSymbol {
                    module: module.clone(),
                    symbol,
                })
        })
        .collect()
}
