//! Turn a flat, externally coded statement list into parent-linked stored items.

use std::collections::HashMap;

use finrep_core::{ItemId, NewStatementItem, ReportId, StatementItem, StatementItemInput, StatementKind};
use finrep_storage::{LedgerTx, StoreError};
use tracing::debug;

/// External item code to storage id, for one (report, kind) pass.
pub type CodeMap = HashMap<String, ItemId>;

/// Resolves one statement kind. The code map persists across calls, so a resolver can
/// be seeded or reused for continuation batches of the same statement.
#[derive(Debug, Clone)]
pub struct HierarchyResolver {
    kind: StatementKind,
    codes: CodeMap,
}

impl HierarchyResolver {
    pub fn new(kind: StatementKind) -> Self {
        Self::with_seed(kind, CodeMap::new())
    }

    pub fn with_seed(kind: StatementKind, codes: CodeMap) -> Self {
        Self { kind, codes }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn codes(&self) -> &CodeMap {
        &self.codes
    }

    pub async fn resolve(
        &mut self,
        tx: &mut dyn LedgerTx,
        report_id: ReportId,
        items: &[StatementItemInput],
    ) -> Result<Vec<StatementItem>, StoreError> {
        resolve(tx, self.kind, report_id, items, &mut self.codes).await
    }
}

/// Insert `items` in order, linking each to the already-inserted item whose code matches
/// its `parent_code`.
///
/// This is a single pass: a parent that appears later in `items` (or not at all) leaves
/// the child unlinked. Later items with a repeated code take over that code.
pub async fn resolve(
    tx: &mut dyn LedgerTx,
    kind: StatementKind,
    report_id: ReportId,
    items: &[StatementItemInput],
    codes: &mut CodeMap,
) -> Result<Vec<StatementItem>, StoreError> {
    let mut resolved = Vec::with_capacity(items.len());
    let mut unlinked = 0usize;

    for input in items {
        let parent_id = match input.parent_code.as_deref() {
            Some(code) => {
                let found = codes.get(code).copied();
                if found.is_none() {
                    unlinked += 1;
                }
                found
            }
            None => None,
        };

        let item = NewStatementItem::from_input(input, report_id, parent_id);
        let id = tx.insert_item(kind, &item).await?;
        if let Some(code) = input.item_code.as_deref().filter(|code| !code.is_empty()) {
            codes.insert(code.to_string(), id);
        }
        resolved.push(item.into_stored(id, kind));
    }

    debug!(%kind, report_id, items = resolved.len(), unlinked, "resolved statement items");
    Ok(resolved)
}
