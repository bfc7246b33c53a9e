//! Rebuild the parent/child structure of a stored statement.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{ItemId, StatementItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementNode {
    #[serde(flatten)]
    pub item: StatementItem,
    pub children: Vec<StatementNode>,
}

/// Items whose parent is absent from `items` become roots. Siblings follow
/// `item_display`, then id.
pub fn build_statement_tree(items: &[StatementItem]) -> Vec<StatementNode> {
    let known: HashSet<ItemId> = items.iter().map(|item| item.id).collect();
    let mut children: HashMap<ItemId, Vec<&StatementItem>> = HashMap::new();
    let mut roots = Vec::new();
    for item in items {
        match item.parent_id {
            Some(parent) if parent != item.id && known.contains(&parent) => {
                children.entry(parent).or_default().push(item)
            }
            _ => roots.push(item),
        }
    }

    let mut visited = HashSet::new();
    let mut nodes = assemble(roots, &children, &mut visited);

    // Cycles never reach a root; surface whatever is left so no item is lost.
    let mut stranded: Vec<&StatementItem> = items.iter().filter(|item| !visited.contains(&item.id)).collect();
    while let Some(first) = stranded.first().copied() {
        nodes.extend(assemble(vec![first], &children, &mut visited));
        stranded.retain(|item| !visited.contains(&item.id));
    }
    nodes
}

fn assemble(
    mut level: Vec<&StatementItem>,
    children: &HashMap<ItemId, Vec<&StatementItem>>,
    visited: &mut HashSet<ItemId>,
) -> Vec<StatementNode> {
    level.sort_by_key(|item| (item.item_display, item.id));
    let mut nodes = Vec::with_capacity(level.len());
    for item in level {
        if !visited.insert(item.id) {
            continue;
        }
        let kids = children.get(&item.id).cloned().unwrap_or_default();
        nodes.push(StatementNode {
            item: item.clone(),
            children: assemble(kids, children, visited),
        });
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Sign, StatementKind};

    fn item(id: ItemId, display: u32, parent_id: Option<ItemId>) -> StatementItem {
        StatementItem {
            id,
            report_id: 1,
            kind: StatementKind::BalanceSheet,
            item_name: format!("item {id}"),
            item_code: Some(id.to_string()),
            item_value: id * 10,
            sign: Sign::Positive,
            level: if parent_id.is_some() { 2 } else { 1 },
            item_display: display,
            parent_id,
        }
    }

    #[test]
    fn nests_children_under_parents() {
        let items = vec![item(3, 3, Some(1)), item(1, 1, None), item(2, 2, Some(1))];
        let tree = build_statement_tree(&items);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].item.id, 1);
        let child_ids: Vec<_> = tree[0].children.iter().map(|node| node.item.id).collect();
        assert_eq!(child_ids, vec![2, 3]);
    }

    #[test]
    fn orphans_become_roots() {
        let items = vec![item(1, 1, None), item(2, 2, Some(99))];
        let tree = build_statement_tree(&items);
        assert_eq!(tree.len(), 2);
        assert!(tree.iter().all(|node| node.children.is_empty()));
    }

    #[test]
    fn cycles_do_not_drop_items() {
        let items = vec![item(1, 1, Some(2)), item(2, 2, Some(1))];
        let tree = build_statement_tree(&items);
        let mut count = 0;
        fn walk(nodes: &[StatementNode], count: &mut usize) {
            for node in nodes {
                *count += 1;
                walk(&node.children, count);
            }
        }
        walk(&tree, &mut count);
        assert_eq!(count, 2);
    }
}
