#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{Harness, MockApi};
use pagetree_core::{MaxDepth, NestedExportSettings};
use proptest::prelude::*;

/// Random tree as a parent vector: node `i > 0` hangs under `parents[i - 1]`.
fn parent_vectors() -> impl Strategy<Value = Vec<usize>> {
    (1usize..14).prop_flat_map(|n| {
        (1..n)
            .map(|i| 0..i)
            .collect::<Vec<_>>()
    })
}

fn children_of(parents: &[usize]) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::new(); parents.len() + 1];
    for (offset, parent) in parents.iter().enumerate() {
        children[*parent].push(offset + 1);
    }
    children
}

fn id(index: usize) -> String {
    if index == 0 {
        "root".to_string()
    } else {
        format!("p{index}")
    }
}

fn expected_preorder(children: &[Vec<usize>], depth_limit: usize) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    let mut stack = vec![(0usize, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        out.push((id(node), depth));
        if depth < depth_limit {
            stack.extend(children[node].iter().rev().map(|c| (*c, depth + 1)));
        }
    }
    out
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn export_follows_tree_order_within_depth(parents in parent_vectors(), depth in 0u8..5) {
        let children = children_of(&parents);
        let mut api = MockApi::new();
        for (index, kids) in children.iter().enumerate() {
            let kid_ids: Vec<String> = kids.iter().map(|k| id(*k)).collect();
            let kid_refs: Vec<&str> = kid_ids.iter().map(String::as_str).collect();
            api = api.page(&id(index), &kid_refs);
        }
        let settings = NestedExportSettings {
            include_nested: true,
            depth: MaxDepth::Limited(depth),
        };

        let result = runtime()
            .block_on(async {
                let h = Harness::new(api);
                h.orchestrator.export_tree(&Harness::root(), settings).await
            })
            .unwrap();

        let expected = expected_preorder(&children, usize::from(depth));
        prop_assert!(result.success);
        prop_assert_eq!(result.total_pages, expected.len());
        prop_assert_eq!(result.successful_pages, expected.len());
        prop_assert_eq!(result.circular_references, 0);

        let sections: Vec<&str> = result.sections.iter().map(|s| s.page_id.as_str()).collect();
        let wanted: Vec<&str> = expected.iter().map(|(id, _)| id.as_str()).collect();
        prop_assert_eq!(sections, wanted);

        for (page, depth) in &expected {
            let level = (depth + 1).min(6);
            let heading = format!("{} Page {page}\n", "#".repeat(level));
            prop_assert!(result.combined_content.contains(&heading), "missing {}", heading);
        }
    }
}
