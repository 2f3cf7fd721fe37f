//! aggtree Hierarchy - the attribute tree
//!
//! - `Hierarchy`: node store with add/remove/update/move that keeps the tree
//!   single-rooted and aggregation formulas in step with membership
//! - `Editor`: a hierarchy plus its recoverable operation log
//! - `TreeView` / `visible_columns`: display projections

mod command;
mod error;
mod history;
mod node;
mod tree;
mod view;

pub use command::Command;
pub use error::HierarchyError;
pub use history::{Editor, LogEntry, OperationLog};
pub use node::{AggregationInfo, AttributeNode, Dtype, NodePatch, NodeType};
pub use tree::{Applied, Hierarchy, ROOT_ID};
pub use view::{visible_columns, TreeView};

#[cfg(test)]
mod tests {
    use super::*;
    use aggtree_formula::{FormulaEngine, Operation, UsedAttribute};

    /// root -> [total(sum of b, c) -> [b, c], d]
    fn fixture() -> Hierarchy {
        let mut info = AggregationInfo::new(
            Operation::Sum,
            vec![UsedAttribute::new(2, "b"), UsedAttribute::new(3, "c")],
        );
        info.formula = "$(b) + $(c)".to_string();
        info.exec = r#"r => r["b"] + r["c"]"#.to_string();
        Hierarchy::from_nodes(vec![
            AttributeNode::root("root").with_related(vec![1, 4]),
            AttributeNode::aggregation(1, "total", info).with_related(vec![2, 3]),
            AttributeNode::attribute(2, "b"),
            AttributeNode::attribute(3, "c"),
            AttributeNode::attribute(4, "d"),
        ])
        .unwrap()
    }

    fn editor() -> Editor {
        Editor::new(fixture())
    }

    fn info_of(tree: &Hierarchy, id: u64) -> AggregationInfo {
        tree.get(id).and_then(|n| n.info.clone()).unwrap()
    }

    mod tree_tests {
        use super::*;

        #[test]
        fn test_remove_splices_children_in_place() {
            let mut ed = Editor::new(
                Hierarchy::from_nodes(vec![
                    AttributeNode::root("root").with_related(vec![5, 1, 6]),
                    AttributeNode::aggregation(1, "a", AggregationInfo::default()).with_related(vec![2, 3]),
                    AttributeNode::attribute(2, "b"),
                    AttributeNode::attribute(3, "c"),
                    AttributeNode::attribute(5, "x"),
                    AttributeNode::attribute(6, "y"),
                ])
                .unwrap(),
            );
            ed.apply(Command::remove(1));
            assert_eq!(ed.tree().children(0), &[5, 2, 3, 6]);
            assert_eq!(ed.tree().parent(2), Some(0));
            assert!(!ed.tree().contains(1));
            ed.tree().check_invariants().unwrap();
        }

        #[test]
        fn test_remove_used_leaf_regenerates_sum() {
            let mut ed = editor();
            let warnings = ed.apply(Command::remove(2));
            assert!(warnings.is_empty());
            let info = info_of(ed.tree(), 1);
            assert_eq!(info.formula, "$(c)");
            assert_eq!(info.exec, r#"r => r["c"]"#);
            assert_eq!(info.used_attributes.len(), 1);
        }

        #[test]
        fn test_remove_last_used_leaf_clears_and_warns() {
            let mut ed = editor();
            ed.apply(Command::remove(2));
            let warnings = ed.apply(Command::remove(3));
            assert_eq!(warnings.len(), 1);
            let info = info_of(ed.tree(), 1);
            assert!(info.formula.is_empty());
            assert!(info.exec.is_empty());
            assert!(info.used_attributes.is_empty());
        }

        #[test]
        fn test_remove_from_custom_only_warns() {
            let mut tree = fixture();
            let engine = FormulaEngine::default();
            let mut info = info_of(&tree, 1);
            info.operation = Operation::Custom;
            info.formula = "$(b) * 2 + $(c)".to_string();
            tree.apply(&engine, Command::update(1, NodePatch::info(Some(info))));

            let applied = tree.apply(&engine, Command::remove(2));
            assert_eq!(applied.warnings.len(), 1);
            assert!(applied.warnings[0].contains("custom"));
            assert_eq!(info_of(&tree, 1).formula, "$(b) * 2 + $(c)");
        }

        #[test]
        fn test_remove_last_used_from_custom_clears() {
            let mut info = AggregationInfo::new(Operation::Custom, vec![UsedAttribute::new(2, "b")]);
            info.formula = "$(b) * 2".to_string();
            info.exec = r#"r => r["b"] * 2"#.to_string();
            let mut tree = Hierarchy::from_nodes(vec![
                AttributeNode::root("root").with_related(vec![1]),
                AttributeNode::aggregation(1, "agg", info).with_related(vec![2]),
                AttributeNode::attribute(2, "b"),
            ])
            .unwrap();

            let applied = tree.apply(&FormulaEngine::default(), Command::remove(2));
            assert_eq!(applied.warnings.len(), 1);
            assert!(applied.warnings[0].contains("no attributes left"));
            let info = info_of(&tree, 1);
            assert!(info.formula.is_empty());
            assert!(info.exec.is_empty());
            assert!(info.used_attributes.is_empty());
        }

        #[test]
        fn test_remove_under_empty_concat_warns() {
            let mut tree = Hierarchy::from_nodes(vec![
                AttributeNode::root("root").with_related(vec![1]),
                AttributeNode::aggregation(1, "g", AggregationInfo::default()).with_related(vec![2, 3]),
                AttributeNode::attribute(2, "x"),
                AttributeNode::attribute(3, "y"),
            ])
            .unwrap();

            let applied = tree.apply(&FormulaEngine::default(), Command::remove(2));
            assert_eq!(applied.warnings.len(), 1);
            assert!(info_of(&tree, 1).formula.is_empty());
            assert_eq!(tree.children(1), &[3]);
        }

        #[test]
        fn test_remove_root_is_noop() {
            let mut ed = editor();
            let before = ed.tree().to_nodes();
            assert!(ed.apply(Command::remove(0)).is_empty());
            assert_eq!(ed.tree().to_nodes(), before);
            assert!(ed.log().is_empty());
        }

        #[test]
        fn test_unknown_ids_are_noops() {
            let mut ed = editor();
            ed.apply(Command::remove(99));
            ed.apply(Command::update(99, NodePatch::name("x")));
            ed.apply(Command::move_to(99, 0));
            ed.apply(Command::add(99, AttributeNode::attribute(7, "z")));
            assert!(ed.log().is_empty());
            assert_eq!(ed.tree().len(), 5);
        }

        #[test]
        fn test_add_appends_and_defaults_aggregation() {
            let mut ed = editor();
            let node = AttributeNode {
                info: None,
                ..AttributeNode::aggregation(7, "agg", AggregationInfo::default())
            };
            ed.apply(Command::add(0, node));
            assert_eq!(ed.tree().children(0), &[1, 4, 7]);
            let info = info_of(ed.tree(), 7);
            assert_eq!(info.operation, Operation::Concat);
            assert!(info.formula.is_empty());
        }

        #[test]
        fn test_add_duplicate_id_is_noop() {
            let mut ed = editor();
            ed.apply(Command::add(0, AttributeNode::attribute(4, "again")));
            assert_eq!(ed.tree().get(4).unwrap().name, "d");
            assert!(ed.log().is_empty());
        }

        #[test]
        fn test_add_with_related_adopts_children() {
            let mut ed = editor();
            ed.apply(Command::add(0, AttributeNode::aggregation(7, "g", AggregationInfo::default()).with_related(vec![4, 99])));
            assert_eq!(ed.tree().children(7), &[4]);
            assert_eq!(ed.tree().children(0), &[1, 7]);
            ed.tree().check_invariants().unwrap();
        }

        #[test]
        fn test_move_appends_to_target() {
            let mut ed = editor();
            ed.apply(Command::move_to(4, 1));
            assert_eq!(ed.tree().children(1), &[2, 3, 4]);
            assert_eq!(ed.tree().children(0), &[1]);
            assert_eq!(ed.tree().parent(4), Some(1));
        }

        #[test]
        fn test_move_into_own_subtree_is_noop() {
            let mut ed = editor();
            ed.apply(Command::move_to(1, 2));
            ed.apply(Command::move_to(1, 1));
            ed.apply(Command::move_to(0, 4));
            assert_eq!(ed.tree().parent(1), Some(0));
            assert!(ed.log().is_empty());
        }

        #[test]
        fn test_update_is_shallow_merge() {
            let mut ed = editor();
            ed.apply(Command::update(2, NodePatch::name("bee").with_shown(false)));
            let node = ed.tree().get(2).unwrap();
            assert_eq!(node.name, "bee");
            assert!(!node.is_shown);
            assert_eq!(node.node_type, NodeType::Attribute);
        }

        #[test]
        fn test_root_type_is_immutable() {
            let mut ed = editor();
            let patch = NodePatch {
                node_type: Some(NodeType::Attribute),
                ..NodePatch::default()
            };
            ed.apply(Command::update(0, patch));
            assert!(ed.tree().root().unwrap().is_root());
            assert!(ed.log().is_empty());
        }

        #[test]
        fn test_next_id() {
            assert_eq!(fixture().next_id(), 5);
            assert_eq!(Hierarchy::default().next_id(), 1);
        }
    }

    mod undo_tests {
        use super::*;

        #[test]
        fn test_move_then_undo_restores_parent_and_index() {
            let mut ed = editor();
            ed.apply(Command::move_to(2, 0));
            assert_eq!(ed.tree().children(0), &[1, 4, 2]);
            assert!(ed.undo());
            assert_eq!(ed.tree().parent(2), Some(1));
            assert_eq!(ed.tree().children(1), &[2, 3]);
            assert_eq!(ed.tree().children(0), &[1, 4]);
            assert!(ed.log().is_empty());
        }

        #[test]
        fn test_add_then_undo_removes_without_logging() {
            let mut ed = editor();
            ed.apply(Command::add(1, AttributeNode::attribute(9, "new")));
            assert_eq!(ed.log().len(), 1);
            assert!(ed.undo());
            assert!(!ed.tree().contains(9));
            assert_eq!(ed.tree().children(1), &[2, 3]);
            assert!(ed.log().is_empty());
        }

        #[test]
        fn test_update_then_undo() {
            let mut ed = editor();
            ed.apply(Command::update(4, NodePatch::name("dee")));
            ed.undo();
            assert_eq!(ed.tree().get(4).unwrap().name, "d");
        }

        #[test]
        fn test_undo_remove_restores_subtree() {
            let mut ed = editor();
            let before = ed.tree().to_nodes();
            ed.apply(Command::remove(1));
            assert_eq!(ed.tree().children(0), &[2, 3, 4]);
            assert_eq!(ed.log().len(), 1);
            assert!(ed.undo());
            assert_eq!(ed.tree().to_nodes(), before);
            ed.tree().check_invariants().unwrap();
        }

        #[test]
        fn test_undo_remove_restores_parent_formula() {
            let mut ed = editor();
            let mut sub = AggregationInfo::new(Operation::Sum, vec![]);
            sub.formula = String::new();
            ed.apply(Command::add(1, AttributeNode::aggregation(8, "sub", sub)));
            let mut info = info_of(ed.tree(), 1);
            info.used_attributes.push(UsedAttribute::new(8, "sub"));
            info.formula = "$(b) + $(c) + $(sub)".to_string();
            ed.apply(Command::update(1, NodePatch::info(Some(info.clone()))));

            ed.apply(Command::remove(8));
            assert_eq!(info_of(ed.tree(), 1).formula, "$(b) + $(c)");
            assert!(ed.undo());
            assert_eq!(info_of(ed.tree(), 1), info);
            assert_eq!(ed.tree().children(1), &[2, 3, 8]);
        }

        #[test]
        fn test_removing_attribute_clears_history() {
            let mut ed = editor();
            ed.apply(Command::update(4, NodePatch::name("dee")));
            ed.apply(Command::move_to(4, 1));
            assert_eq!(ed.log().len(), 2);
            ed.apply(Command::remove(4));
            assert!(ed.log().is_empty());
            assert!(!ed.undo());
        }

        #[test]
        fn test_undo_of_attribute_add_keeps_history() {
            let mut ed = editor();
            ed.apply(Command::update(4, NodePatch::name("dee")));
            ed.apply(Command::add(0, AttributeNode::attribute(9, "z")));
            ed.undo();
            assert_eq!(ed.log().len(), 1);
        }

        #[test]
        fn test_batch_undoes_in_one_step() {
            let mut ed = editor();
            ed.apply(Command::Batch {
                commands: vec![
                    Command::add(0, AttributeNode::aggregation(7, "g", AggregationInfo::default())),
                    Command::move_to(4, 7),
                ],
            });
            assert_eq!(ed.log().len(), 1);
            ed.undo();
            assert_eq!(ed.tree().children(0), &[1, 4]);
            assert!(!ed.tree().contains(7));
        }

        #[test]
        fn test_set_formula_checks_scope_and_undoes() {
            let mut ed = editor();
            let err = ed.set_formula(1, "$(b) + $(d)").unwrap_err();
            assert!(err.is(aggtree_core::ErrorKind::AttributeNotFound));
            assert!(ed.set_formula(4, "$(b)").is_err());

            ed.set_formula(1, "$(b) * $(c)").unwrap();
            assert_eq!(info_of(ed.tree(), 1).exec, r#"r => r["b"] * r["c"]"#);
            ed.undo();
            assert_eq!(info_of(ed.tree(), 1).formula, "$(b) + $(c)");
        }

        #[test]
        fn test_set_formula_survives_unrelated_removal() {
            let mut ed = editor();
            ed.set_formula(1, "$(b) * 2 + $(b)").unwrap();
            let info = info_of(ed.tree(), 1);
            assert_eq!(info.operation, Operation::Custom);
            let used: Vec<u64> = info.used_attributes.iter().map(|a| a.id).collect();
            assert_eq!(used, vec![2]);

            let warnings = ed.apply(Command::remove(3));
            assert!(warnings.is_empty());
            assert_eq!(info_of(ed.tree(), 1).formula, "$(b) * 2 + $(b)");

            let warnings = ed.apply(Command::remove(2));
            assert_eq!(warnings.len(), 1);
            assert!(info_of(ed.tree(), 1).formula.is_empty());
        }
    }

    mod view_tests {
        use super::*;

        #[test]
        fn test_traverse_from_any_node() {
            let tree = fixture();
            let view = tree.traverse(1).unwrap();
            assert_eq!(view.name, "total");
            assert_eq!(view.formula, "$(b) + $(c)");
            assert_eq!(view.children.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 3]);
            assert_eq!(tree.traverse(0).unwrap().size(), 5);
            assert!(tree.traverse(42).is_none());
        }

        #[test]
        fn test_traverse_json_shape() {
            let view = fixture().traverse(4).unwrap();
            assert_eq!(
                serde_json::to_value(view).unwrap(),
                serde_json::json!({
                    "id": 4, "name": "d", "children": [],
                    "isShown": true, "type": "attribute", "formula": ""
                })
            );
        }

        #[test]
        fn test_visible_columns_breadth_first() {
            let tree = fixture();
            assert_eq!(visible_columns(&tree.traverse(0).unwrap()), vec!["d", "b", "c"]);
        }

        #[test]
        fn test_collapsed_aggregation_shows_itself() {
            let mut ed = editor();
            ed.apply(Command::update(1, NodePatch::default().with_shown(false)));
            assert_eq!(visible_columns(&ed.tree().traverse(0).unwrap()), vec!["total", "d"]);
        }

        #[test]
        fn test_formula_less_aggregation_is_skipped() {
            let mut ed = editor();
            ed.apply(Command::add(0, AttributeNode::aggregation(7, "empty", AggregationInfo::default())));
            ed.apply(Command::update(1, NodePatch::info(Some(AggregationInfo::default()))));
            assert_eq!(visible_columns(&ed.tree().traverse(0).unwrap()), vec!["d", "b", "c"]);
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_json_round_trip() {
            let tree = fixture();
            let json = tree.to_json().unwrap();
            let back = Hierarchy::from_json(&json).unwrap();
            assert_eq!(back.to_nodes(), tree.to_nodes());
            assert_eq!(back.parent(3), Some(1));
        }

        #[test]
        fn test_missing_root() {
            let err = Hierarchy::from_nodes(vec![AttributeNode::attribute(1, "a")]).unwrap_err();
            assert!(matches!(err, HierarchyError::MissingRoot));
        }

        #[test]
        fn test_multiple_parents() {
            let err = Hierarchy::from_nodes(vec![
                AttributeNode::root("root").with_related(vec![1, 2]),
                AttributeNode::attribute(1, "a").with_related(vec![2]),
                AttributeNode::attribute(2, "b"),
            ])
            .unwrap_err();
            assert!(matches!(err, HierarchyError::MultipleParents { child: 2, .. }));
        }

        #[test]
        fn test_cycle() {
            let err = Hierarchy::from_nodes(vec![
                AttributeNode::root("root"),
                AttributeNode::attribute(1, "a").with_related(vec![2]),
                AttributeNode::attribute(2, "b").with_related(vec![1]),
            ])
            .unwrap_err();
            assert!(matches!(err, HierarchyError::Cycle(_)));
        }

        #[test]
        fn test_dangling_child() {
            let err = Hierarchy::from_nodes(vec![AttributeNode::root("root").with_related(vec![3])])
                .unwrap_err();
            assert!(matches!(err, HierarchyError::DanglingChild { parent: 0, child: 3 }));
        }

        #[test]
        fn test_orphan() {
            let err = Hierarchy::from_nodes(vec![AttributeNode::root("root"), AttributeNode::attribute(1, "a")])
                .unwrap_err();
            assert!(matches!(err, HierarchyError::Unreachable(1)));
        }

        #[test]
        fn test_bad_json() {
            assert!(matches!(Hierarchy::from_json("{"), Err(HierarchyError::Json(_))));
        }
    }
}
