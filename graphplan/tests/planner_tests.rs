// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! End-to-end planning tests: whole queries in, operator trees out.

use graphplan::catalog::{InMemoryIndexCatalog, InMemoryStatistics};
use graphplan::ir::{
    Clause, Direction, Expression, NodePattern, PathPattern, ProjectionItem, Query,
    RelationshipChain, RelationshipPattern, SingleQuery, Variable,
};
use graphplan::plan::{EagernessReason, Operator};
use graphplan::{Planner, PlannerConfig};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn planner() -> Planner<InMemoryStatistics, InMemoryIndexCatalog> {
    Planner::new(
        InMemoryStatistics::new(10_000.0, 50_000.0)
            .with_label("Person", 1_000.0)
            .with_label("Foo", 500.0)
            .with_relationship_type("X", 20_000.0),
        InMemoryIndexCatalog::new(),
        PlannerConfig::default(),
    )
}

fn return_items(items: Vec<ProjectionItem>) -> Clause {
    Clause::Return {
        distinct: false,
        items,
        order_by: Vec::new(),
        skip: None,
        limit: None,
    }
}

fn match_clause(patterns: Vec<PathPattern>, predicate: Option<Expression>) -> Clause {
    Clause::Match {
        optional: false,
        patterns,
        hints: Vec::new(),
        predicate,
    }
}

/// `(a)-[:X]->()` as a pattern-expression chain.
fn outgoing_x_chain(from: &str, far: NodePattern) -> RelationshipChain {
    RelationshipChain::new(NodePattern::named(from)).step(
        RelationshipPattern::new(Direction::Outgoing).with_type("X"),
        far,
    )
}

#[test]
fn bare_existence_check_plans_as_degree_filter() {
    init_logging();
    // MATCH (a) WHERE (a)-[:X]->() RETURN a
    let query = Query::single(vec![
        match_clause(
            vec![PathPattern::node(NodePattern::named("a"))],
            Some(Expression::PatternExpression {
                chain: outgoing_x_chain("a", NodePattern::anonymous()),
            }),
        ),
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();

    assert!(planned.contains_operator("AllNodesScan"));
    assert!(planned.contains_operator("Selection"));
    assert!(!planned.contains_operator("SemiApply"));
    assert!(planned.display().contains("hasDegreeGreaterThan(a, X, OUTGOING, 0)"));
}

#[test]
fn filtered_existence_check_forces_semi_apply() {
    init_logging();
    // MATCH (a) WHERE (a)-[:X]->(:Foo) RETURN a
    let query = Query::single(vec![
        match_clause(
            vec![PathPattern::node(NodePattern::named("a"))],
            Some(Expression::PatternExpression {
                chain: outgoing_x_chain("a", NodePattern::anonymous().with_label("Foo")),
            }),
        ),
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();

    assert!(planned.contains_operator("SemiApply"));
    let semi = planned.find_operators("SemiApply")[0];
    let Operator::SemiApply { rhs, .. } = planned.operator(semi) else {
        unreachable!()
    };
    // The filtering moved into the right-hand branch.
    let mut saw_expand = false;
    let mut saw_label_filter = false;
    let mut stack = vec![*rhs];
    while let Some(id) = stack.pop() {
        let op = planned.operator(id);
        match op {
            Operator::Expand { .. } => saw_expand = true,
            Operator::Selection { predicates, .. } => {
                if predicates
                    .iter()
                    .any(|p| matches!(p, Expression::HasLabels { labels, .. } if labels.contains(&"Foo".to_string())))
                {
                    saw_label_filter = true;
                }
            }
            _ => {}
        }
        stack.extend(op.children());
    }
    assert!(saw_expand && saw_label_filter);
}

#[test]
fn bare_relationship_count_uses_the_count_store() {
    init_logging();
    // RETURN COUNT { ()-[]->() } AS result
    let inner = Query::single(vec![match_clause(
        vec![PathPattern::node(NodePattern::anonymous()).step(
            RelationshipPattern::new(Direction::Outgoing),
            NodePattern::anonymous(),
        )],
        None,
    )]);
    let query = Query::single(vec![return_items(vec![ProjectionItem::new(
        Expression::CountSubquery {
            query: Box::new(inner),
        },
        "result",
    )])]);
    let planned = planner().plan(&query).unwrap();

    assert!(planned.contains_operator("RelationshipCountFromCountStore"));
    assert!(!planned.contains_operator("AllNodesScan"));
    assert!(!planned.contains_operator("AllRelationshipsScan"));
    assert_eq!(planned.columns, vec![Variable::new("result")]);
}

#[test]
fn create_then_nested_count_gets_an_eager_barrier_and_nested_plan() {
    init_logging();
    // CREATE (a) RETURN [1,2,3][COUNT { MATCH (x) }] AS value
    let count_inner = Query::single(vec![match_clause(
        vec![PathPattern::node(NodePattern::named("x"))],
        None,
    )]);
    let query = Query::single(vec![
        Clause::Create {
            patterns: vec![PathPattern::node(NodePattern::named("a"))],
        },
        return_items(vec![ProjectionItem::new(
            Expression::ContainerIndex {
                subject: Box::new(Expression::ListLiteral(vec![
                    Expression::integer(1),
                    Expression::integer(2),
                    Expression::integer(3),
                ])),
                index: Box::new(Expression::CountSubquery {
                    query: Box::new(count_inner),
                }),
            },
            "value",
        )]),
    ]);
    let planned = planner().plan(&query).unwrap();

    assert!(planned.contains_operator("Create"));
    let eager = planned.find_operators("Eager");
    assert_eq!(eager.len(), 1);
    let Operator::Eager { reasons, .. } = planned.operator(eager[0]) else {
        unreachable!()
    };
    assert_eq!(reasons, &vec![EagernessReason::Unknown]);
    // The count evaluates lazily inside the projection expression.
    assert!(planned.contains_operator("NodeCountFromCountStore"));
    assert!(planned.display().contains("NestedPlanGetByName"));
    assert!(planned.contains_operator("Projection"));
}

#[test]
fn named_projected_comprehension_uses_roll_up_apply() {
    init_logging();
    // MATCH (n) RETURN [(n)-[:X]->(b) | b.age] AS ages
    let comprehension = Expression::PatternComprehension {
        chain: outgoing_x_chain("n", NodePattern::named("b")),
        predicate: None,
        projection: Box::new(Expression::property("b", "age")),
    };
    let query = Query::single(vec![
        match_clause(vec![PathPattern::node(NodePattern::named("n"))], None),
        return_items(vec![ProjectionItem::new(comprehension, "ages")]),
    ]);
    let planned = planner().plan(&query).unwrap();

    assert!(planned.contains_operator("RollUpApply"));
    assert!(!planned.display().contains("NestedPlanCollect"));
}

#[test]
fn indexed_comprehension_uses_nested_plan_instead_of_roll_up() {
    init_logging();
    // MATCH (n) RETURN [(n)-[:X]->(b) | b.age][1] AS age
    let comprehension = Expression::PatternComprehension {
        chain: outgoing_x_chain("n", NodePattern::named("b")),
        predicate: None,
        projection: Box::new(Expression::property("b", "age")),
    };
    let query = Query::single(vec![
        match_clause(vec![PathPattern::node(NodePattern::named("n"))], None),
        return_items(vec![ProjectionItem::new(
            Expression::ContainerIndex {
                subject: Box::new(comprehension),
                index: Box::new(Expression::integer(1)),
            },
            "age",
        )]),
    ]);
    let planned = planner().plan(&query).unwrap();

    assert!(!planned.contains_operator("RollUpApply"));
    assert!(planned.display().contains("NestedPlanCollect"));
}

#[test]
fn planning_twice_yields_structurally_identical_plans() {
    init_logging();
    let build = || {
        let query = Query::single(vec![
            match_clause(
                vec![PathPattern::node(NodePattern::named("a"))
                    .step(
                        RelationshipPattern::named("r1", Direction::Outgoing).with_type("X"),
                        NodePattern::anonymous(),
                    )
                    .step(
                        RelationshipPattern::named("r2", Direction::Outgoing).with_type("X"),
                        NodePattern::anonymous().with_label("Person"),
                    )],
                Some(Expression::PatternExpression {
                    chain: outgoing_x_chain("a", NodePattern::anonymous()),
                }),
            ),
            return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
        ]);
        planner().plan(&query).unwrap().display()
    };
    assert_eq!(build(), build());
}

#[test]
fn two_same_typed_relationships_keep_a_uniqueness_filter() {
    init_logging();
    // MATCH (a)-[r1:X]->(b)-[r2:X]->(c) RETURN a
    let query = Query::single(vec![
        match_clause(
            vec![PathPattern::node(NodePattern::named("a"))
                .step(
                    RelationshipPattern::named("r1", Direction::Outgoing).with_type("X"),
                    NodePattern::named("b"),
                )
                .step(
                    RelationshipPattern::named("r2", Direction::Outgoing).with_type("X"),
                    NodePattern::named("c"),
                )],
            None,
        ),
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();
    let display = planned.display();
    assert!(display.contains("NOT (r1 = r2)") || display.contains("NOT (r2 = r1)"));
}

#[test]
fn differently_typed_relationships_skip_the_uniqueness_filter() {
    init_logging();
    let query = Query::single(vec![
        match_clause(
            vec![PathPattern::node(NodePattern::named("a"))
                .step(
                    RelationshipPattern::named("r1", Direction::Outgoing).with_type("X"),
                    NodePattern::named("b"),
                )
                .step(
                    RelationshipPattern::named("r2", Direction::Outgoing).with_type("Y"),
                    NodePattern::named("c"),
                )],
            None,
        ),
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();
    let display = planned.display();
    assert!(!display.contains("NOT (r1 = r2)"));
    assert!(!display.contains("NOT (r2 = r1)"));
}

#[test]
fn every_selection_only_reads_bound_variables() {
    init_logging();
    // Variable-scope invariant, checked over a plan with joins, semi-applies
    // and projections.
    let query = Query::single(vec![
        match_clause(
            vec![
                PathPattern::node(NodePattern::named("a")).step(
                    RelationshipPattern::named("r", Direction::Outgoing).with_type("X"),
                    NodePattern::named("b").with_label("Person"),
                ),
                PathPattern::node(NodePattern::named("c")),
            ],
            Some(Expression::and_all(vec![
                Expression::eq(
                    Expression::property("a", "x"),
                    Expression::property("c", "x"),
                ),
                Expression::PatternExpression {
                    chain: outgoing_x_chain("b", NodePattern::anonymous().with_label("Foo")),
                },
            ])),
        ),
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();

    for id in planned.reachable_operators() {
        if let Operator::Selection { input, predicates } = planned.operator(id) {
            let mut bound = planned.arena.available_symbols(*input);
            // Apply-family right sides additionally see the outer rows; the
            // argument sets on leaves carry those bindings, so a Selection
            // on top of them is covered by available_symbols already.
            bound.extend(planned.columns.iter().cloned());
            for predicate in predicates {
                for dep in predicate.dependencies() {
                    assert!(
                        bound.contains(&dep),
                        "predicate {:?} reads unbound {:?}",
                        predicate,
                        dep
                    );
                }
            }
        }
    }
}

#[test]
fn with_aggregation_then_return_plans_aggregation() {
    init_logging();
    // MATCH (a) WITH count(a) AS n RETURN n
    let query = Query::single(vec![
        match_clause(vec![PathPattern::node(NodePattern::named("a"))], None),
        Clause::With {
            distinct: false,
            items: vec![ProjectionItem::new(
                Expression::function("count", vec![Expression::var("a")]),
                "n",
            )],
            order_by: Vec::new(),
            skip: None,
            limit: None,
            predicate: None,
        },
        return_items(vec![ProjectionItem::new(Expression::var("n"), "n")]),
    ]);
    let planned = planner().plan(&query).unwrap();
    assert!(planned.contains_operator("Aggregation"));
}

#[test]
fn sort_with_literal_limit_becomes_top() {
    init_logging();
    // MATCH (a) RETURN a ORDER BY a.x LIMIT 5
    let query = Query::single(vec![
        match_clause(vec![PathPattern::node(NodePattern::named("a"))], None),
        Clause::Return {
            distinct: false,
            items: vec![ProjectionItem::new(Expression::var("a"), "a")],
            order_by: vec![graphplan::ir::SortItem {
                expression: Expression::property("a", "x"),
                ascending: true,
            }],
            skip: None,
            limit: Some(Expression::integer(5)),
        },
    ]);
    let planned = planner().plan(&query).unwrap();
    assert!(planned.contains_operator("Top"));
    assert!(!planned.contains_operator("Sort"));
    assert!(!planned.contains_operator("Limit"));
}

#[test]
fn optional_match_plans_apply_over_optional() {
    init_logging();
    // MATCH (a) OPTIONAL MATCH (a)-[r:X]->(b) RETURN a
    let query = Query::single(vec![
        match_clause(vec![PathPattern::node(NodePattern::named("a"))], None),
        Clause::Match {
            optional: true,
            patterns: vec![PathPattern::node(NodePattern::named("a")).step(
                RelationshipPattern::named("r", Direction::Outgoing).with_type("X"),
                NodePattern::named("b"),
            )],
            hints: Vec::new(),
            predicate: None,
        },
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();
    assert!(planned.contains_operator("Optional"));
    assert!(planned.contains_operator("Apply"));
}

#[test]
fn quantified_path_pattern_plans_a_trail() {
    init_logging();
    // MATCH (a) ((x)-[q:X]->(y)){1,3} (b) RETURN a
    let qpp = graphplan::ir::QuantifiedPattern {
        inner: RelationshipChain::new(NodePattern::named("x")).step(
            RelationshipPattern::named("q", Direction::Outgoing).with_type("X"),
            NodePattern::named("y"),
        ),
        repetition: graphplan::ir::Repetition {
            min: 1,
            max: Some(3),
        },
        predicate: None,
    };
    let query = Query::single(vec![
        match_clause(
            vec![PathPattern::node(NodePattern::named("a"))
                .quantified_step(qpp, NodePattern::named("b"))],
            None,
        ),
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();
    assert!(planned.contains_operator("Trail"));
    // The repeated section re-enters from an Argument leaf.
    let trail = planned.find_operators("Trail")[0];
    let Operator::Trail { inner, .. } = planned.operator(trail) else {
        unreachable!()
    };
    let mut cursor = *inner;
    loop {
        let op = planned.operator(cursor);
        match op.children().first() {
            Some(child) => cursor = *child,
            None => break,
        }
    }
    assert_eq!(planned.operator(cursor).name(), "Argument");
}

#[test]
fn shortest_selector_plans_a_shortest_path_operator() {
    init_logging();
    use graphplan::ir::Selector;
    // MATCH SHORTEST 1 (a)-[r:X]->(b) RETURN a
    let query = Query::single(vec![
        match_clause(
            vec![PathPattern::node(NodePattern::named("a"))
                .step(
                    RelationshipPattern::named("r", Direction::Outgoing).with_type("X"),
                    NodePattern::named("b"),
                )
                .with_selector(Selector::Shortest(1))],
            None,
        ),
        return_items(vec![ProjectionItem::new(Expression::var("a"), "a")]),
    ]);
    let planned = planner().plan(&query).unwrap();
    assert!(planned.contains_operator("ShortestPath"));
}

#[test]
fn updating_query_without_return_ends_in_empty_result() {
    init_logging();
    let query = Query::single(vec![Clause::Create {
        patterns: vec![PathPattern::node(NodePattern::named("a").with_label("Person"))],
    }]);
    let planned = planner().plan(&query).unwrap();
    assert!(planned.contains_operator("Create"));
    assert!(planned.contains_operator("EmptyResult"));
    assert!(planned.columns.is_empty());
}

#[test]
fn delete_after_collecting_projection_gets_a_barrier() {
    init_logging();
    // MATCH (a) WITH collect(a) AS items, a AS a DELETE a
    let query = Query::single(vec![
        match_clause(vec![PathPattern::node(NodePattern::named("a"))], None),
        Clause::With {
            distinct: false,
            items: vec![
                ProjectionItem::new(
                    Expression::function("collect", vec![Expression::var("a")]),
                    "items",
                ),
                ProjectionItem::new(Expression::var("a"), "a"),
            ],
            order_by: Vec::new(),
            skip: None,
            limit: None,
            predicate: None,
        },
        Clause::Delete {
            expressions: vec![Expression::var("a")],
            detach: false,
        },
    ]);
    let planned = planner().plan(&query).unwrap();
    let eager = planned.find_operators("Eager");
    assert_eq!(eager.len(), 1);
    let Operator::Eager { reasons, .. } = planned.operator(eager[0]) else {
        unreachable!()
    };
    assert!(reasons.contains(&EagernessReason::WriteAfterProjection));
}

#[test]
fn union_all_concatenates_without_dedup() {
    init_logging();
    let side = |var: &str| SingleQuery {
        clauses: vec![
            match_clause(vec![PathPattern::node(NodePattern::named(var))], None),
            return_items(vec![ProjectionItem::new(Expression::var(var), "n")]),
        ],
    };
    let query = Query::Union {
        lhs: Box::new(Query::Single(side("a"))),
        rhs: side("b"),
        all: true,
    };
    let planned = planner().plan(&query).unwrap();
    let union = planned.find_operators("Union")[0];
    let Operator::Union { distinct, .. } = planned.operator(union) else {
        unreachable!()
    };
    assert!(!distinct);
}
