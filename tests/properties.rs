use jbc_dec_rs::bytecode::{Assembler, FrameKind, Opcode};
use jbc_dec_rs::cfg::{Destination, NodeGraph, NodeId};
use jbc_dec_rs::operand::{ConditionOperator, Operand, OperandCondition, OperandKind};
use jbc_dec_rs::structure::recognizer::visits_conserved;
use jbc_dec_rs::{DecompileOptions, Decompiler};

fn chain(length: u32) -> (NodeGraph, Vec<NodeId>) {
    let mut graph = NodeGraph::new();
    let ids: Vec<NodeId> = (0..length)
        .map(|label| {
            let id = graph.get_or_create(label);
            graph.append(id);
            id
        })
        .collect();
    (graph, ids)
}

fn compare(operator: ConditionOperator, then: NodeId) -> Operand {
    Operand::condition(OperandCondition::compare(Operand::int(1), operator, Operand::int(2), then))
}

fn stack_text(graph: &NodeGraph, id: NodeId) -> Vec<String> {
    graph.node(id).stack.iter().map(|operand| operand.to_string()).collect()
}

#[test]
fn test_disposed_node_is_unreferenced() {
    let (mut graph, ids) = chain(4);
    graph.connect_nodes(ids[0], ids[1]);
    graph.connect_nodes(ids[0], ids[2]);
    graph.connect_nodes(ids[1], ids[2]);
    graph.connect_nodes(ids[2], ids[3]);
    graph.push(ids[0], compare(ConditionOperator::EQ, ids[2]));
    graph.set_destination(ids[0], Destination::Node(ids[1]));
    graph.set_destination(ids[1], Destination::Node(ids[2]));
    graph.set_destination(ids[2], Destination::Node(ids[3]));

    graph.dispose(ids[2], true, false);

    assert!(!graph.is_referenced(ids[2]));
    assert!(!graph.order().contains(&ids[2]));
    assert!(graph.node(ids[1]).outgoing.contains(&ids[3]));
    assert!(graph.node(ids[0]).outgoing.contains(&ids[3]));
    assert_eq!(graph.node(ids[1]).destination, Some(Destination::Node(ids[3])));
    let retargeted = graph.node(ids[0]).stack[0].as_condition().and_then(|c| c.then);
    assert_eq!(retargeted, Some(ids[3]));
    assert_eq!(graph.verify_symmetry(), Ok(()));
}

#[test]
fn test_sequential_conditions_merge_once() {
    let (mut graph, ids) = chain(4);
    // first condition skips to the false target of the second
    graph.push(ids[0], compare(ConditionOperator::GT, ids[1]));
    graph.push(ids[0], compare(ConditionOperator::LE, ids[2]));
    graph.connect_nodes(ids[0], ids[1]);
    graph.connect_nodes(ids[0], ids[2]);
    graph.set_destination(ids[0], Destination::Node(ids[1]));

    graph.merge(ids[0]);
    let merged = stack_text(&graph, ids[0]);
    assert_eq!(merged.len(), 1);
    match &graph.node(ids[0]).stack[0].kind {
        OperandKind::Condition(condition) => {
            assert_eq!(condition.operator, ConditionOperator::AND);
            assert_eq!(condition.then, Some(ids[2]));
            assert_eq!(condition.elze, Some(ids[1]));
        }
        other => panic!("unexpected {:?}", other),
    }

    graph.merge(ids[0]);
    assert_eq!(stack_text(&graph, ids[0]), merged);
}

#[test]
fn test_shared_target_merges_to_or() {
    let (mut graph, ids) = chain(3);
    graph.push(ids[0], compare(ConditionOperator::EQ, ids[2]));
    graph.push(ids[0], compare(ConditionOperator::NE, ids[2]));
    graph.connect_nodes(ids[0], ids[1]);
    graph.connect_nodes(ids[0], ids[2]);
    graph.set_destination(ids[0], Destination::Node(ids[1]));

    graph.merge(ids[0]);
    let node = graph.node(ids[0]);
    assert_eq!(node.stack.len(), 1);
    let condition = node.stack[0].as_condition().unwrap();
    assert_eq!(condition.operator, ConditionOperator::OR);
    assert_eq!(condition.then, Some(ids[2]));
}

/// `if (a > 0 || b > 0) return 1; return 0;`
#[test]
fn test_short_circuit_renders_one_condition() {
    let mut assembler = Assembler::new_static("demo/Logic", "any", "(II)I");
    assembler
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IFGT, 1)
        .var(Opcode::ILOAD, 1)
        .jump(Opcode::IFLE, 2)
        .label(1)
        .frame(FrameKind::Same)
        .push_int(1)
        .insn(Opcode::IRETURN)
        .label(2)
        .frame(FrameKind::Same)
        .push_int(0)
        .insn(Opcode::IRETURN);

    let decompiler = Decompiler::new(DecompileOptions {
        parallel: false,
        ..DecompileOptions::default()
    });
    let method = decompiler.decompile_unit(&assembler.build()).unwrap();
    assert!(visits_conserved(&method.body.graph));

    let text = method.pseudo_code();
    assert_eq!(text.matches("if (").count(), 1, "{}", text);
    assert!(text.contains("&&") || text.contains("||"), "{}", text);
}
