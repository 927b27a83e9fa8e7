use jbc_dec_rs::bytecode::{Assembler, CompiledUnit, FrameKind, Opcode};
use jbc_dec_rs::cfg::visualization::{generate_dot, DotOptions};
use jbc_dec_rs::{DecompileOptions, Decompiler, MethodBody};

fn build(unit: &CompiledUnit) -> MethodBody {
    let decompiler = Decompiler::new(DecompileOptions {
        parallel: false,
        ..DecompileOptions::default()
    });
    decompiler.build_graph(unit).unwrap()
}

/// `while (n > 0) { n--; } return n;`
fn loop_unit() -> CompiledUnit {
    let mut assembler = Assembler::new_static("demo/Graph", "drain", "(I)I");
    assembler
        .label(0)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IFLE, 1)
        .iinc(0, -1)
        .jump(Opcode::GOTO, 0)
        .label(1)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 0)
        .insn(Opcode::IRETURN);
    assembler.build()
}

/// `return a < b ? b : a;` written with two returns
fn diamond_unit() -> CompiledUnit {
    let mut assembler = Assembler::new_static("demo/Graph", "larger", "(II)I");
    assembler
        .var(Opcode::ILOAD, 0)
        .var(Opcode::ILOAD, 1)
        .jump(Opcode::IF_ICMPGE, 1)
        .var(Opcode::ILOAD, 1)
        .insn(Opcode::IRETURN)
        .label(1)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 0)
        .insn(Opcode::IRETURN);
    assembler.build()
}

#[test]
fn test_edges_are_mirrored() {
    for unit in [loop_unit(), diamond_unit()] {
        let body = build(&unit);
        assert_eq!(body.graph.verify_symmetry(), Ok(()), "{}", body.graph.dump());
    }
}

#[test]
fn test_entry_dominates_every_node() {
    for unit in [loop_unit(), diamond_unit()] {
        let body = build(&unit);
        let graph = &body.graph;
        let entry = graph.entry().unwrap();
        assert_eq!(graph.dominator(entry), None);
        for &id in graph.order() {
            assert!(graph.has_dominator(id, entry), "{}", graph.dump());
        }
    }
}

#[test]
fn test_loop_header_carries_the_back_edge() {
    let body = build(&loop_unit());
    let graph = &body.graph;
    let headers: Vec<_> = graph
        .order()
        .iter()
        .copied()
        .filter(|&id| !graph.node(id).backedges.is_empty())
        .collect();
    assert_eq!(headers.len(), 1, "{}", graph.dump());

    let header = graph.node(headers[0]);
    assert_eq!(header.outgoing.len(), 2);
    for source in &header.backedges {
        assert!(header.incoming.contains(source));
        assert!(graph.has_dominator(*source, header.id));
    }
}

#[test]
fn test_diamond_branches_are_dominated_by_the_test() {
    let body = build(&diamond_unit());
    let graph = &body.graph;
    let entry = graph.entry().unwrap();
    let outgoing = graph.node(entry).outgoing.clone();
    assert_eq!(outgoing.len(), 2, "{}", graph.dump());
    for id in outgoing {
        assert_eq!(graph.dominator(id), Some(entry));
        assert!(graph.node(id).outgoing.is_empty());
    }
    assert_eq!(graph.dominator_children(entry).len(), 2);
}

#[test]
fn test_dot_export_lists_every_edge() {
    let body = build(&loop_unit());
    let dot = generate_dot(&body.graph, &DotOptions::default());
    assert!(dot.starts_with("digraph CFG {"));
    assert_eq!(dot.matches(" -> ").count(), body.graph.edge_count());
}
