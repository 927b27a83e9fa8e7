use jbc_dec_rs::bytecode::{Assembler, FrameKind, Opcode};
use jbc_dec_rs::structure::recognizer::visits_conserved;
use jbc_dec_rs::{DecompileOptions, Decompiler};

fn sequential() -> Decompiler {
    Decompiler::new(DecompileOptions {
        parallel: false,
        ..DecompileOptions::default()
    })
}

fn render(assembler: &Assembler) -> String {
    sequential().render(&assembler.build()).unwrap()
}

/// `if (a > 0) a = a * 2; else a = -a; return a;`
fn if_else() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Branches", "pick", "(I)I");
    assembler
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IFLE, 1)
        .var(Opcode::ILOAD, 0)
        .push_int(2)
        .insn(Opcode::IMUL)
        .var(Opcode::ISTORE, 0)
        .jump(Opcode::GOTO, 2)
        .label(1)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 0)
        .insn(Opcode::INEG)
        .var(Opcode::ISTORE, 0)
        .label(2)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 0)
        .insn(Opcode::IRETURN);
    assembler
}

#[test]
fn test_if_else_keeps_both_branches() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&if_else().build())?;
    let kinds = method.tree.chain(method.tree.root());
    assert_eq!(kinds.first(), Some(&"If"));
    assert!(visits_conserved(&method.body.graph));

    let text = method.pseudo_code();
    assert!(text.contains("if ("), "{}", text);
    assert!(text.contains("} else {"), "{}", text);
    assert!(text.contains("return arg0;"), "{}", text);
    Ok(())
}

/// `if (a > 0) foo(); else bar(); return;`
fn if_else_calls() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Branches", "dispatch", "(I)V");
    assembler
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IFLE, 1)
        .method(Opcode::INVOKESTATIC, "demo/Branches", "foo", "()V")
        .jump(Opcode::GOTO, 2)
        .label(1)
        .frame(FrameKind::Same)
        .method(Opcode::INVOKESTATIC, "demo/Branches", "bar", "()V")
        .label(2)
        .frame(FrameKind::Same)
        .insn(Opcode::RETURN);
    assembler
}

#[test]
fn test_statement_branches_are_not_fused_into_a_ternary() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&if_else_calls().build())?;
    assert!(method.tree.find("If").is_some());
    assert!(visits_conserved(&method.body.graph));

    let text = method.pseudo_code();
    assert!(text.contains("foo();"), "{}", text);
    assert!(text.contains("bar();"), "{}", text);
    assert!(text.contains("} else {"), "{}", text);
    assert!(!text.contains(" ? "), "{}", text);
    Ok(())
}

/// `int i = 0; while (i < n) { i++; } return i;`
fn counting_loop() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Loops", "count", "(I)I");
    assembler
        .push_int(0)
        .var(Opcode::ISTORE, 1)
        .label(0)
        .frame(FrameKind::Append)
        .var(Opcode::ILOAD, 1)
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IF_ICMPGE, 1)
        .iinc(1, 1)
        .jump(Opcode::GOTO, 0)
        .label(1)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 1)
        .insn(Opcode::IRETURN);
    assembler
}

#[test]
fn test_counting_loop_is_structured_as_a_for() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&counting_loop().build())?;
    assert!(method.tree.find("For").is_some(), "{:?}", method.tree.chain(method.tree.root()));
    assert!(method.body.graph.verify_symmetry().is_ok());

    let text = method.pseudo_code();
    assert!(text.contains("for ("), "{}", text);
    assert!(!text.contains("while ("), "{}", text);
    assert!(text.contains("return "), "{}", text);
    Ok(())
}

/// `int s = 0; for (int i = 0; i < n; i++) { s += i; } return s;`
fn summing_loop() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Loops", "sum", "(I)I");
    assembler
        .push_int(0)
        .var(Opcode::ISTORE, 1)
        .push_int(0)
        .var(Opcode::ISTORE, 2)
        .label(0)
        .frame(FrameKind::Append)
        .var(Opcode::ILOAD, 2)
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IF_ICMPGE, 1)
        .var(Opcode::ILOAD, 1)
        .var(Opcode::ILOAD, 2)
        .insn(Opcode::IADD)
        .var(Opcode::ISTORE, 1)
        .iinc(2, 1)
        .jump(Opcode::GOTO, 0)
        .label(1)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 1)
        .insn(Opcode::IRETURN);
    assembler
}

#[test]
fn test_trailing_increment_becomes_the_update_clause() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&summing_loop().build())?;
    assert!(method.tree.find("For").is_some(), "{:?}", method.tree.chain(method.tree.root()));
    assert!(method.body.graph.verify_symmetry().is_ok());

    let text = method.pseudo_code();
    assert!(text.contains("for ("), "{}", text);
    assert!(text.contains(" += "), "{}", text);
    assert!(!text.contains("while ("), "{}", text);
    Ok(())
}

/// `while (i < n) { tick(); if (i == 5) continue; i++; } return;`
fn skipping_loop() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Loops", "skip", "(II)V");
    assembler
        .label(0)
        .frame(FrameKind::Same)
        .var(Opcode::ILOAD, 0)
        .var(Opcode::ILOAD, 1)
        .jump(Opcode::IF_ICMPGE, 9)
        .method(Opcode::INVOKESTATIC, "demo/Loops", "tick", "()V")
        .var(Opcode::ILOAD, 0)
        .push_int(5)
        .jump(Opcode::IF_ICMPNE, 2)
        .jump(Opcode::GOTO, 0)
        .label(2)
        .frame(FrameKind::Same)
        .iinc(0, 1)
        .jump(Opcode::GOTO, 0)
        .label(9)
        .frame(FrameKind::Same)
        .insn(Opcode::RETURN);
    assembler
}

#[test]
fn test_continue_between_statements_keeps_the_loop() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&skipping_loop().build())?;
    assert!(method.body.graph.verify_symmetry().is_ok());
    for &id in method.body.graph.order() {
        let node = method.body.graph.node(id);
        assert!(node.disposed || node.outgoing.len() <= 2, "{}", method.body.graph.describe(id));
    }

    let text = method.pseudo_code();
    assert!(text.contains("while ("), "{}", text);
    assert!(text.contains("tick();"), "{}", text);
    Ok(())
}

/// `do { tick(); a--; } while (a > 0); return a;`
fn countdown() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Loops", "countdown", "(I)I");
    assembler
        .label(0)
        .frame(FrameKind::Same)
        .method(Opcode::INVOKESTATIC, "demo/Loops", "tick", "()V")
        .iinc(0, -1)
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IFGT, 0)
        .var(Opcode::ILOAD, 0)
        .insn(Opcode::IRETURN);
    assembler
}

#[test]
fn test_bottom_tested_loop_renders_do_while() {
    let text = render(&countdown());
    assert!(text.contains("do {"), "{}", text);
    assert!(text.contains("tick();"), "{}", text);
    assert!(text.contains("} while ("), "{}", text);
}

/// `switch (k) { case 1: return 10; case 2: return 20; default: return 0; }`
fn lookup() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Switches", "lookup", "(I)I");
    assembler
        .var(Opcode::ILOAD, 0)
        .switch(3, &[1, 2], &[1, 2])
        .label(1)
        .frame(FrameKind::Same)
        .push_int(10)
        .insn(Opcode::IRETURN)
        .label(2)
        .frame(FrameKind::Same)
        .push_int(20)
        .insn(Opcode::IRETURN)
        .label(3)
        .frame(FrameKind::Same)
        .push_int(0)
        .insn(Opcode::IRETURN);
    assembler
}

#[test]
fn test_switch_lists_cases_and_default() {
    let text = render(&lookup());
    assert!(text.contains("switch (arg0) {"), "{}", text);
    assert!(text.contains("case 1:"), "{}", text);
    assert!(text.contains("case 2:"), "{}", text);
    assert!(text.contains("return 20;"), "{}", text);
}

/// `try { risky(); } catch (IllegalStateException e) { log(e); } return;`
fn guarded() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Guards", "guarded", "()V");
    assembler
        .try_catch(0, 1, 2, Some("java/lang/IllegalStateException"))
        .label(0)
        .method(Opcode::INVOKESTATIC, "demo/Guards", "risky", "()V")
        .label(1)
        .jump(Opcode::GOTO, 3)
        .label(2)
        .frame(FrameKind::Same1)
        .var(Opcode::ASTORE, 0)
        .var(Opcode::ALOAD, 0)
        .method(Opcode::INVOKESTATIC, "demo/Guards", "log", "(Ljava/lang/Throwable;)V")
        .label(3)
        .frame(FrameKind::Same)
        .insn(Opcode::RETURN);
    assembler
}

#[test]
fn test_try_catch_names_the_exception() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&guarded().build())?;
    assert!(method.tree.find("Try").is_some());

    let text = method.pseudo_code();
    assert!(text.contains("try {"), "{}", text);
    assert!(text.contains("catch (IllegalStateException"), "{}", text);
    assert!(text.contains("risky()"), "{}", text);
    Ok(())
}

#[test]
fn test_try_exit_is_the_code_after_the_handler() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&guarded().build())?;
    let block = method.body.tries.iter().next().ok_or("no try record")?;
    assert_eq!(block.exit, method.body.graph.label_node(3));
    assert_eq!(Some(block.catcher), method.body.graph.label_node(2));
    Ok(())
}

/// `try { risky(); } finally { done(); } return;`
fn finalized() -> Assembler {
    let mut assembler = Assembler::new_static("demo/Guards", "finalized", "()V");
    assembler
        .try_catch(0, 1, 2, None)
        .label(0)
        .method(Opcode::INVOKESTATIC, "demo/Guards", "risky", "()V")
        .label(1)
        .method(Opcode::INVOKESTATIC, "demo/Guards", "done", "()V")
        .jump(Opcode::GOTO, 4)
        .label(2)
        .frame(FrameKind::Same1)
        .var(Opcode::ASTORE, 0)
        .method(Opcode::INVOKESTATIC, "demo/Guards", "done", "()V")
        .var(Opcode::ALOAD, 0)
        .insn(Opcode::ATHROW)
        .label(4)
        .frame(FrameKind::Same)
        .insn(Opcode::RETURN);
    assembler
}

#[test]
fn test_inlined_finally_copy_is_removed() -> Result<(), Box<dyn std::error::Error>> {
    let method = sequential().decompile_unit(&finalized().build())?;
    let block = method.body.tries.iter().next().ok_or("no try record")?;
    assert!(block.finally().is_some());
    assert_eq!(block.exit, method.body.graph.label_node(4));

    let text = method.pseudo_code();
    assert!(text.contains("try {"), "{}", text);
    assert!(text.contains("} finally {"), "{}", text);
    assert_eq!(text.matches("done()").count(), 1, "{}", text);
    assert!(!text.contains("throw "), "{}", text);
    Ok(())
}

#[test]
fn test_batch_reports_failures_per_unit() {
    let mut broken = Assembler::new_static("demo/Broken", "underflow", "()V");
    broken.insn(Opcode::IADD);
    let units = vec![if_else().build(), broken.build(), lookup().build()];

    let outcomes = Decompiler::default().decompile_all(&units);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[1].result.is_err());
    assert_eq!(outcomes[1].signature, "demo/Broken.underflow()V");
    assert!(outcomes[2].result.is_ok());
}

#[test]
fn test_parallel_and_sequential_agree() {
    let units = vec![if_else().build(), counting_loop().build(), lookup().build()];
    let parallel = Decompiler::default().decompile_all(&units);
    let sequential = sequential().decompile_all(&units);
    for (a, b) in parallel.iter().zip(&sequential) {
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.result.as_ref().ok(), b.result.as_ref().ok());
    }
}
