use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jbc_dec_rs::bytecode::{Assembler, CompiledUnit, FrameKind, Opcode};
use jbc_dec_rs::decompiler::Decompiler;
use jbc_dec_rs::DecompileOptions;

/// `int s = 0; for (int i = 0; i < n; i++) { if (i % 3 == 0) s += i; } return s;`
fn summing_loop(index: usize) -> CompiledUnit {
    let mut assembler = Assembler::new_static("bench/Sums", &format!("sum{}", index), "(I)I");
    assembler
        .push_int(0)
        .var(Opcode::ISTORE, 1)
        .push_int(0)
        .var(Opcode::ISTORE, 2)
        .label(0)
        .frame(FrameKind::Append)
        .var(Opcode::ILOAD, 2)
        .var(Opcode::ILOAD, 0)
        .jump(Opcode::IF_ICMPGE, 2)
        .var(Opcode::ILOAD, 2)
        .push_int(3)
        .insn(Opcode::IREM)
        .jump(Opcode::IFNE, 1)
        .var(Opcode::ILOAD, 1)
        .var(Opcode::ILOAD, 2)
        .insn(Opcode::IADD)
        .var(Opcode::ISTORE, 1)
        .label(1)
        .frame(FrameKind::Same)
        .iinc(2, 1)
        .jump(Opcode::GOTO, 0)
        .label(2)
        .frame(FrameKind::Chop)
        .var(Opcode::ILOAD, 1)
        .insn(Opcode::IRETURN);
    assembler.build()
}

fn decompilation_benchmark(c: &mut Criterion) {
    let units: Vec<CompiledUnit> = (0..64).map(summing_loop).collect();

    c.bench_function("single_unit", |b| {
        let decompiler = Decompiler::default();
        b.iter(|| black_box(decompiler.render(&units[0])));
    });

    c.bench_function("batch_sequential", |b| {
        let decompiler = Decompiler::new(DecompileOptions {
            parallel: false,
            ..DecompileOptions::default()
        });
        b.iter(|| black_box(decompiler.decompile_all(&units)));
    });

    c.bench_function("batch_parallel", |b| {
        let decompiler = Decompiler::default();
        b.iter(|| black_box(decompiler.decompile_all(&units)));
    });
}

criterion_group!(benches, decompilation_benchmark);
criterion_main!(benches);
