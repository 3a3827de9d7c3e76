use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_bytecode::{FunctionBuilder, Opcode, UnitBuilder};
use kiln_engine::{
    BytecodeLoader, CapabilityRegistrar, CapabilitySet, CompiledUnit, Context, EvalFlags, JobLoop,
    LoadOptions, Runtime, RuntimeOptions,
};

/// `fib(n)` written recursively, with `fib` held in unit variable 0
fn fib_unit(n: i32) -> CompiledUnit {
    let mut builder = UnitBuilder::script("fib.js").shareable(true);

    let mut fib = FunctionBuilder::new("fib", 1, 1);
    let recurse = fib.label();
    fib.load_local(0)
        .const_i32(2)
        .op(Opcode::Lt)
        .jump(Opcode::JmpIfFalse, recurse)
        .load_local(0)
        .op(Opcode::Return);
    fib.bind(recurse);
    fib.load_unit_var(0)
        .load_local(0)
        .const_i32(1)
        .op(Opcode::Sub)
        .call(1)
        .load_unit_var(0)
        .load_local(0)
        .const_i32(2)
        .op(Opcode::Sub)
        .call(1)
        .op(Opcode::Add)
        .op(Opcode::Return);
    let fib_index = builder.function(fib).unwrap();

    let mut main = FunctionBuilder::new("", 0, 1);
    main.make_closure(fib_index)
        .store_unit_var(0)
        .load_unit_var(0)
        .const_i32(n)
        .call(1)
        .op(Opcode::Return);
    builder.entry(main).unwrap();

    BytecodeLoader::from_unit(builder.finish(), LoadOptions::default()).unwrap()
}

/// Schedules `count` chained promise reactions
fn promise_chain_unit(count: u16) -> CompiledUnit {
    let mut builder = UnitBuilder::script("chain.js").shareable(true);

    let mut step = FunctionBuilder::new("step", 1, 1);
    step.load_local(0).const_i32(1).op(Opcode::Add).op(Opcode::Return);
    let step_index = builder.function(step).unwrap();

    let mut main = FunctionBuilder::new("", 0, 1);
    main.load_global("Promise")
        .const_i32(0)
        .call_method("resolve", 1)
        .store_unit_var(0);
    for _ in 0..count {
        main.load_unit_var(0)
            .make_closure(step_index)
            .call_method("then", 1)
            .store_unit_var(0);
    }
    main.op(Opcode::ReturnUndefined);
    builder.entry(main).unwrap();

    BytecodeLoader::from_unit(builder.finish(), LoadOptions::default()).unwrap()
}

fn fresh_context(runtime: &Runtime) -> Context {
    let mut ctx = Context::new_raw(runtime).unwrap();
    CapabilityRegistrar::install(&mut ctx, &CapabilitySet::reference()).unwrap();
    ctx
}

fn bench_fib(c: &mut Criterion) {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut group = c.benchmark_group("fib");
    for n in [10, 15, 20] {
        let unit = fib_unit(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &unit, |b, unit| {
            b.iter(|| {
                let mut ctx = fresh_context(&runtime);
                let result = BytecodeLoader::bind_and_run(unit, &mut ctx, EvalFlags::script()).unwrap();
                black_box(result.value);
            });
        });
    }
    group.finish();
}

fn bench_context_setup(c: &mut Criterion) {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    c.bench_function("context_with_reference_capabilities", |b| {
        b.iter(|| black_box(fresh_context(&runtime)));
    });
}

fn bench_promise_chain(c: &mut Criterion) {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let unit = promise_chain_unit(256);
    c.bench_function("promise_chain_256", |b| {
        b.iter(|| {
            let mut ctx = fresh_context(&runtime);
            BytecodeLoader::bind_and_run(&unit, &mut ctx, EvalFlags::script()).unwrap();
            black_box(JobLoop::drain(&mut ctx).jobs_run);
        });
    });
}

criterion_group!(benches, bench_fib, bench_context_setup, bench_promise_chain);
criterion_main!(benches);
