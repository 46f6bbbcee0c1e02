use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use carrion::{Interpreter, Parser};
use criterion::{criterion_group, criterion_main, Criterion};

fn benchmark(c: &mut Criterion) {
    let src = include_str!("../../data/fib.crl");
    let mut parser = Parser::new(src);
    let program = parser.parse_program();
    assert!(parser.errors().is_empty(), "{:?}", parser.errors());

    c.bench_function("fib 20", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::new(Rc::new(RefCell::new(io::sink())));
            interpreter.interpret(&program).unwrap();
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = benchmark
}
criterion_main!(benches);
