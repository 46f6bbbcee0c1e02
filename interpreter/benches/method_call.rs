use criterion::{criterion_group, criterion_main, Criterion};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use carrion::{Interpreter, Parser};

fn benchmark(c: &mut Criterion) {
    let src = include_str!("../../data/method_call.crl");
    let mut parser = Parser::new(src);
    let program = parser.parse_program();

    c.bench_function("method call", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::new(Rc::new(RefCell::new(io::sink())));
            interpreter.interpret(&program).unwrap();
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
