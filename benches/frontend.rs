use criterion::{black_box, criterion_group, criterion_main, Criterion};
use solar::lexer;
use solar::parser;

const FIBONACCI: &str = r#"
func fib(n: i64) -> i64 {
    return if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
}

func main() -> i32 {
    var limit: i64 = 25
    printf("fib(%ld) = %ld\n", limit, fib(limit))
    return 0i32
}
"#;

fn bench_frontend(c: &mut Criterion) {
    c.bench_function("frontend_tokenize", |b| {
        b.iter(|| {
            let tokens = lexer::tokenize(black_box(FIBONACCI));
            black_box(tokens);
        })
    });

    c.bench_function("frontend_tokenize_parse", |b| {
        b.iter(|| {
            let (program, errors) = parser::parse_source(black_box(FIBONACCI));
            assert!(errors.is_empty());
            black_box(program);
        })
    });
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
