use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde::Deserialize;
use std::collections::HashMap;
use varconf::{
    ConfigurationParser, MemoryLoader, ParserConfig, SubstitutionSyntax, decode_metacharacters,
    encode_metacharacters, from_configuration,
};

/// Generate a configuration with `sections` sections of `vars` variables each
fn generate_flat(sections: usize, vars: usize) -> String {
    let mut text = String::new();
    for s in 0..sections {
        text.push_str(&format!("[section_{s}]\n"));
        for v in 0..vars {
            text.push_str(&format!("key_{v} = plain value number {v}\n"));
        }
        text.push('\n');
    }
    text
}

/// Generate a configuration where every variable references others
fn generate_references(sections: usize, vars: usize) -> String {
    let mut text = String::new();
    for s in 0..sections {
        text.push_str(&format!("[section_{s}]\nbase = /srv/{s}\n"));
        for v in 0..vars {
            if s > 0 {
                text.push_str(&format!(
                    "key_{v} = ${{base}}/${{section_{}:key_{v}}} \"quoted {v}\" '$literal'\n",
                    s - 1
                ));
            } else {
                text.push_str(&format!("key_{v} = ${{base}}/{v}\n"));
            }
        }
    }
    text
}

fn parser() -> ConfigurationParser {
    ConfigurationParser::new()
        .with_config(ParserConfig::new().with_populate_special_sections(false))
}

fn bench_flat_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_parsing");

    for (sections, vars) in [(10, 10), (50, 20), (200, 20)] {
        let text = generate_flat(sections, vars);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{sections}x{vars}")),
            &text,
            |b, text| {
                let parser = parser();
                b.iter(|| parser.parse_str(black_box(text)).unwrap())
            },
        );
    }

    group.finish();
}

fn bench_substitution(c: &mut Criterion) {
    let mut group = c.benchmark_group("substitution");

    for syntax in [SubstitutionSyntax::UnixShell, SubstitutionSyntax::WindowsCmd] {
        let text = match syntax {
            SubstitutionSyntax::UnixShell => generate_references(20, 20),
            SubstitutionSyntax::WindowsCmd => generate_references(20, 20)
                .replace("${base}", "%base%")
                .replace('$', ""),
        };
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{syntax:?}")),
            &text,
            |b, text| {
                let parser = ConfigurationParser::new().with_config(
                    ParserConfig::new()
                        .with_syntax(syntax)
                        .with_populate_special_sections(false),
                );
                b.iter(|| parser.parse_str(black_box(text)).unwrap())
            },
        );
    }

    group.finish();
}

fn bench_includes(c: &mut Criterion) {
    let mut loader = MemoryLoader::new();
    for i in 0..20 {
        let url = url::Url::parse(&format!("mem://bench/{i}.cfg")).unwrap();
        let mut text = generate_flat(1, 20).replace("section_0", &format!("part_{i}"));
        if i + 1 < 20 {
            text.push_str(&format!("%include \"{}.cfg\"\n", i + 1));
        }
        loader.insert(&url, text);
    }
    let parser = parser().with_loader(loader);
    let root = url::Url::parse("mem://bench/0.cfg").unwrap();

    c.bench_function("nested_includes_20", |b| {
        b.iter(|| parser.parse_url(black_box(&root)).unwrap())
    });
}

fn bench_metachar(c: &mut Criterion) {
    let mut group = c.benchmark_group("metachar");
    let plain = "ordinary text without escapes ".repeat(32);
    let mixed = "tab\there \u{4e2d}\u{6587} back\\slash \u{1f600} ".repeat(32);

    for (name, text) in [("plain", &plain), ("mixed", &mixed)] {
        let encoded = encode_metacharacters(text);
        group.bench_with_input(BenchmarkId::new("encode", name), text, |b, text| {
            b.iter(|| encode_metacharacters(black_box(text)))
        });
        group.bench_with_input(BenchmarkId::new("decode", name), &encoded, |b, encoded| {
            b.iter(|| decode_metacharacters(black_box(encoded)))
        });
    }

    group.finish();
}

fn bench_serde(c: &mut Criterion) {
    #[derive(Deserialize)]
    struct Entry {
        #[allow(dead_code)]
        key_0: String,
        #[allow(dead_code)]
        key_1: String,
    }

    let text = generate_flat(100, 2);
    let config = parser().parse_str(&text).unwrap();

    c.bench_function("deserialize_100_sections", |b| {
        b.iter(|| {
            let map: HashMap<String, Entry> = from_configuration(black_box(&config)).unwrap();
            map
        })
    });
}

criterion_group!(
    benches,
    bench_flat_parsing,
    bench_substitution,
    bench_includes,
    bench_metachar,
    bench_serde
);
criterion_main!(benches);
