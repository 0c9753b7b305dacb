//! Directive parser throughput.
//!
//! Measures single-line parsing for the common line shapes and a full
//! turning program.

use cnc_server::gcode::{parse_line, parse_program};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const PROGRAM: &str = "%
(facing pass)
G00 X52 Z2 S1200
G01 X-1 F0.15
G00 X50 Z2
(roughing)
G01 Z-40 F0.25
G00 X52 Z2
G01 X46
G01 Z-40
M30
%";

fn bench_lines(c: &mut Criterion) {
    c.bench_function("parse_move_both_axes", |b| {
        b.iter(|| parse_line(black_box("G01 X10.5 Z-3.25")));
    });
    c.bench_function("parse_move_spindle_feed", |b| {
        b.iter(|| parse_line(black_box("G01 X10 S500 F20")));
    });
    c.bench_function("parse_comment", |b| {
        b.iter(|| parse_line(black_box("(roughing pass)")));
    });
}

fn bench_program(c: &mut Criterion) {
    c.bench_function("parse_program_turning", |b| {
        b.iter(|| parse_program(black_box(PROGRAM)).count());
    });
}

criterion_group!(benches, bench_lines, bench_program);
criterion_main!(benches);
