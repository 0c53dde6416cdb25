//! Backend tests.
//!
//! The generated programs are executed on a small interpreter for the
//! target instruction set, so the suite can check observable behavior
//! (outputs for given inputs) rather than instruction listings.

use std::collections::VecDeque;

use crate::back::{code_gen, Instruction};
use crate::common::Map;
use crate::front::parse;

/// An interpreter for the target machine.  Memory cell 0 doubles as the
/// accumulator, which is what makes `GET 0`/`PUT 0` and the `ADD 0`
/// doubling idiom work.
struct Machine {
    mem: Map<i64, i64>,
    input: VecDeque<i64>,
    output: Vec<i64>,
}

impl Machine {
    fn run(code: &[Instruction], input: &[i64]) -> Vec<i64> {
        let mut m = Machine {
            mem: Map::new(),
            input: input.iter().copied().collect(),
            output: Vec::new(),
        };
        let mut pc: i64 = 0;
        let mut fuel = 2_000_000u64;
        loop {
            assert!(fuel > 0, "program did not halt");
            fuel -= 1;
            let instruction = code
                .get(usize::try_from(pc).expect("pc went negative"))
                .expect("pc ran off the end of the program");
            match *instruction {
                Instruction::Get(a) => {
                    let value = m.input.pop_front().expect("program ran out of input");
                    m.set(a, value);
                }
                Instruction::Put(a) => m.output.push(m.get(a)),
                Instruction::Load(a) => m.set(0, m.get(a)),
                Instruction::Store(a) => m.set(a, m.get(0)),
                Instruction::LoadI(a) => m.set(0, m.get(m.get(a))),
                Instruction::StoreI(a) => m.set(m.get(a), m.get(0)),
                Instruction::Add(a) => m.set(0, m.get(0) + m.get(a)),
                Instruction::Sub(a) => m.set(0, m.get(0) - m.get(a)),
                Instruction::AddI(a) => m.set(0, m.get(0) + m.get(m.get(a))),
                Instruction::SubI(a) => m.set(0, m.get(0) - m.get(m.get(a))),
                Instruction::Set(k) => m.set(0, k),
                Instruction::Half => m.set(0, m.get(0).div_euclid(2)),
                Instruction::Jump(d) => {
                    pc += d;
                    continue;
                }
                Instruction::Jpos(d) => {
                    if m.get(0) > 0 {
                        pc += d;
                        continue;
                    }
                }
                Instruction::Jneg(d) => {
                    if m.get(0) < 0 {
                        pc += d;
                        continue;
                    }
                }
                Instruction::Jzero(d) => {
                    if m.get(0) == 0 {
                        pc += d;
                        continue;
                    }
                }
                Instruction::Rtrn(a) => {
                    pc = m.get(a);
                    continue;
                }
                Instruction::Halt => return m.output,
            }
            pc += 1;
        }
    }

    fn get(&self, addr: i64) -> i64 {
        self.mem.get(&addr).copied().unwrap_or(0)
    }

    fn set(&mut self, addr: i64, value: i64) {
        self.mem.insert(addr, value);
    }
}

fn compile(source: &str) -> Vec<Instruction> {
    let program = parse(source).expect("source should parse");
    code_gen(&program).expect("source should lower")
}

fn run(source: &str, input: &[i64]) -> Vec<i64> {
    Machine::run(&compile(source), input)
}

fn lowering_error(source: &str) -> String {
    let program = parse(source).expect("source should parse");
    code_gen(&program).expect_err("lowering should fail").to_string()
}

/// Every relative branch must land inside the program.
fn assert_branches_in_range(code: &[Instruction]) {
    for (i, instruction) in code.iter().enumerate() {
        if let Some(offset) = instruction.offset() {
            let target = i as i64 + offset;
            assert!(
                (0..=code.len() as i64).contains(&target),
                "branch at {i} jumps to {target}, outside 0..={}",
                code.len()
            );
        }
    }
}

// End-to-end scenarios.

#[test]
fn reads_computes_writes() {
    let source = "program { int x; read x; write x + 1; }";
    assert_eq!(run(source, &[5]), vec![6]);
    assert_branches_in_range(&compile(source));
}

#[test]
fn multiplies_signed_values() {
    let source = "program { int a; int b; read a; read b; write a * b; }";
    assert_eq!(run(source, &[-3, 7]), vec![-21]);
    assert_eq!(run(source, &[3, 7]), vec![21]);
    assert_eq!(run(source, &[3, -7]), vec![-21]);
    assert_eq!(run(source, &[-3, -7]), vec![21]);
    assert_eq!(run(source, &[0, 9]), vec![0]);
    assert_eq!(run(source, &[9, 0]), vec![0]);
    assert_eq!(run(source, &[1234, 5678]), vec![7006652]);
    assert_branches_in_range(&compile(source));
}

#[test]
fn divides_and_takes_remainders() {
    let source = "program { int a; int b; read a; read b; write a / b; write a % b; }";
    assert_eq!(run(source, &[-17, 5]), vec![-4, 3]);
    assert_eq!(run(source, &[17, 5]), vec![3, 2]);
    assert_eq!(run(source, &[17, -5]), vec![-4, -3]);
    assert_eq!(run(source, &[-17, -5]), vec![3, -2]);
    assert_eq!(run(source, &[0, 7]), vec![0, 0]);
    assert_eq!(run(source, &[-15, 5]), vec![-3, 0]);
    assert_eq!(run(source, &[1, 1]), vec![1, 0]);
    // Runtime zero divisors are neutralized to zero results.
    assert_eq!(run(source, &[17, 0]), vec![0, 0]);
    assert_branches_in_range(&compile(source));
}

#[test]
fn fills_and_prints_an_array() {
    let source = "program { int[1:5] A; int i; \
                  for i from 1 to 5 do A[i] := i * i; \
                  for i from 1 to 5 do write A[i]; }";
    assert_eq!(run(source, &[]), vec![1, 4, 9, 16, 25]);
    assert_branches_in_range(&compile(source));
}

#[test]
fn procedure_arguments_are_by_reference() {
    let source = "procedure inc(x) { x := x + 1; } \
                  program { int v; read v; inc(v); write v; }";
    assert_eq!(run(source, &[10]), vec![11]);
    assert_branches_in_range(&compile(source));
}

#[test]
fn counts_down() {
    let source = "program { int i; for i from 5 downto 1 do write i; }";
    assert_eq!(run(source, &[]), vec![5, 4, 3, 2, 1]);
    assert_branches_in_range(&compile(source));
}

// Laws.

#[test]
fn assigning_then_writing_matches_writing_directly() {
    let through = "program { int a; int b; int x; read a; read b; \
                   x := a * b - a / b; write x; }";
    let direct = "program { int a; int b; read a; read b; \
                  write a * b - a / b; }";
    for input in [[6, 2], [-6, 2], [7, -3], [-7, -3], [0, 5]] {
        assert_eq!(run(through, &input), run(direct, &input));
    }
}

#[test]
fn addition_commutes() {
    let left = "program { int a; int b; read a; read b; write a + b; }";
    let right = "program { int a; int b; read a; read b; write b + a; }";
    for input in [[1, 2], [-4, 9], [0, 0], [-7, -8], [1000, -1]] {
        assert_eq!(run(left, &input), run(right, &input));
    }
}

#[test]
fn quotient_and_remainder_recompose_the_dividend() {
    let source = "program { int a; int b; read a; read b; \
                  write (a / b) * b + a % b; }";
    for (a, b) in [
        (17, 5),
        (-17, 5),
        (17, -5),
        (-17, -5),
        (1, 3),
        (-1, 3),
        (100, 7),
        (0, 9),
        (13, 13),
        (-36, 6),
    ] {
        assert_eq!(run(source, &[a, b]), vec![a], "for {a} and {b}");
    }
}

#[test]
fn remainder_follows_the_divisor_sign() {
    let source = "program { int a; int b; read a; read b; write a % b; }";
    for (a, b) in [
        (17, 5),
        (-17, 5),
        (17, -5),
        (-17, -5),
        (4, 9),
        (-4, 9),
        (4, -9),
        (0, 3),
    ] {
        let r = run(source, &[a, b])[0];
        assert!(r == 0 || (r > 0) == (b > 0), "{a} % {b} gave {r}");
        assert!(r.abs() < b.abs(), "{a} % {b} gave {r}");
    }
}

#[test]
fn writes_literals_and_computed_values() {
    let source = "program { write 5; write -3; write 2 + 2 * 2; }";
    assert_eq!(run(source, &[]), vec![5, -3, 6]);
}

// Control flow.

#[test]
fn every_comparison_operator_selects_the_right_branch() {
    fn holds(op: &str, a: i64, b: i64) -> bool {
        match op {
            "=" => a == b,
            "!=" => a != b,
            "<" => a < b,
            ">" => a > b,
            "<=" => a <= b,
            ">=" => a >= b,
            _ => unreachable!(),
        }
    }
    for op in ["=", "!=", "<", ">", "<=", ">="] {
        let source = format!(
            "program {{ int a; int b; read a; read b; \
             if a {op} b {{ write 1; }} else {{ write 0; }} }}"
        );
        for (a, b) in [(1, 2), (2, 1), (2, 2), (-3, 3), (-3, -3)] {
            let expected = i64::from(holds(op, a, b));
            assert_eq!(run(&source, &[a, b]), vec![expected], "{a} {op} {b}");
        }
    }
}

#[test]
fn if_without_else() {
    let source = "program { int a; read a; \
                  if a > 0 { write a; } write 99; }";
    assert_eq!(run(source, &[7]), vec![7, 99]);
    assert_eq!(run(source, &[-7]), vec![99]);
    // Negated-condition operators place the (empty) else-branch first.
    let source = "program { int a; read a; \
                  if a = 0 { write 1; } write 99; }";
    assert_eq!(run(source, &[0]), vec![1, 99]);
    assert_eq!(run(source, &[5]), vec![99]);
}

#[test]
fn while_loops_run_until_the_condition_fails() {
    let source = "program { int n; read n; \
                  while n > 0 { write n; n := n - 1; } }";
    assert_eq!(run(source, &[3]), vec![3, 2, 1]);
    assert_eq!(run(source, &[0]), Vec::<i64>::new());
    let source = "program { int n; read n; \
                  while n != 0 { n := n - 1; } write n; }";
    assert_eq!(run(source, &[4]), vec![0]);
}

#[test]
fn repeat_runs_at_least_once_and_stops_when_the_condition_holds() {
    let source = "program { int x; x := 0; \
                  repeat { x := x + 1; } until x = 5; write x; }";
    assert_eq!(run(source, &[]), vec![5]);
    let source = "program { int x; x := 9; \
                  repeat { write x; } until x = 9; }";
    assert_eq!(run(source, &[]), vec![9]);
    let source = "program { int x; x := 3; \
                  repeat { x := x - 1; } until x < 1; write x; }";
    assert_eq!(run(source, &[]), vec![0]);
}

#[test]
fn for_bounds_are_evaluated_once() {
    let source = "program { int n; int i; n := 3; \
                  for i from 1 to n do { n := 10; write i; } }";
    assert_eq!(run(source, &[]), vec![1, 2, 3]);
}

#[test]
fn for_loops_nest() {
    let source = "program { int i; int j; \
                  for i from 1 to 3 do \
                    for j from i to 3 do \
                      write i * 10 + j; }";
    assert_eq!(run(source, &[]), vec![11, 12, 13, 22, 23, 33]);
}

#[test]
fn empty_ascending_range_skips_the_body() {
    let source = "program { int i; for i from 5 to 1 do write i; write 0; }";
    assert_eq!(run(source, &[]), vec![0]);
}

#[test]
fn counters_shadow_globals_and_come_back() {
    let source = "program { int i; i := 42; \
                  for i from 1 to 2 do write i; \
                  write i; }";
    assert_eq!(run(source, &[]), vec![1, 2, 42]);
}

// Arrays.

#[test]
fn array_ranges_may_start_anywhere() {
    let source = "program { int[-2:2] A; int i; \
                  for i from -2 to 2 do A[i] := i; \
                  for i from -2 to 2 do write A[i]; }";
    assert_eq!(run(source, &[]), vec![-2, -1, 0, 1, 2]);
}

#[test]
fn array_elements_combine_in_arithmetic() {
    let source = "program { int[1:3] A; \
                  read A[1]; read A[2]; \
                  A[3] := A[1] * A[2]; \
                  write A[3] + A[1]; write A[3] - A[2]; }";
    assert_eq!(run(source, &[4, 5]), vec![24, 15]);
}

#[test]
fn array_index_may_be_an_expression() {
    let source = "program { int[1:10] A; int i; \
                  for i from 1 to 5 do A[2 * i - 1] := i; \
                  write A[1]; write A[3]; write A[9]; }";
    assert_eq!(run(source, &[]), vec![1, 2, 5]);
}

#[test]
fn reads_into_array_elements() {
    let source = "program { int[1:2] A; read A[1]; read A[2]; \
                  write A[2]; write A[1]; }";
    assert_eq!(run(source, &[10, 20]), vec![20, 10]);
}

// Procedures.

#[test]
fn procedures_take_several_references() {
    let source = "procedure swap(a, b) { int t; t := a; a := b; b := t; } \
                  program { int x; int y; read x; read y; \
                  swap(x, y); write x; write y; }";
    assert_eq!(run(source, &[1, 2]), vec![2, 1]);
}

#[test]
fn procedures_may_be_called_repeatedly() {
    let source = "procedure inc(x) { x := x + 1; } \
                  program { int v; v := 0; inc(v); inc(v); inc(v); write v; }";
    assert_eq!(run(source, &[]), vec![3]);
}

#[test]
fn array_formals_reach_the_callers_elements() {
    let source = "procedure fill(A[], n) { \
                    for i from 1 to n do A[i] := i + i; } \
                  program { int[1:4] B; int n; int i; n := 4; \
                  fill(B, n); \
                  for i from 1 to 4 do write B[i]; }";
    assert_eq!(run(source, &[]), vec![2, 4, 6, 8]);
}

#[test]
fn formals_forward_to_further_calls() {
    let source = "procedure bump(v) { v := v + 1; } \
                  procedure twice(w) { bump(w); bump(w); } \
                  program { int z; z := 5; twice(z); write z; }";
    assert_eq!(run(source, &[]), vec![7]);
}

#[test]
fn array_formals_forward_to_further_calls() {
    let source = "procedure deep(A[]) { A[2] := 7; } \
                  procedure relay(B[]) { deep(B); } \
                  program { int[1:3] C; relay(C); write C[2]; }";
    assert_eq!(run(source, &[]), vec![7]);
}

#[test]
fn procedures_sum_arrays_through_references() {
    let source = "procedure sum(A[], n, out) { out := 0; \
                    for i from 1 to n do out := out + A[i]; } \
                  program { int[1:4] B; int n; int s; int i; \
                  for i from 1 to 4 do read B[i]; \
                  n := 4; sum(B, n, s); write s; }";
    assert_eq!(run(source, &[10, 20, 30, 40]), vec![100]);
}

#[test]
fn procedures_may_declare_local_arrays() {
    let source = "procedure rev(A[], n) { int[1:8] T; \
                    for i from 1 to n do T[i] := A[i]; \
                    for i from 1 to n do A[i] := T[n - i + 1]; } \
                  program { int[1:3] B; int n; int i; \
                  for i from 1 to 3 do read B[i]; \
                  n := 3; rev(B, n); \
                  for i from 1 to 3 do write B[i]; }";
    assert_eq!(run(source, &[1, 2, 3]), vec![3, 2, 1]);
}

#[test]
fn loop_counters_may_be_passed_by_reference() {
    let source = "procedure show(v) { write v; } \
                  program { int i; for i from 1 to 3 do show(i); }";
    assert_eq!(run(source, &[]), vec![1, 2, 3]);
}

#[test]
fn procedure_reads_and_writes_through_references() {
    let source = "procedure io(x) { read x; write x; } \
                  program { int v; io(v); write v; }";
    assert_eq!(run(source, &[8]), vec![8, 8]);
}

// Emitted-code invariants.

#[test]
fn procedure_bodies_each_end_in_one_rtrn_before_main() {
    let source = "procedure a(x) { x := 1; } \
                  procedure b(y) { y := 2; } \
                  program { int v; a(v); b(v); write v; }";
    let code = compile(source);

    assert!(matches!(code[0], Instruction::Jump(_)));
    assert!(matches!(code.last(), Some(Instruction::Halt)));

    let returns: Vec<(usize, i64)> = code
        .iter()
        .enumerate()
        .filter_map(|(i, ins)| match ins {
            Instruction::Rtrn(cell) => Some((i, *cell)),
            _ => None,
        })
        .collect();
    assert_eq!(returns.len(), 2);
    assert_ne!(returns[0].1, returns[1].1, "return cells must not be shared");

    // The leading placeholder jumps past every procedure body.
    let main_entry = code[0].offset().unwrap();
    for (i, _) in &returns {
        assert!((*i as i64) < main_entry);
    }
    assert_branches_in_range(&code);
}

#[test]
fn trivial_program_listing() {
    let code = compile("program { int x; read x; write x; }");
    let lines: Vec<String> = code.iter().map(|i| i.to_string()).collect();
    assert_eq!(lines, vec!["GET 1", "PUT 1", "HALT"]);
}

// Errors.

#[test]
fn undeclared_identifiers_are_reported() {
    assert_eq!(
        lowering_error("program { write x; }"),
        "Error at line 1: undeclared identifier: x"
    );
}

#[test]
fn redeclarations_are_reported() {
    assert_eq!(
        lowering_error("program {\nint x;\nint x;\nread x;\n}"),
        "Error at line 3: redeclared identifier: x"
    );
    assert_eq!(
        lowering_error("program {\nint x;\nint[1:2] x;\nread x;\n}"),
        "Error at line 3: redeclared identifier: x"
    );
    assert_eq!(
        lowering_error("procedure p(a, a) { }\nprogram { }"),
        "Error at line 1: redeclared identifier: a"
    );
}

#[test]
fn invalid_array_ranges_are_reported() {
    assert_eq!(
        lowering_error("program {\nint[5:1] A;\n}"),
        "Error at line 2: invalid array range for A: 5:1"
    );
}

#[test]
fn array_misuse_is_reported() {
    assert_eq!(
        lowering_error("program {\nint[1:3] A;\nwrite A;\n}"),
        "Error at line 3: misuse of array variable: A"
    );
    assert_eq!(
        lowering_error("program {\nint x;\nx[1] := 2;\n}"),
        "Error at line 3: misuse of array variable: x"
    );
}

#[test]
fn use_before_init_is_reported() {
    assert_eq!(
        lowering_error("program {\nint x;\nwrite x + 1;\n}"),
        "Error at line 3: variable used before initialization: x"
    );
    // Reading or assigning initializes.
    let source = "program { int x; read x; write x; x := x + 1; write x; }";
    assert_eq!(run(source, &[1]), vec![1, 2]);
    // Formals are initialized on entry; array index expressions are still
    // checked.
    let source = "procedure show(v) { write v; } program { int v; v := 1; show(v); }";
    assert_eq!(run(source, &[]), vec![1]);
    assert_eq!(
        lowering_error("program {\nint[1:3] A;\nint i;\nwrite A[i];\n}"),
        "Error at line 4: variable used before initialization: i"
    );
}

#[test]
fn loop_counters_are_immutable() {
    assert_eq!(
        lowering_error("program {\nint i;\nfor i from 1 to 3 do\ni := 5;\n}"),
        "Error at line 4: cannot assign to loop counter: i"
    );
    assert_eq!(
        lowering_error("program {\nint i;\nfor i from 1 to 3 do\nread i;\n}"),
        "Error at line 4: cannot assign to loop counter: i"
    );
}

#[test]
fn call_site_arity_and_kinds_are_checked() {
    assert_eq!(
        lowering_error("procedure inc(x) { x := x + 1; }\nprogram {\nint v;\ninc(v, v);\n}"),
        "Error at line 4: wrong number of arguments for inc: expected 1, got 2"
    );
    assert_eq!(
        lowering_error(
            "procedure fill(A[]) { A[1] := 0; }\nprogram {\nint v;\nread v;\nfill(v);\n}"
        ),
        "Error at line 5: argument v of fill should be an array"
    );
    assert_eq!(
        lowering_error(
            "procedure inc(x) { x := x + 1; }\nprogram {\nint[1:3] A;\ninc(A);\n}"
        ),
        "Error at line 4: argument A of inc should be a scalar"
    );
}

#[test]
fn procedure_resolution_failures_are_reported() {
    assert_eq!(
        lowering_error("program {\nmiss();\n}"),
        "Error at line 2: unknown procedure: miss"
    );
    assert_eq!(
        lowering_error("procedure a() {\nb();\n}\nprocedure b() { }\nprogram { a(); }"),
        "Error at line 2: call to procedure b before its definition"
    );
    assert_eq!(
        lowering_error("procedure r() {\nr();\n}\nprogram { r(); }"),
        "Error at line 2: recursive call to procedure r"
    );
    assert_eq!(
        lowering_error("procedure p() { }\nprocedure p() { }\nprogram { }"),
        "Error at line 2: redeclared identifier: p"
    );
}

#[test]
fn literal_zero_divisors_are_static_errors() {
    assert_eq!(
        lowering_error("program {\nint x;\nx := 1 / 0;\n}"),
        "Error at line 3: division by zero"
    );
    assert_eq!(
        lowering_error("program {\nint x;\nx := 1 % 0;\n}"),
        "Error at line 3: division by zero"
    );
    // A variable divisor is only neutralized at run time.
    let source = "program { int a; int b; read a; read b; write a / b; }";
    assert_eq!(run(source, &[9, 0]), vec![0]);
}
