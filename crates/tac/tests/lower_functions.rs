use diag::Diagnostics;
use tac::{listing_to_string, Instr};

fn lower_src(src: &str) -> Vec<Instr> {
    let mut ds = Diagnostics::new();
    let toks = lex::tokenize(src, &mut ds);
    let mut prog = parse::parse_program(&toks, &mut ds);
    sema::analyze(&mut prog, &mut ds);
    assert!(!ds.has_errors(), "input must be well-typed: {}", ds);
    tac::lower(&prog).expect("lowering succeeds")
}

#[test]
fn function_body_is_bracketed_by_a_skip_goto() {
    let code = lower_src("func int one() { return 1; } print one();");
    // first instruction jumps over the body, landing after it
    assert!(matches!(&code[0], Instr::Goto(l) if l == "L0"));
    assert!(matches!(&code[1], Instr::Label(l) if l == "one"));
    let skip = code.iter().position(|i| matches!(i, Instr::Label(l) if l == "L0")).unwrap();
    let ret = code.iter().position(|i| matches!(i, Instr::Ret(_))).unwrap();
    assert!(ret < skip);
}

#[test]
fn params_alloc_then_pop_in_reverse() {
    let code = lower_src("func int sub(int a, int b) { return a - b; } print sub(7, 2);");
    let text = listing_to_string(&code);
    assert!(text.contains("ALLOC a int"));
    assert!(text.contains("ALLOC b int"));
    let pop_b = code.iter().position(|i| matches!(i, Instr::Pop { name } if name == "b")).unwrap();
    let pop_a = code.iter().position(|i| matches!(i, Instr::Pop { name } if name == "a")).unwrap();
    assert!(pop_b < pop_a, "arguments pop in reverse push order");
}

#[test]
fn call_pushes_args_in_order_and_captures_result() {
    let code = lower_src("func int sub(int a, int b) { return a - b; } int r; r = sub(7, 2);");
    let params: Vec<String> = code
        .iter()
        .filter_map(|i| match i {
            Instr::Param(x) => Some(x.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(params, vec!["7", "2"]);
    assert!(code
        .iter()
        .any(|i| matches!(i, Instr::Call { func, n_args: 2, dest: Some(_) } if func == "sub")));
}

#[test]
fn statement_call_has_no_result_temp() {
    let code = lower_src("func int noisy() { print 1; return 0; } noisy();");
    assert!(code
        .iter()
        .any(|i| matches!(i, Instr::Call { func, dest: None, .. } if func == "noisy")));
}

#[test]
fn nested_call_arguments_lower_inside_out() {
    let code = lower_src(
        "func int id(int v) { return v; } int r; r = id(id(3));",
    );
    let calls: Vec<usize> = code
        .iter()
        .enumerate()
        .filter_map(|(p, i)| match i {
            Instr::Call { .. } => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 2);
    // the inner call completes before the outer call's PARAM
    let outer_param = code[calls[0]..calls[1]]
        .iter()
        .any(|i| matches!(i, Instr::Param(_)));
    assert!(outer_param, "outer PARAM sits between the two CALLs");
}

#[test]
fn return_lowers_expression_then_rets() {
    let code = lower_src("func int twice(int v) { return v + v; } print twice(2);");
    let text = listing_to_string(&code);
    assert!(text.contains("= v + v"), "{}", text);
    let binop = code.iter().position(|i| matches!(i, Instr::Binary { .. })).unwrap();
    let ret = code.iter().position(|i| matches!(i, Instr::Ret(Some(_)))).unwrap();
    assert!(binop < ret);
}
