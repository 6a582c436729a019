mod instr;
mod lower;

pub use instr::{listing_to_string, Instr, Operand};
pub use lower::{lower, Lowerer};

#[cfg(test)]
mod tests {
    use super::*;
    use diag::Diagnostics;

    fn lower_src(src: &str) -> Vec<Instr> {
        let mut ds = Diagnostics::new();
        let toks = lex::tokenize(src, &mut ds);
        let mut prog = parse::parse_program(&toks, &mut ds);
        sema::analyze(&mut prog, &mut ds);
        assert!(!ds.has_errors(), "input must be well-typed: {}", ds);
        lower(&prog).expect("lowering succeeds on annotated programs")
    }

    #[test]
    fn assignment_lowers_to_binary_and_copy() {
        let code = lower_src("int x; x = 5 + 3;");
        let text = listing_to_string(&code);
        assert!(text.contains("ALLOC x int"));
        assert!(text.contains("t0 = 5 + 3"));
        assert!(text.contains("x = t0"));
    }

    #[test]
    fn temporaries_and_labels_are_unique() {
        let code = lower_src(
            "int a; a = 1 + 2 * 3; if (a > 0) { print a; } while (a < 10) { a = a + 1; }",
        );
        let mut temps = std::collections::HashSet::new();
        let mut labels = std::collections::HashSet::new();
        for i in &code {
            if let Some(Operand::Temp(n)) = i.dest() {
                assert!(temps.insert(*n), "temp t{} defined twice", n);
            }
            if let Instr::Label(l) = i {
                assert!(labels.insert(l.clone()), "label {} defined twice", l);
            }
        }
    }

    #[test]
    fn shadowed_variables_get_distinct_storage() {
        let code = lower_src("int x = 1; { float x = 2.0; print x; } print x;");
        let allocs: Vec<&str> = code
            .iter()
            .filter_map(|i| match i {
                Instr::Alloc { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(allocs, vec!["x", "x.1"]);
        // the inner print reads the inner storage, the outer the outer
        let prints: Vec<String> = code
            .iter()
            .filter_map(|i| match i {
                Instr::Print(x) => Some(x.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(prints, vec!["x.1", "x"]);
    }

    #[test]
    fn every_jump_has_a_matching_label() {
        let code = lower_src(
            "func int f(int n) { if (n > 0) { return 1; } else { return 0; } } \
             int s; s = 0; loop from i = 1 to 3 { s = s + f(i); } print s;",
        );
        let labels: std::collections::HashSet<&str> = code
            .iter()
            .filter_map(|i| match i {
                Instr::Label(l) => Some(l.as_str()),
                _ => None,
            })
            .collect();
        for i in &code {
            if let Some(t) = i.jump_target() {
                assert!(labels.contains(t), "dangling jump target {}", t);
            }
        }
    }
}
