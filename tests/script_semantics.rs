use script_sentinel::{AnalysisConfig, ExecutionHarness, Result};

fn console(src: &str) -> Result<Vec<String>> {
    let report = ExecutionHarness::new(AnalysisConfig::default())?.run(src);
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    Ok(report
        .console_lines()
        .into_iter()
        .map(str::to_string)
        .collect())
}

#[test]
fn switch_matches_strictly_and_falls_through() -> Result<()> {
    let lines = console(
        "function k(x) {\
           var out = '';\
           switch (x) {\
             case 1: out += 'a';\
             case 2: out += 'b'; break;\
             case '1': out += 's'; break;\
             default: out += 'd';\
           }\
           return out;\
         }\
         console.log(k(1), k(2), k('1'), k(9));",
    )?;
    assert_eq!(lines, vec!["ab b s d"]);
    Ok(())
}

#[test]
fn const_bindings_reject_reassignment() -> Result<()> {
    let lines = console(
        "const c = 1;\
         try { c = 2; } catch (e) { console.log(e.name, c); }",
    )?;
    assert_eq!(lines, vec!["TypeError 1"]);
    Ok(())
}

#[test]
fn closures_and_finally_blocks_run_in_order() -> Result<()> {
    let lines = console(
        "function counter() { var n = 0; return function () { return ++n; }; }\
         var next = counter(); next();\
         console.log(next());\
         function f() { try { return 'try'; } finally { console.log('finally'); } }\
         console.log(f());",
    )?;
    assert_eq!(lines, vec!["2", "finally", "try"]);
    Ok(())
}

#[test]
fn loops_honour_break_and_continue() -> Result<()> {
    let lines = console(
        "var s = '';\
         for (var k in { a: 1, b: 2, c: 3 }) { if (k === 'b') continue; s += k; }\
         for (var v of [1, 2, 3, 4]) { if (v > 2) break; s += v; }\
         var i = 0; do { i++; } while (i < 5);\
         console.log(s, i);",
    )?;
    assert_eq!(lines, vec!["ac12 5"]);
    Ok(())
}

#[test]
fn block_scoping_and_parameters() -> Result<()> {
    let lines = console(
        "let x = 'outer'; { let x = 'inner'; }\
         var add = (a, b = 10, ...rest) => a + b + rest.length;\
         var o = { p: { q: 'z' } };\
         console.log(x, add(1), add(1, 2, 3, 4), `${o.p?.q}-${o.r?.q ?? 'none'}`);",
    )?;
    assert_eq!(lines, vec!["outer 11 5 z-none"]);
    Ok(())
}
