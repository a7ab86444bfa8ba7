//! End-to-end pipeline scenarios (spec.md §8), driven through the public
//! [`Pipeline`] API rather than any single component in isolation.

use std::io::Cursor;

use auditkit_bridge::{Pipeline, PipelineTurn};

fn drain(mut pipeline: Pipeline<Cursor<Vec<u8>>>) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        match pipeline.next_turn().unwrap() {
            PipelineTurn::Lines(lines) => out.extend(lines),
            PipelineTurn::Eof(lines) => {
                out.extend(lines);
                break;
            }
        }
    }
    out
}

fn pipeline_over(input: &str, merge_unit: i64, ubsi_enabled: bool) -> Pipeline<Cursor<Vec<u8>>> {
    Pipeline::new(Cursor::new(input.as_bytes().to_vec()), merge_unit, ubsi_enabled)
}

#[test]
fn s1_plain_loop_end_to_end() {
    let input = concat!(
        "type=SYSCALL msg=audit(10.000:1): syscall=62 success=yes exit=0 a0=ffffff9c a1=7 a2=0 a3=0 items=0 ppid=100 pid=200 uid=0\n",
        "type=SYSCALL msg=audit(10.001:2): syscall=62 success=yes exit=0 a0=ffffff9c a1=7 a2=0 a3=0 items=0 ppid=100 pid=200 uid=0\n",
        "type=SYSCALL msg=audit(10.002:3): syscall=62 success=yes exit=0 a0=ffffff9b a1=0 a2=0 a3=0 items=0 ppid=100 pid=200 uid=0\n",
    );
    let out = drain(pipeline_over(input, 0, true));
    assert_eq!(
        out,
        vec![
            "type=UBSI_ENTRY msg=ubsi(10.000:1): unit=(pid=200 thread_time=10.000 unitid=7 iteration=0 time=10.000 count=0) ppid=100 pid=200 uid=0",
            "type=UBSI_ENTRY msg=ubsi(10.001:2): unit=(pid=200 thread_time=10.000 unitid=7 iteration=1 time=10.001 count=0) ppid=100 pid=200 uid=0",
            "type=UBSI_EXIT  msg=ubsi(10.002:3): ppid=100 pid=200 uid=0",
        ]
    );
}

#[test]
fn s2_cross_unit_dependency_via_memory_end_to_end() {
    let input = concat!(
        "type=SYSCALL msg=audit(10.000:1): syscall=62 success=yes exit=0 a0=ffffff9c a1=1 a2=0 a3=0 items=0 ppid=1 pid=500 comm=\"w\"\n",
        "type=SYSCALL msg=audit(10.001:2): syscall=62 success=yes exit=0 a0=fffffed4 a1=deadbeef a2=0 a3=0 items=0 ppid=1 pid=500 comm=\"w\"\n",
        "type=SYSCALL msg=audit(10.002:3): syscall=62 success=yes exit=0 a0=fffffed3 a1=cafe a2=0 a3=0 items=0 ppid=1 pid=500 comm=\"w\"\n",
        "type=SYSCALL msg=audit(10.003:4): syscall=62 success=yes exit=0 a0=ffffff9b a1=0 a2=0 a3=0 items=0 ppid=1 pid=500 comm=\"w\"\n",
        "type=SYSCALL msg=audit(10.004:5): syscall=62 success=yes exit=0 a0=ffffff9c a1=2 a2=0 a3=0 items=0 ppid=1 pid=500 comm=\"w\"\n",
        "type=SYSCALL msg=audit(10.005:6): syscall=62 success=yes exit=0 a0=ffffff38 a1=deadbeef a2=0 a3=0 items=0 ppid=1 pid=500 comm=\"w\"\n",
        "type=SYSCALL msg=audit(10.006:7): syscall=62 success=yes exit=0 a0=ffffff37 a1=cafe a2=0 a3=0 items=0 ppid=1 pid=500 comm=\"w\"\n",
    );
    let out = drain(pipeline_over(input, 0, true));
    let deps: Vec<&String> = out.iter().filter(|l| l.starts_with("type=UBSI_DEP")).collect();
    assert_eq!(deps.len(), 1, "exactly one UBSI_DEP expected, got: {out:?}");
    assert!(deps[0].contains("dep=(pid=500") && deps[0].contains("unitid=1"));
}

#[test]
fn s3_reordering_out_of_order_event_ids() {
    let input = concat!(
        "type=SYSCALL msg=audit(10.000:3): syscall=2 success=yes exit=0 a0=0 a1=0 a2=0 a3=0 ppid=1 pid=2\n",
        "type=SYSCALL msg=audit(10.000:1): syscall=2 success=yes exit=0 a0=0 a1=0 a2=0 a3=0 ppid=1 pid=2\n",
        "type=SYSCALL msg=audit(10.000:2): syscall=2 success=yes exit=0 a0=0 a1=0 a2=0 a3=0 ppid=1 pid=2\n",
    );
    let out = drain(pipeline_over(input, 0, true));
    assert_eq!(out.len(), 3);
    assert!(out[0].contains(":1):"));
    assert!(out[1].contains(":2):"));
    assert!(out[2].contains(":3):"));
}

#[test]
fn s4_exit_group_clears_group_state_end_to_end() {
    let input = concat!(
        "type=SYSCALL msg=audit(10.000:1): syscall=62 success=yes exit=0 a0=ffffff9c a1=5 a2=0 a3=0 items=0 ppid=1 pid=100 comm=\"l\"\n",
        "type=SYSCALL msg=audit(10.001:2): syscall=56 success=yes exit=101 a2=1 a3=0 items=0 ppid=1 pid=100 comm=\"l\"\n",
        "type=SYSCALL msg=audit(10.002:3): syscall=62 success=yes exit=0 a0=ffffff9c a1=6 a2=0 a3=0 items=0 ppid=1 pid=101 comm=\"t1\"\n",
        "type=SYSCALL msg=audit(10.003:4): syscall=231 pid=100 ppid=1 comm=\"l\"\n",
        "type=SYSCALL msg=audit(10.004:5): syscall=62 success=yes exit=0 a0=ffffff9c a1=6 a2=0 a3=0 items=0 ppid=1 pid=101 comm=\"t1\"\n",
    );
    let out = drain(pipeline_over(input, 0, true));
    let entries: Vec<&String> = out.iter().filter(|l| l.starts_with("type=UBSI_ENTRY")).collect();
    // the child's post-exit_group UENTRY starts a fresh unit at iteration 0,
    // proving its prior unit-table row (and the leader's) was torn down
    // rather than advanced.
    assert!(entries.last().unwrap().contains("iteration=0"));
}

#[test]
fn ubsi_disabled_still_reorders_but_does_not_annotate() {
    let input = concat!(
        "type=SYSCALL msg=audit(10.000:2): syscall=62 success=yes exit=0 a0=ffffff9c a1=7 a2=0 a3=0 items=0 ppid=1 pid=2\n",
        "type=SYSCALL msg=audit(10.000:1): syscall=62 success=yes exit=0 a0=ffffff9c a1=7 a2=0 a3=0 items=0 ppid=1 pid=2\n",
    );
    let out = drain(pipeline_over(input, 0, false));
    assert_eq!(out.len(), 2);
    assert!(out[0].contains(":1):"));
    assert!(out[0].starts_with("type=SYSCALL"));
    assert!(out[1].contains(":2):"));
}
