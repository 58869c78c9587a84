// Snapshot tests: lock user-facing text surfaces to detect unintended
// formatting changes — diagnostic rendering, certificate reports, and
// build-info output.
//
// Uses inline insta snapshots; run `cargo insta review` after
// intentional output changes to update baselines.

use nac::diag::{codes, DiagLevel, Diagnostic, NodeRef};
use nac::id::NodeId;
use nac::pass::StageCert;
use nac::pipeline::compute_provenance;
use nac::schedule::ScheduleCert;

#[test]
fn diagnostic_without_code() {
    let d = Diagnostic::new(DiagLevel::Warning, "element 'fsm3' has no nodes");
    insta::assert_snapshot!(d.to_string(), @"warning: element 'fsm3' has no nodes");
}

#[test]
fn diagnostic_with_full_context() {
    let d = Diagnostic::error(codes::E0100, "operator latency 12.5ns exceeds clock period 10ns")
        .with_node(NodeRef {
            node: NodeId(4),
            operator: "mul".into(),
            start_time: Some(7.5),
        })
        .with_hint("lower the clock frequency or split the operator")
        .with_related(
            NodeRef {
                node: NodeId(2),
                operator: "add".into(),
                start_time: None,
            },
            "driven by",
        );
    insta::assert_snapshot!(d.to_string(), @r###"
    error[E0100]: operator latency 12.5ns exceeds clock period 10ns
      at: node 4 (mul) @ t=7.5
      driven by: node 2 (add)
      hint: lower the clock frequency or split the operator
    "###);
}

#[test]
fn certificate_report_format() {
    let cert = ScheduleCert {
        t1_all_nodes_scheduled: true,
        t2_causality: false,
        t3_cycle_fit: true,
    };
    insta::assert_snapshot!(cert.render(), @r###"
    PASS T1_all_nodes_scheduled
    FAIL T2_causality
    PASS T3_cycle_fit
    "###);
}

#[test]
fn build_info_output() {
    let p = compute_provenance("{ \"nodes\": [] }");
    insta::assert_snapshot!(p.to_json(), @r###"
    {
      "input_hash": "19109c3de70e71cb5ca7a726a33eda01b2a2530928fb5b652c3bbecf2b8ec8ab",
      "manifest_schema_version": 1,
      "compiler_version": "0.3.2"
    }
    "###);
}
