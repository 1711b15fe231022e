//! Imported-loop fixtures and end-to-end rewrite tests
//!
//! The fixtures mirror what a TF while loop looks like after import: one
//! `Enter`/`Merge`/`Switch`/`Identity`/`NextIteration`/`Exit` frame per
//! loop-carried value, the sequence read through a tensor array and the
//! hidden state written back to one. Dimensions are hidden 4, input 3,
//! batch 2, sequence 5.

use ndarray::{ArrayD, IxDyn};
use test_case::test_case;

use super::*;
use crate::graph::GraphContext;
use crate::loops::StateVariable;
use crate::proto::extensions::{make_node, make_tensor_value_info};
use crate::proto::onnx::tensor_proto::DataType;
use crate::proto::{AttributeProto, GraphProto, NodeProto, TensorProto, ValueInfoProto};
use crate::tensor::{array_to_tensor_f32, tensor_to_array_f32};
use crate::transformers::common::{get_attr_i, get_attr_ints, get_attr_s, run_transformers};

pub(crate) const HIDDEN: i64 = 4;
pub(crate) const INPUT: i64 = 3;
pub(crate) const BATCH: i64 = 2;
pub(crate) const SEQ: i64 = 5;

/// How the fixture carries `c` and `h`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateLayout {
    /// Two loop variables
    Split,
    /// One `[batch, 2H]` variable sliced apart in the body
    Shared,
}

type Fixture = (GraphProto, LoopProperties);

#[derive(Default)]
struct LoopGraph {
    nodes: Vec<NodeProto>,
    initializers: Vec<TensorProto>,
    inputs: Vec<ValueInfoProto>,
    outputs: Vec<ValueInfoProto>,
}

impl LoopGraph {
    fn node(&mut self, op: &str, inputs: &[&str], outputs: &[&str], name: &str) -> &mut NodeProto {
        self.nodes.push(make_node(op, inputs, outputs, name));
        self.nodes.last_mut().unwrap()
    }

    fn input(&mut self, name: &str, shape: &[i64]) {
        self.inputs
            .push(make_tensor_value_info(name, DataType::Float as i32, shape));
    }

    fn output(&mut self, name: &str, shape: &[i64]) {
        self.outputs
            .push(make_tensor_value_info(name, DataType::Float as i32, shape));
    }

    /// One loop frame for the value `state`, entered from `init` and fed
    /// back from `next`
    fn state(&mut self, state: &str, init: &str, prev: &str, next: &str) -> StateVariable {
        let enter = format!("{}_enter", state);
        let merged = format!("{}_merged", state);
        let next_it = format!("{}_next_it", state);
        let switch_false = format!("switch_{}:0", state);
        let switch_true = format!("switch_{}:1", state);
        let exit = format!("{}_exit", state);

        self.node("Enter", &[init], &[&enter], &format!("enter_{}", state));
        self.node("Merge", &[&enter, &next_it], &[&merged], &format!("merge_{}", state));
        self.node(
            "Switch",
            &[&merged, "cond"],
            &[&switch_false, &switch_true],
            &format!("switch_{}", state),
        );
        self.node("Identity", &[&switch_true], &[prev], &format!("identity_{}", state));
        self.node("NextIteration", &[next], &[&next_it], &format!("next_{}", state));
        self.node("Exit", &[&switch_false], &[&exit], &format!("exit_{}", state));

        StateVariable::new(init, prev, next, Some(exit.as_str()))
    }

    fn graph(self) -> GraphProto {
        GraphProto {
            name: "rnn".to_string(),
            node: self.nodes,
            initializer: self.initializers,
            input: self.inputs,
            output: self.outputs,
            ..Default::default()
        }
    }
}

pub(crate) fn f32_tensor(name: &str, shape: &[usize], data: Vec<f32>) -> TensorProto {
    array_to_tensor_f32(&ArrayD::from_shape_vec(IxDyn(shape), data).unwrap(), name)
}

fn i64_tensor(name: &str, data: Vec<i64>) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: vec![data.len() as i64],
        data_type: DataType::Int64 as i32,
        int64_data: data,
        ..Default::default()
    }
}

/// Kernel `[I + H, 4H]` with `kernel[r, c] = 16 r + c`
fn kernel_tensor() -> TensorProto {
    let rows = (INPUT + HIDDEN) as usize;
    let cols = (4 * HIDDEN) as usize;
    f32_tensor("kernel", &[rows, cols], (0..rows * cols).map(|v| v as f32).collect())
}

/// Bias `[4H]` with `bias[c] = c`
fn bias_tensor() -> TensorProto {
    let cols = (4 * HIDDEN) as usize;
    f32_tensor("bias", &[cols], (0..cols).map(|v| v as f32).collect())
}

/// Sequence read, time-step counter and sequence write shared by both cells
fn scan_frame(g: &mut LoopGraph, hidden: &str) -> StateVariable {
    g.input("X", &[SEQ, BATCH, INPUT]);
    g.initializers.push(i64_tensor("t0", vec![0]));
    g.initializers.push(i64_tensor("one", vec![1]));

    g.node("Enter", &["X"], &["x_ta"], "enter_x");
    g.node("TensorArrayReadV3", &["x_ta", "t_prev", "x_flow"], &["x_t"], "read_x");

    let t = g.state("t", "t0", "t_prev", "t_next");
    g.node("AddV2", &["t_prev", "one"], &["t_next"], "add_t");

    g.node(
        "TensorArrayWriteV3",
        &["y_ta", "t_prev", hidden, "y_flow"],
        &["y_flow_next"],
        "write_y",
    );
    g.node("Exit", &["y_flow_next"], &["y_exit"], "exit_y");
    g.node("Identity", &["y_exit"], &["Y_final"], "out_y");
    g.output("Y_final", &[SEQ, BATCH, HIDDEN]);
    t
}

/// Split c/h states: `c0` a zero constant, `h0` a graph input
fn split_states(g: &mut LoopGraph, c_next: &str, h_next: &str) -> Vec<StateVariable> {
    g.input("h0", &[BATCH, HIDDEN]);
    g.initializers
        .push(f32_tensor("c0", &[BATCH as usize, HIDDEN as usize], vec![0.0; 8]));

    let c = g.state("c", "c0", "c_prev", c_next);
    let h = g.state("h", "h0", "h_prev", h_next);
    g.node("Identity", &["c_exit"], &["c_final"], "out_c");
    g.node("Identity", &["h_exit"], &["h_final"], "out_h");
    g.output("c_final", &[BATCH, HIDDEN]);
    g.output("h_final", &[BATCH, HIDDEN]);
    vec![c, h]
}

/// An `LSTMCell` body: MatMul/BiasAdd/Split and elementwise gates
pub(crate) fn lstm_cell_graph(layout: StateLayout) -> Fixture {
    let mut g = LoopGraph::default();
    g.initializers.push(kernel_tensor());
    g.initializers.push(bias_tensor());
    g.initializers.push(f32_tensor("ft_bias", &[], vec![1.0]));
    g.initializers.push(i64_tensor("split_axis", vec![1]));
    g.initializers.push(i64_tensor("concat_axis", vec![1]));

    let t = scan_frame(&mut g, "h_new");

    let states = match layout {
        StateLayout::Split => split_states(&mut g, "c_new", "h_new"),
        StateLayout::Shared => {
            g.input("s0", &[BATCH, 2 * HIDDEN]);
            g.initializers.push(i64_tensor("c_begin", vec![0, 0]));
            g.initializers.push(i64_tensor("h_begin", vec![0, HIDDEN]));
            g.initializers.push(i64_tensor("state_size", vec![-1, HIDDEN]));

            let s = g.state("s", "s0", "s_prev", "s_new");
            g.node("Slice", &["s_prev", "c_begin", "state_size"], &["c_prev"], "slice_c");
            g.node("Slice", &["s_prev", "h_begin", "state_size"], &["h_prev"], "slice_h");
            g.node("ConcatV2", &["c_new", "h_new", "concat_axis"], &["s_new"], "concat_s");
            g.node("Identity", &["s_exit"], &["s_final"], "out_s");
            g.output("s_final", &[BATCH, 2 * HIDDEN]);
            vec![s]
        }
    };

    g.node("ConcatV2", &["x_t", "h_prev", "concat_axis"], &["xh"], "concat_xh");
    g.node("Enter", &["kernel"], &["kernel_e"], "enter_kernel");
    g.node("MatMul", &["xh", "kernel_e"], &["mm"], "matmul");
    g.node("Enter", &["bias"], &["bias_e"], "enter_bias");
    g.node("BiasAdd", &["mm", "bias_e"], &["ba"], "bias_add");
    g.node(
        "Split",
        &["split_axis", "ba"],
        &["split:0", "split:1", "split:2", "split:3"],
        "split",
    );
    g.node("AddV2", &["split:2", "ft_bias"], &["f_pre"], "add_f");
    g.node("Sigmoid", &["f_pre"], &["f"], "sig_f");
    g.node("Mul", &["c_prev", "f"], &["c_kept"], "mul_c");
    g.node("Sigmoid", &["split:0"], &["i"], "sig_i");
    g.node("Tanh", &["split:1"], &["j"], "tanh_j");
    g.node("Mul", &["i", "j"], &["ij"], "mul_ij");
    g.node("AddV2", &["c_kept", "ij"], &["c_new"], "add_c");
    g.node("Tanh", &["c_new"], &["tc"], "tanh_c");
    g.node("Sigmoid", &["split:3"], &["o"], "sig_o");
    g.node("Mul", &["o", "tc"], &["h_new"], "mul_h");

    let mut loop_props = LoopProperties::new("rnn/while");
    for state in states {
        loop_props = loop_props.with_state(state);
    }
    let loop_props = loop_props
        .with_state(t)
        .with_scan_input("X", "x_t")
        .with_scan_output("h_new", Some("y_exit"));

    (g.graph(), loop_props)
}

/// An `LSTMBlockCell` body with cell clipping off
pub(crate) fn block_cell_graph() -> Fixture {
    let mut g = LoopGraph::default();
    g.initializers.push(kernel_tensor());
    g.initializers.push(bias_tensor());
    for name in ["wci", "wcf", "wco"] {
        g.initializers
            .push(f32_tensor(name, &[HIDDEN as usize], vec![0.0; HIDDEN as usize]));
    }

    let t = scan_frame(&mut g, "block:6");
    let states = split_states(&mut g, "block:1", "block:6");

    g.node("Enter", &["kernel"], &["kernel_e"], "enter_kernel");
    g.node("Enter", &["bias"], &["bias_e"], "enter_bias");
    let block = g.node(
        "LSTMBlockCell",
        &["x_t", "c_prev", "h_prev", "kernel_e", "wci", "wcf", "wco", "bias_e"],
        &[
            "block:0", "block:1", "block:2", "block:3", "block:4", "block:5", "block:6",
        ],
        "block",
    );
    block.attribute = vec![
        AttributeProto::new_float("cell_clip", -1.0),
        AttributeProto::new_float("forget_bias", 1.0),
        AttributeProto::new_int("use_peephole", 0),
    ];

    let mut loop_props = LoopProperties::new("rnn/while");
    for state in states {
        loop_props = loop_props.with_state(state);
    }
    let loop_props = loop_props
        .with_state(t)
        .with_scan_input("X", "x_t")
        .with_scan_output("block:6", Some("y_exit"));

    (g.graph(), loop_props)
}

fn rewrite(graph: &GraphProto, loop_props: &LoopProperties) -> (GraphContext, RewriteOutcome) {
    let mut ctx = GraphContext::new(graph);
    let outcome = LstmRewriter::new().rewrite_loop(&mut ctx, loop_props).unwrap();
    (ctx, outcome)
}

fn rewritten_node(ctx: &GraphContext, outcome: &RewriteOutcome) -> NodeProto {
    match outcome {
        RewriteOutcome::Rewritten { node } => ctx.get_node(node).unwrap().clone(),
        other => panic!("expected a rewrite, got {:?}", other),
    }
}

/// Producer of input `index` of the node named `name`
fn input_producer<'g>(ctx: &'g GraphContext, name: &str, index: usize) -> &'g NodeProto {
    let node = ctx.get_node(name).unwrap();
    ctx.get_producer(&node.input[index]).unwrap()
}

fn initializer_array(ctx: &GraphContext, name: &str) -> ArrayD<f32> {
    tensor_to_array_f32(ctx.get_initializer(name).unwrap()).unwrap()
}

#[test]
fn test_split_state_cell_lowers_to_lstm() {
    let (graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    assert_eq!(lstm.op_type, "LSTM");
    assert_eq!(lstm.input.len(), 7);
    assert_eq!(lstm.input[0], "X");
    assert_eq!(lstm.input[4], "");
    assert_eq!(get_attr_s(&lstm, "direction"), Some("forward"));
    assert_eq!(get_attr_i(&lstm, "hidden_size"), Some(HIDDEN));

    let w = initializer_array(&ctx, &lstm.input[1]);
    let r = initializer_array(&ctx, &lstm.input[2]);
    let b = initializer_array(&ctx, &lstm.input[3]);
    assert_eq!(w.shape(), &[1, 16, 3]);
    assert_eq!(r.shape(), &[1, 16, 4]);
    assert_eq!(b.shape(), &[1, 32]);

    // Output gate block of W holds source columns 12..16
    assert_eq!(w[[0, 4, 0]], 12.0);
    // Cell gate block of R holds source columns 4..8 of the hidden rows
    assert_eq!(r[[0, 13, 2]], 85.0);
    // Forget segment carries the forget bias
    assert_eq!(b[[0, 8]], 9.0);
    assert_eq!(b[[0, 4]], 12.0);
    assert_eq!(b[[0, 12]], 4.0);
    assert!(b.iter().skip(16).all(|&v| v == 0.0));

    assert_eq!(
        ctx.get_tensor_shape(&lstm.output[0]),
        Some(vec![SEQ, 1, BATCH, HIDDEN])
    );
    assert_eq!(
        ctx.get_tensor_shape(&lstm.output[1]),
        Some(vec![1, BATCH, HIDDEN])
    );
}

#[test]
fn test_split_state_initial_states() {
    let (graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    // Constant c0 becomes a reshaped constant
    let initial_c = ctx.get_initializer(&lstm.input[6]).unwrap();
    assert_eq!(initial_c.dims, vec![1, BATCH, HIDDEN]);
    assert_eq!(initial_c.float_data, vec![0.0; 8]);

    // h0 is unsqueezed and the loop's own read moved onto it
    let unsqueeze = input_producer(&ctx, &lstm.name, 5);
    assert_eq!(unsqueeze.op_type, "Unsqueeze");
    assert_eq!(unsqueeze.input, vec!["h0"]);
    assert_eq!(get_attr_ints(unsqueeze, "axes"), Some(&[0][..]));
    assert_eq!(ctx.get_node("enter_h").unwrap().input[0], unsqueeze.output[0]);
}

#[test]
fn test_split_state_exits_reconnected() {
    let (graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    for (reader, slot, axis) in [("out_h", 1, 0), ("out_c", 2, 0), ("out_y", 0, 1)] {
        let squeeze = input_producer(&ctx, reader, 0);
        assert_eq!(squeeze.op_type, "Squeeze", "{}", reader);
        assert_eq!(squeeze.input[0], lstm.output[slot], "{}", reader);
        assert_eq!(get_attr_ints(squeeze, "axes"), Some(&[axis][..]), "{}", reader);
    }
    assert_eq!(
        ctx.get_tensor_shape(&ctx.get_node("out_y").unwrap().input[0]),
        Some(vec![SEQ, BATCH, HIDDEN])
    );
}

#[test]
fn test_state_without_exit_is_not_reconnected() {
    let (graph, mut loop_props) = lstm_cell_graph(StateLayout::Split);
    loop_props.state_variables[0].exit_output = None;
    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    let squeezed: Vec<_> = ctx
        .find_nodes_by_op("Squeeze")
        .into_iter()
        .map(|n| n.input[0].clone())
        .collect();
    assert_eq!(squeezed, vec![lstm.output[1].clone(), lstm.output[0].clone()]);
    assert!(ctx.get_consumers(&lstm.output[2]).is_empty());
    assert_eq!(ctx.get_node("out_c").unwrap().input[0], "c_exit");
}

#[test]
fn test_shared_state_without_exit_emits_no_concat() {
    let (graph, mut loop_props) = lstm_cell_graph(StateLayout::Shared);
    loop_props.state_variables[0].exit_output = None;
    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    assert!(ctx.find_nodes_by_op("Concat").is_empty());
    assert!(ctx.get_consumers(&lstm.output[1]).is_empty());
    assert!(ctx.get_consumers(&lstm.output[2]).is_empty());
    assert_eq!(ctx.get_node("out_s").unwrap().input[0], "s_exit");
}

#[test]
fn test_shared_state_cell_lowers_to_lstm() {
    let (graph, loop_props) = lstm_cell_graph(StateLayout::Shared);
    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    // s0 splits into c then h, each unsqueezed
    let initial_h = input_producer(&ctx, &lstm.name, 5);
    let initial_c = input_producer(&ctx, &lstm.name, 6);
    assert_eq!(initial_h.op_type, "Unsqueeze");
    assert_eq!(initial_c.op_type, "Unsqueeze");

    let split = ctx.get_producer(&initial_c.input[0]).unwrap();
    assert_eq!(split.op_type, "Split");
    assert_eq!(split.input, vec!["s0"]);
    assert_eq!(get_attr_ints(split, "split"), Some(&[HIDDEN, HIDDEN][..]));
    assert_eq!(initial_c.input[0], split.output[0]);
    assert_eq!(initial_h.input[0], split.output[1]);

    // The combined exit is rebuilt as concat(Y_c, Y_h)
    let squeeze = input_producer(&ctx, "out_s", 0);
    assert_eq!(squeeze.op_type, "Squeeze");
    let concat = ctx.get_producer(&squeeze.input[0]).unwrap();
    assert_eq!(concat.op_type, "Concat");
    assert_eq!(concat.input, vec![lstm.output[2].clone(), lstm.output[1].clone()]);
    assert_eq!(get_attr_i(concat, "axis"), Some(2));
    assert_eq!(
        ctx.get_tensor_shape(&squeeze.output[0]),
        Some(vec![BATCH, 2 * HIDDEN])
    );
}

#[test]
fn test_block_cell_lowers_to_lstm() {
    let (graph, loop_props) = block_cell_graph();
    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    let b = initializer_array(&ctx, &lstm.input[3]);
    assert_eq!(b[[0, 8]], 9.0);
    assert_eq!(input_producer(&ctx, "out_h", 0).input[0], lstm.output[1]);
    assert_eq!(input_producer(&ctx, "out_y", 0).input[0], lstm.output[0]);
}

#[test]
fn test_sequence_lengths_cast_to_int32() {
    let (mut graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    graph.input.push(make_tensor_value_info(
        "seq_len",
        DataType::Int64 as i32,
        &[BATCH],
    ));
    let loop_props = loop_props.with_sequence_length("seq_len");

    let (ctx, outcome) = rewrite(&graph, &loop_props);
    let lstm = rewritten_node(&ctx, &outcome);

    let cast = input_producer(&ctx, &lstm.name, 4);
    assert_eq!(cast.op_type, "Cast");
    assert_eq!(cast.input, vec!["seq_len"]);
    assert_eq!(get_attr_i(cast, "to"), Some(DataType::Int32 as i64));
}

#[test]
fn test_selected_hidden_state_scan_output() {
    let (mut graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    graph
        .node
        .push(make_node("Select", &["mask", "h_new", "zeros"], &["h_sel"], "select_y"));
    let write = graph.node.iter_mut().find(|n| n.name == "write_y").unwrap();
    write.input[2] = "h_sel".to_string();

    let mut loop_props = loop_props;
    loop_props.scan_outputs[0].iteration_input = "h_sel".to_string();

    let (_, outcome) = rewrite(&graph, &loop_props);
    assert!(outcome.is_rewritten());
}

#[test]
fn test_rewrite_then_cleanup_is_idempotent() {
    let (graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    let (mut ctx, outcome) = rewrite(&graph, &loop_props);
    assert!(outcome.is_rewritten());

    assert!(ctx.eliminate_dead_nodes() > 0);
    assert!(ctx
        .find_nodes_by_ops(&["Enter", "Exit", "NextIteration", "LSTMBlockCell"])
        .is_empty());
    assert_eq!(ctx.find_nodes_by_op("LSTM").len(), 1);

    let nodes: Vec<String> = ctx.node_names().cloned().collect();
    let again = LstmRewriter::new().rewrite_loop(&mut ctx, &loop_props).unwrap();
    assert_eq!(again, RewriteOutcome::Declined(DeclineReason::NoCellMatch));
    assert_eq!(ctx.node_names().cloned().collect::<Vec<_>>(), nodes);
}

#[test]
fn test_transformer_counts_rewrites() {
    let (graph, loop_props) = block_cell_graph();
    let (_, other_loop) = lstm_cell_graph(StateLayout::Split);
    let mut ctx = GraphContext::new(&graph);

    // The second loop belongs to another graph, so nothing matches it here
    let rewriter = LstmRewriter::new().with_loops(vec![loop_props, other_loop]);
    let result = run_transformers(&mut ctx, &[&rewriter]).unwrap();

    assert_eq!(result.patterns_matched, 1);
    assert_eq!(result.transforms_applied, 1);
    assert_eq!(ctx.find_nodes_by_op("LSTM").len(), 1);
}

#[test]
fn test_transformer_without_loops_is_skipped() {
    let (graph, _) = block_cell_graph();
    let mut ctx = GraphContext::new(&graph);
    let before = ctx.node_count();

    let rewriter = LstmRewriter::new();
    assert!(!rewriter.is_applicable(&ctx));
    let result = run_transformers(&mut ctx, &[&rewriter]).unwrap();

    assert_eq!(result.transforms_applied, 0);
    assert_eq!(ctx.node_count(), before);
}

// ============================================================================
// Declines
// ============================================================================

fn block_with_cell_clip() -> Fixture {
    let (mut graph, loop_props) = block_cell_graph();
    let block = graph.node.iter_mut().find(|n| n.name == "block").unwrap();
    block.attribute.retain(|a| a.name != "cell_clip");
    block.attribute.push(AttributeProto::new_float("cell_clip", 0.5));
    (graph, loop_props)
}

fn block_with_peephole() -> Fixture {
    let (mut graph, loop_props) = block_cell_graph();
    let block = graph.node.iter_mut().find(|n| n.name == "block").unwrap();
    block.attribute.retain(|a| a.name != "use_peephole");
    block.attribute.push(AttributeProto::new_int("use_peephole", 1));
    (graph, loop_props)
}

fn two_scan_outputs() -> Fixture {
    let (graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    (graph, loop_props.with_scan_output("h_new", Some("y2_exit")))
}

fn too_many_state_variables() -> Fixture {
    let (graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    let loop_props = loop_props
        .with_state(StateVariable::new("a0", "a_prev", "a_next", None))
        .with_state(StateVariable::new("b0", "b_prev", "b_next", None));
    (graph, loop_props)
}

fn replace_initializer(graph: &mut GraphProto, tensor: TensorProto) {
    let slot = graph
        .initializer
        .iter_mut()
        .find(|t| t.name == tensor.name)
        .unwrap();
    *slot = tensor;
}

fn gate_axis_not_divisible() -> Fixture {
    let (mut graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    replace_initializer(&mut graph, f32_tensor("kernel", &[7, 15], vec![0.0; 105]));
    replace_initializer(&mut graph, f32_tensor("bias", &[15], vec![0.0; 15]));
    (graph, loop_props)
}

fn bias_kernel_mismatch() -> Fixture {
    let (mut graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    replace_initializer(&mut graph, f32_tensor("bias", &[12], vec![0.0; 12]));
    (graph, loop_props)
}

fn scan_output_not_hidden() -> Fixture {
    let (graph, mut loop_props) = lstm_cell_graph(StateLayout::Split);
    loop_props.scan_outputs[0].iteration_input = "c_new".to_string();
    (graph, loop_props)
}

fn cell_not_reading_scan() -> Fixture {
    let (graph, mut loop_props) = lstm_cell_graph(StateLayout::Split);
    loop_props.scan_inputs[0].iteration_output = "x_other".to_string();
    (graph, loop_props)
}

fn no_scan_input() -> Fixture {
    let (graph, mut loop_props) = lstm_cell_graph(StateLayout::Split);
    loop_props.scan_inputs.clear();
    (graph, loop_props)
}

fn two_state_joins() -> Fixture {
    let (mut graph, loop_props) = lstm_cell_graph(StateLayout::Shared);
    graph.node.push(make_node(
        "ConcatV2",
        &["c_new", "h_new", "concat_axis"],
        &["s_copy"],
        "concat_s_copy",
    ));
    (graph, loop_props)
}

fn gate_slots_swapped() -> Fixture {
    let (mut graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    for (name, slot) in [("sig_i", "split:3"), ("sig_o", "split:0")] {
        let gate = graph.node.iter_mut().find(|n| n.name == name).unwrap();
        gate.input[0] = slot.to_string();
    }
    (graph, loop_props)
}

fn split_on_batch_axis() -> Fixture {
    let (mut graph, loop_props) = lstm_cell_graph(StateLayout::Split);
    replace_initializer(&mut graph, i64_tensor("split_axis", vec![0]));
    (graph, loop_props)
}

#[test_case(block_with_cell_clip, DeclineReason::CellClip(0.5); "cell clip enabled")]
#[test_case(block_with_peephole, DeclineReason::Peephole; "peephole enabled")]
#[test_case(two_scan_outputs, DeclineReason::TooManyScanOutputs { count: 2, limit: 1 }; "two scan outputs")]
#[test_case(too_many_state_variables, DeclineReason::TooManyStateVariables { extra: 3, limit: 2 }; "extra state variables")]
#[test_case(gate_axis_not_divisible, DeclineReason::GateAxisNotDivisible(15); "gate axis of 15")]
#[test_case(bias_kernel_mismatch, DeclineReason::BiasKernelMismatch { bias: 12, kernel: 16 }; "bias kernel mismatch")]
#[test_case(scan_output_not_hidden, DeclineReason::ScanOutputNotHidden("c_new".to_string()); "scan output is cell state")]
#[test_case(cell_not_reading_scan, DeclineReason::CellInputNotScanned; "cell not reading scan")]
#[test_case(no_scan_input, DeclineReason::ScanInputCount(0); "no scan input")]
#[test_case(two_state_joins, DeclineReason::StateUnresolved; "ambiguous state join")]
#[test_case(gate_slots_swapped, DeclineReason::GateSlot { gate: "it", slot: 0 }; "gate slots swapped")]
#[test_case(split_on_batch_axis, DeclineReason::SplitAxis(Some(0)); "split on batch axis")]
fn test_decline_leaves_graph_unchanged(fixture: fn() -> Fixture, expected: DeclineReason) {
    let (graph, loop_props) = fixture();
    let mut ctx = GraphContext::new(&graph);
    let nodes: Vec<String> = ctx.node_names().cloned().collect();
    let initializers = ctx.initializer_map.len();
    let value_infos = ctx.value_info_map.len();

    let outcome = LstmRewriter::new().rewrite_loop(&mut ctx, &loop_props).unwrap();

    assert_eq!(outcome, RewriteOutcome::Declined(expected));
    assert_eq!(ctx.node_names().cloned().collect::<Vec<_>>(), nodes);
    assert_eq!(ctx.initializer_map.len(), initializers);
    assert_eq!(ctx.value_info_map.len(), value_infos);
}

#[test]
fn test_scan_output_limit_is_configurable() {
    let (graph, loop_props) = two_scan_outputs();
    let mut ctx = GraphContext::new(&graph);

    let outcome = LstmRewriter::new()
        .with_max_scan_outputs(2)
        .rewrite_loop(&mut ctx, &loop_props)
        .unwrap();
    assert!(outcome.is_rewritten());
}
