// ABOUTME: Script generation contract: a primitive vocabulary per dialect and
// ABOUTME: one shared template-method assembly used for every invocation

pub mod bash;
pub mod python;

use crate::dag::{Derivable, Invocation, NotDerivable, WorkflowGraph};
use crate::engine::report::keys;
use crate::lang::Language;

pub use bash::BashDialect;
pub use python::PythonDialect;

/// Helper function names available inside every generated script.
pub const FUN_REPORT: &str = "wf_report";
pub const FUN_NORMALIZE: &str = "wf_normalize";

/// Static facts baked into a generated script's helper functions.
pub struct ScriptContext<'a> {
    pub run_id: &'a str,
    pub task_node_id: usize,
    pub signature: &'a str,
    pub task_name: &'a str,
    pub lang_label: &'a str,
}

/// The primitive vocabulary a target language must supply. Everything else —
/// the fixed assembly sequence — is shared across dialects.
pub trait ScriptDialect: Send + Sync {
    fn language(&self) -> Language;
    fn shebang(&self) -> String;
    fn imports(&self) -> String;
    fn comment(&self, text: &str) -> String;

    /// An escaped string literal holding `content`.
    fn quote(&self, content: &str) -> String;
    /// An expression reading variable `name`.
    fn dereference(&self, name: &str) -> String;

    fn var_def(&self, name: &str, value_expr: &str) -> String;
    fn list_def(&self, name: &str, values: &[String]) -> String;
    fn new_list(&self, name: &str) -> String;
    fn list_append(&self, list: &str, element_expr: &str) -> String;
    fn list_extend(&self, list: &str, other_list: &str) -> String;
    fn for_each(&self, list: &str, element: &str, body: &str) -> String;
    fn copy_list(&self, from: &str, to: &str) -> String;

    /// Concatenation of already-formed expressions.
    fn join(&self, parts: &[String]) -> String;

    fn if_not_file_exists(&self, file_expr: &str, body: &str) -> String;
    fn if_list_not_empty(&self, list: &str, body: &str) -> String;
    fn raise(&self, message_expr: &str) -> String;
    fn file_size(&self, file_expr: &str) -> String;
    fn symlink(&self, src_expr: &str, dest_expr: &str) -> String;

    /// Renders `list`'s elements comma-joined into `dest`, wrapped in
    /// `open`/`close`.
    fn list_to_json(&self, list: &str, dest: &str, open: &str, close: &str) -> String;

    /// Post-condition check emitted after the task body.
    fn check_post(&self) -> String;

    /// Defines the structured-log emitter with the context baked in.
    fn def_report_fun(&self, ctx: &ScriptContext) -> String;
    /// Defines the output-name normalizer: `<signature>_<channel>_<basename>`.
    fn def_normalize_fun(&self, signature: &str) -> String;

    /// Statement calling the log emitter with a key and a payload variable.
    fn report_call(&self, key: &str, payload_var: &str) -> String;
    /// Expression calling the normalizer for one filename.
    fn normalize_call(&self, channel: usize, filename_expr: &str) -> String;
}

pub fn dialect_for(language: Language) -> &'static dyn ScriptDialect {
    match language {
        Language::Bash => &BashDialect,
        Language::Python => &PythonDialect,
    }
}

/// Assembles the complete sandbox script for one ready invocation. The
/// sequence is fixed; only the primitives vary per dialect. Deterministic
/// given the invocation's bound state.
pub fn assemble_script(graph: &WorkflowGraph, invocation: &Invocation) -> Derivable<String> {
    let signature = invocation.signature(graph)?;
    let proto = graph
        .prototype_by_name(invocation.task_name())
        .map_err(|_| NotDerivable)?;
    let d = dialect_for(invocation.language());

    let ctx = ScriptContext {
        run_id: graph.run_id(),
        task_node_id: invocation.task_node().index(),
        signature: &signature,
        task_name: invocation.task_name(),
        lang_label: invocation.language().label(),
    };

    let mut buf = String::new();
    buf.push_str(&d.shebang());
    buf.push('\n');

    buf.push_str(&d.comment("import libraries"));
    buf.push_str(&d.imports());
    buf.push('\n');

    buf.push_str(&d.comment("define helper functions"));
    buf.push_str(&d.def_report_fun(&ctx));
    buf.push_str(&d.def_normalize_fun(&signature));
    buf.push('\n');

    buf.push_str(&d.comment("bind single output variables to default values"));
    for name in proto.single_output_names() {
        buf.push_str(&d.var_def(name, &d.quote(name)));
    }
    buf.push('\n');

    buf.push_str(&d.comment("bind input parameters"));
    for (name, resolved) in invocation.single_params() {
        if name == crate::lang::TASK_PARAM {
            continue;
        }
        let value = resolved.value(graph)?;
        buf.push_str(&d.var_def(name, &d.quote(&value)));
    }
    for (name, list) in invocation.reduce_params() {
        let values = list.values(graph)?;
        buf.push_str(&d.list_def(name, &values));
    }
    buf.push('\n');

    buf.push_str(&d.comment("report stage-in file sizes; fail on missing files"));
    let staged_single: Vec<&String> = invocation
        .single_params()
        .keys()
        .filter(|n| proto.is_param_stage(n))
        .collect();
    let staged_reduce: Vec<&String> = invocation
        .reduce_params()
        .keys()
        .filter(|n| proto.is_param_stage(n))
        .collect();
    if !staged_single.is_empty() || !staged_reduce.is_empty() {
        buf.push_str(&d.new_list("WF_LIST"));
        for name in &staged_single {
            buf.push_str(&d.list_append("WF_LIST", &d.dereference(name)));
        }
        for name in &staged_reduce {
            buf.push_str(&d.list_extend("WF_LIST", name));
        }
        buf.push_str(&file_size_manifest(d, keys::FILE_SIZE_STAGEIN, "stage in"));
    }
    buf.push('\n');

    buf.push_str(&d.comment("task body"));
    buf.push_str(&proto.body);
    if !proto.body.ends_with('\n') {
        buf.push('\n');
    }
    buf.push('\n');

    buf.push_str(&d.comment("post-condition check"));
    buf.push_str(&d.check_post());
    buf.push('\n');

    buf.push_str(&d.comment("rename output files"));
    for (channel, output) in proto.outputs.iter().enumerate() {
        if !output.stage {
            continue;
        }

        if output.reduce {
            buf.push_str(&d.new_list("WF_LIST"));
            let body = format!(
                "{}{}{}",
                d.var_def(
                    "WF_NEWFILENAME",
                    &d.normalize_call(channel, &d.dereference("WF_FILENAME")),
                ),
                d.list_append("WF_LIST", &d.dereference("WF_NEWFILENAME")),
                d.symlink(
                    &d.dereference("WF_FILENAME"),
                    &d.dereference("WF_NEWFILENAME"),
                ),
            );
            buf.push_str(&d.for_each(&output.name, "WF_FILENAME", &body));
            buf.push_str(&d.copy_list("WF_LIST", &output.name));
        } else {
            buf.push_str(&d.var_def(
                "WF_FILENAME",
                &d.normalize_call(channel, &d.dereference(&output.name)),
            ));
            buf.push_str(&d.symlink(
                &d.dereference(&output.name),
                &d.dereference("WF_FILENAME"),
            ));
            buf.push_str(&d.var_def(&output.name, &d.dereference("WF_FILENAME")));
        }
    }
    buf.push('\n');

    buf.push_str(&d.comment("collect output variables"));
    buf.push_str(&d.new_list("WF_LIST"));
    for output in &proto.outputs {
        if output.reduce {
            buf.push_str(&d.new_list("WF_LIST1"));
            let body = d.list_append(
                "WF_LIST1",
                &d.join(&[
                    d.quote("\""),
                    d.dereference("WF_I"),
                    d.quote("\""),
                ]),
            );
            buf.push_str(&d.for_each(&output.name, "WF_I", &body));
            buf.push_str(&d.list_to_json("WF_LIST1", "WF_STR", "[", "]"));
            buf.push_str(&d.list_append(
                "WF_LIST",
                &d.join(&[
                    d.quote(&format!("\"{}\":", output.name)),
                    d.dereference("WF_STR"),
                ]),
            ));
        } else {
            buf.push_str(&d.list_append(
                "WF_LIST",
                &d.join(&[
                    d.quote(&format!("\"{}\":[\"", output.name)),
                    d.dereference(&output.name),
                    d.quote("\"]"),
                ]),
            ));
        }
    }
    buf.push_str(&d.list_to_json("WF_LIST", "WF_STR", "{", "}"));
    buf.push_str(&d.report_call(keys::INVOC_OUTPUT, "WF_STR"));
    buf.push('\n');

    buf.push_str(&d.comment("report stage-out file sizes"));
    let has_stage_out = proto.outputs.iter().any(|o| o.stage);
    if has_stage_out {
        buf.push_str(&d.new_list("WF_LIST"));
        for output in &proto.outputs {
            if !output.stage {
                continue;
            }
            if output.reduce {
                buf.push_str(&d.list_extend("WF_LIST", &output.name));
            } else {
                buf.push_str(&d.list_append("WF_LIST", &d.dereference(&output.name)));
            }
        }
        buf.push_str(&file_size_manifest(d, keys::FILE_SIZE_STAGEOUT, "stage out"));
    }

    Ok(buf)
}

/// Existence check plus `"file":size` manifest over `WF_LIST`, reported
/// under `key`.
fn file_size_manifest(d: &dyn ScriptDialect, key: &str, phase: &str) -> String {
    let mut buf = String::new();
    buf.push_str(&d.new_list("WF_LIST1"));

    let check = d.if_not_file_exists(
        &d.dereference("WF_I"),
        &d.raise(&d.join(&[
            d.quote(&format!("{phase}: a file ")),
            d.dereference("WF_I"),
            d.quote(" should be present but has not been found"),
        ])),
    );
    let append = d.list_append(
        "WF_LIST1",
        &d.join(&[
            d.quote("\""),
            d.dereference("WF_I"),
            d.quote("\":"),
            d.file_size(&d.dereference("WF_I")),
        ]),
    );
    buf.push_str(&d.for_each("WF_LIST", "WF_I", &format!("{check}{append}")));

    let emit = format!(
        "{}{}",
        d.list_to_json("WF_LIST1", "WF_PAYLOAD", "{", "}"),
        d.report_call(key, "WF_PAYLOAD"),
    );
    buf.push_str(&d.if_list_not_empty("WF_LIST1", &emit));
    buf
}
