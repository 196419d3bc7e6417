// ABOUTME: Bash dialect of the script-generation primitive vocabulary

use super::{ScriptContext, ScriptDialect, FUN_NORMALIZE, FUN_REPORT};
use crate::engine::sandbox::REPORT_FILENAME;
use crate::lang::Language;

pub struct BashDialect;

fn escape(content: &str) -> String {
    content.replace('\\', "\\\\").replace('"', "\\\"")
}

impl ScriptDialect for BashDialect {
    fn language(&self) -> Language {
        Language::Bash
    }

    fn shebang(&self) -> String {
        "#!/usr/bin/env bash".to_string()
    }

    fn imports(&self) -> String {
        String::new()
    }

    fn comment(&self, text: &str) -> String {
        format!("# {text}\n")
    }

    fn quote(&self, content: &str) -> String {
        format!("\"{}\"", escape(content))
    }

    fn dereference(&self, name: &str) -> String {
        format!("${{{name}}}")
    }

    fn var_def(&self, name: &str, value_expr: &str) -> String {
        format!("{name}={value_expr}\n")
    }

    fn list_def(&self, name: &str, values: &[String]) -> String {
        let quoted: Vec<String> = values.iter().map(|v| self.quote(v)).collect();
        format!("{name}=( {} )\n", quoted.join(" "))
    }

    fn new_list(&self, name: &str) -> String {
        format!("{name}=()\n")
    }

    fn list_append(&self, list: &str, element_expr: &str) -> String {
        format!("{list}+=( {element_expr} )\n")
    }

    fn list_extend(&self, list: &str, other_list: &str) -> String {
        format!("{list}+=( \"${{{other_list}[@]}}\" )\n")
    }

    fn for_each(&self, list: &str, element: &str, body: &str) -> String {
        format!("for {element} in \"${{{list}[@]}}\"\ndo\n{body}done\n")
    }

    fn copy_list(&self, from: &str, to: &str) -> String {
        format!("{to}=( \"${{{from}[@]}}\" )\n")
    }

    fn join(&self, parts: &[String]) -> String {
        parts.concat()
    }

    fn if_not_file_exists(&self, file_expr: &str, body: &str) -> String {
        format!("if [ ! -e {file_expr} ]\nthen\n{body}fi\n")
    }

    fn if_list_not_empty(&self, list: &str, body: &str) -> String {
        format!("if [ ${{#{list}[@]}} -ne 0 ]\nthen\n{body}fi\n")
    }

    fn raise(&self, message_expr: &str) -> String {
        format!("echo {message_expr} >&2\nexit 1\n")
    }

    fn file_size(&self, file_expr: &str) -> String {
        format!("$(stat -c %s {file_expr})")
    }

    fn symlink(&self, src_expr: &str, dest_expr: &str) -> String {
        format!("ln -sf {src_expr} {dest_expr}\n")
    }

    fn list_to_json(&self, list: &str, dest: &str, open: &str, close: &str) -> String {
        format!(
            "{dest}=$(IFS=,; echo \"${{{list}[*]}}\")\n{dest}=\"{open}${{{dest}}}{close}\"\n"
        )
    }

    fn check_post(&self) -> String {
        "if [ \"$?\" -ne \"0\" ]\nthen\necho task body returned non-zero exit value >&2\nexit 1\nfi\n"
            .to_string()
    }

    fn def_report_fun(&self, ctx: &ScriptContext) -> String {
        format!(
            "{FUN_REPORT}() {{\nprintf '{{\"timestamp\":%s,\"runId\":\"{}\",\"taskId\":{},\"invocId\":\"{}\",\"taskName\":\"{}\",\"lang\":\"{}\",\"key\":\"%s\",\"value\":%s}}\\n' \"$(date +%s%3N)\" \"$1\" \"$2\" >> {REPORT_FILENAME}\n}}\n",
            ctx.run_id, ctx.task_node_id, ctx.signature, ctx.task_name, ctx.lang_label,
        )
    }

    fn def_normalize_fun(&self, signature: &str) -> String {
        format!("{FUN_NORMALIZE}() {{\necho \"{signature}_${{1}}_$(basename ${{2}})\"\n}}\n")
    }

    fn report_call(&self, key: &str, payload_var: &str) -> String {
        format!("{FUN_REPORT} '{key}' \"${{{payload_var}}}\"\n")
    }

    fn normalize_call(&self, channel: usize, filename_expr: &str) -> String {
        format!("$({FUN_NORMALIZE} {channel} {filename_expr})")
    }
}
