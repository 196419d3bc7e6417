// ABOUTME: Python dialect of the script-generation primitive vocabulary

use super::{ScriptContext, ScriptDialect, FUN_NORMALIZE, FUN_REPORT};
use crate::engine::sandbox::REPORT_FILENAME;
use crate::lang::Language;

pub struct PythonDialect;

fn escape(content: &str) -> String {
    content.replace('\\', "\\\\").replace('"', "\\\"")
}

fn indent(body: &str) -> String {
    let mut out = String::new();
    for line in body.lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str("    pass\n");
    }
    out
}

impl ScriptDialect for PythonDialect {
    fn language(&self) -> Language {
        Language::Python
    }

    fn shebang(&self) -> String {
        "#!/usr/bin/env python3".to_string()
    }

    fn imports(&self) -> String {
        "import os\nimport sys\nimport time\n".to_string()
    }

    fn comment(&self, text: &str) -> String {
        format!("# {text}\n")
    }

    fn quote(&self, content: &str) -> String {
        format!("\"{}\"", escape(content))
    }

    fn dereference(&self, name: &str) -> String {
        name.to_string()
    }

    fn var_def(&self, name: &str, value_expr: &str) -> String {
        format!("{name} = {value_expr}\n")
    }

    fn list_def(&self, name: &str, values: &[String]) -> String {
        let quoted: Vec<String> = values.iter().map(|v| self.quote(v)).collect();
        format!("{name} = [{}]\n", quoted.join(", "))
    }

    fn new_list(&self, name: &str) -> String {
        format!("{name} = []\n")
    }

    fn list_append(&self, list: &str, element_expr: &str) -> String {
        format!("{list}.append({element_expr})\n")
    }

    fn list_extend(&self, list: &str, other_list: &str) -> String {
        format!("{list}.extend({other_list})\n")
    }

    fn for_each(&self, list: &str, element: &str, body: &str) -> String {
        format!("for {element} in {list}:\n{}", indent(body))
    }

    fn copy_list(&self, from: &str, to: &str) -> String {
        format!("{to} = list({from})\n")
    }

    fn join(&self, parts: &[String]) -> String {
        parts
            .iter()
            .map(|p| format!("str({p})"))
            .collect::<Vec<_>>()
            .join(" + ")
    }

    fn if_not_file_exists(&self, file_expr: &str, body: &str) -> String {
        format!("if not os.path.exists({file_expr}):\n{}", indent(body))
    }

    fn if_list_not_empty(&self, list: &str, body: &str) -> String {
        format!("if {list}:\n{}", indent(body))
    }

    fn raise(&self, message_expr: &str) -> String {
        format!("raise RuntimeError({message_expr})\n")
    }

    fn file_size(&self, file_expr: &str) -> String {
        format!("os.path.getsize({file_expr})")
    }

    fn symlink(&self, src_expr: &str, dest_expr: &str) -> String {
        format!(
            "if os.path.lexists({dest_expr}):\n    os.remove({dest_expr})\nos.symlink({src_expr}, {dest_expr})\n"
        )
    }

    fn list_to_json(&self, list: &str, dest: &str, open: &str, close: &str) -> String {
        format!(
            "{dest} = {} + \",\".join({list}) + {}\n",
            self.quote(open),
            self.quote(close)
        )
    }

    fn check_post(&self) -> String {
        // Python bodies signal failure through exceptions; nothing to check.
        String::new()
    }

    fn def_report_fun(&self, ctx: &ScriptContext) -> String {
        format!(
            "def {FUN_REPORT}(key, value):\n    with open(\"{REPORT_FILENAME}\", \"a\") as f:\n        f.write('{{\"timestamp\":%d,\"runId\":\"{}\",\"taskId\":{},\"invocId\":\"{}\",\"taskName\":\"{}\",\"lang\":\"{}\",\"key\":\"%s\",\"value\":%s}}\\n' % (int(time.time() * 1000), key, value))\n",
            ctx.run_id, ctx.task_node_id, ctx.signature, ctx.task_name, ctx.lang_label,
        )
    }

    fn def_normalize_fun(&self, signature: &str) -> String {
        format!(
            "def {FUN_NORMALIZE}(channel, filename):\n    return \"{signature}_\" + str(channel) + \"_\" + os.path.basename(filename)\n"
        )
    }

    fn report_call(&self, key: &str, payload_var: &str) -> String {
        format!("{FUN_REPORT}(\"{key}\", {payload_var})\n")
    }

    fn normalize_call(&self, channel: usize, filename_expr: &str) -> String {
        format!("{FUN_NORMALIZE}({channel}, {filename_expr})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bodies_are_indented() {
        let d = PythonDialect;
        let body = format!(
            "{}{}",
            d.var_def("a", &d.quote("x")),
            d.list_append("L", "a")
        );
        let text = d.for_each("L", "item", &body);
        assert!(text.contains("for item in L:\n    a = \"x\"\n    L.append(a)\n"));
    }

    #[test]
    fn test_empty_body_gets_pass() {
        let d = PythonDialect;
        assert!(d.if_list_not_empty("L", "").contains("    pass"));
    }

    #[test]
    fn test_join_coerces_to_str() {
        let d = PythonDialect;
        let joined = d.join(&[d.quote("\""), "x".to_string()]);
        assert_eq!(joined, "str(\"\\\"\") + str(x)");
    }

    #[test]
    fn test_report_fun_writes_jsonl() {
        let d = PythonDialect;
        let text = d.def_report_fun(&ScriptContext {
            run_id: "r",
            task_node_id: 1,
            signature: "s",
            task_name: "t",
            lang_label: "python",
        });
        assert!(text.contains("def wf_report(key, value):"));
        assert!(text.contains(REPORT_FILENAME));
        assert!(text.contains("\"lang\":\"python\""));
    }
}
