#[derive(Debug, Clone)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

pub fn build_analysis_prompt(file: &str, source: &str) -> LlmPrompt {
    LlmPrompt {
        system: system_prompt(),
        user: user_prompt(file, source),
    }
}

/* ============================================================
   System prompt (stable, reused)
   ============================================================ */

fn system_prompt() -> String {
    r#"
You are an expert Python engineer reviewing code so that unit tests can be written for it.

Rules:
- Describe behavior, do not rewrite the code
- List concrete edge cases a test should exercise
- Only output a single JSON object, nothing else
"#
    .trim()
    .to_string()
}

/* ============================================================
   User prompt
   ============================================================ */

fn user_prompt(file: &str, source: &str) -> String {
    let mut out = String::new();

    out.push_str("Analyze this Python code and return JSON:\n");
    out.push_str("- summary: short file description\n");
    out.push_str("- functions: list of {name, desc, edge_cases[]}\n\n");

    out.push_str("Schema:\n");
    out.push_str(
        "{\"summary\": \"...\", \"functions\": [{\"name\": \"...\", \"desc\": \"...\", \"edge_cases\": [\"...\"]}]}\n\n",
    );

    out.push_str(&format!("File: {}\n", file));
    out.push_str("Code:\n```python\n");
    out.push_str(source);
    if !source.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_embeds_full_source() {
        let src = "def add(a, b):\n    return a + b";
        let p = build_analysis_prompt("calc.py", src);

        assert!(p.user.contains("File: calc.py"));
        assert!(p.user.contains(src));
        assert!(p.user.contains("edge_cases"));
        assert!(p.system.contains("JSON"));
    }
}
