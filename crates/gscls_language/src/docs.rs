//! Doc-comment (`/@ … @/`) field parser.
//!
//! Script authors annotate functions with structured fields:
//!
//! ```text
//! /@
//! Name: spawn_wave
//! Summary: Spawns one wave of enemies at the given struct.
//! Module: zm_waves
//! CallOn: level
//! SPMP: multiplayer
//! MandatoryArg: <origin> Where the wave spawns.
//! OptionalArg: [count] How many enemies; defaults to 4.
//! Example: level spawn_wave(spot, 6);
//! @/
//! ```
//!
//! Arguments may be written `<arg>`, `[arg]` or bare, separated from their
//! description by a colon or whitespace. The output is a single formatted
//! markdown string for hovers and completion detail.

/// A parsed doc block, ready to render as markdown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocComment {
    pub name: Option<String>,
    pub summary: Option<String>,
    pub module: Option<String>,
    pub called_on: Option<String>,
    pub spmp: Option<String>,
    pub mandatory_args: Vec<DocArg>,
    pub optional_args: Vec<DocArg>,
    pub example: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocArg {
    pub name: String,
    pub description: String,
}

impl DocComment {
    /// Parses the raw text of a `/@ … @/` token, delimiters included.
    pub fn parse(raw: &str) -> DocComment {
        let body = raw
            .trim_start_matches("/@")
            .trim_end_matches("@/")
            .trim();

        let mut doc = DocComment::default();
        for line in body.lines() {
            let line = line.trim().trim_start_matches('*').trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, rest)) = line.split_once(':') else {
                continue;
            };
            let rest = rest.trim();
            match field.trim().to_ascii_lowercase().as_str() {
                "name" => doc.name = Some(rest.to_string()),
                "summary" => doc.summary = Some(rest.to_string()),
                "module" => doc.module = Some(rest.to_string()),
                "callon" => doc.called_on = Some(rest.to_string()),
                "spmp" => doc.spmp = Some(rest.to_string()),
                "mandatoryarg" => doc.mandatory_args.push(parse_arg(rest)),
                "optionalarg" => doc.optional_args.push(parse_arg(rest)),
                "example" => doc.example = Some(rest.to_string()),
                _ => {}
            }
        }
        doc
    }

    /// Renders the block as a single markdown string.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        if let Some(summary) = &self.summary {
            out.push_str(summary);
            out.push('\n');
        }
        if let Some(called_on) = &self.called_on {
            out.push_str(&format!("\n*Called on:* `{called_on}`\n"));
        }
        if let Some(spmp) = &self.spmp {
            out.push_str(&format!("\n*Mode:* {spmp}\n"));
        }
        if !self.mandatory_args.is_empty() || !self.optional_args.is_empty() {
            out.push_str("\n**Arguments**\n\n");
            for arg in &self.mandatory_args {
                out.push_str(&format!("- `{}` — {}\n", arg.name, arg.description));
            }
            for arg in &self.optional_args {
                out.push_str(&format!("- `{}` *(optional)* — {}\n", arg.name, arg.description));
            }
        }
        if let Some(example) = &self.example {
            out.push_str(&format!("\n**Example**\n\n```gsc\n{example}\n```\n"));
        }
        out.trim_end().to_string()
    }
}

/// Parses one argument line: `<origin> Where it spawns.`, `[count]: How
/// many.`, or `origin description`.
fn parse_arg(rest: &str) -> DocArg {
    let rest = rest.trim();
    let (name, description) = if let Some(stripped) = rest.strip_prefix('<') {
        split_delimited(stripped, '>')
    } else if let Some(stripped) = rest.strip_prefix('[') {
        split_delimited(stripped, ']')
    } else {
        match rest.split_once([':', ' ']) {
            Some((n, d)) => (n.to_string(), d.to_string()),
            None => (rest.to_string(), String::new()),
        }
    };
    DocArg {
        name: name.trim().to_string(),
        description: description
            .trim()
            .trim_start_matches(':')
            .trim()
            .to_string(),
    }
}

fn split_delimited(rest: &str, close: char) -> (String, String) {
    match rest.split_once(close) {
        Some((n, d)) => (n.to_string(), d.to_string()),
        None => (rest.to_string(), String::new()),
    }
}
