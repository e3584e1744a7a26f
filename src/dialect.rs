//! Backend dialects.
//!
//! Every piece of backend-specific syntax lives here, keyed by an exhaustive
//! match on [`BackendDialect`]. Visitors decide WHAT to emit; this module
//! decides how it is spelled.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chunk::{MacroChunk, MacroParameter};
use crate::settings::{Accessor, NullBehaviour};
use crate::writer::SourceWriter;

/// Longest literal run written as one token before it is split.
const LITERAL_SPLIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendDialect {
    /// Pascal-style: `interface`/`implementation` sections, `'...'#13#10` literals.
    #[default]
    Oxygene,
    /// Brace-style, single class body, `"...\r\n"` literals.
    CSharp,
}

impl fmt::Display for BackendDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendDialect::Oxygene => f.write_str("oxygene"),
            BackendDialect::CSharp => f.write_str("csharp"),
        }
    }
}

/// How a member access failure inside an output expression is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullGuard {
    Swallow,
    Rethrow,
}

impl NullGuard {
    pub fn for_output(behaviour: NullBehaviour, silent_nulls: bool) -> Self {
        if silent_nulls || behaviour == NullBehaviour::Lenient {
            NullGuard::Swallow
        } else {
            NullGuard::Rethrow
        }
    }
}

impl BackendDialect {
    // ═══════════════════════════════════════════════════════════════════════════
    // LITERALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Spells `text` as a string literal that evaluates to exactly `text`.
    pub fn quote_literal(&self, text: &str) -> String {
        if text.is_empty() {
            return match self {
                BackendDialect::Oxygene => "''".to_string(),
                BackendDialect::CSharp => "\"\"".to_string(),
            };
        }
        let pieces: Vec<String> = split_runs(text, LITERAL_SPLIT)
            .into_iter()
            .map(|piece| match self {
                BackendDialect::Oxygene => quote_pascal(piece),
                BackendDialect::CSharp => quote_c(piece),
            })
            .collect();
        pieces.join(" + ")
    }

    fn default_type(&self) -> &'static str {
        match self {
            BackendDialect::Oxygene => "System.Object",
            BackendDialect::CSharp => "object",
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UNIT AND CLASS STRUCTURE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn unit_open(&self, source: &mut SourceWriter, namespace: Option<&str>) {
        match self {
            BackendDialect::Oxygene => {
                match namespace {
                    Some(ns) => source.write_line(&format!("namespace {};", ns)),
                    None => source.write_line("namespace;"),
                };
                source.blank_line().write_line("interface").blank_line();
            }
            BackendDialect::CSharp => {
                if let Some(ns) = namespace {
                    source.write_line(&format!("namespace {}", ns)).write_line("{");
                }
            }
        }
    }

    pub fn using_namespace(&self, source: &mut SourceWriter, namespace: &str, first: bool) {
        match self {
            BackendDialect::Oxygene => {
                if first {
                    source.write_line("uses");
                } else {
                    source.write_line(",");
                }
                source.write("  ").write(namespace);
            }
            BackendDialect::CSharp => {
                source.write_line(&format!("using {};", namespace));
            }
        }
    }

    /// Terminates the namespace import list, if anything was imported.
    pub fn using_close(&self, source: &mut SourceWriter, count: usize) {
        if count == 0 {
            return;
        }
        match self {
            BackendDialect::Oxygene => {
                source.write_line(";").blank_line();
            }
            BackendDialect::CSharp => {
                source.blank_line();
            }
        }
    }

    pub fn class_open(
        &self,
        source: &mut SourceWriter,
        class_name: &str,
        base_type: &str,
        target_namespace: Option<&str>,
        templates: &[String],
    ) {
        let attribute = self.descriptor_attribute(target_namespace, templates);
        match self {
            BackendDialect::Oxygene => {
                source.write_line("type").add_indent();
                if let Some(attribute) = attribute {
                    source.write_line(&attribute);
                }
                source
                    .write_line(&format!("{} = public class ({})", class_name, base_type))
                    .add_indent();
            }
            BackendDialect::CSharp => {
                if let Some(attribute) = attribute {
                    source.write_line(&attribute);
                }
                source
                    .write_line(&format!("public class {} : {}", class_name, base_type))
                    .write_line("{")
                    .add_indent();
            }
        }
    }

    fn descriptor_attribute(&self, target_namespace: Option<&str>, templates: &[String]) -> Option<String> {
        if target_namespace.is_none() && templates.is_empty() {
            return None;
        }
        let names: Vec<String> = templates.iter().map(|t| self.quote_literal(t)).collect();
        Some(match self {
            BackendDialect::Oxygene => {
                let mut args = Vec::new();
                if let Some(ns) = target_namespace {
                    args.push(format!("TargetNamespace := {}", self.quote_literal(ns)));
                }
                args.push(format!("Templates := [{}]", names.join(", ")));
                format!("[ViewDescriptor({})]", args.join(", "))
            }
            BackendDialect::CSharp => {
                let mut args = Vec::new();
                if let Some(ns) = target_namespace {
                    args.push(format!("TargetNamespace = {}", self.quote_literal(ns)));
                }
                args.push(format!("Templates = new[] {{ {} }}", names.join(", ")));
                format!("[ViewDescriptor({})]", args.join(", "))
            }
        })
    }

    pub fn view_id_members(&self, source: &mut SourceWriter, view_id: &str) {
        let id = self.quote_literal(view_id);
        match self {
            BackendDialect::Oxygene => {
                source
                    .write_line("private class var")
                    .write_line(&format!("  _generatedViewId : System.String := {};", id))
                    .write_line("public")
                    .write_line("  property GeneratedViewId : System.String read _generatedViewId; override;");
            }
            BackendDialect::CSharp => {
                source
                    .write_line(&format!("private static readonly string _generatedViewId = {};", id))
                    .write_line("public override string GeneratedViewId { get { return _generatedViewId; } }");
            }
        }
    }

    pub fn accessor(&self, source: &mut SourceWriter, accessor: &Accessor) {
        let ty = accessor.var_type.as_deref().unwrap_or(self.default_type());
        source.blank_line();
        match self {
            BackendDialect::Oxygene => {
                source.write_line(&format!(
                    "property {} : {} read ({});",
                    accessor.name, ty, accessor.value
                ));
            }
            BackendDialect::CSharp => {
                source.write_line(&format!(
                    "public {} {} {{ get {{ return {}; }} }}",
                    ty, accessor.name, accessor.value
                ));
            }
        }
    }

    pub fn class_close(&self, source: &mut SourceWriter) {
        match self {
            BackendDialect::Oxygene => {
                source.remove_indent().remove_indent().write_line("end;").blank_line();
                source.write_line("implementation");
            }
            BackendDialect::CSharp => {}
        }
    }

    pub fn unit_close(&self, source: &mut SourceWriter, namespace: Option<&str>) {
        match self {
            BackendDialect::Oxygene => {
                source.blank_line().write_line("end.");
            }
            BackendDialect::CSharp => {
                source.remove_indent().write_line("}");
                if namespace.is_some() {
                    source.write_line("}");
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MEMBERS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn global_declaration(&self, source: &mut SourceWriter, name: &str, var_type: Option<&str>, value: &str) {
        let ty = var_type.unwrap_or(self.default_type());
        match self {
            BackendDialect::Oxygene => {
                source
                    .write_line(&format!("var _{} : {} := {};", name, ty, value))
                    .write_line(&format!(
                        "property {} : {} read _{} write _{};",
                        name, ty, name, name
                    ));
            }
            BackendDialect::CSharp => {
                source
                    .write_line(&format!("{} _{} = {};", ty, name, value))
                    .write_line(&format!(
                        "public {} {} {{ get {{ return _{}; }} set {{ _{} = value; }} }}",
                        ty, name, name, name
                    ));
            }
        }
    }

    pub fn view_data_declaration(
        &self,
        source: &mut SourceWriter,
        name: &str,
        key: &str,
        var_type: Option<&str>,
        default: Option<&str>,
    ) {
        let ty = var_type.unwrap_or(self.default_type());
        let key = self.quote_literal(key);
        match (self, default) {
            (BackendDialect::Oxygene, None) => {
                source.write_line(&format!(
                    "property {} : {} read (ViewData.Eval({}) as {});",
                    name, ty, key, ty
                ));
            }
            (BackendDialect::Oxygene, Some(default)) => {
                source.write_line(&format!(
                    "property {} : {} read coalesce(ViewData.Eval({}) as {}, {});",
                    name, ty, key, ty, default
                ));
            }
            (BackendDialect::CSharp, None) => {
                source.write_line(&format!(
                    "{} {} {{ get {{ return ({})ViewData.Eval({}); }} }}",
                    ty, name, ty, key
                ));
            }
            (BackendDialect::CSharp, Some(default)) => {
                source.write_line(&format!(
                    "{} {} {{ get {{ return ({})(ViewData.Eval({}) ?? {}); }} }}",
                    ty, name, ty, key, default
                ));
            }
        }
    }

    pub fn model_declaration(&self, source: &mut SourceWriter, model_type: &str, alias: &str) {
        match self {
            BackendDialect::Oxygene => {
                source.write_line(&format!("property {} : {} read ViewData.Model;", alias, model_type));
            }
            BackendDialect::CSharp => {
                source.write_line(&format!(
                    "{} {} {{ get {{ return ViewData.Model; }} }}",
                    model_type, alias
                ));
            }
        }
    }

    /// Declaration-section macro signature. C# has no separate declaration.
    pub fn macro_declaration(&self, source: &mut SourceWriter, chunk: &MacroChunk) {
        match self {
            BackendDialect::Oxygene => {
                source.write_line(&format!(
                    "method {}({}) : System.Object;",
                    chunk.name,
                    self.parameter_list(&chunk.parameters)
                ));
            }
            BackendDialect::CSharp => {}
        }
    }

    pub fn macro_open(&self, source: &mut SourceWriter, class_name: &str, chunk: &MacroChunk) {
        let parameters = self.parameter_list(&chunk.parameters);
        match self {
            BackendDialect::Oxygene => {
                source
                    .blank_line()
                    .write_line(&format!(
                        "method {}.{}({}) : System.Object;",
                        class_name, chunk.name, parameters
                    ))
                    .write_line("begin")
                    .add_indent()
                    .write_line("using OutputScope(new System.IO.StringWriter()) do")
                    .write_line("begin")
                    .add_indent();
            }
            BackendDialect::CSharp => {
                source
                    .blank_line()
                    .write_line(&format!("public object {}({})", chunk.name, parameters))
                    .write_line("{")
                    .add_indent()
                    .write_line("using (OutputScope(new System.IO.StringWriter()))")
                    .write_line("{")
                    .add_indent();
            }
        }
    }

    pub fn macro_close(&self, source: &mut SourceWriter) {
        match self {
            BackendDialect::Oxygene => {
                source
                    .write_line("result := self.ToHtmlString(Output);")
                    .remove_indent()
                    .write_line("end;")
                    .remove_indent()
                    .write_line("end;");
            }
            BackendDialect::CSharp => {
                source
                    .write_line("return HTML(Output);")
                    .remove_indent()
                    .write_line("}")
                    .remove_indent()
                    .write_line("}");
            }
        }
    }

    fn parameter_list(&self, parameters: &[MacroParameter]) -> String {
        match self {
            BackendDialect::Oxygene => parameters
                .iter()
                .map(|p| format!("{} : {}", p.name, p.param_type))
                .collect::<Vec<_>>()
                .join("; "),
            BackendDialect::CSharp => parameters
                .iter()
                .map(|p| format!("{} {}", p.param_type, p.name))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RENDER LEVELS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn render_level_declaration(&self, source: &mut SourceWriter, level: usize) {
        if let BackendDialect::Oxygene = self {
            source.write_line(&format!("method RenderViewLevel{};", level));
        }
    }

    pub fn render_entry_declaration(&self, source: &mut SourceWriter) {
        if let BackendDialect::Oxygene = self {
            source.write_line("method Render; override;");
        }
    }

    pub fn render_level_open(&self, source: &mut SourceWriter, class_name: &str, level: usize) {
        match self {
            BackendDialect::Oxygene => {
                source
                    .blank_line()
                    .write_line(&format!("method {}.RenderViewLevel{}();", class_name, level))
                    .write_line("begin")
                    .add_indent();
            }
            BackendDialect::CSharp => {
                source
                    .blank_line()
                    .write_line(&format!("public void RenderViewLevel{}()", level))
                    .write_line("{")
                    .add_indent();
            }
        }
    }

    pub fn render_level_close(&self, source: &mut SourceWriter) {
        match self {
            BackendDialect::Oxygene => source.remove_indent().write_line("end;"),
            BackendDialect::CSharp => source.remove_indent().write_line("}"),
        };
    }

    /// Entry routine: every level but the last is captured into the `view`
    /// content slot; the last one writes to the final output.
    pub fn render_entry(&self, source: &mut SourceWriter, class_name: &str, levels: usize) {
        match self {
            BackendDialect::Oxygene => {
                source
                    .blank_line()
                    .write_line(&format!("method {}.Render();", class_name))
                    .write_line("begin")
                    .add_indent();
                for level in 0..levels {
                    if level + 1 < levels {
                        source.write_line(&format!(
                            "using OutputScope do begin RenderViewLevel{}(); Content['view'] := Output; end;",
                            level
                        ));
                    } else {
                        source.write_line(&format!("RenderViewLevel{};", level));
                    }
                }
                source.remove_indent().write_line("end;");
            }
            BackendDialect::CSharp => {
                source
                    .blank_line()
                    .write_line("public override void Render()")
                    .write_line("{")
                    .add_indent();
                for level in 0..levels {
                    if level + 1 < levels {
                        source.write_line(&format!(
                            "using (OutputScope()) {{ RenderViewLevel{}(); Content[\"view\"] = Output.ToString(); }}",
                            level
                        ));
                    } else {
                        source.write_line(&format!("RenderViewLevel{}();", level));
                    }
                }
                source.remove_indent().write_line("}");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn write_literal(&self, source: &mut SourceWriter, text: &str) {
        source.write_line(&format!("Output.Write({});", self.quote_literal(text)));
    }

    pub fn write_expression(&self, source: &mut SourceWriter, code: &str, guard: NullGuard, encode: bool) {
        let value = if encode {
            format!("H({})", code)
        } else {
            code.to_string()
        };
        let quoted = self.quote_literal(code);
        match self {
            BackendDialect::Oxygene => {
                source.write_line("try").add_indent();
                source.write_line(&format!("Output.Write({});", value));
                source.remove_indent().write_line("except").add_indent();
                match guard {
                    NullGuard::Swallow => {
                        source.write_line("on System.NullReferenceException do ;");
                    }
                    NullGuard::Rethrow => {
                        source
                            .write_line("on ex: System.NullReferenceException do")
                            .write_line(&format!(
                                "  raise new System.ArgumentNullException({}, ex);",
                                quoted
                            ));
                    }
                }
                source.remove_indent().write_line("end;");
            }
            BackendDialect::CSharp => {
                source.write_line(&format!("try {{ Output.Write({}); }}", value));
                match guard {
                    NullGuard::Swallow => {
                        source.write_line("catch (System.NullReferenceException) { }");
                    }
                    NullGuard::Rethrow => {
                        source.write_line(&format!(
                            "catch (System.NullReferenceException ex) {{ throw new System.ArgumentNullException({}, ex); }}",
                            quoted
                        ));
                    }
                }
            }
        }
    }

    pub fn local_variable(&self, source: &mut SourceWriter, name: &str, var_type: Option<&str>, value: &str) {
        match (self, var_type) {
            (BackendDialect::Oxygene, Some(ty)) => {
                source.write_line(&format!("var {} : {} := {};", name, ty, value))
            }
            (BackendDialect::Oxygene, None) => source.write_line(&format!("var {} := {};", name, value)),
            (BackendDialect::CSharp, Some(ty)) => {
                source.write_line(&format!("{} {} = {};", ty, name, value))
            }
            (BackendDialect::CSharp, None) => source.write_line(&format!("var {} = {};", name, value)),
        };
    }

    pub fn if_open(&self, source: &mut SourceWriter, condition: &str) {
        match self {
            BackendDialect::Oxygene => source.write_line(&format!("if ({}) then begin", condition)),
            BackendDialect::CSharp => source.write_line(&format!("if ({})", condition)).write_line("{"),
        };
        source.add_indent();
    }

    pub fn unless_open(&self, source: &mut SourceWriter, condition: &str) {
        match self {
            BackendDialect::Oxygene => source.write_line(&format!("if not ({}) then begin", condition)),
            BackendDialect::CSharp => source.write_line(&format!("if (!({}))", condition)).write_line("{"),
        };
        source.add_indent();
    }

    pub fn else_if_open(&self, source: &mut SourceWriter, condition: &str) {
        match self {
            BackendDialect::Oxygene => {
                source.write_line(&format!("else if ({}) then begin", condition))
            }
            BackendDialect::CSharp => source
                .write_line(&format!("else if ({})", condition))
                .write_line("{"),
        };
        source.add_indent();
    }

    pub fn else_open(&self, source: &mut SourceWriter) {
        match self {
            BackendDialect::Oxygene => source.write_line("else begin"),
            BackendDialect::CSharp => source.write_line("else").write_line("{"),
        };
        source.add_indent();
    }

    pub fn once_open(&self, source: &mut SourceWriter, key: &str) {
        let key = self.quote_literal(key);
        self.if_open(source, &format!("Once({})", key));
    }

    /// An else with no preceding condition: compiles, never runs.
    pub fn dangling_else_open(&self, source: &mut SourceWriter) {
        self.if_open(source, "false");
    }

    /// Closes one branch. `continues` is true when an else/elseif follows.
    pub fn conditional_close(&self, source: &mut SourceWriter, continues: bool) {
        source.remove_indent();
        match (self, continues) {
            (BackendDialect::Oxygene, true) => source.write_line("end"),
            (BackendDialect::Oxygene, false) => source.write_line("end;"),
            (BackendDialect::CSharp, _) => source.write_line("}"),
        };
    }

    /// Opens a loop that also maintains `{variable}Index`, `{variable}Count`,
    /// `{variable}IsFirst` and `{variable}IsLast`. Closed by [`Self::for_each_close`].
    pub fn for_each_open(&self, source: &mut SourceWriter, variable: &str, collection: &str) {
        let iterator = format!("__iter__{}", variable);
        match self {
            BackendDialect::Oxygene => {
                source.write_line("begin").add_indent();
                source
                    .write_line(&format!("var {}Index : Int32 := 0;", variable))
                    .write_line(&format!("var {}IsFirst : Boolean := true;", variable))
                    .write_line(&format!("var {} := ({});", iterator, collection))
                    .write_line(&format!(
                        "var {}Count : Int32 := Spark.Compiler.CollectionUtility.Count({});",
                        variable, iterator
                    ))
                    .write_line(&format!("for each {} in {} do begin", variable, iterator))
                    .add_indent()
                    .write_line(&format!(
                        "var {v}IsLast : Boolean := ({v}Index = {v}Count - 1);",
                        v = variable
                    ));
            }
            BackendDialect::CSharp => {
                source.write_line("{").add_indent();
                source
                    .write_line(&format!("int {}Index = 0;", variable))
                    .write_line(&format!("bool {}IsFirst = true;", variable))
                    .write_line(&format!("var {} = {};", iterator, collection))
                    .write_line(&format!(
                        "int {}Count = global::Spark.Compiler.CollectionUtility.Count({});",
                        variable, iterator
                    ))
                    .write_line(&format!("foreach (var {} in {})", variable, iterator))
                    .write_line("{")
                    .add_indent()
                    .write_line(&format!("bool {v}IsLast = ({v}Index == {v}Count - 1);", v = variable));
            }
        }
    }

    pub fn for_each_close(&self, source: &mut SourceWriter, variable: &str) {
        match self {
            BackendDialect::Oxygene => {
                source
                    .write_line(&format!("{}IsFirst := false;", variable))
                    .write_line(&format!("inc({}Index);", variable));
            }
            BackendDialect::CSharp => {
                source
                    .write_line(&format!("{}IsFirst = false;", variable))
                    .write_line(&format!("++{}Index;", variable));
            }
        }
        self.block_close(source);
        self.block_close(source);
    }

    /// Redirects output into the named content slot until [`Self::block_close`].
    pub fn content_open(&self, source: &mut SourceWriter, name: &str) {
        let name = self.quote_literal(name);
        match self {
            BackendDialect::Oxygene => source.write_line(&format!("using OutputScope({}) do begin", name)),
            BackendDialect::CSharp => source
                .write_line(&format!("using (OutputScope({}))", name))
                .write_line("{"),
        };
        source.add_indent();
    }

    pub fn block_open(&self, source: &mut SourceWriter) {
        match self {
            BackendDialect::Oxygene => source.write_line("begin"),
            BackendDialect::CSharp => source.write_line("{"),
        };
        source.add_indent();
    }

    pub fn block_close(&self, source: &mut SourceWriter) {
        source.remove_indent();
        match self {
            BackendDialect::Oxygene => source.write_line("end;"),
            BackendDialect::CSharp => source.write_line("}"),
        };
    }

    pub fn comment(&self, source: &mut SourceWriter, text: &str) {
        match self {
            BackendDialect::Oxygene => source.write_line(&format!("{{ {} }}", text)),
            BackendDialect::CSharp => source.write_line(&format!("// {}", text)),
        };
    }
}

/// Splits `text` into runs of at most `max` characters.
fn split_runs(text: &str, max: usize) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == max {
            runs.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    runs.push(&text[start..]);
    runs
}

fn quote_pascal(text: &str) -> String {
    let mut out = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        if (c as u32) < 0x20 || c == '\u{7f}' {
            if in_quotes {
                out.push('\'');
                in_quotes = false;
            }
            out.push_str(&format!("#{}", c as u32));
        } else {
            if !in_quotes {
                out.push('\'');
                in_quotes = true;
            }
            if c == '\'' {
                out.push_str("''");
            } else {
                out.push(c);
            }
        }
    }
    if in_quotes {
        out.push('\'');
    }
    out
}

fn quote_c(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
