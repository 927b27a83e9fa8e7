//! Java-like pseudo code
//!
//! [`PseudoCodeWriter`] is a [`CodeSink`] building an indented Java-like
//! listing. It is what the CLI prints and what tests compare against; it
//! makes no attempt at producing compilable source (imports, generics and
//! lambda bodies are not reconstructed).

use super::sink::{CatchClause, Code, CodeSink, Scope, SwitchCase};
use super::StructureTree;
use crate::analysis::MethodBody;
use crate::bytecode::JvmType;
use crate::operand::{ConstructorKind, Number};
use std::fmt::Write;

const INDENT: &str = "    ";

/// Writes decompiled code as Java-like text
#[derive(Debug, Default)]
pub struct PseudoCodeWriter {
    out: String,
    depth: usize,
}

impl PseudoCodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text written so far
    pub fn finish(self) -> String {
        self.out
    }

    /// Body of a structured unit without its declaration
    pub fn render_body(body: &MethodBody, tree: &StructureTree) -> String {
        let mut writer = Self::new();
        Scope::new(&body.graph, tree, &body.variables).root().write(&mut writer);
        writer.finish()
    }

    /// A structured unit as a method declaration
    pub fn render(body: &MethodBody, tree: &StructureTree) -> String {
        let mut writer = Self::new();
        writer.write_header(body);
        writer.depth += 1;
        Scope::new(&body.graph, tree, &body.variables).root().write(&mut writer);
        writer.depth -= 1;
        writer.out.push_str("}\n");
        writer.finish()
    }

    fn write_header(&mut self, body: &MethodBody) {
        let owner = JvmType::Reference(body.owner.clone()).simple_name();
        if body.name == "<clinit>" {
            self.out.push_str("static {\n");
            return;
        }
        if body.is_static {
            self.out.push_str("static ");
        }
        if body.is_constructor() {
            self.out.push_str(&owner);
        } else {
            let _ = write!(self.out, "{} {}", body.descriptor.return_type.simple_name(), body.name);
        }
        let parameters: Vec<String> = body
            .variables
            .parameters()
            .map(|parameter| format!("{} {}", parameter.ty.get().simple_name(), parameter.name))
            .collect();
        let _ = writeln!(self.out, "({}) {{", parameters.join(", "));
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn text(&mut self, text: &str) {
        self.out.push_str(text);
    }

    /// `body` one level deeper, then the closing brace on its own line
    fn block(&mut self, body: &dyn Code) {
        self.text(" {\n");
        self.depth += 1;
        body.write(self);
        self.depth -= 1;
        self.indent();
        self.text("}");
    }

    fn label(&mut self, label: Option<&str>) {
        if let Some(label) = label {
            let _ = write!(self.out, "{}: ", label);
        }
    }

    fn list(&mut self, items: &[&dyn Code]) {
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.text(", ");
            }
            item.write(self);
        }
    }

    fn switch_body(&mut self, selector: &dyn Code, cases: &[SwitchCase<'_>], default: Option<&dyn Code>) {
        self.text("switch (");
        selector.write(self);
        self.text(") {\n");
        for case in cases {
            for key in case.keys {
                self.indent();
                let _ = writeln!(self.out, "case {}:", key);
            }
            self.depth += 1;
            case.body.write(self);
            self.depth -= 1;
        }
        if let Some(default) = default {
            self.indent();
            self.text("default:\n");
            self.depth += 1;
            default.write(self);
            self.depth -= 1;
        }
        self.indent();
        self.text("}");
    }

    /// Keyword statement with an optional operand
    fn keyword(&mut self, keyword: &str, value: Option<&dyn Code>) {
        self.indent();
        self.text(keyword);
        if let Some(value) = value {
            self.text(" ");
            value.write(self);
        }
        self.text(";\n");
    }
}

fn escape(value: char, quote: char, out: &mut String) {
    match value {
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\r' => out.push_str("\\r"),
        '\\' => out.push_str("\\\\"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_control() || (c as u32) > 0xFFFF => {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
        c => out.push(c),
    }
}

impl CodeSink for PseudoCodeWriter {
    fn write_statement(&mut self, statement: &dyn Code) {
        self.indent();
        statement.write(self);
        self.text(";\n");
    }

    fn write_if(&mut self, condition: &dyn Code, then: &dyn Code, elze: Option<&dyn Code>) {
        self.indent();
        self.text("if (");
        condition.write(self);
        self.text(")");
        self.block(then);
        if let Some(elze) = elze {
            self.text(" else");
            self.block(elze);
        }
        self.text("\n");
    }

    fn write_while(&mut self, label: Option<&str>, condition: &dyn Code, body: &dyn Code) {
        self.indent();
        self.label(label);
        self.text("while (");
        condition.write(self);
        self.text(")");
        self.block(body);
        self.text("\n");
    }

    fn write_do_while(&mut self, label: Option<&str>, body: &dyn Code, condition: &dyn Code) {
        self.indent();
        self.label(label);
        self.text("do");
        self.block(body);
        self.text(" while (");
        condition.write(self);
        self.text(");\n");
    }

    fn write_for(
        &mut self,
        label: Option<&str>,
        initializer: Option<&dyn Code>,
        condition: &dyn Code,
        updates: &[&dyn Code],
        body: &dyn Code,
    ) {
        self.indent();
        self.label(label);
        self.text("for (");
        if let Some(initializer) = initializer {
            initializer.write(self);
        }
        self.text("; ");
        condition.write(self);
        self.text("; ");
        self.list(updates);
        self.text(")");
        self.block(body);
        self.text("\n");
    }

    fn write_enhanced_for(&mut self, label: Option<&str>, variable: &dyn Code, iterable: &dyn Code, body: &dyn Code) {
        self.indent();
        self.label(label);
        self.text("for (");
        variable.write(self);
        self.text(" : ");
        iterable.write(self);
        self.text(")");
        self.block(body);
        self.text("\n");
    }

    fn write_infinite_loop(&mut self, label: Option<&str>, body: &dyn Code) {
        self.indent();
        self.label(label);
        self.text("while (true)");
        self.block(body);
        self.text("\n");
    }

    fn write_switch(
        &mut self,
        label: Option<&str>,
        selector: &dyn Code,
        cases: &[SwitchCase<'_>],
        default: Option<&dyn Code>,
    ) {
        self.indent();
        self.label(label);
        self.switch_body(selector, cases, default);
        self.text("\n");
    }

    fn write_try(&mut self, body: &dyn Code, catches: &[CatchClause<'_>], finally: Option<&dyn Code>) {
        self.indent();
        self.text("try");
        self.block(body);
        for clause in catches {
            let exception = clause
                .exception
                .map_or_else(|| "Throwable".to_string(), |name| JvmType::Reference(name.into()).simple_name());
            let _ = write!(self.out, " catch ({} {})", exception, clause.variable.unwrap_or("e"));
            self.block(clause.body);
        }
        if let Some(finally) = finally {
            self.text(" finally");
            self.block(finally);
        }
        self.text("\n");
    }

    fn write_return(&mut self, value: Option<&dyn Code>) {
        self.keyword("return", value);
    }

    fn write_throw(&mut self, value: &dyn Code) {
        self.keyword("throw", Some(value));
    }

    fn write_yield(&mut self, value: &dyn Code) {
        self.keyword("yield", Some(value));
    }

    fn write_break(&mut self, label: Option<&str>) {
        self.indent();
        match label {
            Some(label) => {
                let _ = writeln!(self.out, "break {};", label);
            }
            None => self.text("break;\n"),
        }
    }

    fn write_continue(&mut self, label: Option<&str>) {
        self.indent();
        match label {
            Some(label) => {
                let _ = writeln!(self.out, "continue {};", label);
            }
            None => self.text("continue;\n"),
        }
    }

    fn write_assert(&mut self, condition: &dyn Code, message: Option<&dyn Code>) {
        self.indent();
        self.text("assert ");
        condition.write(self);
        if let Some(message) = message {
            self.text(" : ");
            message.write(self);
        }
        self.text(";\n");
    }

    fn write_binary_operation(&mut self, left: &dyn Code, operator: &str, right: &dyn Code) {
        left.write(self);
        let _ = write!(self.out, " {} ", operator);
        right.write(self);
    }

    fn write_unary_operation(&mut self, operator: &str, postfix: bool, value: &dyn Code) {
        if postfix {
            value.write(self);
            self.text(operator);
        } else {
            self.text(operator);
            value.write(self);
        }
    }

    fn write_assign_operation(&mut self, target: &dyn Code, operator: &str, value: &dyn Code) {
        target.write(self);
        let _ = write!(self.out, " {} ", operator);
        value.write(self);
    }

    fn write_method_call(
        &mut self,
        receiver: Option<&dyn Code>,
        owner: &str,
        name: &str,
        special: bool,
        arguments: &[&dyn Code],
    ) {
        match receiver {
            Some(_) if special => self.text("super"),
            Some(receiver) => receiver.write(self),
            None => self.text(&JvmType::Reference(owner.into()).simple_name()),
        }
        let _ = write!(self.out, ".{}(", name);
        self.list(arguments);
        self.text(")");
    }

    fn write_constructor_call(&mut self, kind: ConstructorKind, owner: &str, arguments: &[&dyn Code]) {
        match kind {
            ConstructorKind::New => {
                let _ = write!(self.out, "new {}(", JvmType::Reference(owner.into()).simple_name());
            }
            ConstructorKind::Super => self.text("super("),
            ConstructorKind::This => self.text("this("),
        }
        self.list(arguments);
        self.text(")");
    }

    fn write_access_field(&mut self, receiver: Option<&dyn Code>, owner: &str, name: &str) {
        match receiver {
            Some(receiver) => receiver.write(self),
            None => self.text(&JvmType::Reference(owner.into()).simple_name()),
        }
        let _ = write!(self.out, ".{}", name);
    }

    fn write_access_array(&mut self, array: &dyn Code, index: &dyn Code) {
        array.write(self);
        self.text("[");
        index.write(self);
        self.text("]");
    }

    fn write_array_length(&mut self, array: &dyn Code) {
        array.write(self);
        self.text(".length");
    }

    fn write_create_array(&mut self, element: &JvmType, dimensions: &[&dyn Code], initializers: Option<&[&dyn Code]>) {
        let _ = write!(self.out, "new {}", element.simple_name());
        match initializers {
            Some(values) => {
                self.text("[] {");
                self.list(values);
                self.text("}");
            }
            None => {
                for dimension in dimensions {
                    self.text("[");
                    dimension.write(self);
                    self.text("]");
                }
            }
        }
    }

    fn write_cast(&mut self, ty: &JvmType, value: &dyn Code) {
        let _ = write!(self.out, "({}) ", ty.simple_name());
        value.write(self);
    }

    fn write_instanceof(&mut self, value: &dyn Code, ty: &JvmType) {
        value.write(self);
        let _ = write!(self.out, " instanceof {}", ty.simple_name());
    }

    fn write_local_variable(&mut self, ty: &JvmType, name: &str, declare: bool) {
        if declare {
            let _ = write!(self.out, "{} ", ty.simple_name());
        }
        self.text(name);
    }

    fn write_this(&mut self) {
        self.text("this");
    }

    fn write_class_literal(&mut self, ty: &JvmType) {
        let _ = write!(self.out, "{}.class", ty.simple_name());
    }

    fn write_ternary(&mut self, condition: &dyn Code, then: &dyn Code, elze: &dyn Code) {
        condition.write(self);
        self.text(" ? ");
        then.write(self);
        self.text(" : ");
        elze.write(self);
    }

    fn write_lambda(&mut self, interface: &str, owner: &str, name: &str, captures: &[&dyn Code]) {
        let _ = write!(
            self.out,
            "/* {} */ ",
            JvmType::Reference(interface.into()).simple_name()
        );
        let owner = JvmType::Reference(owner.into()).simple_name();
        if captures.is_empty() {
            let _ = write!(self.out, "{}::{}", owner, name);
        } else {
            let _ = write!(self.out, "(...) -> {}.{}(", owner, name);
            self.list(captures);
            self.text(", ...)");
        }
    }

    fn write_method_reference(&mut self, receiver: Option<&dyn Code>, owner: &str, name: &str) {
        match receiver {
            Some(receiver) => receiver.write(self),
            None => self.text(&JvmType::Reference(owner.into()).simple_name()),
        }
        let _ = write!(self.out, "::{}", name);
    }

    fn write_switch_expression(&mut self, selector: &dyn Code, cases: &[SwitchCase<'_>], default: Option<&dyn Code>) {
        self.depth += 1;
        self.switch_body(selector, cases, default);
        self.depth -= 1;
    }

    fn write_number(&mut self, value: Number) {
        let _ = write!(self.out, "{}", value);
    }

    fn write_char(&mut self, value: char) {
        self.out.push('\'');
        escape(value, '\'', &mut self.out);
        self.out.push('\'');
    }

    fn write_string(&mut self, value: &str) {
        self.out.push('"');
        for c in value.chars() {
            escape(c, '"', &mut self.out);
        }
        self.out.push('"');
    }

    fn write_boolean(&mut self, value: bool) {
        self.text(if value { "true" } else { "false" });
    }

    fn write_null(&mut self) {
        self.text("null");
    }

    fn write_enclose(&mut self, inner: &dyn Code) {
        self.text("(");
        inner.write(self);
        self.text(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Text(&'static str);

    impl Code for Text {
        fn write(&self, sink: &mut dyn CodeSink) {
            sink.write_statement(&Raw(self.0));
        }
    }

    struct Raw(&'static str);

    impl Code for Raw {
        fn write(&self, sink: &mut dyn CodeSink) {
            sink.write_string(self.0);
        }
    }

    #[test]
    fn blocks_nest_with_indentation() {
        let mut writer = PseudoCodeWriter::new();
        writer.write_while(Some("l1"), &Raw("c"), &Text("body"));
        assert_eq!(writer.finish(), "l1: while (\"c\") {\n    \"body\";\n}\n");
    }

    #[test]
    fn strings_and_chars_are_escaped() {
        let mut writer = PseudoCodeWriter::new();
        writer.write_string("a\"b\n");
        writer.write_char('\'');
        writer.write_char('\u{1}');
        assert_eq!(writer.finish(), "\"a\\\"b\\n\"'\\'''\\u0001'");
    }

    #[test]
    fn switch_lists_every_key() {
        let mut writer = PseudoCodeWriter::new();
        let body = Text("x");
        writer.write_switch(
            None,
            &Raw("s"),
            &[SwitchCase {
                keys: &[1, 2],
                body: &body,
            }],
            None,
        );
        assert_eq!(
            writer.finish(),
            "switch (\"s\") {\ncase 1:\ncase 2:\n    \"x\";\n}\n"
        );
    }
}
