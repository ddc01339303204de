use crate::ast::*;

/// Render an expression tree back into Groovy-like source text. Lowered
/// trees print their rewritten form, so `a <=> b` shows up as the ternary
/// chain it was replaced with.
pub fn pretty_print(expr: &TypedExpr) -> String {
    let mut pp = PrettyPrinter::new();
    pp.emit_expr(expr);
    pp.buf
}

struct PrettyPrinter {
    buf: String,
    indent: usize,
}

impl PrettyPrinter {
    fn new() -> Self {
        Self {
            buf: String::new(),
            indent: 0,
        }
    }

    fn write(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    fn newline(&mut self) {
        self.buf.push('\n');
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.buf.push_str("    ");
        }
    }

    fn emit_list(&mut self, items: &[TypedExpr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.emit_expr(item);
        }
    }

    /// Operands that are themselves operators get parenthesized.
    fn emit_operand(&mut self, expr: &TypedExpr) {
        let compound = matches!(
            expr.node,
            Expr::Binary(_) | Expr::Ternary { .. } | Expr::CompareToNull { .. } | Expr::CompareIdentity { .. }
        );
        if compound {
            self.write("(");
            self.emit_expr(expr);
            self.write(")");
        } else {
            self.emit_expr(expr);
        }
    }

    fn emit_expr(&mut self, expr: &TypedExpr) {
        match &expr.node {
            Expr::Constant(c) => self.write(&c.to_string()),
            Expr::Variable(v) => self.write(&v.name),
            Expr::This => self.write("this"),
            Expr::ClassRef(ty) => self.write(&ty.to_string()),
            Expr::Property(p) => {
                self.emit_operand(&p.object);
                self.write(if p.safe { "?." } else { "." });
                self.write(&p.name);
            }
            Expr::Binary(bin) => {
                if bin.declaration {
                    self.write("def ");
                }
                self.emit_operand(&bin.lhs);
                self.write(" ");
                self.write(bin.op.node.symbol());
                self.write(" ");
                self.emit_operand(&bin.rhs);
            }
            Expr::Unary { op, operand } => {
                self.write(op.symbol());
                self.emit_operand(operand);
            }
            Expr::Tuple(items) => {
                self.write("(");
                self.emit_list(items);
                self.write(")");
            }
            Expr::List(items) => {
                self.write("[");
                self.emit_list(items);
                self.write("]");
            }
            Expr::MethodCall(call) => {
                if !call.implicit_this {
                    self.emit_operand(&call.receiver);
                    self.write(if call.safe { "?." } else { "." });
                }
                self.write(&call.name);
                self.write("(");
                self.emit_list(&call.args);
                self.write(")");
            }
            Expr::New { ty, args } => {
                self.write("new ");
                self.write(&ty.to_string());
                self.write("(");
                self.emit_list(args);
                self.write(")");
            }
            Expr::NewArray { element, sizes } => {
                self.write("new ");
                self.write(&element.to_string());
                for size in sizes {
                    self.write("[");
                    self.emit_expr(size);
                    self.write("]");
                }
            }
            Expr::Ternary { cond, then_branch, else_branch } => {
                self.emit_operand(cond);
                self.write(" ? ");
                self.emit_operand(then_branch);
                self.write(" : ");
                self.emit_operand(else_branch);
            }
            Expr::CompareToNull { operand, equal_to_null } => {
                self.emit_operand(operand);
                self.write(if *equal_to_null { " === null" } else { " !== null" });
            }
            Expr::CompareIdentity { lhs, rhs } => {
                self.emit_operand(lhs);
                self.write(" === ");
                self.emit_operand(rhs);
            }
            Expr::MethodReference(r) => {
                self.emit_operand(&r.receiver);
                self.write("::");
                self.write(&r.name.node);
            }
            Expr::Sequence(items) => {
                self.write("{");
                self.newline();
                self.indent += 1;
                for item in items {
                    self.write_indent();
                    self.emit_expr(item);
                    self.newline();
                }
                self.indent -= 1;
                self.write_indent();
                self.write("}");
            }
            Expr::Other { label, children } => {
                self.write(label);
                if !children.is_empty() {
                    self.write("(");
                    self.emit_list(children);
                    self.write(")");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn nested_operators_are_parenthesized() {
        let sum = TypedExpr::binary(BinOp::Plus, TypedExpr::var("a", Type::int()), TypedExpr::int(1));
        let expr = TypedExpr::binary(BinOp::Multiply, sum, TypedExpr::var("b", Type::int()));
        insta::assert_snapshot!(pretty_print(&expr), @"(a + 1) * b");
    }

    #[test]
    fn ternary_chain() {
        let a = || TypedExpr::var("a", Type::int());
        let b = || TypedExpr::var("b", Type::int());
        let inner = TypedExpr::ternary(TypedExpr::binary(BinOp::Less, a(), b()), TypedExpr::int(-1), TypedExpr::int(1));
        let expr = TypedExpr::ternary(TypedExpr::binary(BinOp::Equal, a(), b()), TypedExpr::int(0), inner);
        insta::assert_snapshot!(pretty_print(&expr), @"(a == b) ? 0 : ((a < b) ? -1 : 1)");
    }

    #[test]
    fn sequence_prints_one_expression_per_line() {
        let expr = TypedExpr::new(
            Expr::Sequence(vec![
                TypedExpr::declaration(TypedExpr::var("t", Type::int()), TypedExpr::var("a", Type::int())),
                TypedExpr::compare_to_null(TypedExpr::var("s", Type::string()), true),
            ]),
            crate::span::Span::dummy(),
        );
        assert_eq!(pretty_print(&expr), "{\n    def t = a\n    s === null\n}");
    }

    #[test]
    fn method_reference_and_call() {
        let r = TypedExpr::method_ref(
            TypedExpr::class_ref(Type::string()),
            "valueOf",
            Type::object("java.util.function.Function"),
        );
        insta::assert_snapshot!(pretty_print(&r), @"java.lang.String::valueOf");
        let call = TypedExpr::call(TypedExpr::var("xs", Type::object("java.util.List")), "size", vec![]);
        insta::assert_snapshot!(pretty_print(&call), @"xs.size()");
    }
}
