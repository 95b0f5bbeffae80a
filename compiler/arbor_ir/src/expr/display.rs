//! Readable rendering of expression trees for diagnostics.

use std::fmt;

use super::{BinaryOp, Expr, ExprKind, UnaryOp};

fn comma_separated(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Constant(value) => write!(f, "{value}"),
            ExprKind::Parameter(param) => f.write_str(param.name()),
            ExprKind::Binary(binary) => match (&binary.method, binary.op) {
                (Some(method), _) => {
                    write!(f, "{}({}, {})", method.name(), binary.left, binary.right)
                }
                (None, BinaryOp::Power) => write!(f, "pow({}, {})", binary.left, binary.right),
                (None, op) => write!(f, "({} {} {})", binary.left, op.symbol(), binary.right),
            },
            ExprKind::Unary(unary) => match unary.op {
                UnaryOp::Convert | UnaryOp::ConvertChecked => {
                    write!(f, "{:?}({}, {})", unary.op, unary.operand, self.ty())
                }
                UnaryOp::TypeAs => write!(f, "({} as {})", unary.operand, self.ty()),
                UnaryOp::Negate | UnaryOp::NegateChecked => write!(f, "-{}", unary.operand),
                UnaryOp::Not => write!(f, "!{}", unary.operand),
                UnaryOp::OnesComplement => write!(f, "~{}", unary.operand),
                UnaryOp::UnaryPlus => write!(f, "+{}", unary.operand),
                UnaryOp::ArrayLength => write!(f, "{}.len", unary.operand),
            },
            ExprKind::Conditional(cond) => {
                write!(f, "IIF({}, {}, {})", cond.test, cond.if_true, cond.if_false)
            }
            ExprKind::Member(access) => match &access.receiver {
                Some(receiver) => write!(f, "{receiver}.{}", access.member.name()),
                None => f.write_str(access.member.name()),
            },
            ExprKind::Call(call) => {
                if let Some(receiver) = &call.receiver {
                    write!(f, "{receiver}.")?;
                }
                write!(f, "{}(", call.method.name())?;
                comma_separated(f, &call.args)?;
                f.write_str(")")
            }
            ExprKind::New(new) => {
                write!(f, "new {}(", new.ctor.ty())?;
                comma_separated(f, &new.args)?;
                f.write_str(")")
            }
            ExprKind::NewArray(array) => {
                write!(f, "new {}[] {{", array.element)?;
                comma_separated(f, &array.items)?;
                f.write_str("}")
            }
            ExprKind::Index(index) => {
                write!(f, "{}[", index.receiver)?;
                comma_separated(f, &index.args)?;
                f.write_str("]")
            }
            ExprKind::TypeIs(test) => write!(f, "({} is {})", test.operand, test.target),
            ExprKind::Lambda(parts) => {
                if let [single] = parts.params() {
                    write!(f, "{single} => {}", parts.body())
                } else {
                    f.write_str("(")?;
                    comma_separated(f, parts.params())?;
                    write!(f, ") => {}", parts.body())
                }
            }
            ExprKind::Raise(raise) => write!(f, "raise({})", raise.payload),
            ExprKind::Extension(ext) => write!(f, "<{}>", ext.kind),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({self}: {})", self.ty())
    }
}
