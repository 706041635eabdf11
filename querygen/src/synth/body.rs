//! Lowering of a bound template into statements that build `__sql` and
//! `__values` at run time.

use super::signature::{classify, ValueKind};
use crate::dialect::Dialect;
use crate::error::TemplateError;
use crate::model::{Field, Model};
use crate::naming;
use crate::template::{ClauseKind, CompareOp, Fragment, Literal, Operand, Predicate};
use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};

/// One declared parameter after classification
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub kind: ValueKind,
    pub by_ref: bool,
}

/// Statements of a method body plus the clause helpers they call
pub struct LoweredBody {
    pub statements: TokenStream,
    pub uses_where: bool,
    pub uses_set: bool,
}

pub struct BodyBuilder<'a> {
    pub dialect: Dialect,
    pub model: &'a Model,
    pub params: &'a [ParamInfo],
    pub method: &'a str,
    clauses: usize,
    uses_where: bool,
    uses_set: bool,
}

/// SQL text waiting to be pushed as one `push_str`
struct Pending {
    text: String,
}

impl Pending {
    fn flush(&mut self, buffer: &Ident, out: &mut TokenStream) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            out.extend(quote! { #buffer.push_str(#text); });
        }
    }
}

impl<'a> BodyBuilder<'a> {
    pub fn new(dialect: Dialect, model: &'a Model, params: &'a [ParamInfo], method: &'a str) -> Self {
        Self {
            dialect,
            model,
            params,
            method,
            clauses: 0,
            uses_where: false,
            uses_set: false,
        }
    }

    pub fn lower(mut self, fragments: &[Fragment]) -> Result<LoweredBody, TemplateError> {
        let sql = format_ident!("__sql");
        let body = self.fragments(fragments, &sql)?;
        Ok(LoweredBody {
            statements: quote! {
                let mut __sql = String::new();
                #[allow(unused_mut)]
                let mut __values: Vec<::sea_orm::Value> = Vec::new();
                #body
            },
            uses_where: self.uses_where,
            uses_set: self.uses_set,
        })
    }

    fn invalid(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::InvalidContract {
            method: self.method.to_string(),
            message: message.into(),
        }
    }

    fn unbound(&self, path: String) -> TemplateError {
        TemplateError::UnboundFieldReference {
            method: self.method.to_string(),
            model: self.model.model_name().to_string(),
            path,
        }
    }

    fn fragments(&mut self, fragments: &[Fragment], buffer: &Ident) -> Result<TokenStream, TemplateError> {
        let mut out = TokenStream::new();
        let mut pending = Pending { text: String::new() };

        for fragment in fragments {
            match fragment {
                Fragment::Literal(text) => pending.text.push_str(text),
                Fragment::Table { .. } => pending.text.push_str(&self.dialect.quote_ident(self.model.table_name())),
                Fragment::Field { path, .. } => {
                    let (owner, field) = self
                        .model
                        .resolve_path(path)
                        .ok_or_else(|| self.unbound(format!("@@{}", path.join("."))))?;
                    let column = self.dialect.quote_ident(&field.column);
                    if path.len() > 1 {
                        pending.text.push_str(&self.dialect.quote_ident(owner.table_name()));
                        pending.text.push('.');
                    }
                    pending.text.push_str(&column);
                }
                Fragment::Param { name, path, .. } => {
                    let (expr, kind) = self.operand_expr(name, path)?;
                    match kind {
                        ValueKind::Slice => {
                            pending.flush(buffer, &mut out);
                            out.extend(self.expand_slice(&expr, buffer));
                        }
                        ValueKind::Model => {
                            return Err(self.invalid(format!(
                                "'@{}' is the whole model; bind one of its fields such as '@{}.id'",
                                name, name
                            )))
                        }
                        _ => {
                            out.extend(quote! { __values.push(::sea_orm::Value::from(#expr.clone())); });
                            if self.dialect.numbered_placeholders() {
                                pending.flush(buffer, &mut out);
                                out.extend(quote! { #buffer.push_str(&format!("${}", __values.len())); });
                            } else {
                                pending.text.push('?');
                            }
                        }
                    }
                }
                Fragment::Conditional { branches, otherwise } => {
                    pending.flush(buffer, &mut out);
                    let mut chain = TokenStream::new();
                    for (index, branch) in branches.iter().enumerate() {
                        let condition = self.predicate(&branch.predicate)?;
                        let body = self.fragments(&branch.body, buffer)?;
                        if index == 0 {
                            chain.extend(quote! { if #condition { #body } });
                        } else {
                            chain.extend(quote! { else if #condition { #body } });
                        }
                    }
                    if let Some(body) = otherwise {
                        let body = self.fragments(body, buffer)?;
                        chain.extend(quote! { else { #body } });
                    }
                    out.extend(chain);
                }
                Fragment::Clause { kind, body } => {
                    pending.flush(buffer, &mut out);
                    let clause = format_ident!("__clause{}", self.clauses);
                    self.clauses += 1;
                    let inner = self.fragments(body, &clause)?;
                    let helper = match kind {
                        ClauseKind::Where => {
                            self.uses_where = true;
                            format_ident!("where_clause")
                        }
                        ClauseKind::Set => {
                            self.uses_set = true;
                            format_ident!("set_clause")
                        }
                    };
                    out.extend(quote! {
                        let mut #clause = String::new();
                        #inner
                        #buffer.push_str(&#helper(&#clause));
                    });
                }
            }
        }
        pending.flush(buffer, &mut out);
        Ok(out)
    }

    fn expand_slice(&self, expr: &TokenStream, buffer: &Ident) -> TokenStream {
        let placeholder = if self.dialect.numbered_placeholders() {
            quote! { #buffer.push_str(&format!("${}", __values.len())); }
        } else {
            quote! { #buffer.push('?'); }
        };
        // `IN ()` is a syntax error everywhere; `IN (NULL)` matches nothing
        quote! {
            if #expr.is_empty() {
                #buffer.push_str("NULL");
            }
            for (__index, __item) in #expr.iter().enumerate() {
                if __index > 0 {
                    #buffer.push_str(", ");
                }
                __values.push(::sea_orm::Value::from(__item.clone()));
                #placeholder
            }
        }
    }

    fn param(&self, name: &str) -> Result<&'a ParamInfo, TemplateError> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .ok_or_else(|| self.invalid(format!("unknown parameter '{}'", name)))
    }

    /// Expression and kind of `name` or `name.field`
    fn operand_expr(&self, name: &str, path: &[String]) -> Result<(TokenStream, ValueKind), TemplateError> {
        let param = self.param(name)?;
        let ident = naming::ident(name);
        if path.is_empty() {
            let expr = if param.by_ref && matches!(param.kind, ValueKind::Bool | ValueKind::Number { .. }) {
                quote! { (*#ident) }
            } else {
                quote! { #ident }
            };
            return Ok((expr, param.kind.clone()));
        }

        let label = format!("@{}.{}", name, path.join("."));
        if param.kind != ValueKind::Model {
            return Err(self.invalid(format!("'{}' reads a field of a parameter that is not the model", label)));
        }
        let field = match path {
            [single] => self.model.resolve(single).filter(|field| !field.is_relation()),
            _ => None,
        }
        .ok_or_else(|| self.unbound(label))?;
        let field_ident = naming::ident(&field.name);
        Ok((quote! { #ident.#field_ident }, field_kind(field)))
    }

    fn predicate(&self, predicate: &Predicate) -> Result<TokenStream, TemplateError> {
        match predicate {
            Predicate::Present(Operand::Param { name, path }) => {
                let (expr, kind) = self.operand_expr(name, path)?;
                self.presence(&expr, &kind, name)
            }
            Predicate::Present(_) => Err(self.invalid("a condition needs a parameter")),
            Predicate::Not(inner) => {
                let inner = self.predicate(inner)?;
                Ok(quote! { !(#inner) })
            }
            Predicate::And(a, b) => {
                let (a, b) = (self.predicate(a)?, self.predicate(b)?);
                Ok(quote! { (#a) && (#b) })
            }
            Predicate::Or(a, b) => {
                let (a, b) = (self.predicate(a)?, self.predicate(b)?);
                Ok(quote! { (#a) || (#b) })
            }
            Predicate::Compare { left, op, right } => match (left, right) {
                (Operand::Param { name, path }, Operand::Nil) | (Operand::Nil, Operand::Param { name, path }) => {
                    let (expr, kind) = self.operand_expr(name, path)?;
                    self.nil_check(&expr, &kind, *op, name)
                }
                (Operand::Param { name, path }, Operand::Literal(literal)) => {
                    let (expr, kind) = self.operand_expr(name, path)?;
                    self.compare(&expr, &kind, *op, literal, name)
                }
                (Operand::Literal(literal), Operand::Param { name, path }) => {
                    let (expr, kind) = self.operand_expr(name, path)?;
                    self.compare(&expr, &kind, flip(*op), literal, name)
                }
                (Operand::Param { name: a, path: pa }, Operand::Param { name: b, path: pb }) => {
                    let (left, left_kind) = self.operand_expr(a, pa)?;
                    let (right, right_kind) = self.operand_expr(b, pb)?;
                    if left_kind != right_kind || !is_comparable(&left_kind) {
                        return Err(self.invalid(format!("'{}' and '{}' cannot be compared", a, b)));
                    }
                    let op = op_tokens(*op);
                    Ok(quote! { #left #op #right })
                }
                _ => Err(self.invalid("a comparison needs a parameter on one side")),
            },
        }
    }

    fn presence(&self, expr: &TokenStream, kind: &ValueKind, name: &str) -> Result<TokenStream, TemplateError> {
        Ok(match kind {
            ValueKind::Str | ValueKind::Slice => quote! { !#expr.is_empty() },
            ValueKind::Bool => quote! { #expr },
            ValueKind::Number { .. } => quote! { #expr != ::core::default::Default::default() },
            ValueKind::Optional(_) => quote! { #expr.is_some() },
            ValueKind::Nullable(_) => quote! { #expr.valid },
            ValueKind::Model => quote! { true },
            ValueKind::Other => return Err(self.invalid(format!("'{}' cannot be used as a condition", name))),
        })
    }

    fn nil_check(&self, expr: &TokenStream, kind: &ValueKind, op: CompareOp, name: &str) -> Result<TokenStream, TemplateError> {
        let is_nil = match kind {
            ValueKind::Optional(_) => quote! { #expr.is_none() },
            ValueKind::Nullable(_) => quote! { !#expr.valid },
            _ => return Err(self.invalid(format!("'{}' is never nil", name))),
        };
        match op {
            CompareOp::Eq => Ok(is_nil),
            CompareOp::Ne => Ok(quote! { !(#is_nil) }),
            _ => Err(self.invalid(format!("nil only supports == and != (on '{}')", name))),
        }
    }

    fn compare(
        &self,
        expr: &TokenStream,
        kind: &ValueKind,
        op: CompareOp,
        literal: &Literal,
        name: &str,
    ) -> Result<TokenStream, TemplateError> {
        let op_tokens = op_tokens(op);
        let mismatch = || self.invalid(format!("'{}' cannot be compared with {:?}", name, literal));
        Ok(match (kind, literal) {
            (ValueKind::Str, Literal::Str(value)) => quote! { &#expr[..] #op_tokens #value },
            (ValueKind::Number { float: false }, Literal::Int(value)) => {
                let value = proc_macro2::Literal::i64_unsuffixed(*value);
                quote! { #expr #op_tokens #value }
            }
            (ValueKind::Number { float: true }, Literal::Int(value)) => {
                let value = proc_macro2::Literal::f64_unsuffixed(*value as f64);
                quote! { #expr #op_tokens #value }
            }
            (ValueKind::Number { float: true }, Literal::Float(value)) => {
                let value = proc_macro2::Literal::f64_unsuffixed(*value);
                quote! { #expr #op_tokens #value }
            }
            (ValueKind::Bool, Literal::Bool(value)) => quote! { #expr #op_tokens #value },
            (ValueKind::Optional(inner), _) => {
                let value = self.compare(&deref_binding(inner), inner, op, literal, name)?;
                quote! { #expr.as_ref().map_or(false, |__v| #value) }
            }
            (ValueKind::Nullable(inner), _) => {
                let value = self.compare(&quote! { #expr.value }, inner, op, literal, name)?;
                quote! { (#expr.valid && #value) }
            }
            _ => return Err(mismatch()),
        })
    }
}

/// The closure binding `__v` of an `Option` comparison, dereferenced where
/// the inner value is `Copy`
fn deref_binding(kind: &ValueKind) -> TokenStream {
    match kind {
        ValueKind::Bool | ValueKind::Number { .. } => quote! { (*__v) },
        _ => quote! { __v },
    }
}

fn is_comparable(kind: &ValueKind) -> bool {
    matches!(kind, ValueKind::Str | ValueKind::Bool | ValueKind::Number { .. })
}

fn field_kind(field: &Field) -> ValueKind {
    syn::parse_str::<syn::Type>(&field.target_type)
        .map(|ty| classify(&ty).0)
        .unwrap_or(ValueKind::Other)
}

fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        other => other,
    }
}

fn op_tokens(op: CompareOp) -> TokenStream {
    match op {
        CompareOp::Eq => quote! { == },
        CompareOp::Ne => quote! { != },
        CompareOp::Gt => quote! { > },
        CompareOp::Ge => quote! { >= },
        CompareOp::Lt => quote! { < },
        CompareOp::Le => quote! { <= },
    }
}
