//! Method contracts declared as Rust traits.
//!
//! ```ignore
//! /// gen:for users
//! trait Querier {
//!     /// SELECT * FROM @@table WHERE @@name = @name
//!     fn FindByName(name: &str) -> Result<Vec<gen::T>, sea_orm::DbErr>;
//!
//!     /// gen:skip
//!     fn HandWritten(id: i64) -> Result<gen::T, sea_orm::DbErr>;
//! }
//! ```
//!
//! The doc comment of a method is its query template. A `gen:skip` line
//! marks the method as hand-written; a `gen:for` line restricts which models
//! the method applies to.

use crate::error::{SchemaError, TemplateError};
use crate::model::Model;
use quote::ToTokens;
use syn::{Attribute, FnArg, Item, Pat, ReturnType, TraitItem};

const SKIP_DIRECTIVE: &str = "gen:skip";
const FOR_DIRECTIVE: &str = "gen:for";

/// A trait of method contracts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub methods: Vec<MethodContract>,
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Binding name; `None` for non-identifier patterns such as `_`
    pub name: Option<String>,
    /// Pattern as written
    pub pattern: String,
    /// Type as written, `gen::T` not yet substituted
    pub ty: String,
}

/// One declared method and its template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodContract {
    /// Name as declared in the trait
    pub name: String,
    pub params: Vec<Param>,
    /// Return type as written; `None` for `()`
    pub return_type: Option<String>,
    pub template: String,
    pub skip: bool,
    /// Models the method applies to; empty means every model
    pub for_types: Vec<String>,
    /// Set when the declaration itself cannot be generated
    pub invalid: Option<String>,
}

impl MethodContract {
    /// Names `@param` markers may refer to
    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().filter_map(|param| param.name.clone()).collect()
    }

    /// Whether the method applies to `model`.
    ///
    /// A qualifier matches the table name, the model name or the module
    /// name, ignoring ASCII case.
    pub fn applies_to(&self, model: &Model) -> bool {
        self.for_types.is_empty()
            || self.for_types.iter().any(|target| {
                target.eq_ignore_ascii_case(model.table_name())
                    || target.eq_ignore_ascii_case(model.model_name())
                    || target.eq_ignore_ascii_case(&model.names.module_name)
            })
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        match &self.invalid {
            Some(message) => Err(TemplateError::InvalidContract {
                method: self.name.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Parse every trait in `source` as an interface
pub fn parse_interfaces(source: &str) -> Result<Vec<Interface>, SchemaError> {
    let file = syn::parse_file(source).map_err(|err| SchemaError::InvalidSource {
        context: "interface source".to_string(),
        message: err.to_string(),
    })?;

    let mut interfaces = Vec::new();
    for item in file.items {
        let Item::Trait(item_trait) = item else {
            continue;
        };
        let trait_docs = Docs::parse(&item_trait.attrs, &item_trait.ident.to_string());
        let mut methods = Vec::new();
        for trait_item in &item_trait.items {
            let TraitItem::Fn(method) = trait_item else {
                continue;
            };
            let docs = Docs::parse(&method.attrs, &method.sig.ident.to_string());
            let sig = &method.sig;

            let mut invalid = None;
            if !sig.generics.params.is_empty() {
                invalid = Some("generic methods cannot be generated".to_string());
            }
            if method.default.is_some() {
                invalid = Some("methods with a default body cannot be generated".to_string());
            }

            let params = sig
                .inputs
                .iter()
                .filter_map(|input| match input {
                    FnArg::Receiver(_) => None,
                    FnArg::Typed(typed) => Some(Param {
                        name: match typed.pat.as_ref() {
                            Pat::Ident(pat) => Some(pat.ident.to_string().trim_start_matches("r#").to_string()),
                            _ => None,
                        },
                        pattern: typed.pat.to_token_stream().to_string(),
                        ty: typed.ty.to_token_stream().to_string(),
                    }),
                })
                .collect();
            let return_type = match &sig.output {
                ReturnType::Default => None,
                ReturnType::Type(_, ty) => Some(ty.to_token_stream().to_string()),
            };

            methods.push(MethodContract {
                name: sig.ident.to_string(),
                params,
                return_type,
                template: docs.template,
                skip: docs.skip,
                for_types: if docs.for_types.is_empty() {
                    trait_docs.for_types.clone()
                } else {
                    docs.for_types
                },
                invalid,
            });
        }
        interfaces.push(Interface {
            name: item_trait.ident.to_string(),
            methods,
        });
    }
    Ok(interfaces)
}

/// Directives and template text of one doc comment
#[derive(Default)]
struct Docs {
    template: String,
    skip: bool,
    for_types: Vec<String>,
}

impl Docs {
    /// `name` is the documented item; a line opening with it is prose, not template
    fn parse(attrs: &[Attribute], name: &str) -> Self {
        let mut docs = Docs::default();
        let mut lines = Vec::new();
        for attr in attrs.iter().filter(|attr| attr.path().is_ident("doc")) {
            let syn::Meta::NameValue(nv) = &attr.meta else {
                continue;
            };
            let syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) = &nv.value
            else {
                continue;
            };
            for line in lit.value().lines() {
                let line = line.trim();
                if line == SKIP_DIRECTIVE {
                    docs.skip = true;
                } else if let Some(targets) = directive_args(line, FOR_DIRECTIVE) {
                    docs.for_types.extend(
                        targets
                            .split(',')
                            .map(str::trim)
                            .filter(|target| !target.is_empty())
                            .map(str::to_string),
                    );
                } else if !line.is_empty() && directive_args(line, name).is_none() {
                    lines.push(line.to_string());
                }
            }
        }
        docs.template = lines.join("\n");
        docs
    }
}

/// Text after `keyword` when the line starts with it as a whole word
fn directive_args<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}
